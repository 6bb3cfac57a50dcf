// Startup time evaluation

use crate::check::Severity;
use crate::systemd::StartupProfile;
use std::time::Duration;

pub const DEFAULT_WARNING: Duration = Duration::from_secs(60);
pub const DEFAULT_CRITICAL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupReport {
    pub severity: Severity,
    /// Sum of all boot phases, `None` while the boot is not finished
    pub total: Option<Duration>,
    /// The figure the thresholds were compared with
    pub judged: Option<Duration>,
    /// What `judged` measures, e.g. "userspace startup took"
    pub judged_label: &'static str,
    /// (warning, critical) when the threshold check is enabled
    pub thresholds: Option<(Duration, Duration)>,
}

impl StartupReport {
    pub fn total_seconds(&self) -> Option<f64> {
        self.total.map(|t| t.as_secs_f64())
    }
}

/// Judge the boot duration against the thresholds.
///
/// The total is always reported; `enabled = false` only skips the judgement.
pub fn evaluate(
    profile: Option<&StartupProfile>,
    warning: Duration,
    critical: Duration,
    enabled: bool,
) -> StartupReport {
    let total = profile.map(StartupProfile::total);
    let judged = profile.map(StartupProfile::judged);

    let severity = match judged {
        Some(time) if enabled && time >= critical => Severity::Critical,
        Some(time) if enabled && time >= warning => Severity::Warning,
        _ => Severity::Ok,
    };

    StartupReport {
        severity,
        total,
        judged,
        judged_label: profile.map_or("startup took", StartupProfile::judged_label),
        thresholds: enabled.then_some((warning, critical)),
    }
}
