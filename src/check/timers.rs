// Dead timer detection

use crate::check::Severity;
use crate::systemd::TimerRecord;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default age of a dead timer that raises a warning (6 days)
pub const DEFAULT_WARNING_AGE: Duration = Duration::from_secs(6 * 24 * 60 * 60);
/// Default age of a dead timer that raises a critical state (7 days)
pub const DEFAULT_CRITICAL_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A timer that has nothing scheduled and whose last run is too old
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadTimer {
    pub name: String,
    pub activates: String,
    pub age: Duration,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerReport {
    pub dead: Vec<DeadTimer>,
    pub severity: Severity,
    /// Number of timers that were examined
    pub checked: usize,
}

fn classify(age: Duration, warning_age: Duration, critical_age: Duration) -> Severity {
    if age >= critical_age {
        Severity::Critical
    } else if age >= warning_age {
        Severity::Warning
    } else {
        Severity::Ok
    }
}

/// Find timers that are no longer scheduled although they ran before.
///
/// A timer that never ran has no history to go stale and is never dead.
pub fn find_dead(
    timers: &[TimerRecord],
    warning_age: Duration,
    critical_age: Duration,
    now: DateTime<Utc>,
) -> TimerReport {
    let mut dead = Vec::new();
    for timer in timers {
        if !timer.is_unscheduled() || !timer.has_run() {
            continue;
        }
        let Some(age) = timer.age(now) else {
            continue;
        };
        let severity = classify(age, warning_age, critical_age);
        if severity == Severity::Ok {
            continue;
        }
        tracing::info!("Timer {} is dead, last run {:?} ago", timer.name, age);
        dead.push(DeadTimer {
            name: timer.name.clone(),
            activates: timer.activates.clone(),
            age,
            severity,
        });
    }

    let severity = dead.iter().map(|d| d.severity).max().unwrap_or(Severity::Ok);
    TimerReport {
        dead,
        severity,
        checked: timers.len(),
    }
}
