// Systemd unit, timer and boot data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// UnitScope represents which service manager reported a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitScope {
    /// System manager (PID 1)
    System,
    /// Per-user manager (`systemctl --user`)
    User,
}

impl UnitScope {
    /// Get display label for the scope
    pub fn label(&self) -> &'static str {
        match self {
            UnitScope::System => "system",
            UnitScope::User => "user",
        }
    }

    /// Get systemctl flag for this scope
    pub fn systemctl_flag(&self) -> Option<&'static str> {
        match self {
            UnitScope::System => None,
            UnitScope::User => Some("--user"),
        }
    }
}

/// Unit types known to systemd, derived from the unit name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Service,
    Socket,
    Target,
    Device,
    Mount,
    Automount,
    Timer,
    Swap,
    Path,
    Slice,
    Scope,
}

impl UnitType {
    pub const ALL: [UnitType; 11] = [
        UnitType::Service,
        UnitType::Socket,
        UnitType::Target,
        UnitType::Device,
        UnitType::Mount,
        UnitType::Automount,
        UnitType::Timer,
        UnitType::Swap,
        UnitType::Path,
        UnitType::Slice,
        UnitType::Scope,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::Service => "service",
            UnitType::Socket => "socket",
            UnitType::Target => "target",
            UnitType::Device => "device",
            UnitType::Mount => "mount",
            UnitType::Automount => "automount",
            UnitType::Timer => "timer",
            UnitType::Swap => "swap",
            UnitType::Path => "path",
            UnitType::Slice => "slice",
            UnitType::Scope => "scope",
        }
    }

    /// Derive the type from a unit name such as `sshd.service`
    pub fn from_unit_name(name: &str) -> Option<UnitType> {
        let (_, suffix) = name.rsplit_once('.')?;
        suffix.parse().ok()
    }
}

impl FromStr for UnitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnitType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("The given type '{}' is not a valid systemd unit type.", s))
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the unit's configuration has been loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadState {
    Stub,
    Loaded,
    NotFound,
    BadSetting,
    Error,
    Merged,
    Masked,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Stub => "stub",
            LoadState::Loaded => "loaded",
            LoadState::NotFound => "not-found",
            LoadState::BadSetting => "bad-setting",
            LoadState::Error => "error",
            LoadState::Merged => "merged",
            LoadState::Masked => "masked",
        }
    }
}

impl FromStr for LoadState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stub" => Ok(LoadState::Stub),
            "loaded" => Ok(LoadState::Loaded),
            "not-found" => Ok(LoadState::NotFound),
            "bad-setting" => Ok(LoadState::BadSetting),
            "error" => Ok(LoadState::Error),
            "merged" => Ok(LoadState::Merged),
            "masked" => Ok(LoadState::Masked),
            other => Err(format!("Invalid load state: {}", other)),
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The high-level state of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveState {
    Active,
    Reloading,
    Inactive,
    Failed,
    Activating,
    Deactivating,
}

impl ActiveState {
    pub const ALL: [ActiveState; 6] = [
        ActiveState::Active,
        ActiveState::Reloading,
        ActiveState::Inactive,
        ActiveState::Failed,
        ActiveState::Activating,
        ActiveState::Deactivating,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActiveState::Active => "active",
            ActiveState::Reloading => "reloading",
            ActiveState::Inactive => "inactive",
            ActiveState::Failed => "failed",
            ActiveState::Activating => "activating",
            ActiveState::Deactivating => "deactivating",
        }
    }
}

impl FromStr for ActiveState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActiveState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("Invalid active state: {}", s))
    }
}

impl fmt::Display for ActiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UnitRecord is the canonical snapshot of one systemd unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub name: String,
    pub unit_type: UnitType,
    pub load_state: LoadState,
    pub active_state: ActiveState,
    pub sub_state: String,
    pub description: String,
    pub scope: UnitScope,
}

impl UnitRecord {
    /// Returns true if the unit failed
    pub fn is_failed(&self) -> bool {
        self.active_state == ActiveState::Failed
    }

    /// Returns true if the unit configuration is loaded
    pub fn is_loaded(&self) -> bool {
        self.load_state == LoadState::Loaded
    }

    /// Returns true if the unit comes from a per-user manager
    pub fn is_user_unit(&self) -> bool {
        self.scope == UnitScope::User
    }
}

/// TimerRecord is the canonical snapshot of one timer unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRecord {
    pub name: String,
    pub next_run: Option<DateTime<Utc>>,
    /// Countdown to the next run (LEFT column)
    pub left: Option<Duration>,
    pub last_run: Option<DateTime<Utc>>,
    /// Time passed since the last run (PASSED column)
    pub time_since_last_run: Option<Duration>,
    pub activates: String,
    /// Next elapse on the monotonic clock, counted from boot. Only the bus
    /// reports it separately; `list-timers` merges both clocks into NEXT.
    #[serde(default)]
    pub next_monotonic: Option<Duration>,
}

impl TimerRecord {
    /// Nothing is scheduled for this timer anymore
    pub fn is_unscheduled(&self) -> bool {
        self.next_run.is_none() && self.left.is_none() && self.next_monotonic.is_none()
    }

    /// The timer has elapsed at least once
    pub fn has_run(&self) -> bool {
        self.last_run.is_some() || self.time_since_last_run.is_some()
    }

    /// Age of the last run, preferring the duration reported by systemd
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.time_since_last_run.or_else(|| {
            self.last_run
                .and_then(|last| now.signed_duration_since(last).to_std().ok())
        })
    }
}

/// Boot duration split into phases, as reported by `systemd-analyze`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupProfile {
    pub firmware: Option<Duration>,
    pub loader: Option<Duration>,
    pub kernel: Option<Duration>,
    pub initrd: Option<Duration>,
    pub userspace: Option<Duration>,
    /// Time until the default target was reached in userspace
    pub target_reached: Option<Duration>,
}

impl StartupProfile {
    /// Sum of all present phases; missing phases count as zero
    pub fn total(&self) -> Duration {
        [self.firmware, self.loader, self.kernel, self.initrd, self.userspace]
            .into_iter()
            .flatten()
            .sum()
    }

    pub fn has_phases(&self) -> bool {
        self.firmware.is_some()
            || self.loader.is_some()
            || self.kernel.is_some()
            || self.initrd.is_some()
            || self.userspace.is_some()
    }

    /// The figure startup thresholds are judged against
    pub fn judged(&self) -> Duration {
        self.target_reached
            .or(self.userspace)
            .unwrap_or_else(|| self.total())
    }

    /// Names the figure returned by [`StartupProfile::judged`] in a status line
    pub fn judged_label(&self) -> &'static str {
        if self.target_reached.is_some() {
            "default target reached after"
        } else if self.userspace.is_some() {
            "userspace startup took"
        } else {
            "startup took"
        }
    }
}

/// A table row that could not be turned into a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    pub source: String,
    pub row: String,
    pub reason: String,
    /// Unit name, when it could be read from the row
    pub unit: Option<String>,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{}: skipped {} ({})", self.source, unit, self.reason),
            None => write!(f, "{}: skipped row '{}' ({})", self.source, self.row.trim(), self.reason),
        }
    }
}
