// Acquisition contract shared by the command line and D-Bus backends

use crate::error::Result;
use crate::systemd::UnitScope;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Which backend gathers the monitoring data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Parse the text output of systemctl and systemd-analyze
    #[default]
    Cli,
    /// Query systemd's D-Bus API
    Dbus,
}

/// One entry of the manager's `ListUnits` reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusUnitRow {
    pub name: String,
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
}

/// Scheduling properties of a timer unit object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusTimerRow {
    pub name: String,
    /// Microseconds since the epoch, 0 when nothing is scheduled on the
    /// realtime clock
    pub next_elapse_usec: u64,
    /// Microseconds since boot, 0 when nothing is scheduled on the
    /// monotonic clock (`OnBootSec=`, `OnUnitActiveSec=`, ...)
    pub next_elapse_monotonic_usec: u64,
    /// Microseconds since the epoch, 0 when the timer never elapsed
    pub last_trigger_usec: u64,
    pub unit: String,
}

/// Monotonic boot timestamps of the manager object, in microseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusBootTimestamps {
    pub firmware: u64,
    pub loader: u64,
    pub initrd: u64,
    pub userspace: u64,
    pub finish: u64,
    /// When the default target became active, 0 if unknown
    pub default_target: u64,
}

/// Unit data as delivered by a backend, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitListing {
    /// Output of `systemctl list-units --all`
    Table(String),
    /// Output of `systemctl show --property=...` for a single unit
    Properties(String),
    /// Typed rows from D-Bus
    Bus(Vec<BusUnitRow>),
}

/// Timer data as delivered by a backend, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerListing {
    /// Output of `systemctl list-timers --all`
    Table(String),
    Bus(Vec<BusTimerRow>),
}

/// Boot timing as delivered by a backend, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootListing {
    /// Output of `systemd-analyze`
    Text(String),
    Bus(BusBootTimestamps),
    /// The boot process has not finished yet
    NotFinished,
}

/// Read-only access to the service manager.
///
/// Implemented by [`crate::systemd::CliSource`] and
/// [`crate::systemd::DbusSource`]; exactly one of them is used per run.
pub trait UnitSource {
    /// All units known to the manager of the given scope
    fn fetch_units(&self, scope: UnitScope) -> impl Future<Output = Result<UnitListing>> + Send;

    /// A single unit by name, loading it if the manager of the given scope
    /// does not list it
    fn fetch_unit(&self, name: &str, scope: UnitScope) -> impl Future<Output = Result<UnitListing>> + Send;

    /// All timer units of the system manager
    fn fetch_timers(&self) -> impl Future<Output = Result<TimerListing>> + Send;

    /// Boot duration breakdown
    fn fetch_startup(&self) -> impl Future<Output = Result<BootListing>> + Send;
}
