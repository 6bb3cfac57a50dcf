// Normalization of raw backend output into the canonical unit model

use crate::error::{CheckError, Result};
use crate::systemd::source::{BootListing, BusBootTimestamps, BusTimerRow, BusUnitRow, TimerListing, UnitListing};
use crate::systemd::table::{Table, TableRow};
use crate::systemd::timespan::{from_realtime_usec, parse_timespan, parse_timestamp};
use crate::systemd::{RowIssue, StartupProfile, TimerRecord, UnitRecord, UnitScope, UnitType};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

const LIST_UNITS: &str = "systemctl list-units";
const LIST_TIMERS: &str = "systemctl list-timers";
const SHOW_UNIT: &str = "systemctl show";
const ANALYZE: &str = "systemd-analyze";

/// Records that survived normalization plus the rows that did not
#[derive(Debug, Clone)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub issues: Vec<RowIssue>,
}

impl<T> Default for Normalized<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            issues: Vec::new(),
        }
    }
}

impl<T> Normalized<T> {
    fn push(&mut self, source: &str, raw: &str, unit: Option<&str>, outcome: std::result::Result<T, String>) {
        match outcome {
            Ok(record) => self.records.push(record),
            Err(reason) => {
                tracing::debug!("{}: skipping row '{}': {}", source, raw.trim(), reason);
                self.issues.push(RowIssue {
                    source: source.to_string(),
                    row: raw.to_string(),
                    reason,
                    unit: unit.filter(|u| !u.is_empty()).map(str::to_string),
                });
            }
        }
    }
}

/// Cells that mean "not applicable" in systemctl tables
fn is_absent(cell: &str) -> bool {
    matches!(cell.trim(), "" | "n/a" | "-")
}

/// Strip the failure marker some systemctl versions print before the name
fn clean_unit_name(cell: &str) -> &str {
    cell.trim_start_matches(|c: char| c == '●' || c == '*' || c.is_whitespace())
        .trim_end()
}

fn unit_record(
    name: &str,
    load_state: &str,
    active_state: &str,
    sub_state: &str,
    description: &str,
    scope: UnitScope,
) -> std::result::Result<UnitRecord, String> {
    if name.is_empty() {
        return Err("missing unit name".to_string());
    }
    let unit_type = UnitType::from_unit_name(name)
        .ok_or_else(|| format!("unknown unit type of '{}'", name))?;
    Ok(UnitRecord {
        name: name.to_string(),
        unit_type,
        load_state: load_state.parse()?,
        active_state: active_state.parse()?,
        sub_state: sub_state.to_string(),
        description: description.to_string(),
        scope,
    })
}

/// Turn a unit listing of any backend into unit records.
pub fn normalize_units(listing: UnitListing, scope: UnitScope) -> Result<Normalized<UnitRecord>> {
    let mut normalized = Normalized::default();
    match listing {
        UnitListing::Table(stdout) => {
            let table = Table::parse(LIST_UNITS, &stdout)?;
            table.require_columns(&["unit", "load", "active", "sub"])?;
            for row in table.rows() {
                let name = clean_unit_name(row.get("unit"));
                let outcome = unit_record(
                    name,
                    row.get("load"),
                    row.get("active"),
                    row.get("sub"),
                    row.get("description"),
                    scope,
                );
                normalized.push(LIST_UNITS, &row.raw, Some(name), outcome);
            }
        }
        UnitListing::Properties(stdout) => {
            let properties: HashMap<&str, &str> = stdout
                .lines()
                .filter_map(|line| line.split_once('='))
                .collect();
            let name = properties
                .get("Id")
                .copied()
                .ok_or_else(|| CheckError::parse(SHOW_UNIT, "the property 'Id' is missing"))?;
            let property = |key: &str| properties.get(key).copied().unwrap_or("");
            let outcome = unit_record(
                name,
                property("LoadState"),
                property("ActiveState"),
                property("SubState"),
                property("Description"),
                scope,
            );
            normalized.push(SHOW_UNIT, &stdout, Some(name), outcome);
        }
        UnitListing::Bus(rows) => {
            for BusUnitRow {
                name,
                description,
                load_state,
                active_state,
                sub_state,
            } in rows
            {
                let outcome = unit_record(&name, &load_state, &active_state, &sub_state, &description, scope);
                let raw = format!("{} {} {} {}", name, load_state, active_state, sub_state);
                normalized.push("ListUnits", &raw, Some(&name), outcome);
            }
        }
    }
    Ok(normalized)
}

fn optional<T>(
    cell: &str,
    parse: impl Fn(&str) -> std::result::Result<T, String>,
) -> std::result::Result<Option<T>, String> {
    if is_absent(cell) {
        Ok(None)
    } else {
        parse(cell).map(Some)
    }
}

fn timer_from_row(row: &TableRow) -> std::result::Result<TimerRecord, String> {
    let name = row.get("unit");
    if name.is_empty() {
        return Err("missing unit name".to_string());
    }
    Ok(TimerRecord {
        name: name.to_string(),
        next_run: optional(row.get("next"), parse_timestamp)?,
        left: optional(row.get("left"), parse_timespan)?,
        last_run: optional(row.get("last"), parse_timestamp)?,
        time_since_last_run: optional(row.get("passed"), parse_timespan)?,
        activates: row.get("activates").to_string(),
        next_monotonic: None,
    })
}

fn timer_from_bus(row: &BusTimerRow, now: DateTime<Utc>) -> TimerRecord {
    let next_run = from_realtime_usec(row.next_elapse_usec);
    let last_run = from_realtime_usec(row.last_trigger_usec);
    TimerRecord {
        name: row.name.clone(),
        next_run,
        left: next_run.and_then(|next| next.signed_duration_since(now).to_std().ok()),
        last_run,
        time_since_last_run: last_run.and_then(|last| now.signed_duration_since(last).to_std().ok()),
        activates: row.unit.clone(),
        next_monotonic: match row.next_elapse_monotonic_usec {
            0 | u64::MAX => None,
            usec => Some(Duration::from_micros(usec)),
        },
    }
}

/// Turn a timer listing of any backend into timer records.
pub fn normalize_timers(listing: TimerListing, now: DateTime<Utc>) -> Result<Normalized<TimerRecord>> {
    let mut normalized = Normalized::default();
    match listing {
        TimerListing::Table(stdout) => {
            let table = Table::parse(LIST_TIMERS, &stdout)?;
            table.require_columns(&["next", "left", "last", "passed", "unit"])?;
            for row in table.rows() {
                let outcome = timer_from_row(&row);
                normalized.push(LIST_TIMERS, &row.raw, Some(row.get("unit")), outcome);
            }
        }
        TimerListing::Bus(rows) => {
            normalized.records = rows.iter().map(|row| timer_from_bus(row, now)).collect();
        }
    }
    Ok(normalized)
}

fn phase_regex() -> &'static Regex {
    static PHASE: OnceLock<Regex> = OnceLock::new();
    PHASE.get_or_init(|| {
        Regex::new(r"(?P<span>[^+=()]+?)\s*\((?P<phase>[a-z]+)\)").expect("phase pattern is valid")
    })
}

fn target_regex() -> &'static Regex {
    static TARGET: OnceLock<Regex> = OnceLock::new();
    TARGET.get_or_init(|| {
        Regex::new(r"reached after (?P<span>.+?) in userspace").expect("target pattern is valid")
    })
}

fn parse_analyze(stdout: &str) -> Result<Option<StartupProfile>> {
    if stdout.contains("Bootup is not yet finished") {
        return Ok(None);
    }

    let line = stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("Startup finished in "))
        .ok_or_else(|| CheckError::parse(ANALYZE, "no 'Startup finished in' line found"))?;
    let phases = line.split(" = ").next().unwrap_or(line);

    let span = |text: &str| -> Result<Duration> {
        parse_timespan(text).map_err(|reason| CheckError::parse(ANALYZE, reason).into())
    };

    let mut profile = StartupProfile::default();
    for captures in phase_regex().captures_iter(phases) {
        let duration = span(captures["span"].trim())?;
        match &captures["phase"] {
            "firmware" => profile.firmware = Some(duration),
            "loader" => profile.loader = Some(duration),
            "kernel" => profile.kernel = Some(duration),
            "initrd" => profile.initrd = Some(duration),
            "userspace" => profile.userspace = Some(duration),
            other => tracing::debug!("{}: ignoring unknown boot phase '{}'", ANALYZE, other),
        }
    }
    if !profile.has_phases() {
        return Err(CheckError::parse(ANALYZE, format!("no boot phases found in '{}'", line)).into());
    }

    if let Some(captures) = target_regex().captures(stdout) {
        profile.target_reached = Some(span(&captures["span"])?);
    }

    Ok(Some(profile))
}

/// Mirrors the phase arithmetic of systemd-analyze on the manager's
/// monotonic timestamps.
fn profile_from_bus(ts: &BusBootTimestamps) -> Option<StartupProfile> {
    if ts.finish == 0 {
        return None;
    }
    let usec = Duration::from_micros;
    let kernel_done = if ts.initrd > 0 { ts.initrd } else { ts.userspace };
    Some(StartupProfile {
        firmware: (ts.firmware > 0).then(|| usec(ts.firmware.saturating_sub(ts.loader))),
        loader: (ts.loader > 0).then(|| usec(ts.loader)),
        kernel: (kernel_done > 0).then(|| usec(kernel_done)),
        initrd: (ts.initrd > 0).then(|| usec(ts.userspace.saturating_sub(ts.initrd))),
        userspace: Some(usec(ts.finish.saturating_sub(ts.userspace))),
        target_reached: (ts.default_target > ts.userspace)
            .then(|| usec(ts.default_target - ts.userspace)),
    })
}

/// Turn boot timing of any backend into a profile; `None` while booting.
pub fn normalize_startup(listing: BootListing) -> Result<Option<StartupProfile>> {
    match listing {
        BootListing::Text(stdout) => parse_analyze(&stdout),
        BootListing::Bus(timestamps) => Ok(profile_from_bus(&timestamps)),
        BootListing::NotFinished => Ok(None),
    }
}
