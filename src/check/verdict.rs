// Severity aggregation and the monitoring plugin output

use crate::check::startup::StartupReport;
use crate::check::timers::TimerReport;
use crate::systemd::timespan::format_seconds;
use crate::systemd::{ActiveState, UnitRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum number of findings named in the summary line
pub const MAX_SUMMARY_ITEMS: usize = 10;

pub const NO_UNITS_MESSAGE: &str =
    "Please verify your --include-* and --exclude-* options. No units have been added for testing.";

/// Plugin states, ordered by significance. UNKNOWN is not a "worse
/// CRITICAL" but it dominates every other state because it means the
/// system could not be observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Severity {
    /// Exit code of the Nagios plugin API
    pub fn exit_code(&self) -> i32 {
        match self {
            Severity::Ok => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
            Severity::Unknown => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
            Severity::Unknown => "UNKNOWN",
        }
    }

    pub fn worst(self, other: Severity) -> Severity {
        self.max(other)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How to treat units whose configuration is not loaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotLoadedPolicy {
    /// Mention them in the verbose details only
    #[default]
    Ignore,
    /// Raise a warning for each of them
    Warning,
}

/// How selected units are judged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitRule {
    /// `None` scans for failed units, `Some(state)` asserts that every
    /// selected unit is in that state
    pub required_state: Option<ActiveState>,
    pub not_loaded: NotLoadedPolicy,
}

impl UnitRule {
    /// Whether the unit belongs to the restricted set of the required state
    pub fn conforms(&self, unit: &UnitRecord) -> bool {
        match self.required_state {
            Some(state) => unit.active_state == state,
            None => !unit.is_failed(),
        }
    }
}

/// One performance data value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerfMetric {
    pub value: f64,
    pub warning: Option<f64>,
    pub critical: Option<f64>,
}

impl PerfMetric {
    pub fn plain(value: f64) -> Self {
        Self {
            value,
            warning: None,
            critical: None,
        }
    }
}

impl fmt::Display for PerfMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_seconds(self.value))?;
        if self.warning.is_some() || self.critical.is_some() {
            let threshold = |t: Option<f64>| t.map(format_seconds).unwrap_or_default();
            write!(f, ";{};{}", threshold(self.warning), threshold(self.critical))?;
        }
        Ok(())
    }
}

/// The result of one check run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub severity: Severity,
    pub summary: String,
    /// Performance data, sorted by label
    pub metrics: BTreeMap<String, PerfMetric>,
    /// Extra lines for verbose output
    pub details: Vec<String>,
}

impl Verdict {
    /// A run that could not observe the system; carries no metrics
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Unknown,
            summary: message.into(),
            metrics: BTreeMap::new(),
            details: Vec::new(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.severity.exit_code()
    }

    /// Render in the plugin text format:
    /// `SYSTEMD CRITICAL - smartd.service: failed | count_units=3 ...`
    pub fn render(&self, performance_data: bool, verbose: bool) -> String {
        let mut output = if self.severity == Severity::Unknown {
            format!("SYSTEMD {}: {}", self.severity, self.summary)
        } else {
            format!("SYSTEMD {} - {}", self.severity, self.summary)
        };

        if performance_data && !self.metrics.is_empty() {
            let perfdata: Vec<String> = self
                .metrics
                .iter()
                .map(|(label, metric)| format!("{}={}", label, metric))
                .collect();
            output.push_str(" | ");
            output.push_str(&perfdata.join(" "));
        }

        if verbose {
            for line in &self.details {
                output.push('\n');
                output.push_str(line);
            }
        }
        output
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Finding {
    severity: Severity,
    text: String,
}

fn unit_findings(units: &[UnitRecord], rule: &UnitRule, details: &mut Vec<String>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for unit in units {
        if !rule.conforms(unit) {
            findings.push(Finding {
                severity: Severity::Critical,
                text: format!("{}: {}", unit.name, unit.active_state),
            });
            continue;
        }
        if !unit.is_loaded() {
            details.push(format!(
                "{}: load state is {} ({}/{})",
                unit.name, unit.load_state, unit.active_state, unit.sub_state
            ));
            if rule.not_loaded == NotLoadedPolicy::Warning {
                findings.push(Finding {
                    severity: Severity::Warning,
                    text: format!("{}: {}", unit.name, unit.load_state),
                });
            }
        }
    }
    findings
}

fn timer_findings(report: &TimerReport, details: &mut Vec<String>) -> Vec<Finding> {
    report
        .dead
        .iter()
        .map(|timer| {
            details.push(format!(
                "{}: dead timer of {}, last run {}s ago",
                timer.name,
                timer.activates,
                format_seconds(timer.age.as_secs_f64())
            ));
            Finding {
                severity: timer.severity,
                text: timer.name.clone(),
            }
        })
        .collect()
}

fn startup_finding(report: &StartupReport) -> Option<Finding> {
    let (warning, critical) = report.thresholds?;
    let judged = report.judged?;
    let limit = match report.severity {
        Severity::Critical => critical,
        Severity::Warning => warning,
        _ => return None,
    };
    Some(Finding {
        severity: report.severity,
        text: format!(
            "{} {:.2}s (outside range 0:{})",
            report.judged_label,
            judged.as_secs_f64(),
            format_seconds(limit.as_secs_f64())
        ),
    })
}

fn metrics(
    units: &[UnitRecord],
    timers: Option<&TimerReport>,
    startup: &StartupReport,
) -> BTreeMap<String, PerfMetric> {
    let mut metrics = BTreeMap::new();
    metrics.insert("count_units".to_string(), PerfMetric::plain(units.len() as f64));
    for state in ActiveState::ALL {
        let count = units.iter().filter(|u| u.active_state == state).count();
        metrics.insert(format!("units_{}", state), PerfMetric::plain(count as f64));
    }
    if let Some(total) = startup.total_seconds() {
        let (warning, critical) = match startup.thresholds {
            Some((w, c)) => (Some(w.as_secs_f64()), Some(c.as_secs_f64())),
            None => (None, None),
        };
        metrics.insert(
            "startup_time".to_string(),
            PerfMetric {
                value: total,
                warning,
                critical,
            },
        );
    }
    if let Some(report) = timers {
        metrics.insert("count_timers".to_string(), PerfMetric::plain(report.checked as f64));
        metrics.insert("dead_timers".to_string(), PerfMetric::plain(report.dead.len() as f64));
    }
    metrics
}

fn summarize(findings: &[Finding], severity: Severity, units: &[UnitRecord]) -> String {
    let named: Vec<&str> = findings
        .iter()
        .filter(|f| f.severity == severity)
        .map(|f| f.text.as_str())
        .collect();

    if named.is_empty() {
        return match units {
            [unit] => format!("{}: {}", unit.name, unit.active_state),
            _ => format!("all {} units ok", units.len()),
        };
    }

    let mut summary = named
        .iter()
        .take(MAX_SUMMARY_ITEMS)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if named.len() > MAX_SUMMARY_ITEMS {
        summary.push_str(&format!(", +{} more", named.len() - MAX_SUMMARY_ITEMS));
    }
    summary
}

/// Fold the unit judgement, the dead timer check and the startup check
/// into one verdict.
///
/// `timers` is `None` when timers were not checked. The function has no
/// side effects.
pub fn aggregate(
    units: &[UnitRecord],
    rule: &UnitRule,
    timers: Option<&TimerReport>,
    startup: &StartupReport,
) -> Verdict {
    if units.is_empty() {
        return Verdict::unknown(NO_UNITS_MESSAGE);
    }

    let mut details = Vec::new();
    let mut findings = unit_findings(units, rule, &mut details);
    if let Some(report) = timers {
        findings.extend(timer_findings(report, &mut details));
    }
    findings.extend(startup_finding(startup));

    let severity = findings
        .iter()
        .map(|f| f.severity)
        .fold(Severity::Ok, Severity::worst);

    Verdict {
        severity,
        summary: summarize(&findings, severity, units),
        metrics: metrics(units, timers, startup),
        details,
    }
}
