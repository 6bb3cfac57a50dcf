// Check pipeline: acquisition, normalization, selection and evaluation

pub mod selector;
pub mod startup;
pub mod timers;
pub mod verdict;


pub use selector::{select, NamePattern, SelectionCriteria};
pub use startup::StartupReport;
pub use timers::{find_dead, DeadTimer, TimerReport};
pub use verdict::{aggregate, NotLoadedPolicy, PerfMetric, Severity, UnitRule, Verdict};

use crate::error::{CheckError, Result};
use crate::systemd::{
    normalize_startup, normalize_timers, normalize_units, LoadState, RowIssue, StartupProfile, TimerRecord,
    UnitRecord, UnitScope, UnitSource,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::error::Elapsed;

/// A warning / critical pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub warning: Duration,
    pub critical: Duration,
}

/// Everything the pipeline needs to know, validated before acquisition
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub criteria: SelectionCriteria,
    pub rule: UnitRule,
    /// `None` when dead timers are not checked
    pub timers: Option<Thresholds>,
    pub startup: Thresholds,
    pub startup_enabled: bool,
    /// Upper bound for the whole acquisition phase
    pub timeout: Duration,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            criteria: SelectionCriteria::default(),
            rule: UnitRule::default(),
            timers: None,
            startup: Thresholds {
                warning: startup::DEFAULT_WARNING,
                critical: startup::DEFAULT_CRITICAL,
            },
            startup_enabled: true,
            timeout: Duration::from_secs(10),
        }
    }
}

/// One consistent picture of the service manager
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub units: Vec<UnitRecord>,
    pub timers: Option<Vec<TimerRecord>>,
    pub startup: Option<StartupProfile>,
    pub issues: Vec<RowIssue>,
}

/// Gather and normalize all data the options ask for, one request at a time.
pub async fn acquire<S: UnitSource>(source: &S, options: &CheckOptions, now: DateTime<Utc>) -> Result<Snapshot> {
    let mut snapshot = Snapshot::default();

    let mut scopes = vec![UnitScope::System];
    if options.criteria.include_user_units {
        scopes.push(UnitScope::User);
    }
    for scope in scopes {
        tracing::debug!("Listing {} units", scope.label());
        let normalized = normalize_units(source.fetch_units(scope).await?, scope)?;
        snapshot.units.extend(normalized.records);
        snapshot.issues.extend(normalized.issues);
    }

    // Units named explicitly may be missing from the listing, e.g. when
    // they are not loaded.
    let missing: Vec<String> = options
        .criteria
        .literal_includes()
        .filter(|name| !snapshot.units.iter().any(|u| u.name == *name))
        .map(str::to_string)
        .collect();
    for name in missing {
        tracing::debug!("Unit {} is not listed, querying it directly", name);
        let mut normalized = normalize_units(source.fetch_unit(&name, UnitScope::System).await?, UnitScope::System)?;
        // A user unit is unknown to the system manager
        if options.criteria.include_user_units && !is_loaded(&normalized.records) {
            tracing::debug!("Unit {} is not known to the system manager, asking the user manager", name);
            let user = normalize_units(source.fetch_unit(&name, UnitScope::User).await?, UnitScope::User)?;
            if is_loaded(&user.records) {
                normalized = user;
            }
        }
        snapshot.units.extend(normalized.records);
        snapshot.issues.extend(normalized.issues);
    }

    if options.timers.is_some() {
        let normalized = normalize_timers(source.fetch_timers().await?, now)?;
        snapshot.timers = Some(normalized.records);
        snapshot.issues.extend(normalized.issues);
    }

    snapshot.startup = normalize_startup(source.fetch_startup().await?)?;

    tracing::info!(
        "Acquired {} units, {} timers, {} skipped rows",
        snapshot.units.len(),
        snapshot.timers.as_ref().map_or(0, Vec::len),
        snapshot.issues.len()
    );
    Ok(snapshot)
}

fn is_loaded(units: &[UnitRecord]) -> bool {
    units.iter().any(|unit| unit.load_state != LoadState::NotFound)
}

/// Evaluate a snapshot. Pure: the same snapshot always gives the same verdict.
pub fn evaluate(snapshot: &Snapshot, options: &CheckOptions, now: DateTime<Utc>) -> Verdict {
    let selected = select(&snapshot.units, &options.criteria);

    let timer_report = options.timers.map(|thresholds| {
        let timers: Vec<TimerRecord> = snapshot
            .timers
            .iter()
            .flatten()
            .filter(|timer| !options.criteria.excludes_name(&timer.name))
            .cloned()
            .collect();
        find_dead(&timers, thresholds.warning, thresholds.critical, now)
    });

    let startup_report = startup::evaluate(
        snapshot.startup.as_ref(),
        options.startup.warning,
        options.startup.critical,
        options.startup_enabled,
    );

    let mut verdict = aggregate(&selected, &options.rule, timer_report.as_ref(), &startup_report);
    verdict
        .details
        .extend(snapshot.issues.iter().map(RowIssue::to_string));
    verdict
}

/// Run the whole check. Never fails: every error becomes an UNKNOWN verdict.
pub async fn run<S: UnitSource>(source: &S, options: &CheckOptions, now: DateTime<Utc>) -> Verdict {
    let outcome = tokio::time::timeout(options.timeout, acquire(source, options, now)).await;
    conclude(outcome, options, now)
}

/// Like [`run`], for a source that has to be set up first, e.g. a bus
/// connection. Connecting counts against the same timeout as acquisition.
pub async fn connect_and_run<S, F>(connect: F, options: &CheckOptions, now: DateTime<Utc>) -> Verdict
where
    S: UnitSource,
    F: Future<Output = Result<S>>,
{
    let acquisition = async {
        let source = connect.await?;
        acquire(&source, options, now).await
    };
    let outcome = tokio::time::timeout(options.timeout, acquisition).await;
    conclude(outcome, options, now)
}

fn conclude(
    outcome: std::result::Result<Result<Snapshot>, Elapsed>,
    options: &CheckOptions,
    now: DateTime<Utc>,
) -> Verdict {
    match outcome {
        Ok(Ok(snapshot)) => evaluate(&snapshot, options, now),
        Ok(Err(e)) => {
            tracing::warn!("Check aborted: {:#}", e);
            Verdict::unknown(format!("{:#}", e))
        }
        Err(_) => {
            let e = CheckError::Timeout(options.timeout);
            tracing::warn!("Check aborted: {}", e);
            Verdict::unknown(e.to_string())
        }
    }
}
