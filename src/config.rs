// Configuration management

use crate::check::{startup, timers, CheckOptions, NamePattern, NotLoadedPolicy, SelectionCriteria, Thresholds, UnitRule};
use crate::error::{CheckError, Result};
use crate::systemd::{ActiveState, Backend, UnitType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Dead timer detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimersConfig {
    pub enabled: bool,
    pub warning_secs: f64,
    pub critical_secs: f64,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            warning_secs: timers::DEFAULT_WARNING_AGE.as_secs_f64(),
            critical_secs: timers::DEFAULT_CRITICAL_AGE.as_secs_f64(),
        }
    }
}

/// Startup time settings; the metric is collected even when disabled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    pub enabled: bool,
    pub warning_secs: f64,
    pub critical_secs: f64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warning_secs: startup::DEFAULT_WARNING.as_secs_f64(),
            critical_secs: startup::DEFAULT_CRITICAL.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    /// Regular expressions of units to include
    pub include: Vec<String>,
    /// Exact unit names to include
    pub include_units: Vec<String>,
    pub include_types: Vec<String>,
    /// Regular expressions of units to exclude
    pub exclude: Vec<String>,
    pub exclude_units: Vec<String>,
    pub exclude_types: Vec<String>,
    pub required_state: Option<String>,
    pub user_units: bool,
    pub not_loaded: NotLoadedPolicy,
    pub timers: TimersConfig,
    pub startup: StartupConfig,
    pub performance_data: bool,
    pub timeout_secs: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Cli,
            include: Vec::new(),
            include_units: Vec::new(),
            include_types: Vec::new(),
            exclude: Vec::new(),
            exclude_units: Vec::new(),
            exclude_types: Vec::new(),
            required_state: None,
            user_units: false,
            not_loaded: NotLoadedPolicy::Ignore,
            timers: TimersConfig::default(),
            startup: StartupConfig::default(),
            performance_data: true,
            timeout_secs: 10.0,
        }
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        return Err(CheckError::Configuration(format!("{} must be a non-negative number of seconds, got {}", name, value)).into());
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| CheckError::Configuration(format!("{} of {} seconds is out of range: {}", name, value, e)).into())
}

fn thresholds(name: &str, warning: f64, critical: f64) -> Result<Thresholds> {
    let warning = seconds(&format!("{} warning", name), warning)?;
    let critical = seconds(&format!("{} critical", name), critical)?;
    if warning > critical {
        return Err(CheckError::Configuration(format!(
            "the {} warning threshold ({:?}) is above the critical threshold ({:?})",
            name, warning, critical
        ))
        .into());
    }
    Ok(Thresholds { warning, critical })
}

fn unit_types(types: &[String]) -> Result<BTreeSet<UnitType>> {
    types
        .iter()
        .map(|t| t.parse::<UnitType>().map_err(|e| CheckError::Configuration(e).into()))
        .collect()
}

fn name_patterns(regexes: &[String], literals: &[String]) -> Result<Vec<NamePattern>> {
    let mut patterns = regexes
        .iter()
        .map(|pattern| NamePattern::regex(pattern))
        .collect::<Result<Vec<_>>>()?;
    patterns.extend(literals.iter().map(NamePattern::literal));
    Ok(patterns)
}

impl Config {
    /// Get default config path: ~/.config/check-systemd/config.yaml
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("check-systemd").join("config.yaml"))
    }

    /// Load config from path. Without an explicit path a missing default
    /// file means defaults; an explicit path must exist.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(CheckError::Configuration(format!(
                        "config file {} does not exist",
                        path.display()
                    ))
                    .into());
                }
                path
            }
            None => match Self::default_path() {
                Ok(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        tracing::debug!("Loading config from {}", config_path.display());
        let contents = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(|e| {
            CheckError::Configuration(format!("{}: {}", config_path.display(), e))
        })?;
        Ok(config)
    }

    /// Save config to path
    pub fn save(&self, path: PathBuf) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration and turn it into pipeline options.
    /// Runs before any data is acquired.
    pub fn check_options(&self) -> Result<CheckOptions> {
        let required_state = self
            .required_state
            .as_deref()
            .map(|state| state.parse::<ActiveState>().map_err(CheckError::Configuration))
            .transpose()?;

        let criteria = SelectionCriteria {
            include: name_patterns(&self.include, &self.include_units)?,
            exclude: name_patterns(&self.exclude, &self.exclude_units)?,
            include_types: unit_types(&self.include_types)?,
            exclude_types: unit_types(&self.exclude_types)?,
            include_user_units: self.user_units,
        };

        let timer_thresholds = thresholds("dead timer", self.timers.warning_secs, self.timers.critical_secs)?;
        let timeout = seconds("timeout", self.timeout_secs)?;
        if timeout.is_zero() {
            return Err(CheckError::Configuration("timeout must be greater than zero".to_string()).into());
        }

        Ok(CheckOptions {
            rule: UnitRule {
                required_state,
                not_loaded: self.not_loaded,
            },
            criteria,
            timers: self.timers.enabled.then_some(timer_thresholds),
            startup: thresholds("startup time", self.startup.warning_secs, self.startup.critical_secs)?,
            startup_enabled: self.startup.enabled,
            timeout,
        })
    }
}
