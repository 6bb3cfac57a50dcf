// check_systemd - Nagios / Icinga monitoring plugin for systemd
// Main entry point

use check_systemd::check::{self, CheckOptions, NotLoadedPolicy, Verdict};
use check_systemd::config::Config;
use check_systemd::error::{CheckError, Result};
use check_systemd::systemd::{Backend, CliSource, ConnectionManager, DbusSource};
use check_systemd::version::build_info;
use chrono::Utc;
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "check_systemd")]
#[command(author, about, long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Print the details of every finding below the status line
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Log to stderr (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = ArgAction::Count)]
    debug: u8,

    /// Show version information
    #[arg(short = 'V', long)]
    version: bool,

    /// Show detailed build information
    #[arg(long)]
    build_info: bool,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Include units whose name matches a regular expression
    #[arg(short = 'I', long = "include", value_name = "REGEX")]
    include: Vec<String>,

    /// Include a unit by its exact name
    #[arg(short = 'u', long = "unit", visible_alias = "include-unit", value_name = "UNIT_NAME")]
    units: Vec<String>,

    /// Include all units of the given types
    #[arg(long = "include-type", value_name = "UNIT_TYPE", num_args = 1..)]
    include_types: Vec<String>,

    /// Exclude units whose name matches a regular expression
    #[arg(short = 'e', long = "exclude", value_name = "REGEX")]
    exclude: Vec<String>,

    /// Exclude units by their exact names
    #[arg(long = "exclude-unit", value_name = "UNIT_NAME", num_args = 1..)]
    exclude_units: Vec<String>,

    /// Exclude all units of the given types
    #[arg(long = "exclude-type", value_name = "UNIT_TYPE", num_args = 1..)]
    exclude_types: Vec<String>,

    /// Every selected unit must be in this active state
    #[arg(long = "state", visible_aliases = ["required", "expected-state"], value_name = "STATE")]
    state: Option<String>,

    /// Raise a warning for units that are not loaded
    #[arg(long)]
    not_loaded_warning: bool,

    /// Detect dead timers
    #[arg(short = 't', long = "timers", visible_alias = "dead-timers")]
    timers: bool,

    /// Last run age of a dead timer that raises a warning
    #[arg(short = 'W', long = "timers-warning", value_name = "SECONDS")]
    timers_warning: Option<f64>,

    /// Last run age of a dead timer that raises a critical state
    #[arg(short = 'C', long = "timers-critical", value_name = "SECONDS")]
    timers_critical: Option<f64>,

    /// Don't judge the startup time
    #[arg(short = 'n', long = "no-startup-time")]
    no_startup_time: bool,

    /// Startup time that raises a warning
    #[arg(short = 'w', long = "warning", value_name = "SECONDS")]
    warning: Option<f64>,

    /// Startup time that raises a critical state
    #[arg(short = 'c', long = "critical", value_name = "SECONDS")]
    critical: Option<f64>,

    /// Query systemd over D-Bus
    #[arg(long)]
    dbus: bool,

    /// Parse the output of systemctl and systemd-analyze
    #[arg(long)]
    cli: bool,

    /// Also check the units of the user managers
    #[arg(long)]
    user: bool,

    /// Attach performance data to the status line
    #[arg(short = 'P', long = "performance-data")]
    performance_data: bool,

    /// Omit performance data
    #[arg(short = 'p', long = "no-performance-data")]
    no_performance_data: bool,

    /// Upper bound for collecting data from systemd
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<f64>,
}

fn conflict(first: &str, second: &str) -> anyhow::Error {
    CheckError::Configuration(format!("{} and {} cannot be combined", first, second)).into()
}

impl Cli {
    /// Command line options win over the config file. List options add to
    /// the lists of the file.
    fn apply(&self, config: &mut Config) -> Result<()> {
        if self.dbus && self.cli {
            return Err(conflict("--dbus", "--cli"));
        }
        if self.performance_data && self.no_performance_data {
            return Err(conflict("--performance-data", "--no-performance-data"));
        }

        if self.dbus {
            config.backend = Backend::Dbus;
        } else if self.cli {
            config.backend = Backend::Cli;
        }

        config.include.extend(self.include.iter().cloned());
        config.include_units.extend(self.units.iter().cloned());
        config.include_types.extend(self.include_types.iter().cloned());
        config.exclude.extend(self.exclude.iter().cloned());
        config.exclude_units.extend(self.exclude_units.iter().cloned());
        config.exclude_types.extend(self.exclude_types.iter().cloned());

        if let Some(state) = &self.state {
            config.required_state = Some(state.clone());
        }
        if self.not_loaded_warning {
            config.not_loaded = NotLoadedPolicy::Warning;
        }
        if self.user {
            config.user_units = true;
        }

        if self.timers {
            config.timers.enabled = true;
        }
        if let Some(warning) = self.timers_warning {
            config.timers.warning_secs = warning;
        }
        if let Some(critical) = self.timers_critical {
            config.timers.critical_secs = critical;
        }

        if self.no_startup_time {
            config.startup.enabled = false;
        }
        if let Some(warning) = self.warning {
            config.startup.warning_secs = warning;
        }
        if let Some(critical) = self.critical {
            config.startup.critical_secs = critical;
        }

        if self.performance_data {
            config.performance_data = true;
        } else if self.no_performance_data {
            config.performance_data = false;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        Ok(())
    }
}

fn init_logging(debug: u8) -> Result<()> {
    let level = match debug {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    // Stdout carries the plugin output only
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Load the config file and validate it together with the command line
fn prepare(cli: &Cli) -> Result<(Config, CheckOptions)> {
    let mut config = Config::load(cli.config.clone())?;
    cli.apply(&mut config)?;
    let options = config.check_options()?;
    tracing::debug!("Effective configuration: {:?}", config);
    Ok((config, options))
}

async fn run_check(backend: Backend, options: &CheckOptions) -> Verdict {
    let now = Utc::now();
    match backend {
        Backend::Cli => check::run(&CliSource::new(), options, now).await,
        Backend::Dbus => {
            let manager = ConnectionManager::new(options.timeout);
            let connect = DbusSource::connect(&manager, options.criteria.include_user_units);
            check::connect_and_run(connect, options, now).await
        }
    }
}

fn exit_code(verdict: &Verdict) -> ExitCode {
    ExitCode::from(verdict.exit_code() as u8)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                let message = e.to_string();
                let headline = message.lines().next().unwrap_or_default();
                let verdict = Verdict::unknown(headline.trim_start_matches("error: "));
                println!("{}", verdict.render(false, false));
                eprint!("{}", message);
                return exit_code(&verdict);
            }
        },
    };

    // Handle version flag
    if cli.version {
        println!("{}", build_info().format_display());
        return ExitCode::SUCCESS;
    }

    // Handle build info flag
    if cli.build_info {
        println!("{}", build_info().format_display());
        println!("\n{}", build_info().format_build_info());
        return ExitCode::SUCCESS;
    }

    if let Err(e) = init_logging(cli.debug) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let (verdict, performance_data) = match prepare(&cli) {
        Ok((config, options)) => (run_check(config.backend, &options).await, config.performance_data),
        Err(e) => {
            tracing::warn!("Invalid configuration: {:#}", e);
            (Verdict::unknown(format!("{:#}", e)), false)
        }
    };

    println!("{}", verdict.render(performance_data, cli.verbose > 0));
    exit_code(&verdict)
}
