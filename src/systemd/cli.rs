// Data acquisition through the systemctl / systemd-analyze command line tools

use crate::error::{CheckError, Result};
use crate::systemd::source::{BootListing, TimerListing, UnitListing, UnitSource};
use crate::systemd::UnitScope;
use std::future::Future;
use std::process::Stdio;
use tokio::process::Command;

/// Captured result of one command invocation
#[derive(Debug, Clone)]
struct CommandOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

/// Backend that runs the systemd command line tools and hands their text
/// output to the normalizer.
#[derive(Debug, Clone)]
pub struct CliSource {
    systemctl: String,
    analyze: String,
}

impl Default for CliSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CliSource {
    pub fn new() -> Self {
        Self::with_programs("systemctl", "systemd-analyze")
    }

    /// Use other binaries, e.g. wrappers or absolute paths
    pub fn with_programs(systemctl: impl Into<String>, analyze: impl Into<String>) -> Self {
        Self {
            systemctl: systemctl.into(),
            analyze: analyze.into(),
        }
    }

    async fn execute(program: &str, args: &[&str]) -> Result<CommandOutput> {
        let command_line = format!("{} {}", program, args.join(" "));
        tracing::debug!("Execute command on the command line: {}", command_line);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CheckError::Command {
                command: command_line.clone(),
                message: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::trace!("stdout of '{}':\n{}", command_line, stdout);

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run a command that must succeed without complaints and return its
    /// stdout
    async fn execute_checked(program: &str, args: &[&str]) -> Result<String> {
        let output = Self::execute(program, args).await?;
        output.check(&format!("{} {}", program, args.join(" ")))?;
        Ok(output.stdout)
    }
}

impl CommandOutput {
    /// A non-zero exit or anything on stderr fails the command
    fn check(&self, command: &str) -> Result<()> {
        let message = if !self.success {
            let code = self
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            if self.stderr.is_empty() {
                format!("exited with a non-zero return code ({})", code)
            } else {
                format!("exited with a non-zero return code ({}): {}", code, self.stderr)
            }
        } else if !self.stderr.is_empty() {
            format!("wrote to stderr: {}", self.stderr)
        } else {
            return Ok(());
        };
        Err(CheckError::Command {
            command: command.to_string(),
            message,
        }
        .into())
    }
}

impl UnitSource for CliSource {
    fn fetch_units(&self, scope: UnitScope) -> impl Future<Output = Result<UnitListing>> + Send {
        async move {
            let mut args = vec!["list-units", "--all", "--no-pager"];
            if let Some(flag) = scope.systemctl_flag() {
                args.push(flag);
            }
            let stdout = Self::execute_checked(&self.systemctl, &args).await?;
            Ok(UnitListing::Table(stdout))
        }
    }

    fn fetch_unit(&self, name: &str, scope: UnitScope) -> impl Future<Output = Result<UnitListing>> + Send {
        async move {
            let mut args = vec!["show", "--property=Id,LoadState,ActiveState,SubState,Description"];
            if let Some(flag) = scope.systemctl_flag() {
                args.push(flag);
            }
            args.extend(["--", name]);
            let stdout = Self::execute_checked(&self.systemctl, &args).await?;
            if stdout.trim().is_empty() {
                return Err(CheckError::Acquisition(format!("The unit '{}' couldn't be found.", name)).into());
            }
            Ok(UnitListing::Properties(stdout))
        }
    }

    fn fetch_timers(&self) -> impl Future<Output = Result<TimerListing>> + Send {
        async move {
            let stdout =
                Self::execute_checked(&self.systemctl, &["list-timers", "--all", "--no-pager"]).await?;
            Ok(TimerListing::Table(stdout))
        }
    }

    fn fetch_startup(&self) -> impl Future<Output = Result<BootListing>> + Send {
        async move {
            let output = Self::execute(&self.analyze, &[]).await?;
            // Output while booting: "Bootup is not yet finished. Please try again later."
            if output.stderr.contains("not yet finished") || output.stdout.contains("not yet finished") {
                tracing::info!("{}: boot process is not finished", self.analyze);
                return Ok(BootListing::NotFinished);
            }
            output.check(&self.analyze)?;
            Ok(BootListing::Text(output.stdout))
        }
    }
}
