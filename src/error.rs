// Error types for check_systemd

use std::time::Duration;
use thiserror::Error;

/// Result type alias using anyhow::Error
pub type Result<T> = anyhow::Result<T>;

/// Errors that abort a check run.
///
/// Every variant ends up as an UNKNOWN verdict: a check that could not
/// observe the system must not claim it is healthy or broken. Problems with
/// a single table row are not errors, see [`crate::systemd::RowIssue`].
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("Failed to connect to systemd D-Bus: {0}")]
    BusConnection(String),

    #[error("Failed to query systemd: {0}")]
    Acquisition(String),

    #[error("The command '{command}' failed: {message}")]
    Command { command: String, message: String },

    #[error("Data acquisition timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unable to parse the output of '{source_name}': {message}")]
    Parse { source_name: String, message: String },

    #[error("Invalid regular expression: '{pattern}'")]
    InvalidRegex { pattern: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckError {
    pub(crate) fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckError::Parse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}
