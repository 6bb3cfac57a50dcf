// Bounded D-Bus connection handling

use crate::error::{CheckError, Result};
use std::time::Duration;
use zbus::Connection;

/// Connection manager that bounds every connection attempt by a timeout.
///
/// A failed attempt is final for the run; the monitoring scheduler decides
/// when to try again.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    connection_timeout: Duration,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectionManager {
    /// Create a new connection manager with a custom timeout
    pub fn new(connection_timeout: Duration) -> Self {
        Self { connection_timeout }
    }

    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Connect to the system bus where PID 1 lives
    pub async fn connect_system(&self) -> Result<Connection> {
        self.connect("system", Connection::system()).await
    }

    /// Connect to the session bus of the per-user manager
    pub async fn connect_session(&self) -> Result<Connection> {
        self.connect("session", Connection::session()).await
    }

    async fn connect<F>(&self, bus: &str, attempt: F) -> Result<Connection>
    where
        F: std::future::Future<Output = zbus::Result<Connection>>,
    {
        tracing::debug!("Connecting to the {} bus", bus);
        let connection = tokio::time::timeout(self.connection_timeout, attempt)
            .await
            .map_err(|_| {
                CheckError::BusConnection(format!(
                    "{} bus connection timed out after {:?}",
                    bus, self.connection_timeout
                ))
            })?
            .map_err(|e| CheckError::BusConnection(format!("{} bus: {}", bus, e)))?;
        Ok(connection)
    }
}
