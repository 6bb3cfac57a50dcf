// Systemd integration module: acquisition backends and normalization

pub mod cli;
pub mod client;
pub mod connection;
pub mod models;
pub mod normalize;
pub mod source;
pub mod table;
pub mod timespan;

#[cfg(test)]
mod tests;

pub use cli::CliSource;
pub use client::DbusSource;
pub use connection::ConnectionManager;
pub use models::{
    ActiveState, LoadState, RowIssue, StartupProfile, TimerRecord, UnitRecord, UnitScope, UnitType,
};
pub use normalize::{normalize_startup, normalize_timers, normalize_units, Normalized};
pub use source::{Backend, BootListing, TimerListing, UnitListing, UnitSource};
pub use table::Table;
pub use timespan::{parse_timespan, parse_timestamp};
