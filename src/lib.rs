// check_systemd - Nagios / Icinga monitoring plugin for systemd
// Library root

pub mod check;
pub mod config;
pub mod error;
pub mod systemd;
pub mod version;
