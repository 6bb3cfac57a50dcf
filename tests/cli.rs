// End-to-end tests of the check_systemd binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

/// The plugin with an empty config directory, so no local config is picked up
fn plugin(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("check_systemd").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path());
    cmd
}

/// Put fake systemctl and systemd-analyze programs in front of PATH
#[cfg(unix)]
fn fake_systemd(cmd: &mut Command, dir: &TempDir, units: &str, analyze: &str) {
    use std::os::unix::fs::PermissionsExt;

    let scripts = [
        (
            "systemctl",
            format!(
                "case \"$1\" in\n  list-units) cat '{}' ;;\n  list-timers) cat '{}' ;;\n  *) echo \"unsupported: $*\" >&2; exit 1 ;;\nesac",
                fixture(units).display(),
                fixture("list-timers.txt").display()
            ),
        ),
        ("systemd-analyze", format!("cat '{}'", fixture(analyze).display())),
    ];
    for (name, body) in scripts {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let path = std::env::var("PATH").unwrap_or_default();
    cmd.env("PATH", format!("{}:{}", dir.path().display(), path));
}

#[test]
fn test_version() {
    let home = TempDir::new().unwrap();
    plugin(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("check_systemd "));
}

#[test]
fn test_invalid_regex_is_unknown() {
    let home = TempDir::new().unwrap();
    plugin(&home)
        .args(["-e", "*service"])
        .assert()
        .code(3)
        .stdout("SYSTEMD UNKNOWN: Invalid regular expression: '*service'\n");
}

#[test]
fn test_invalid_unit_type_is_unknown() {
    let home = TempDir::new().unwrap();
    plugin(&home)
        .args(["--include-type", "services"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("The given type 'services' is not a valid systemd unit type."));
}

#[test]
fn test_contradictory_options_are_unknown() {
    let home = TempDir::new().unwrap();
    plugin(&home)
        .args(["--dbus", "--cli"])
        .assert()
        .code(3)
        .stdout(predicate::str::starts_with("SYSTEMD UNKNOWN: "))
        .stdout(predicate::str::contains("cannot be combined"));

    plugin(&home)
        .args(["-w", "200", "-c", "100"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("warning threshold"));
}

#[test]
fn test_unknown_flag_is_unknown() {
    let home = TempDir::new().unwrap();
    plugin(&home)
        .arg("--bogus")
        .assert()
        .code(3)
        .stdout(predicate::str::starts_with("SYSTEMD UNKNOWN: "));
}

#[test]
fn test_missing_config_file_is_unknown() {
    let home = TempDir::new().unwrap();
    plugin(&home)
        .args(["--config", "/nonexistent/check-systemd.yaml"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("does not exist"));
}

#[cfg(unix)]
#[test]
fn test_all_units_ok() {
    let home = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    let mut cmd = plugin(&home);
    fake_systemd(&mut cmd, &bin, "list-units-ok.txt", "analyze.txt");

    cmd.assert()
        .code(0)
        .stdout(predicate::str::starts_with("SYSTEMD OK - all 7 units ok | count_units=7 startup_time=61.2;60;120 "));
}

#[cfg(unix)]
#[test]
fn test_failed_units_are_critical() {
    let home = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    let mut cmd = plugin(&home);
    fake_systemd(&mut cmd, &bin, "list-units-failed.txt", "analyze.txt");

    cmd.arg("--no-performance-data")
        .assert()
        .code(2)
        .stdout("SYSTEMD CRITICAL - smartd.service: failed, user@123.service: failed\n");
}

#[cfg(unix)]
#[test]
fn test_dead_timers_verbose() {
    let home = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    let mut cmd = plugin(&home);
    fake_systemd(&mut cmd, &bin, "list-units-ok.txt", "analyze.txt");

    cmd.args(["--dead-timers", "-v"])
        .assert()
        .code(2)
        .stdout(predicate::str::starts_with("SYSTEMD CRITICAL - phpsessionclean.timer | "))
        .stdout(predicate::str::contains("dead_timers=1"))
        .stdout(predicate::str::contains(
            "\nphpsessionclean.timer: dead timer of phpsessionclean.service",
        ));
}

#[cfg(unix)]
#[test]
fn test_required_state() {
    let home = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    let mut cmd = plugin(&home);
    fake_systemd(&mut cmd, &bin, "list-units-ok.txt", "analyze.txt");

    cmd.args(["-u", "ssh.service", "-u", "auditd.service", "--required", "active", "-p"])
        .assert()
        .code(2)
        .stdout("SYSTEMD CRITICAL - auditd.service: inactive\n");
}

#[cfg(unix)]
#[test]
fn test_config_file_is_applied() {
    let home = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    let config_path = home.path().join("check-systemd").join("config.yaml");
    std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
    std::fs::write(&config_path, "exclude:\n  - smartd\n  - 'user@\\d+'\nperformance_data: false\n").unwrap();

    let mut cmd = plugin(&home);
    fake_systemd(&mut cmd, &bin, "list-units-failed.txt", "analyze.txt");

    cmd.assert()
        .code(0)
        .stdout("SYSTEMD OK - all 6 units ok\n");
}
