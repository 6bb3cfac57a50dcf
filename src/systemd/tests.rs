#[cfg(test)]
mod tests {
    use crate::error::{CheckError, Result};
    use crate::systemd::source::{BusBootTimestamps, BusTimerRow, BusUnitRow};
    use crate::systemd::table::{column_starts, split_row};
    use crate::systemd::timespan::{format_seconds, from_realtime_usec};
    use crate::systemd::{
        normalize_startup, normalize_timers, normalize_units, parse_timespan, parse_timestamp,
        ActiveState, BootListing, CliSource, LoadState, Table, TimerListing, UnitListing, UnitScope,
        UnitSource, UnitType,
    };
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    const UNITS_OK: &str = include_str!("../../tests/fixtures/list-units-ok.txt");
    const UNITS_FAILED: &str = include_str!("../../tests/fixtures/list-units-failed.txt");
    const TIMERS: &str = include_str!("../../tests/fixtures/list-timers.txt");
    const ANALYZE: &str = include_str!("../../tests/fixtures/analyze.txt");
    const ANALYZE_FIRMWARE: &str = include_str!("../../tests/fixtures/analyze-firmware.txt");
    const ANALYZE_UNFINISHED: &str = include_str!("../../tests/fixtures/analyze-unfinished.txt");

    fn secs(value: f64) -> Duration {
        Duration::from_micros((value * 1e6).round() as u64)
    }

    #[test]
    fn test_column_starts() {
        assert_eq!(column_starts("1  2  3"), vec![0, 3, 6]);
        assert_eq!(column_starts("  1  2  3  "), vec![0, 2, 5, 8]);
        assert_eq!(column_starts("UNIT LOAD ACTIVE"), vec![0, 5, 10]);
        assert!(column_starts("").is_empty());
    }

    #[test]
    fn test_split_row() {
        assert_eq!(split_row("1  2  3", &[0, 3, 6]), vec!["1", "2", "3"]);
        assert_eq!(split_row("  1  2  3  ", &[0, 2, 5, 8]), vec!["", "1", "2", "3"]);
        // Short rows give empty trailing cells
        assert_eq!(split_row("a", &[0, 3, 6]), vec!["a", "", ""]);
    }

    #[test]
    fn test_split_row_counts_characters() {
        let starts = column_starts("  UNIT       LOAD");
        assert_eq!(starts, vec![0, 2, 13]);
        assert_eq!(
            split_row("● a.service  loaded", &starts),
            vec!["●", "a.service", "loaded"]
        );
    }

    #[test]
    fn test_table_discards_trailer() -> Result<()> {
        let table = Table::parse("systemctl list-units", UNITS_OK)?;
        assert_eq!(table.row_count(), 7);
        assert_eq!(
            table.columns(),
            &["column_0", "unit", "load", "active", "sub", "description"]
        );
        assert!(table.rows().all(|row| !row.raw.contains("listed.")));
        Ok(())
    }

    #[test]
    fn test_table_keeps_row_ending_like_trailer() -> Result<()> {
        let stdout = concat!(
            "  UNIT            LOAD   ACTIVE SUB     DESCRIPTION\n",
            "  report.service  loaded active running Mail reports of all jobs listed.\n",
            "1 loaded units listed. Pass --all to see loaded but inactive units, too.\n",
            "\n",
            "3 timers listed.\n",
        );
        let table = Table::parse("systemctl list-units", stdout)?;
        assert_eq!(table.row_count(), 1);
        let row = table.rows().next().expect("one row");
        assert_eq!(row.get("unit"), "report.service");
        assert_eq!(row.get("description"), "Mail reports of all jobs listed.");
        Ok(())
    }

    #[test]
    fn test_table_empty_output_is_structural_error() {
        let err = Table::parse("systemctl list-units", "\n\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CheckError>(),
            Some(CheckError::Parse { .. })
        ));
    }

    #[test]
    fn test_table_missing_column() -> Result<()> {
        let table = Table::parse("systemctl list-units", "UNIT  LOAD  ACTIVE\na.service loaded active\n")?;
        let err = table.require_columns(&["unit", "load", "active", "sub"]).unwrap_err();
        assert!(err.to_string().contains("'sub'"));
        Ok(())
    }

    #[test]
    fn test_normalize_list_units() -> Result<()> {
        let normalized = normalize_units(UnitListing::Table(UNITS_FAILED.to_string()), UnitScope::System)?;
        assert!(normalized.issues.is_empty());
        assert_eq!(normalized.records.len(), 8);

        let failed: Vec<&str> = normalized
            .records
            .iter()
            .filter(|u| u.is_failed())
            .map(|u| u.name.as_str())
            .collect();
        assert_eq!(failed, vec!["smartd.service", "user@123.service"]);

        let automount = &normalized.records[0];
        assert_eq!(automount.name, "proc-sys-fs-binfmt_misc.automount");
        assert_eq!(automount.unit_type, UnitType::Automount);
        assert_eq!(automount.sub_state, "waiting");
        assert_eq!(
            automount.description,
            "Arbitrary Executable File Formats File System Automount Point"
        );
        Ok(())
    }

    #[test]
    fn test_normalize_keeps_scope_and_load_state() -> Result<()> {
        let normalized = normalize_units(UnitListing::Table(UNITS_OK.to_string()), UnitScope::User)?;
        assert!(normalized.records.iter().all(|u| u.is_user_unit()));

        let auditd = normalized
            .records
            .iter()
            .find(|u| u.name == "auditd.service")
            .expect("auditd is listed");
        assert_eq!(auditd.load_state, LoadState::NotFound);
        assert_eq!(auditd.active_state, ActiveState::Inactive);
        assert!(!auditd.is_loaded());
        Ok(())
    }

    #[test]
    fn test_normalize_skips_bad_rows() -> Result<()> {
        let row = |name: &str, load: &str, active: &str| BusUnitRow {
            name: name.to_string(),
            description: String::new(),
            load_state: load.to_string(),
            active_state: active.to_string(),
            sub_state: "running".to_string(),
        };
        let listing = UnitListing::Bus(vec![
            row("ssh.service", "loaded", "active"),
            row("weird.service", "loaded", "sleepy"),
            row("no-suffix", "loaded", "active"),
            row("cron.service", "loaded", "active"),
        ]);

        let normalized = normalize_units(listing, UnitScope::System)?;
        assert_eq!(normalized.records.len(), 2);
        assert_eq!(normalized.issues.len(), 2);
        assert_eq!(normalized.issues[0].unit.as_deref(), Some("weird.service"));
        assert!(normalized.issues[0].to_string().contains("Invalid active state: sleepy"));
        Ok(())
    }

    #[test]
    fn test_normalize_properties() -> Result<()> {
        let stdout = "Id=foo.service\nLoadState=not-found\nActiveState=inactive\nSubState=dead\nDescription=foo.service\n";
        let normalized = normalize_units(UnitListing::Properties(stdout.to_string()), UnitScope::System)?;
        assert_eq!(normalized.records.len(), 1);
        assert_eq!(normalized.records[0].load_state, LoadState::NotFound);

        let err = normalize_units(UnitListing::Properties("LoadState=loaded\n".to_string()), UnitScope::System);
        assert!(err.is_err());
        Ok(())
    }

    #[test]
    fn test_normalize_list_timers() -> Result<()> {
        let now = Utc.with_ymd_and_hms(2020, 5, 16, 14, 36, 18).unwrap();
        let normalized = normalize_timers(TimerListing::Table(TIMERS.to_string()), now)?;
        assert!(normalized.issues.is_empty());
        assert_eq!(normalized.records.len(), 3);

        let apt = &normalized.records[0];
        assert_eq!(apt.left, Some(Duration::from_secs(34 * 60)));
        assert_eq!(apt.activates, "apt-daily.service");
        assert!(!apt.is_unscheduled());

        let php = &normalized.records[1];
        assert_eq!(php.name, "phpsessionclean.timer");
        assert!(php.is_unscheduled());
        assert_eq!(php.time_since_last_run, Some(Duration::from_secs(64 * 86400)));

        let fstrim = &normalized.records[2];
        assert!(fstrim.is_unscheduled());
        assert!(!fstrim.has_run());
        Ok(())
    }

    #[test]
    fn test_normalize_timers_dash_is_absent() -> Result<()> {
        let stdout = "NEXT LEFT LAST PASSED UNIT            ACTIVATES\n\
                      -    -    -    -      logrotate.timer logrotate.service\n";
        let normalized = normalize_timers(TimerListing::Table(stdout.to_string()), Utc::now())?;
        let timer = &normalized.records[0];
        assert_eq!(timer.name, "logrotate.timer");
        assert_eq!(timer.activates, "logrotate.service");
        assert!(timer.is_unscheduled());
        assert!(!timer.has_run());
        Ok(())
    }

    #[test]
    fn test_normalize_bus_timers() -> Result<()> {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let rows = vec![BusTimerRow {
            name: "backup.timer".to_string(),
            next_elapse_usec: 0,
            next_elapse_monotonic_usec: 0,
            last_trigger_usec: last.timestamp() as u64 * 1_000_000,
            unit: "backup.service".to_string(),
        }];
        let normalized = normalize_timers(TimerListing::Bus(rows), now)?;
        let timer = &normalized.records[0];
        assert!(timer.is_unscheduled());
        assert_eq!(timer.last_run, Some(last));
        assert_eq!(timer.age(now), Some(Duration::from_secs(9 * 86400)));
        Ok(())
    }

    #[test]
    fn test_normalize_bus_monotonic_timer() -> Result<()> {
        // OnUnitActiveSec=1w: nothing on the realtime clock, next elapse
        // 8 days after boot on the monotonic one
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let rows = vec![BusTimerRow {
            name: "fstrim.timer".to_string(),
            next_elapse_usec: 0,
            next_elapse_monotonic_usec: 8 * 86400 * 1_000_000,
            last_trigger_usec: last.timestamp() as u64 * 1_000_000,
            unit: "fstrim.service".to_string(),
        }];
        let normalized = normalize_timers(TimerListing::Bus(rows), now)?;
        let timer = &normalized.records[0];
        assert_eq!(timer.next_run, None);
        assert_eq!(timer.next_monotonic, Some(Duration::from_secs(8 * 86400)));
        assert!(!timer.is_unscheduled());

        let report = crate::check::find_dead(
            &normalized.records,
            Duration::from_secs(6 * 86400),
            Duration::from_secs(7 * 86400),
            now,
        );
        assert!(report.dead.is_empty());
        Ok(())
    }

    #[test]
    fn test_parse_timespan() {
        let cases = [
            ("1s", 1.0),
            ("1s ago", 1.0),
            ("1min 1s", 61.0),
            ("1min 1.123s", 61.123),
            ("34min 46.292s", 2086.292),
            ("2 months 8 days", 5_875_200.0),
            ("45ms", 0.045),
            ("3h 39min ago", 13_140.0),
            ("2min 6.203s", 126.203),
            ("1y 1w", 365.0 * 86400.0 + 7.0 * 86400.0),
            ("5h left", 18_000.0),
            ("12", 12.0),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_timespan(input), Ok(secs(expected)), "parsing '{}'", input);
        }
    }

    #[test]
    fn test_parse_timespan_rejects_garbage() {
        assert!(parse_timespan("").is_err());
        assert!(parse_timespan("n/a").is_err());
        assert!(parse_timespan("3 fortnights").is_err());
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(
            parse_timestamp("Sat 2020-05-16 15:11:15 UTC"),
            Ok(Utc.with_ymd_and_hms(2020, 5, 16, 15, 11, 15).unwrap())
        );
        assert!(parse_timestamp("Sat 2020-05-16 15:11:15 CEST").is_ok());
        assert!(parse_timestamp("n/a").is_err());
        assert!(parse_timestamp("Sat 2020-13-16 15:11:15 UTC").is_err());
    }

    #[test]
    fn test_realtime_usec() {
        assert_eq!(from_realtime_usec(0), None);
        assert_eq!(from_realtime_usec(u64::MAX), None);
        assert_eq!(
            from_realtime_usec(1_589_641_875_000_000),
            Some(Utc.with_ymd_and_hms(2020, 5, 16, 15, 11, 15).unwrap())
        );
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(61.2), "61.2");
        assert_eq!(format_seconds(3.0), "3");
        assert_eq!(format_seconds(0.0), "0");
        assert_eq!(format_seconds(1.23456), "1.235");
    }

    #[test]
    fn test_parse_analyze() -> Result<()> {
        let profile = normalize_startup(BootListing::Text(ANALYZE.to_string()))?.expect("boot finished");
        assert_eq!(profile.kernel, Some(secs(3.2)));
        assert_eq!(profile.userspace, Some(secs(58.0)));
        assert_eq!(profile.firmware, None);
        assert_eq!(profile.total(), secs(61.2));
        assert_eq!(profile.target_reached, Some(secs(57.9)));
        assert_eq!(profile.judged(), secs(57.9));
        assert_eq!(profile.judged_label(), "default target reached after");
        Ok(())
    }

    #[test]
    fn test_parse_analyze_all_phases() -> Result<()> {
        let profile = normalize_startup(BootListing::Text(ANALYZE_FIRMWARE.to_string()))?.expect("boot finished");
        assert_eq!(profile.firmware, Some(secs(5.362)));
        assert_eq!(profile.loader, Some(secs(3.291)));
        assert_eq!(profile.userspace, Some(secs(126.203)));
        assert_eq!(profile.total(), secs(136.961));
        Ok(())
    }

    #[test]
    fn test_parse_analyze_unfinished_and_garbage() -> Result<()> {
        assert_eq!(normalize_startup(BootListing::Text(ANALYZE_UNFINISHED.to_string()))?, None);
        assert_eq!(normalize_startup(BootListing::NotFinished)?, None);
        assert!(normalize_startup(BootListing::Text("something else\n".to_string())).is_err());
        Ok(())
    }

    #[test]
    fn test_profile_from_bus() -> Result<()> {
        let timestamps = BusBootTimestamps {
            firmware: 8_653_000,
            loader: 3_291_000,
            initrd: 0,
            userspace: 2_105_000,
            finish: 128_308_000,
            default_target: 128_099_000,
        };
        let profile = normalize_startup(BootListing::Bus(timestamps))?.expect("boot finished");
        assert_eq!(profile.firmware, Some(secs(5.362)));
        assert_eq!(profile.loader, Some(secs(3.291)));
        assert_eq!(profile.kernel, Some(secs(2.105)));
        assert_eq!(profile.initrd, None);
        assert_eq!(profile.userspace, Some(secs(126.203)));
        assert_eq!(profile.target_reached, Some(secs(125.994)));

        let booting = BusBootTimestamps {
            finish: 0,
            ..timestamps
        };
        assert_eq!(normalize_startup(BootListing::Bus(booting))?, None);
        Ok(())
    }

    #[cfg(unix)]
    fn fake_program(dir: &std::path::Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod script");
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_source_reads_command_output() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let fixtures = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");
        let systemctl = fake_program(dir.path(), "systemctl", &format!("cat {}/list-units-ok.txt", fixtures));
        let analyze = fake_program(dir.path(), "systemd-analyze", &format!("cat {}/analyze.txt", fixtures));
        let source = CliSource::with_programs(systemctl, analyze);

        let listing = source.fetch_units(UnitScope::System).await?;
        let normalized = normalize_units(listing, UnitScope::System)?;
        assert_eq!(normalized.records.len(), 7);

        let boot = source.fetch_startup().await?;
        assert!(matches!(boot, BootListing::Text(_)));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_source_failures() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let systemctl = fake_program(dir.path(), "systemctl", "echo 'Failed to connect to bus' >&2\nexit 1");
        let analyze = fake_program(
            dir.path(),
            "systemd-analyze",
            "echo 'Bootup is not yet finished. Please try again later.' >&2\nexit 1",
        );
        let source = CliSource::with_programs(systemctl, analyze);

        let err = source.fetch_units(UnitScope::System).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to connect to bus"));
        assert_eq!(source.fetch_startup().await?, BootListing::NotFinished);

        let missing = CliSource::with_programs("/nonexistent/systemctl", "/nonexistent/systemd-analyze");
        assert!(missing.fetch_timers().await.is_err());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_source_rejects_stderr_on_success() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let fixtures = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");
        let systemctl = fake_program(
            dir.path(),
            "systemctl",
            &format!("echo 'Failed to connect to user bus' >&2\ncat {}/list-units-ok.txt", fixtures),
        );
        let analyze = fake_program(
            dir.path(),
            "systemd-analyze",
            &format!("echo 'Failed to get boot timestamps' >&2\ncat {}/analyze.txt", fixtures),
        );
        let source = CliSource::with_programs(systemctl, analyze);

        let err = source.fetch_units(UnitScope::User).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CheckError>(), Some(CheckError::Command { .. })));
        assert!(format!("{:#}", err).contains("Failed to connect to user bus"));

        let err = source.fetch_startup().await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to get boot timestamps"));
        Ok(())
    }
}
