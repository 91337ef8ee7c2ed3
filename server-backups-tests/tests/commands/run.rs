//! Tests for the 'run' command
//!
//! The run command backs up the selected servers phase by phase.

use server_backups::config::{RawBackup, RawDatabases, RawMysql, RawServer};
use server_backups::utils::{Clock, StdoutTarget};
use server_backups::{Backups, Phase, PhaseStatus, RunOptions, Selection, ServerReport};
use std::sync::Arc;
use test_utils::{date, listing, snapshot_time, ConfigBuilder, MockExecutor, MockResponse, TestContext};

fn backups(ctx: &TestContext, mock: &Arc<MockExecutor>) -> Backups {
    ctx.backups()
        .unwrap()
        .with_executor(mock.clone())
        .with_clock(Clock::Fixed(snapshot_time(date(2018, 3, 31))))
}

fn run_one(backups: &Backups, server: &str, options: &RunOptions) -> ServerReport {
    let summary = backups
        .run(&Selection::Server(server.to_string()), options)
        .unwrap();
    assert_eq!(summary.servers.len(), 1);
    summary.servers.into_iter().next().unwrap()
}

fn skipped(report: &ServerReport, phase: Phase) -> bool {
    matches!(report.status(phase), Some(PhaseStatus::Skipped(_)))
}

#[test]
fn test_first_run_syncs_without_link_dest() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().add_server("web"));
    let mock = Arc::new(MockExecutor::new());

    let report = run_one(&backups(&ctx, &mock), "web", &RunOptions::default());

    assert_eq!(report.snapshot.as_deref(), Some("2018-03-31_010101"));
    assert!(report.is_success());
    assert_eq!(report.status(Phase::FilesSync), Some(&PhaseStatus::Ok));
    assert_eq!(report.status(Phase::Symlink), Some(&PhaseStatus::Ok));
    assert!(skipped(&report, Phase::PreScripts));
    assert!(skipped(&report, Phase::MysqlDump));

    let rsync: Vec<String> = mock
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("rsync"))
        .collect();
    assert_eq!(rsync.len(), 1);
    assert!(rsync[0].contains("--exclude-from="));
    assert!(!rsync[0].contains("--link-dest"));
}

#[test]
fn test_existing_current_is_used_as_link_dest() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().add_server("web"));
    let base = format!("{}/web", ctx.backup_path().display());
    let mock = Arc::new(
        MockExecutor::new()
            .expect_containing(
                "/web/snapshots",
                MockResponse::stdout(listing(&["2018-03-30_010101".to_string()])),
            )
            .expect_containing(&format!("ls -1 {}", base), MockResponse::stdout("current\nsnapshots\n")),
    );

    let report = run_one(&backups(&ctx, &mock), "web", &RunOptions::default());
    assert!(report.is_success());

    let rsync = mock
        .commands()
        .into_iter()
        .find(|c| c.starts_with("rsync"))
        .unwrap();
    assert!(rsync.contains(&format!("--link-dest={}/current", base)));
}

#[test]
fn test_failed_sync_drops_new_snapshot_and_keeps_current() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().add_server("web"));
    let base = format!("{}/web", ctx.backup_path().display());
    let mock = Arc::new(
        MockExecutor::new()
            .expect_containing("rsync --archive", MockResponse::Failure { exit_code: 23 })
            .expect(
                "readlink",
                MockResponse::stdout(format!("{}/snapshots/2018-03-30_010101\n", base)),
            )
            .expect_containing(
                "/web/snapshots",
                MockResponse::stdout(listing(&[
                    "2018-03-30_010101".to_string(),
                    "2018-03-31_010101".to_string(),
                ])),
            ),
    );

    let report = run_one(&backups(&ctx, &mock), "web", &RunOptions::default());

    assert!(report.status(Phase::FilesSync).unwrap().is_failed());
    assert!(skipped(&report, Phase::Symlink));
    assert_eq!(report.deleted, vec!["2018-03-31_010101"]);
    assert!(!mock.was_called("ln"));
}

#[test]
fn test_failed_prepare_skips_remaining_phases() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().add_server("web"));
    let mock = Arc::new(MockExecutor::new().expect("mkdir", MockResponse::Failure { exit_code: 1 }));

    let report = run_one(&backups(&ctx, &mock), "web", &RunOptions::default());

    assert!(report.status(Phase::Prepare).unwrap().is_failed());
    for phase in &Phase::ALL[1..] {
        assert_eq!(
            report.status(*phase),
            Some(&PhaseStatus::Skipped("prepare failed".to_string()))
        );
    }
    assert!(!mock.was_called("rsync"));
}

#[test]
fn test_mysql_dumps_every_database_not_excluded() {
    let mysql_server = RawServer {
        backup: Some(RawBackup {
            mysql: Some(RawMysql {
                enabled: Some(true),
                password: Some("s3cret".to_string()),
                dbs: Some(RawDatabases::One("*".to_string())),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().add_server_with("db", mysql_server));
    let mock = Arc::new(MockExecutor::new().expect_containing(
        "show databases",
        MockResponse::stdout("information_schema\nshop\nmysql\nperformance_schema\n"),
    ));

    let report = run_one(&backups(&ctx, &mock), "db", &RunOptions::default());
    assert_eq!(report.status(Phase::MysqlDump), Some(&PhaseStatus::Ok));

    let dumps: Vec<_> = mock
        .get_calls()
        .into_iter()
        .filter(|c| c.pipeline.program() == "mysqldump")
        .collect();
    assert_eq!(dumps.len(), 2);
    assert!(dumps[0].command().contains(" mysql |"));
    assert!(dumps[1].command().contains(" shop |"));
    assert!(dumps[0].command().contains("-ps3cret"));
    assert!(matches!(
        &dumps[1].stdout,
        StdoutTarget::File(path) if path.ends_with("mysqldump/shop.sql.gz")
    ));
}

#[test]
fn test_ssh_source_is_pulled_over_ssh() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .with_post_script("packages", "dpkg -l", Some("packages.txt"))
            .add_ssh_server("web1", "web1.example.com", "root"),
    );
    let mock = Arc::new(MockExecutor::new());

    let report = run_one(&backups(&ctx, &mock), "web1", &RunOptions::default());
    assert!(report.is_success());

    let commands = mock.commands();
    let rsync = commands.iter().find(|c| c.starts_with("rsync")).unwrap();
    assert!(rsync.contains("root@web1.example.com:"));
    assert!(rsync.contains("-e"));

    let script = mock
        .get_calls()
        .into_iter()
        .find(|c| c.command().contains("dpkg -l"))
        .unwrap();
    assert_eq!(script.pipeline.program(), "ssh");
    assert!(matches!(
        &script.stdout,
        StdoutTarget::File(path) if path.ends_with("packages.txt")
    ));
}

#[test]
fn test_dry_run_executes_nothing() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .add_server("web1")
            .add_server("web2"),
    );
    let mock = Arc::new(MockExecutor::new());
    let options = RunOptions {
        dry_run: true,
        ..Default::default()
    };

    let summary = backups(&ctx, &mock).run(&Selection::All, &options).unwrap();

    assert_eq!(summary.servers.len(), 2);
    assert!(summary.is_success());
    assert!(mock.get_calls().is_empty());
    assert!(!ctx.work_dir().join("web1.exclude").exists());
}

#[test]
fn test_disabled_server_is_reported_without_phases() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .add_server("web")
            .add_disabled_server("legacy"),
    );
    let mock = Arc::new(MockExecutor::new());

    let summary = backups(&ctx, &mock)
        .run(&Selection::Servers, &RunOptions::default())
        .unwrap();

    let legacy = &summary.servers[1];
    assert!(legacy.is_disabled());
    assert!(legacy.phases.is_empty());
    assert_eq!(mock.call_count("rsync"), 1);
}
