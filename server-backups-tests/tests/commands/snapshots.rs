//! Tests for the 'snapshots' command
//!
//! Lists a server's snapshots and which retention tier keeps each one,
//! without changing anything at the destination.

use server_backups::config::RetentionPolicy;
use server_backups::utils::Clock;
use server_backups::BackupError;
use std::sync::Arc;
use test_utils::{date, first_quarter_2018, listing, snapshot_time, ConfigBuilder, MockExecutor, MockResponse, TestContext};

fn context() -> TestContext {
    TestContext::from_builder(
        ConfigBuilder::minimal()
            .with_retention(RetentionPolicy {
                daily: 5,
                weekly: 8,
                monthly: 6,
                yearly: 1,
            })
            .add_server("web"),
    )
}

#[test]
fn test_snapshot_overview_tiers() {
    let ctx = context();
    let mut entries = first_quarter_2018();
    entries.push("lost+found".to_string());
    let mock = Arc::new(MockExecutor::new().expect("ls", MockResponse::stdout(listing(&entries))));

    let overview = ctx
        .backups()
        .unwrap()
        .with_executor(mock.clone())
        .with_clock(Clock::Fixed(snapshot_time(date(2018, 3, 31))))
        .snapshots("web")
        .unwrap();

    assert_eq!(overview.snapshots.len(), 90);
    assert_eq!(overview.plan.monthly.len(), 3);
    assert_eq!(overview.plan.weekly.len(), 8);
    // 03-27 through 03-30; 03-31 is a month end
    assert_eq!(overview.plan.daily.len(), 4);
    assert_eq!(overview.plan.delete.len(), 90 - 15);
    assert_eq!(overview.plan.tier("2018-03-24_010101"), Some("weekly"));
    assert_eq!(overview.plan.tier("2018-01-02_010101"), None);
}

#[test]
fn test_snapshot_overview_runs_only_a_listing() {
    let ctx = context();
    let mock = Arc::new(MockExecutor::new());

    let overview = ctx
        .backups()
        .unwrap()
        .with_executor(mock.clone())
        .snapshots("web")
        .unwrap();

    assert!(overview.snapshots.is_empty());
    assert_eq!(mock.commands().len(), 1);
    assert!(mock.commands()[0].starts_with("ls -1 "));
    assert!(mock.commands()[0].ends_with("/web/snapshots"));
}

#[test]
fn test_snapshot_overview_unknown_server() {
    let ctx = context();
    let result = ctx.backups().unwrap().snapshots("nope");
    assert!(matches!(result, Err(BackupError::UnknownServer(name)) if name == "nope"));
}
