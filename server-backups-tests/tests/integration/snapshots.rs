//! End-to-end snapshot rotation with real rsync

use crate::common::{in_snapshot, rsync_available, snapshot_names};
use server_backups::{RunOptions, Selection};
use std::fs;
use std::os::unix::fs::MetadataExt;
use test_utils::{date, snapshot_name, snapshot_time, ConfigBuilder, TestContext, TestResult};

fn run_day(ctx: &TestContext, day: u32) -> TestResult {
    let options = RunOptions {
        now: Some(snapshot_time(date(2018, 3, day))),
        ..Default::default()
    };
    let summary = ctx.backups()?.run(&Selection::Server("web".to_string()), &options)?;
    assert!(summary.is_success(), "run on day {} failed: {:?}", day, summary);
    Ok(())
}

#[test]
fn test_daily_rotation_hardlinks_unchanged_files() -> TestResult {
    if !rsync_available() {
        return Ok(());
    }

    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .with_excludes(vec!["*.tmp".to_string()])
            .add_server("web"),
    );
    let data = ctx.temp_dir().join("data");
    ctx.create_file("data/stable.txt", "unchanged every day");
    ctx.create_file("data/sub/nested.txt", "nested");
    ctx.create_file("data/scratch.tmp", "never backed up");

    for day in [26, 27, 28] {
        run_day(&ctx, day)?;
    }
    ctx.create_file("data/changing.txt", "appeared on the 29th");
    run_day(&ctx, 29)?;

    let backups = ctx.backup_path();
    let latest = snapshot_name(date(2018, 3, 29));
    let previous = snapshot_name(date(2018, 3, 28));

    // keepDaily=3 on the 29th keeps the 27th through the 29th
    assert_eq!(
        snapshot_names(&backups, "web"),
        vec![
            snapshot_name(date(2018, 3, 27)),
            previous.clone(),
            latest.clone()
        ]
    );

    let current = fs::read_link(backups.join("web/current"))?;
    assert!(current.ends_with(&latest), "current -> {:?}", current);

    let stable_latest = in_snapshot(&backups, "web", &latest, &data.join("stable.txt"));
    let stable_previous = in_snapshot(&backups, "web", &previous, &data.join("stable.txt"));
    assert_eq!(fs::read_to_string(&stable_latest)?, "unchanged every day");
    assert_eq!(
        fs::metadata(&stable_latest)?.ino(),
        fs::metadata(&stable_previous)?.ino()
    );

    assert!(in_snapshot(&backups, "web", &latest, &data.join("sub/nested.txt")).exists());
    assert!(in_snapshot(&backups, "web", &latest, &data.join("changing.txt")).exists());
    assert!(!in_snapshot(&backups, "web", &previous, &data.join("changing.txt")).exists());
    assert!(!in_snapshot(&backups, "web", &latest, &data.join("scratch.tmp")).exists());

    // Exclude file is scratch space for a single run
    assert!(!ctx.work_dir().join("web.exclude").exists());
    Ok(())
}

#[test]
fn test_post_script_output_lands_in_snapshot() -> TestResult {
    if !rsync_available() {
        return Ok(());
    }

    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .with_post_script("hello", "echo hello from the source", Some("scripts/hello.txt"))
            .add_server("web"),
    );
    run_day(&ctx, 30)?;

    let snapshot = snapshot_name(date(2018, 3, 30));
    let output = ctx
        .backup_path()
        .join("web/snapshots")
        .join(&snapshot)
        .join("scripts/hello.txt");
    assert_eq!(fs::read_to_string(output)?, "hello from the source\n");
    Ok(())
}
