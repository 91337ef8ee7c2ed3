//! Tests for the retention planner over a quarter of daily snapshots

use rstest::rstest;
use server_backups::config::RetentionPolicy;
use server_backups::utils::prune;
use test_utils::{daily_snapshots, date, first_quarter_2018, snapshot_name};

fn keep(daily: u32, weekly: u32, monthly: u32, yearly: u32) -> RetentionPolicy {
    RetentionPolicy {
        daily,
        weekly,
        monthly,
        yearly,
    }
}

// 2018-03-31 is both a month end and a Saturday, so it only ever counts
// toward the monthly tier.
#[rstest]
#[case::nothing_kept(keep(0, 0, 0, 0), 0)]
#[case::dailies_skip_month_end(keep(7, 0, 0, 0), 6)]
#[case::month_ends(keep(0, 0, 3, 0), 3)]
#[case::saturdays(keep(0, 4, 0, 0), 4)]
#[case::more_tiers_than_snapshots(keep(0, 0, 12, 0), 3)]
#[case::everything(keep(90, 13, 3, 1), 90)]
fn test_kept_counts(#[case] policy: RetentionPolicy, #[case] expected: usize) {
    let names = first_quarter_2018();
    let plan = prune(&names, date(2018, 3, 31), &policy);

    assert_eq!(plan.kept().len(), expected);
    assert_eq!(plan.delete.len(), names.len() - expected);
}

#[test]
fn test_month_ends_are_kept_by_monthly() {
    let names = first_quarter_2018();
    let plan = prune(&names, date(2018, 3, 31), &keep(0, 0, 3, 0));

    assert_eq!(
        plan.monthly,
        vec![
            snapshot_name(date(2018, 1, 31)),
            snapshot_name(date(2018, 2, 28)),
            snapshot_name(date(2018, 3, 31)),
        ]
    );
    assert_eq!(plan.tier(&snapshot_name(date(2018, 3, 31))), Some("monthly"));
}

#[test]
fn test_weekly_keeps_latest_saturdays() {
    let names = first_quarter_2018();
    let plan = prune(&names, date(2018, 3, 31), &keep(0, 2, 0, 0));

    // 03-31 already left the working set as a month end
    assert_eq!(
        plan.weekly,
        vec![
            snapshot_name(date(2018, 3, 17)),
            snapshot_name(date(2018, 3, 24)),
        ]
    );
}

#[test]
fn test_daily_window_is_relative_to_today() {
    let names = daily_snapshots(date(2018, 3, 1), date(2018, 3, 30));
    let plan = prune(&names, date(2018, 3, 30), &keep(3, 0, 0, 0));

    assert_eq!(
        plan.daily,
        vec![
            snapshot_name(date(2018, 3, 28)),
            snapshot_name(date(2018, 3, 29)),
            snapshot_name(date(2018, 3, 30)),
        ]
    );
    assert_eq!(plan.tier(&snapshot_name(date(2018, 3, 28))), Some("daily"));
    assert_eq!(plan.tier(&snapshot_name(date(2018, 3, 27))), None);
    assert_eq!(plan.delete.len(), 27);
}

#[test]
fn test_unrelated_entries_are_never_deleted() {
    let mut names = first_quarter_2018();
    names.push("lost+found".to_string());
    names.push("notes.txt".to_string());

    let plan = prune(&names, date(2018, 3, 31), &keep(0, 0, 0, 0));
    assert!(!plan.delete.iter().any(|name| name == "lost+found"));
    assert!(!plan.delete.iter().any(|name| name == "notes.txt"));
    assert_eq!(plan.delete.len(), 90);
}
