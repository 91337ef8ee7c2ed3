//! Test fixtures and sample data

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Snapshot directory name taken at `date` 01:01:01
pub fn snapshot_name(date: NaiveDate) -> String {
    snapshot_time(date).format("%Y-%m-%d_%H%M%S").to_string()
}

/// 01:01:01 on `date`, the time the nightly run fires in fixtures
pub fn snapshot_time(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(1, 1, 1).expect("valid time")
}

/// One snapshot a day for every day from `first` through `last`
pub fn daily_snapshots(first: NaiveDate, last: NaiveDate) -> Vec<String> {
    let mut names = Vec::new();
    let mut date = first;
    while date <= last {
        names.push(snapshot_name(date));
        date += Duration::days(1);
    }
    names
}

/// Every day of the first quarter of 2018
pub fn first_quarter_2018() -> Vec<String> {
    daily_snapshots(date(2018, 1, 1), date(2018, 3, 31))
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// `ls` output for a snapshots directory
pub fn listing(names: &[String]) -> String {
    let mut out = names.join("\n");
    out.push('\n');
    out
}
