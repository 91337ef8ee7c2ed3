//! Tiered retention of snapshots
//!
//! Tiers are evaluated from the coarsest to the finest: yearly, monthly,
//! weekly, then daily. A snapshot qualifies for the yearly tier when it was
//! taken on December 31st, for monthly on the last day of its month, for
//! weekly on the Saturday that ends its week. Each tier keeps the last N
//! qualifying snapshots and then removes *every* qualifying snapshot from the
//! working set, so a year-end snapshot never also counts against the monthly
//! quota. The daily tier keeps everything left that was taken within the last
//! `daily` days. Whatever no tier kept is deleted.

use super::snapshot::{parse_listing, Snapshot};
use crate::config::RetentionPolicy;
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeSet;

/// Result of applying a retention policy to a snapshot listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    pub yearly: Vec<String>,
    pub monthly: Vec<String>,
    pub weekly: Vec<String>,
    pub daily: Vec<String>,
    /// Snapshot names to delete, oldest first
    pub delete: Vec<String>,
}

impl PrunePlan {
    /// Every snapshot some tier retained
    pub fn kept(&self) -> BTreeSet<&str> {
        self.yearly
            .iter()
            .chain(&self.monthly)
            .chain(&self.weekly)
            .chain(&self.daily)
            .map(String::as_str)
            .collect()
    }

    /// Tier that retained `name`, if any
    pub fn tier(&self, name: &str) -> Option<&'static str> {
        let tiers = [
            ("yearly", &self.yearly),
            ("monthly", &self.monthly),
            ("weekly", &self.weekly),
            ("daily", &self.daily),
        ];
        tiers
            .into_iter()
            .find(|(_, kept)| kept.iter().any(|k| k == name))
            .map(|(tier, _)| tier)
    }
}

/// Compute which snapshots to keep and which to delete
///
/// Entries that are not snapshot names are ignored and never deleted.
pub fn prune<S: AsRef<str>>(entries: &[S], today: NaiveDate, keep: &RetentionPolicy) -> PrunePlan {
    let snapshots = parse_listing(entries);
    let mut remaining: Vec<&Snapshot> = snapshots.iter().collect();

    let yearly = keep_tier(&mut remaining, keep.yearly, is_last_day_of_year);
    let monthly = keep_tier(&mut remaining, keep.monthly, is_last_day_of_month);
    let weekly = keep_tier(&mut remaining, keep.weekly, is_last_day_of_week);
    let daily = keep_daily(&remaining, keep.daily, today);

    let mut plan = PrunePlan {
        yearly,
        monthly,
        weekly,
        daily,
        delete: Vec::new(),
    };

    // Recomputed from the full listing: same-day siblings of kept snapshots
    // were dropped from the working set without being kept.
    let kept = plan.kept();
    let delete = snapshots
        .iter()
        .map(Snapshot::name)
        .filter(|name| !kept.contains(name))
        .map(str::to_string)
        .collect();
    plan.delete = delete;
    plan
}

/// Keep the last `count` qualifying snapshots, drop all qualifying ones from `remaining`
fn keep_tier(remaining: &mut Vec<&Snapshot>, count: u32, qualifies: fn(NaiveDate) -> bool) -> Vec<String> {
    if remaining.is_empty() {
        return Vec::new();
    }

    let candidates: Vec<&Snapshot> = remaining
        .iter()
        .copied()
        .filter(|s| qualifies(s.date()))
        .collect();
    remaining.retain(|s| !qualifies(s.date()));

    let skip = candidates.len().saturating_sub(count as usize);
    candidates
        .into_iter()
        .skip(skip)
        .map(|s| s.name().to_string())
        .collect()
}

/// Everything left taken strictly after `today - days`
fn keep_daily(remaining: &[&Snapshot], days: u32, today: NaiveDate) -> Vec<String> {
    if days == 0 {
        return Vec::new();
    }

    let cutoff = today - Duration::days(i64::from(days));
    remaining
        .iter()
        .filter(|s| s.date() > cutoff)
        .map(|s| s.name().to_string())
        .collect()
}

/// Last calendar day of the month `date` falls in
pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

fn is_last_day_of_month(date: NaiveDate) -> bool {
    date == last_day_of_month(date)
}

fn is_last_day_of_year(date: NaiveDate) -> bool {
    date.month() == 12 && is_last_day_of_month(date)
}

/// Weeks run Sunday to Saturday
fn is_last_day_of_week(date: NaiveDate) -> bool {
    let days_to_saturday = 6 - i64::from(date.weekday().num_days_from_sunday());
    date + Duration::days(days_to_saturday) == date
}
