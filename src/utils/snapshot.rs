//! Timestamped snapshot directory names

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

/// `YYYY-MM-DD_HHMMSS`, local time, fixed width so names sort chronologically
pub const SNAPSHOT_FORMAT: &str = "%Y-%m-%d_%H%M%S";

/// A snapshot directory name together with the time it encodes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snapshot {
    taken: NaiveDateTime,
    name: String,
}

impl Snapshot {
    /// Parse a directory name; anything else in `snapshots/` is not a snapshot
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim_end_matches('/');
        let taken = NaiveDateTime::parse_from_str(name, SNAPSHOT_FORMAT).ok()?;
        Some(Self {
            taken,
            name: name.to_string(),
        })
    }

    pub fn at(taken: NaiveDateTime) -> Self {
        Self {
            name: taken.format(SNAPSHOT_FORMAT).to_string(),
            taken,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn taken(&self) -> NaiveDateTime {
        self.taken
    }

    pub fn date(&self) -> NaiveDate {
        self.taken.date()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Valid snapshot names from a directory listing, oldest first
pub fn parse_listing<S: AsRef<str>>(entries: &[S]) -> Vec<Snapshot> {
    let mut snapshots: Vec<Snapshot> = entries
        .iter()
        .filter_map(|entry| Snapshot::parse(entry.as_ref()))
        .collect();
    snapshots.sort();
    snapshots.dedup();
    snapshots
}
