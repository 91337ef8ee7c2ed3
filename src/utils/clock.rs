//! Source of "now" for snapshot names and retention

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};

use super::snapshot::SNAPSHOT_FORMAT;

/// Environment variable that pins the current time
pub const NOW_ENV: &str = "SERVER_BACKUPS_NOW";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(NaiveDateTime),
}

impl Clock {
    /// Read [`NOW_ENV`] once; unset or empty means the system clock
    pub fn from_env() -> Result<Self> {
        match std::env::var(NOW_ENV) {
            Ok(value) if !value.trim().is_empty() => {
                let now = parse_now(value.trim())
                    .with_context(|| format!("Invalid {} value: {}", NOW_ENV, value))?;
                Ok(Clock::Fixed(now))
            }
            _ => Ok(Clock::System),
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        match self {
            Clock::System => Local::now().naive_local(),
            Clock::Fixed(now) => *now,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// `YYYY-MM-DD_HHMMSS` or a bare `YYYY-MM-DD` (midnight)
pub fn parse_now(value: &str) -> Result<NaiveDateTime> {
    if let Ok(now) = NaiveDateTime::parse_from_str(value, SNAPSHOT_FORMAT) {
        return Ok(now);
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .context("Expected YYYY-MM-DD_HHMMSS or YYYY-MM-DD")?;
    date.and_hms_opt(0, 0, 0)
        .context("Invalid time of day")
}
