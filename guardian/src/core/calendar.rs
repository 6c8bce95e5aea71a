//! Calendar helpers: month keys, ISO week keys, and remaining-slot counts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Calendar month identifier formatted as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn first_day(self) -> NaiveDate {
        // Always valid: month is range-checked at construction.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Number of days in the month.
    pub fn days(self) -> u32 {
        let next = self.next().first_day();
        (next - self.first_day()).num_days() as u32
    }

    /// Midnight UTC on the first day of the following month.
    pub fn end(self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.next().first_day().and_hms_opt(0, 0, 0).unwrap_or_default())
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("month key '{s}' must be YYYY-MM"))?;
        if year.len() != 4 || month.len() != 2 {
            return Err(format!("month key '{s}' must be YYYY-MM"));
        }
        let year: i32 = year
            .parse()
            .map_err(|_| format!("month key '{s}' has invalid year"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("month key '{s}' has invalid month"))?;
        MonthKey::new(year, month).ok_or_else(|| format!("month key '{s}' has invalid month"))
    }
}

impl TryFrom<String> for MonthKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(value: MonthKey) -> Self {
        value.to_string()
    }
}

/// ISO week key, e.g. `2026-W43`.
pub fn week_key(at: DateTime<Utc>) -> String {
    let week = at.iso_week();
    format!("{:04}-W{:02}", week.year(), week.week())
}

/// Half-open `[start, end)` bounds of the ISO week containing `at`.
pub fn week_bounds(at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let days_from_monday = i64::from(at.weekday().num_days_from_monday());
    let monday = at.date_naive() - Duration::days(days_from_monday);
    let start = Utc.from_utc_datetime(&monday.and_hms_opt(0, 0, 0).unwrap_or_default());
    (start, start + Duration::days(7))
}

/// Days left in the month of `now`, counting today.
pub fn days_remaining_in_month(now: DateTime<Utc>) -> u32 {
    let month = MonthKey::of(now);
    month.days() - now.day() + 1
}

/// Weeks (rounded up) left in the month of `now`, counting the current one.
pub fn weeks_remaining_in_month(now: DateTime<Utc>) -> u32 {
    days_remaining_in_month(now).div_ceil(7)
}

/// Episodes the scheduler will still attempt this month at `weekly_target`,
/// counting the one being decided. Never below one.
pub fn episodes_remaining_in_month(now: DateTime<Utc>, weekly_target: u32) -> u32 {
    let days = u64::from(days_remaining_in_month(now));
    let episodes = (days * u64::from(weekly_target)).div_ceil(7).max(1);
    u32::try_from(episodes).unwrap_or(u32::MAX)
}
