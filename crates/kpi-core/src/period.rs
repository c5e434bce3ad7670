//! Calendar-month periods.
//!
//! A [`Period`] is the canonical time bucket of the whole pipeline. Its text
//! form is always `YYYY-MM`; lenient parsing of messy spreadsheet dates lives
//! in [`crate::data_processors::PeriodParser`] and always lands here.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::KpiError;

// ── Period ────────────────────────────────────────────────────────────────────

/// One calendar month. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    /// Build a period, returning `None` for months outside `1..=12` or years
    /// that cannot be printed as four digits.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return None;
        }
        Some(Self { year, month })
    }

    /// The month containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First day of the month.
    pub fn first_day(&self) -> NaiveDate {
        // `new` guarantees a valid year/month pair.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Shift by `months` (negative goes back in time).
    ///
    /// Returns `None` when the result leaves the representable range.
    pub fn offset_months(&self, months: i32) -> Option<Self> {
        let first = self.first_day();
        let shifted = if months >= 0 {
            first.checked_add_months(Months::new(months.unsigned_abs()))?
        } else {
            first.checked_sub_months(Months::new(months.unsigned_abs()))?
        };
        Self::new(shifted.year(), shifted.month())
    }

    /// The month before this one.
    pub fn previous(&self) -> Option<Self> {
        self.offset_months(-1)
    }

    /// The month after this one.
    pub fn next(&self) -> Option<Self> {
        self.offset_months(1)
    }

    /// Signed number of months from `self` to `other`.
    pub fn months_until(&self, other: &Period) -> i32 {
        (other.year - self.year) * 12 + (other.month as i32 - self.month as i32)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Strict parser: only the canonical `YYYY-MM` form is accepted.
impl FromStr for Period {
    type Err = KpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KpiError::InvalidPeriod(s.to_string());
        let (y, m) = s.trim().split_once('-').ok_or_else(invalid)?;
        if y.len() != 4 || m.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        Period::new(year, month).ok_or_else(invalid)
    }
}

impl TryFrom<String> for Period {
    type Error = KpiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
