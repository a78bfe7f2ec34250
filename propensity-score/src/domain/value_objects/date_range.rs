//! Date range and job key value objects.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Error;

/// Textual date format accepted on the submit/query surface.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// An inclusive calendar range of issue dates.
///
/// Ordering between `start` and `end` is not validated; a reversed range is
/// a valid value that simply selects no records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Parse a range from two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, Error> {
        Ok(Self {
            start: parse_date("start", start)?,
            end: parse_date("end", end)?,
        })
    }

    /// Derive the job key identifying work over this range.
    pub fn key(&self) -> JobKey {
        JobKey(*self)
    }

    /// Whether `date` falls within the range, bounds included.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

fn parse_date(which: &str, value: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| {
        Error::invalid_range(format!(
            "{which} date '{value}' is not a valid YYYY-MM-DD date: {e}"
        ))
    })
}

/// Deterministic identifier for a batch job.
///
/// Equality and hashing are those of the parsed calendar dates, so textual
/// variants of the same range ("2024-1-5" vs "2024-01-05") share a key and
/// distinct ranges never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey(DateRange);

impl JobKey {
    /// Derive a key from two `YYYY-MM-DD` strings.
    pub fn derive(start: &str, end: &str) -> Result<Self, Error> {
        DateRange::parse(start, end).map(|range| range.key())
    }

    pub fn range(&self) -> DateRange {
        self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.0.start.format(DATE_FORMAT),
            self.0.end.format(DATE_FORMAT)
        )
    }
}
