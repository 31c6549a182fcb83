//! Closed calendar-date ranges.
//!
//! Every window computation in the engine (query range, recurrence bounds,
//! semester bounds) goes through [`DateRange::intersect`], so "empty" has a
//! single meaning: `start > end`.

use std::iter::FusedIterator;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Inclusive range of dates `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a range; `start > end` yields an empty range rather than a panic.
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Parses two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d")?;
        let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d")?;
        Ok(Self::new(start, end))
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// The common part of two ranges, or `None` when they do not meet.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        let result = Self::new(start, end);
        (!result.is_empty()).then_some(result)
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.intersect(other).is_some()
    }

    /// Shrinks the end of the range to `until` if it is earlier.
    pub fn clamp_end(&self, until: Option<NaiveDate>) -> Self {
        match until {
            Some(until) if until < self.end => Self::new(self.start, until),
            _ => *self,
        }
    }

    /// Number of dates in the range, zero when empty.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            usize::try_from((self.end - self.start).num_days() + 1).unwrap_or(0)
        }
    }

    /// First and last instant covered by the range, in UTC.
    pub fn utc_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start.and_time(NaiveTime::MIN).and_utc();
        let end = self.end.and_time(NaiveTime::MIN).and_utc() + Duration::days(1)
            - Duration::nanoseconds(1);
        (start, end)
    }

    pub fn days(&self) -> Days {
        Days {
            next: self.start,
            end: self.end,
        }
    }
}

impl IntoIterator for DateRange {
    type Item = NaiveDate;
    type IntoIter = Days;

    fn into_iter(self) -> Self::IntoIter {
        self.days()
    }
}

/// Iterator over the dates of a [`DateRange`] in ascending order
#[derive(Debug, Clone)]
pub struct Days {
    next: NaiveDate,
    end: NaiveDate,
}

impl Iterator for Days {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.end {
            return None;
        }
        let current = self.next;
        match current.succ_opt() {
            Some(next) => self.next = next,
            // NaiveDate::MAX: make the iterator empty after yielding it
            None => self.end = NaiveDate::MIN,
        }
        Some(current)
    }
}

impl FusedIterator for Days {}
