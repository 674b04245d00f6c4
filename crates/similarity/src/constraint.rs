//! Time constraints restricting which ratings take part in a similarity computation.
//!
//! "No restriction" is not a variant: it is `Option::<TimeConstraint>::None`.
//! A constructed `TimeConstraint` is always one of two shapes:
//!
//! - **MaxLimit**: `(-inf, end)`, only an upper bound
//! - **TimeBin**: `[start, end)` with `start < end`
//!
//! Any other pairing is rejected when the value is built, including when it is
//! deserialized.

use crate::error::{Result, SimilarityError};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two valid shapes a constraint has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    MaxLimit,
    TimeBin,
}

/// Immutable temporal filter over rating timestamps.
///
/// Equality and hashing are structural over `(start, end)`, so two constraints
/// built independently for the same window are the same cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeConstraint", into = "RawTimeConstraint")]
pub struct TimeConstraint {
    start: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
}

impl TimeConstraint {
    /// Build a constraint from an optional start and end.
    ///
    /// Fails with `InvalidTimeConstraint` when `end` is missing or `start >= end`.
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        match (start, end) {
            (None, Some(end)) => Ok(Self { start: None, end }),
            (Some(s), Some(e)) if s < e => Ok(Self {
                start: Some(s),
                end: e,
            }),
            _ => Err(SimilarityError::InvalidTimeConstraint { start, end }),
        }
    }

    /// Upper bound only: ratings strictly before `end`
    pub fn max_limit(end: DateTime<Utc>) -> Self {
        Self { start: None, end }
    }

    /// Closed-open window `[start, end)`
    pub fn time_bin(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        Self::new(Some(start), Some(end))
    }

    /// Ratings strictly before Jan 1 of `year`
    pub fn max_limit_year(year: i32) -> Result<Self> {
        Ok(Self::max_limit(jan_first(year)?))
    }

    /// Ratings from Jan 1 of `start_year` up to (not including) Jan 1 of `end_year`
    pub fn time_bin_years(start_year: i32, end_year: i32) -> Result<Self> {
        Self::time_bin(jan_first(start_year)?, jan_first(end_year)?)
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn kind(&self) -> ConstraintKind {
        if self.start.is_some() {
            ConstraintKind::TimeBin
        } else {
            ConstraintKind::MaxLimit
        }
    }

    pub fn is_max_limit(&self) -> bool {
        self.kind() == ConstraintKind::MaxLimit
    }

    pub fn is_time_bin(&self) -> bool {
        matches!(self.start, Some(start) if start < self.end)
    }

    /// Always true for a constructed value
    pub fn is_valid(&self) -> bool {
        self.is_max_limit() || self.is_time_bin()
    }

    /// Calendar year of the upper bound
    pub fn end_year(&self) -> i32 {
        self.end.year()
    }

    /// Calendar year of the lower bound, if any
    pub fn start_year(&self) -> Option<i32> {
        self.start.map(|s| s.year())
    }

    /// Whether a Unix timestamp (seconds) falls inside the window
    pub fn contains(&self, timestamp: i64) -> bool {
        let end = self.end.timestamp();
        match self.start {
            None => timestamp < end,
            Some(start) => timestamp >= start.timestamp() && timestamp < end,
        }
    }
}

/// Whether `timestamp` passes an optional constraint (`None` admits everything)
pub fn admits(constraint: Option<&TimeConstraint>, timestamp: i64) -> bool {
    constraint.is_none_or(|c| c.contains(timestamp))
}

/// Midnight UTC on Jan 1 of `year`
pub fn jan_first(year: i32) -> Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .ok_or(SimilarityError::InvalidYear(year))
}

impl fmt::Display for TimeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start {
            None => write!(f, "before {}", self.end.format("%Y-%m-%d")),
            Some(start) => write!(
                f,
                "[{}, {})",
                start.format("%Y-%m-%d"),
                self.end.format("%Y-%m-%d")
            ),
        }
    }
}

/// Wire shape used by serde; validated through `TimeConstraint::new`
#[derive(Serialize, Deserialize)]
struct RawTimeConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start: Option<DateTime<Utc>>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
}

impl TryFrom<RawTimeConstraint> for TimeConstraint {
    type Error = SimilarityError;

    fn try_from(raw: RawTimeConstraint) -> Result<Self> {
        TimeConstraint::new(raw.start, raw.end)
    }
}

impl From<TimeConstraint> for RawTimeConstraint {
    fn from(c: TimeConstraint) -> Self {
        Self {
            start: c.start,
            end: Some(c.end),
        }
    }
}
