//! Rollup buckets
//!
//! A bucket is identified by its start, in seconds since the epoch. Buckets
//! of a rollup `r` start at multiples of `r`, so sub-day rollups align to the
//! epoch and day rollups align to UTC midnight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TsdbError};

/// Seconds in one day
pub const DAY: i64 = 86_400;

/// A configured rollup and how many buckets of it the store retains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupSpec {
    /// Bucket width in seconds
    pub seconds: i64,
    /// Number of buckets kept
    pub samples: i64,
}

impl RollupSpec {
    /// Create a rollup spec
    pub const fn new(seconds: i64, samples: i64) -> Self {
        Self { seconds, samples }
    }

    /// Time span covered by all retained buckets
    pub fn span(&self) -> i64 {
        self.seconds.saturating_mul(self.samples)
    }
}

/// Check a rollup can be used for bucketing
///
/// Rollups must be positive; rollups of a day or longer must be a whole
/// number of days.
pub fn validate_rollup(rollup: i64) -> Result<()> {
    if rollup <= 0 {
        return Err(TsdbError::InvalidRequest(format!(
            "rollup must be positive, got {}",
            rollup
        )));
    }
    if rollup >= DAY && rollup % DAY != 0 {
        return Err(TsdbError::InvalidRequest(format!(
            "rollup of {}s is longer than a day but not a whole number of days",
            rollup
        )));
    }
    Ok(())
}

/// Start of the bucket containing `ts`
///
/// Floors toward negative infinity, so instants before the epoch land in the
/// bucket that starts at or before them. Assumes a validated rollup.
pub fn bucket_start(ts: i64, rollup: i64) -> i64 {
    ts - ts.rem_euclid(rollup)
}

/// Every bucket start from the bucket of `start` to the bucket of `end`, inclusive
///
/// Always yields at least one bucket.
pub fn buckets(start: DateTime<Utc>, end: DateTime<Utc>, rollup: i64) -> Result<Vec<i64>> {
    validate_rollup(rollup)?;
    if start > end {
        return Err(TsdbError::InvalidRequest(format!(
            "start {} is after end {}",
            start, end
        )));
    }

    let first = bucket_start(start.timestamp(), rollup);
    let last = bucket_start(end.timestamp(), rollup);

    let count = ((last - first) / rollup + 1) as usize;
    let mut series = Vec::with_capacity(count);
    let mut bucket = first;
    while bucket <= last {
        series.push(bucket);
        bucket += rollup;
    }

    Ok(series)
}

/// Smallest configured rollup whose retention covers `[start, end]`
///
/// Falls back to the largest rollup when none covers the range. Returns
/// `None` only when no rollups are configured.
pub fn optimal_rollup(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    rollups: &[RollupSpec],
) -> Option<i64> {
    let span = end.timestamp() - start.timestamp();

    rollups
        .iter()
        .find(|r| r.span() >= span)
        .or_else(|| rollups.last())
        .map(|r| r.seconds)
}

/// Convert a bucket start back to an instant
pub fn to_datetime(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| TsdbError::InvalidRequest(format!("timestamp {} is out of range", ts)))
}
