//! Inclusive time windows for telemetry scans.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use xp_common::{Error, Result};

/// A closed interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, rejecting `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(Error::Validation(format!(
                "window start {} is after end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` days ending at `end`.
    ///
    /// Fails with [`Error::Validation`] when the start would fall outside
    /// the representable date range.
    pub fn trailing_days(end: DateTime<Utc>, days: u32) -> Result<Self> {
        let start = Duration::try_days(i64::from(days))
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| {
                Error::Validation(format!("window of {} days is out of range", days))
            })?;
        Ok(Self { start, end })
    }

    /// Both bounds are inclusive.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}
