//! Fixed-width, absolute-time-aligned buckets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BucketWidthError {
    #[error("bucket width '{0}' is not of the form <n><s|m|min|h|d>")]
    Malformed(String),

    #[error("bucket width must be positive")]
    NonPositive,
}

/// Width of a resampling bucket, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketWidth(i64);

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

impl BucketWidth {
    pub fn from_millis(ms: i64) -> Result<Self, BucketWidthError> {
        if ms <= 0 {
            return Err(BucketWidthError::NonPositive);
        }
        Ok(Self(ms))
    }

    pub fn hourly() -> Self {
        Self(HOUR_MS)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Start of the bucket containing `epoch_ms`.
    ///
    /// Uses the Euclidean floor so instants before the epoch land in the
    /// bucket that precedes them rather than the one after.
    pub fn bucket_start_millis(&self, epoch_ms: i64) -> i64 {
        epoch_ms.div_euclid(self.0) * self.0
    }

    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let start = self.bucket_start_millis(ts.timestamp_millis());
        DateTime::from_timestamp_millis(start).unwrap_or(ts)
    }
}

impl Default for BucketWidth {
    fn default() -> Self {
        Self::hourly()
    }
}

impl FromStr for BucketWidth {
    type Err = BucketWidthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| BucketWidthError::Malformed(s.to_string()))?;
        let (digits, unit) = s.split_at(split);
        let n: i64 = digits
            .parse()
            .map_err(|_| BucketWidthError::Malformed(s.to_string()))?;
        let unit_ms = match unit {
            "s" => SECOND_MS,
            "m" | "min" => MINUTE_MS,
            "h" => HOUR_MS,
            "d" => DAY_MS,
            _ => return Err(BucketWidthError::Malformed(s.to_string())),
        };
        let ms = n
            .checked_mul(unit_ms)
            .ok_or_else(|| BucketWidthError::Malformed(s.to_string()))?;
        Self::from_millis(ms)
    }
}

impl TryFrom<String> for BucketWidth {
    type Error = BucketWidthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BucketWidth> for String {
    fn from(width: BucketWidth) -> Self {
        width.to_string()
    }
}

impl fmt::Display for BucketWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0;
        if ms % DAY_MS == 0 {
            write!(f, "{}d", ms / DAY_MS)
        } else if ms % HOUR_MS == 0 {
            write!(f, "{}h", ms / HOUR_MS)
        } else if ms % MINUTE_MS == 0 {
            write!(f, "{}m", ms / MINUTE_MS)
        } else if ms % SECOND_MS == 0 {
            write!(f, "{}s", ms / SECOND_MS)
        } else {
            write!(f, "{ms}ms")
        }
    }
}
