//! OHLC row: one resampled bucket for one asset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open/high/low/close of `price_usd` over one bucket.
///
/// `timestamp` is the bucket start, aligned to absolute time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcRow {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl OhlcRow {
    /// `low <= open, close <= high`, all finite.
    pub fn is_sane(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite());
        finite
            && !self.symbol.is_empty()
            && self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
    }
}
