//! Observation: one raw quote for one asset at one fetch instant.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// A single price observation, as appended to the raw observations table.
///
/// `timestamp` is the fetch instant and is identical for every row of a batch.
/// `last_updated_at` is what upstream reports for the quote itself and may lag
/// the fetch instant by minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price_usd: f64,
    pub market_cap_usd: f64,
    pub vol_24h_usd: f64,
    pub change_24h_pct: f64,
    pub last_updated_at: DateTime<Utc>,
    /// Synthetic filler kept for table-schema compatibility.
    ///
    /// Not derived from any market signal; see [`crate::rng::VolumeSource`].
    pub volume: f64,
}

impl Observation {
    /// Row-level invariants: non-empty symbol, finite non-negative price.
    pub fn is_sane(&self) -> bool {
        !self.symbol.is_empty() && self.price_usd.is_finite() && self.price_usd >= 0.0
    }
}

/// Capture a batch instant at the millisecond precision the stores keep.
pub fn batch_instant(now: DateTime<Utc>) -> DateTime<Utc> {
    now.trunc_subsecs(3)
}
