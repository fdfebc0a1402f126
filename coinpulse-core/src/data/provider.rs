//! Quote source trait and structured fetch errors.
//!
//! The QuoteSource trait abstracts over the upstream price API so the pipeline
//! can run against canned snapshots in tests.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors talking to the upstream price API. All of them are fatal to a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("upstream returned HTTP {status}: {excerpt}")]
    HttpStatus { status: u16, excerpt: String },

    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

/// Raw per-asset record exactly as upstream sent it.
///
/// Fields stay loosely typed: upstream occasionally sends numbers as strings
/// or drops fields for thinly traded assets, and deciding what is usable is
/// the normalizer's job.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawQuote {
    #[serde(default)]
    pub usd: Option<Value>,
    #[serde(default)]
    pub usd_market_cap: Option<Value>,
    #[serde(default)]
    pub usd_24h_vol: Option<Value>,
    #[serde(default)]
    pub usd_24h_change: Option<Value>,
    #[serde(default)]
    pub last_updated_at: Option<Value>,
}

/// Asset id → raw record, in a deterministic order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteSnapshot {
    entries: Vec<(String, Value)>,
}

impl QuoteSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, asset_id: impl Into<String>, record: Value) {
        self.entries.push((asset_id.into(), record));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(id, v)| (id.as_str(), v))
    }

    pub fn asset_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Requested ids that upstream silently left out.
    pub fn missing<'a>(&self, requested: &'a [String]) -> Vec<&'a str> {
        requested
            .iter()
            .filter(|id| !self.entries.iter().any(|(have, _)| have == *id))
            .map(|id| id.as_str())
            .collect()
    }
}

/// Trait for upstream price sources.
pub trait QuoteSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch current USD quotes for `asset_ids` in a single request.
    fn fetch(&self, asset_ids: &[String]) -> Result<QuoteSnapshot, FetchError>;
}
