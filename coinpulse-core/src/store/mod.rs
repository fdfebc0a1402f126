//! Append-only analytic table stores.
//!
//! A store exposes one bulk-append operation per table kind and answers with
//! a per-row error list. An empty list means every row landed. Transport-level
//! failures come back as a single batch-wide error (no row index) so callers
//! handle both the same way.

pub mod bigquery;
pub mod parquet;
pub mod writer;

pub use bigquery::BigQueryStore;
pub use parquet::{ParquetStore, PartMeta};
pub use writer::{write_observations, write_ohlc, WriteOutcome};

use crate::domain::{Observation, OhlcRow, TableId};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure inside a store backend, before per-row results exist.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(String),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("store request failed: {0}")]
    Request(String),

    #[error("store returned HTTP {status}: {excerpt}")]
    HttpStatus { status: u16, excerpt: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// One rejected row, or the whole batch when `index` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    pub index: Option<usize>,
    pub reason: String,
}

impl RowError {
    pub fn row(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            reason: reason.into(),
        }
    }

    pub fn batch(reason: impl Into<String>) -> Self {
        Self {
            index: None,
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for RowError {
    fn from(e: StoreError) -> Self {
        Self::batch(e.to_string())
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "row {i}: {}", self.reason),
            None => write!(f, "batch: {}", self.reason),
        }
    }
}

/// Trait for analytic store backends.
pub trait TableStore: Send + Sync {
    /// Human-readable name of this backend.
    fn name(&self) -> &str;

    /// Append raw observation rows.
    fn append_observations(&self, table: &TableId, rows: &[Observation]) -> Vec<RowError>;

    /// Append resampled OHLC rows.
    fn append_ohlc(&self, table: &TableId, rows: &[OhlcRow]) -> Vec<RowError>;
}
