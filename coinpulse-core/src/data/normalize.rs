//! Snapshot → observation rows.
//!
//! One bad entry never aborts the batch: it is skipped with a diagnostic and
//! the rest are normalized. All rows share the fetch instant handed in by the
//! caller.

use super::provider::{QuoteSnapshot, RawQuote};
use crate::domain::Observation;
use crate::rng::VolumeSource;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a single snapshot entry could not become a row.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RowFormatError {
    #[error("entry is not an object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' is not a number: {value}")]
    NotANumber { field: &'static str, value: String },

    #[error("price must be finite and non-negative, got {0}")]
    InvalidPrice(f64),

    #[error("last_updated_at {0} is not a valid instant")]
    InvalidInstant(String),

    #[error("asset id upper-cases to an empty symbol")]
    EmptySymbol,

    #[error("symbol {0} already present in this batch")]
    DuplicateSymbol(String),
}

/// Output of one normalization call.
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub fetched_at: DateTime<Utc>,
    pub rows: Vec<Observation>,
    /// Asset id and reason for every entry that was dropped.
    pub skipped: Vec<(String, RowFormatError)>,
}

impl NormalizedBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Normalize every entry of `snapshot`, stamping rows with `fetched_at`.
pub fn normalize(
    snapshot: &QuoteSnapshot,
    fetched_at: DateTime<Utc>,
    volume: &mut dyn VolumeSource,
) -> NormalizedBatch {
    let mut rows = Vec::with_capacity(snapshot.len());
    let mut skipped = Vec::new();
    let mut seen = HashSet::new();

    for (asset_id, record) in snapshot.iter() {
        let result = parse_entry(asset_id, record, fetched_at).and_then(|row| {
            if seen.insert(row.symbol.clone()) {
                Ok(row)
            } else {
                Err(RowFormatError::DuplicateSymbol(row.symbol))
            }
        });

        match result {
            Ok(mut row) => {
                row.volume = volume.volume_for(fetched_at, &row.symbol);
                rows.push(row);
            }
            Err(e) => {
                warn!(asset = asset_id, error = %e, "skipping malformed quote");
                skipped.push((asset_id.to_string(), e));
            }
        }
    }

    info!(
        prepared = rows.len(),
        skipped = skipped.len(),
        batch = %fetched_at,
        "normalized quote snapshot"
    );
    if let Some(first) = rows.first() {
        debug!(row = ?first, "first row");
    }

    NormalizedBatch {
        fetched_at,
        rows,
        skipped,
    }
}

/// Build one row, with `volume` left at zero for the caller to fill.
fn parse_entry(
    asset_id: &str,
    record: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<Observation, RowFormatError> {
    if !record.is_object() {
        return Err(RowFormatError::NotAnObject);
    }
    let raw: RawQuote =
        serde_json::from_value(record.clone()).map_err(|_| RowFormatError::NotAnObject)?;

    let symbol = asset_id.to_uppercase();
    if symbol.is_empty() {
        return Err(RowFormatError::EmptySymbol);
    }

    let price_usd = numeric("usd", raw.usd.as_ref())?.ok_or(RowFormatError::MissingField("usd"))?;
    if !price_usd.is_finite() || price_usd < 0.0 {
        return Err(RowFormatError::InvalidPrice(price_usd));
    }

    let last_updated_at = instant(raw.last_updated_at.as_ref())?;

    Ok(Observation {
        timestamp: fetched_at,
        symbol,
        price_usd,
        market_cap_usd: optional("usd_market_cap", raw.usd_market_cap.as_ref())?,
        vol_24h_usd: optional("usd_24h_vol", raw.usd_24h_vol.as_ref())?,
        change_24h_pct: optional("usd_24h_change", raw.usd_24h_change.as_ref())?,
        last_updated_at,
        volume: 0.0,
    })
}

/// Numbers arrive as JSON numbers or numeric strings; null counts as absent.
fn numeric(field: &'static str, value: Option<&Value>) -> Result<Option<f64>, RowFormatError> {
    let Some(v) = value else {
        return Ok(None);
    };
    let parsed = match v {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.map(Some).ok_or_else(|| RowFormatError::NotANumber {
        field,
        value: v.to_string(),
    })
}

fn optional(field: &'static str, value: Option<&Value>) -> Result<f64, RowFormatError> {
    match numeric(field, value)? {
        None => Ok(0.0),
        Some(x) if x.is_finite() => Ok(x),
        Some(_) => Err(RowFormatError::NotANumber {
            field,
            value: value.map(Value::to_string).unwrap_or_default(),
        }),
    }
}

/// Upstream reports epoch seconds, sometimes fractional.
fn instant(value: Option<&Value>) -> Result<DateTime<Utc>, RowFormatError> {
    let secs = numeric("last_updated_at", value)
        .map_err(|_| RowFormatError::InvalidInstant(value.map(Value::to_string).unwrap_or_default()))?
        .ok_or(RowFormatError::MissingField("last_updated_at"))?;
    if !secs.is_finite() {
        return Err(RowFormatError::InvalidInstant(secs.to_string()));
    }
    let millis = (secs * 1_000.0).round();
    if millis.abs() > i64::MAX as f64 {
        return Err(RowFormatError::InvalidInstant(secs.to_string()));
    }
    DateTime::from_timestamp_millis(millis as i64)
        .ok_or_else(|| RowFormatError::InvalidInstant(secs.to_string()))
}
