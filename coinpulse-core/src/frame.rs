//! Row ↔ DataFrame conversions shared by the Parquet store and the resampler.
//!
//! Instants are stored as millisecond `Datetime` columns without a time zone;
//! all values are UTC.

use crate::domain::{Observation, OhlcRow};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame construction failed: {0}")]
    Build(String),

    #[error("column '{column}': {reason}")]
    Column { column: String, reason: String },

    #[error("null or out-of-range value in '{column}' at row {row}")]
    BadValue { column: String, row: usize },
}

fn datetime_column(name: &str, millis: Vec<i64>) -> Result<Column, FrameError> {
    Column::new(name.into(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .map_err(|e| FrameError::Build(format!("{name} cast: {e}")))
}

/// Materialize observation rows as a table.
pub fn observations_to_frame(rows: &[Observation]) -> Result<DataFrame, FrameError> {
    let timestamps: Vec<i64> = rows.iter().map(|r| r.timestamp.timestamp_millis()).collect();
    let symbols: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
    let prices: Vec<f64> = rows.iter().map(|r| r.price_usd).collect();
    let caps: Vec<f64> = rows.iter().map(|r| r.market_cap_usd).collect();
    let vols: Vec<f64> = rows.iter().map(|r| r.vol_24h_usd).collect();
    let changes: Vec<f64> = rows.iter().map(|r| r.change_24h_pct).collect();
    let updated: Vec<i64> = rows
        .iter()
        .map(|r| r.last_updated_at.timestamp_millis())
        .collect();
    let volumes: Vec<f64> = rows.iter().map(|r| r.volume).collect();

    DataFrame::new(vec![
        datetime_column("timestamp", timestamps)?,
        Column::new("symbol".into(), symbols),
        Column::new("price_usd".into(), prices),
        Column::new("market_cap_usd".into(), caps),
        Column::new("vol_24h_usd".into(), vols),
        Column::new("change_24h_pct".into(), changes),
        datetime_column("last_updated_at", updated)?,
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| FrameError::Build(e.to_string()))
}

/// Materialize OHLC rows as a table.
pub fn ohlc_to_frame(rows: &[OhlcRow]) -> Result<DataFrame, FrameError> {
    let symbols: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
    let timestamps: Vec<i64> = rows.iter().map(|r| r.timestamp.timestamp_millis()).collect();
    let opens: Vec<f64> = rows.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = rows.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = rows.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();

    DataFrame::new(vec![
        Column::new("symbol".into(), symbols),
        datetime_column("timestamp", timestamps)?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
    ])
    .map_err(|e| FrameError::Build(e.to_string()))
}

pub fn observations_from_frame(df: &DataFrame) -> Result<Vec<Observation>, FrameError> {
    let timestamps = millis_values(df, "timestamp")?;
    let symbols = str_values(df, "symbol")?;
    let prices = f64_values(df, "price_usd")?;
    let caps = f64_values(df, "market_cap_usd")?;
    let vols = f64_values(df, "vol_24h_usd")?;
    let changes = f64_values(df, "change_24h_pct")?;
    let updated = millis_values(df, "last_updated_at")?;
    let volumes = f64_values(df, "volume")?;

    (0..df.height())
        .map(|i| {
            Ok(Observation {
                timestamp: instant_at(&timestamps, "timestamp", i)?,
                symbol: required(&symbols, "symbol", i)?,
                price_usd: required(&prices, "price_usd", i)?,
                market_cap_usd: caps[i].unwrap_or(0.0),
                vol_24h_usd: vols[i].unwrap_or(0.0),
                change_24h_pct: changes[i].unwrap_or(0.0),
                last_updated_at: instant_at(&updated, "last_updated_at", i)?,
                volume: volumes[i].unwrap_or(0.0),
            })
        })
        .collect()
}

pub fn ohlc_from_frame(df: &DataFrame) -> Result<Vec<OhlcRow>, FrameError> {
    let symbols = str_values(df, "symbol")?;
    let timestamps = millis_values(df, "timestamp")?;
    let opens = f64_values(df, "open")?;
    let highs = f64_values(df, "high")?;
    let lows = f64_values(df, "low")?;
    let closes = f64_values(df, "close")?;

    (0..df.height())
        .map(|i| {
            Ok(OhlcRow {
                symbol: required(&symbols, "symbol", i)?,
                timestamp: instant_at(&timestamps, "timestamp", i)?,
                open: required(&opens, "open", i)?,
                high: required(&highs, "high", i)?,
                low: required(&lows, "low", i)?,
                close: required(&closes, "close", i)?,
            })
        })
        .collect()
}

// ── Column readers ──────────────────────────────────────────────────

fn series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series, FrameError> {
    df.column(name)
        .map(|c| c.as_materialized_series())
        .map_err(|e| FrameError::Column {
            column: name.to_string(),
            reason: e.to_string(),
        })
}

fn column_error(name: &str) -> impl Fn(PolarsError) -> FrameError + '_ {
    move |e| FrameError::Column {
        column: name.to_string(),
        reason: e.to_string(),
    }
}

/// Integer or datetime column read as epoch milliseconds.
pub(crate) fn millis_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, FrameError> {
    let physical = series(df, name)?
        .cast(&DataType::Int64)
        .map_err(column_error(name))?;
    let ca = physical.i64().map_err(column_error(name))?;
    Ok(ca.iter().collect())
}

pub(crate) fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, FrameError> {
    let ca = series(df, name)?.f64().map_err(column_error(name))?;
    Ok(ca.iter().collect())
}

pub(crate) fn str_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, FrameError> {
    let ca = series(df, name)?.str().map_err(column_error(name))?;
    Ok(ca.iter().map(|v| v.map(str::to_string)).collect())
}

fn required<T: Clone>(values: &[Option<T>], column: &str, row: usize) -> Result<T, FrameError> {
    values[row].clone().ok_or_else(|| FrameError::BadValue {
        column: column.to_string(),
        row,
    })
}

fn instant_at(values: &[Option<i64>], column: &str, row: usize) -> Result<DateTime<Utc>, FrameError> {
    let ms = required(values, column, row)?;
    DateTime::from_timestamp_millis(ms).ok_or_else(|| FrameError::BadValue {
        column: column.to_string(),
        row,
    })
}
