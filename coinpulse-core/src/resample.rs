//! OHLC resampling of observation rows.
//!
//! Rows are materialized as a table indexed by fetch timestamp, tagged with
//! the start of their absolute-time-aligned bucket, and aggregated per
//! `(symbol, bucket)`: first, max, min and last `price_usd`. Buckets without
//! observations never appear in the output.

use crate::domain::{BucketWidth, Observation, OhlcRow};
use crate::frame::{self, FrameError};
use polars::prelude::*;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("resample table: {0}")]
    Frame(#[from] FrameError),

    #[error("resample aggregation: {0}")]
    Aggregation(String),
}

/// Resamples observations into fixed-width OHLC buckets.
#[derive(Debug, Clone, Copy)]
pub struct Resampler {
    width: BucketWidth,
}

impl Resampler {
    pub fn new(width: BucketWidth) -> Self {
        Self { width }
    }

    pub fn width(&self) -> BucketWidth {
        self.width
    }

    /// Aggregate `rows` into OHLC rows.
    ///
    /// Output is grouped by symbol, in order of each symbol's earliest
    /// observation, with buckets ascending within a symbol. Identical input
    /// always yields identical output.
    pub fn resample(&self, rows: &[Observation]) -> Result<Vec<OhlcRow>, ResampleError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let buckets: Vec<i64> = rows
            .iter()
            .map(|r| self.width.bucket_start_millis(r.timestamp.timestamp_millis()))
            .collect();
        let mut table = frame::observations_to_frame(rows)?;
        table
            .with_column(Column::new("bucket".into(), buckets))
            .map_err(|e| ResampleError::Aggregation(format!("bucket column: {e}")))?;

        let aggregated = table
            .lazy()
            .sort(
                ["timestamp"],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .group_by_stable([col("symbol"), col("bucket")])
            .agg([
                col("price_usd").first().alias("open"),
                col("price_usd").max().alias("high"),
                col("price_usd").min().alias("low"),
                col("price_usd").last().alias("close"),
            ])
            .with_column(col("bucket").alias("timestamp"))
            .collect()
            .map_err(|e| ResampleError::Aggregation(e.to_string()))?;

        let mut out = frame::ohlc_from_frame(&aggregated)?;

        // Symbol-major order: rank symbols by their earliest observation.
        let mut by_time: Vec<&Observation> = rows.iter().collect();
        by_time.sort_by_key(|r| r.timestamp);
        let mut rank: HashMap<&str, usize> = HashMap::new();
        for row in by_time {
            let next = rank.len();
            rank.entry(row.symbol.as_str()).or_insert(next);
        }
        out.sort_by_key(|r| (rank.get(r.symbol.as_str()).copied(), r.timestamp));

        debug!(
            observations = rows.len(),
            buckets = out.len(),
            width = %self.width,
            "resampled observations"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, h, m, s).unwrap()
    }

    fn obs(symbol: &str, ts: DateTime<Utc>, price: f64) -> Observation {
        Observation {
            timestamp: ts,
            symbol: symbol.into(),
            price_usd: price,
            market_cap_usd: 0.0,
            vol_24h_usd: 0.0,
            change_24h_pct: 0.0,
            last_updated_at: ts,
            volume: 1_000.0,
        }
    }

    fn hourly() -> Resampler {
        Resampler::new(BucketWidth::hourly())
    }

    #[test]
    fn eth_three_points_one_bucket() {
        let rows = vec![
            obs("ETH", at(10, 5, 0), 100.0),
            obs("ETH", at(10, 20, 0), 105.0),
            obs("ETH", at(10, 40, 0), 98.0),
        ];
        let out = hourly().resample(&rows).unwrap();

        assert_eq!(out.len(), 1);
        let bar = &out[0];
        assert_eq!(bar.symbol, "ETH");
        assert_eq!(bar.timestamp, at(10, 0, 0));
        assert_eq!((bar.open, bar.high, bar.low, bar.close), (100.0, 105.0, 98.0, 98.0));
    }

    #[test]
    fn rows_out_of_time_order_are_sorted_first() {
        let rows = vec![
            obs("ETH", at(10, 40, 0), 98.0),
            obs("ETH", at(10, 5, 0), 100.0),
            obs("ETH", at(10, 20, 0), 105.0),
        ];
        let bar = &hourly().resample(&rows).unwrap()[0];
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.close, 98.0);
    }

    #[test]
    fn single_observation_degenerates() {
        let out = hourly().resample(&[obs("BTC", at(3, 59, 59), 42.0)]).unwrap();
        assert_eq!(out.len(), 1);
        let bar = &out[0];
        assert_eq!((bar.open, bar.high, bar.low, bar.close), (42.0, 42.0, 42.0, 42.0));
        assert!(bar.is_sane());
    }

    #[test]
    fn empty_buckets_are_dropped() {
        let rows = vec![obs("BTC", at(1, 10, 0), 1.0), obs("BTC", at(4, 10, 0), 2.0)];
        let out = hourly().resample(&rows).unwrap();
        let starts: Vec<_> = out.iter().map(|b| b.timestamp).collect();
        assert_eq!(starts, vec![at(1, 0, 0), at(4, 0, 0)]);
    }

    #[test]
    fn buckets_align_to_absolute_time() {
        let width = BucketWidth::from_millis(15 * 60 * 1000).unwrap();
        let rows = vec![obs("BTC", at(9, 14, 59), 1.0), obs("BTC", at(9, 15, 0), 2.0)];
        let out = Resampler::new(width).resample(&rows).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].timestamp, at(9, 0, 0));
        assert_eq!(out[1].timestamp, at(9, 15, 0));
    }

    #[test]
    fn groups_by_symbol_in_first_seen_order() {
        let t = at(12, 0, 0);
        let rows = vec![
            obs("SOL", t, 60.0),
            obs("BTC", t, 50_000.0),
            obs("SOL", t + Duration::hours(1), 61.0),
            obs("BTC", t + Duration::hours(1), 50_100.0),
        ];
        let out = hourly().resample(&rows).unwrap();
        let keys: Vec<_> = out.iter().map(|b| (b.symbol.as_str(), b.timestamp)).collect();
        assert_eq!(
            keys,
            vec![
                ("SOL", t),
                ("SOL", t + Duration::hours(1)),
                ("BTC", t),
                ("BTC", t + Duration::hours(1)),
            ]
        );
    }

    #[test]
    fn same_timestamp_batch_keeps_input_order_for_open_close() {
        let t = at(8, 30, 0);
        let rows = vec![obs("X", t, 3.0), obs("X", t, 1.0), obs("X", t, 2.0)];
        let bar = &hourly().resample(&rows).unwrap()[0];
        assert_eq!(bar.open, 3.0);
        assert_eq!(bar.close, 2.0);
        assert_eq!(bar.high, 3.0);
        assert_eq!(bar.low, 1.0);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(hourly().resample(&[]).unwrap().is_empty());
    }
}
