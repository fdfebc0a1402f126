//! CoinPulse Core: quote ingestion, normalization, OHLC resampling, table stores.
//!
//! One pipeline run:
//! - Fetch a price snapshot for the tracked assets from the upstream API
//! - Normalize it into observation rows sharing one batch timestamp
//! - Append the rows to the raw observations table
//! - Resample them into fixed-width OHLC buckets
//! - Append the OHLC rows to the aggregate table

pub mod config;
pub mod data;
pub mod domain;
pub mod frame;
pub mod pipeline;
pub mod resample;
pub mod rng;
pub mod store;
