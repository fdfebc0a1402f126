//! Upstream quotes: fetching and normalization into observation rows.

pub mod coingecko;
pub mod normalize;
pub mod provider;
pub mod schema;

pub use coingecko::CoinGeckoClient;
pub use normalize::{normalize, NormalizedBatch, RowFormatError};
pub use provider::{FetchError, QuoteSnapshot, QuoteSource, RawQuote};
pub use schema::{ObservationSchema, OhlcSchema, SchemaError};
