//! Domain types: observation and OHLC rows, table ids, bucket widths.

pub mod bucket;
pub mod observation;
pub mod ohlc;
pub mod table;

pub use bucket::{BucketWidth, BucketWidthError};
pub use observation::{batch_instant, Observation};
pub use ohlc::OhlcRow;
pub use table::{TableId, TableIdError};
