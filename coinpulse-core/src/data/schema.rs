//! Polars column layouts for the observations and OHLC tables.

use polars::prelude::*;

fn datetime_ms() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

/// Column layout of the raw observations table
pub struct ObservationSchema;

impl ObservationSchema {
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("timestamp".into(), datetime_ms()),
            Field::new("symbol".into(), DataType::String),
            Field::new("price_usd".into(), DataType::Float64),
            Field::new("market_cap_usd".into(), DataType::Float64),
            Field::new("vol_24h_usd".into(), DataType::Float64),
            Field::new("change_24h_pct".into(), DataType::Float64),
            Field::new("last_updated_at".into(), datetime_ms()),
            Field::new("volume".into(), DataType::Float64),
        ])
    }

    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        validate_against(&Self::schema(), df)
    }
}

/// Column layout of the OHLC aggregates table
pub struct OhlcSchema;

impl OhlcSchema {
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("symbol".into(), DataType::String),
            Field::new("timestamp".into(), datetime_ms()),
            Field::new("open".into(), DataType::Float64),
            Field::new("high".into(), DataType::Float64),
            Field::new("low".into(), DataType::Float64),
            Field::new("close".into(), DataType::Float64),
        ])
    }

    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        validate_against(&Self::schema(), df)
    }
}

fn validate_against(expected: &Schema, df: &DataFrame) -> Result<(), SchemaError> {
    let actual = df.schema();

    for field in expected.iter_fields() {
        if !actual.contains(field.name()) {
            return Err(SchemaError::MissingColumn(field.name().to_string()));
        }
    }

    for field in expected.iter_fields() {
        let actual_dtype = actual
            .get(field.name())
            .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
        if actual_dtype != field.dtype() {
            return Err(SchemaError::TypeMismatch {
                column: field.name().to_string(),
                expected: field.dtype().clone(),
                actual: actual_dtype.clone(),
            });
        }
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}
