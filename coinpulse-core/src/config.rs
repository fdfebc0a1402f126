//! TOML pipeline configuration.
//!
//! Every field has a default, so an empty file (or no file) yields the
//! stock twenty-asset hourly pipeline writing to a local Parquet store.

use crate::data::CoinGeckoClient;
use crate::domain::{BucketWidth, TableId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub upstream: UpstreamConfig,
    pub store: StoreConfig,
    pub resample: ResampleConfig,
    pub volume: VolumeConfig,
}

/// Upstream quote API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Asset ids, requested in this order.
    pub assets: Vec<String>,
    /// Request timeout. Unset keeps the HTTP client default.
    pub timeout_secs: Option<u64>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: CoinGeckoClient::DEFAULT_BASE_URL.to_string(),
            assets: default_assets(),
            timeout_secs: None,
        }
    }
}

/// The twenty assets tracked out of the box.
pub fn default_assets() -> Vec<String> {
    [
        "bitcoin",
        "ethereum",
        "tether",
        "binancecoin",
        "solana",
        "usd-coin",
        "ripple",
        "toncoin",
        "dogecoin",
        "cardano",
        "avalanche-2",
        "shiba-inu",
        "wrapped-bitcoin",
        "polkadot",
        "tron",
        "chainlink",
        "uniswap",
        "litecoin",
        "polygon",
        "internet-computer",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Which store backend receives the rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Parquet,
    BigQuery,
}

/// Store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Root directory of the Parquet backend.
    pub root: PathBuf,
    /// Project owning the datasets (BigQuery backend only).
    pub project: Option<String>,
    /// insertAll API endpoint (BigQuery backend only).
    pub endpoint: Option<String>,
    pub observations_table: TableId,
    pub ohlc_table: TableId,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Parquet,
            root: PathBuf::from("data"),
            project: None,
            endpoint: None,
            observations_table: TableId::from_parts("crypto_data", "crypto_prices"),
            ohlc_table: TableId::from_parts("crypto_data", "crypto_ohlc_hourly"),
        }
    }
}

/// Resampling settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResampleConfig {
    pub bucket: BucketWidth,
}

/// Filler volume settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumeConfig {
    /// Master seed for reproducible filler; unset draws from entropy.
    pub seed: Option<u64>,
}

impl PipelineConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.assets.is_empty() {
            return Err(ConfigError::Invalid("upstream.assets must not be empty".into()));
        }
        if let Some(bad) = self
            .upstream
            .assets
            .iter()
            .find(|a| a.trim().is_empty() || a.contains(','))
        {
            return Err(ConfigError::Invalid(format!("invalid asset id '{bad}'")));
        }
        for (i, asset) in self.upstream.assets.iter().enumerate() {
            if self.upstream.assets[..i].contains(asset) {
                return Err(ConfigError::Invalid(format!("duplicate asset id '{asset}'")));
            }
        }
        if self.upstream.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("upstream.timeout_secs must be positive".into()));
        }
        if self.store.observations_table == self.store.ohlc_table {
            return Err(ConfigError::Invalid(
                "observations and OHLC tables must differ".into(),
            ));
        }
        if self.store.backend == StoreBackend::BigQuery && self.store.project.is_none() {
            return Err(ConfigError::Invalid(
                "store.project is required for the big_query backend".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.upstream.assets.len(), 20);
        assert_eq!(config.upstream.assets[0], "bitcoin");
        assert_eq!(config.store.observations_table.to_string(), "crypto_data.crypto_prices");
        assert_eq!(config.store.ohlc_table.to_string(), "crypto_data.crypto_ohlc_hourly");
        assert_eq!(config.resample.bucket, BucketWidth::hourly());
        assert_eq!(config.volume.seed, None);
    }

    #[test]
    fn default_tables_are_valid_ids() {
        let store = StoreConfig::default();
        for id in [&store.observations_table, &store.ohlc_table] {
            assert_eq!(&id.to_string().parse::<TableId>().unwrap(), id);
        }
    }

    #[test]
    fn parses_full_config() {
        let config = PipelineConfig::from_toml(
            r#"
[upstream]
base_url = "http://localhost:9000/api/v3"
assets = ["bitcoin", "ethereum"]
timeout_secs = 10

[store]
backend = "big_query"
project = "crypto-pipeline"
observations_table = "raw.prices"
ohlc_table = "agg.ohlc_15m"

[resample]
bucket = "15m"

[volume]
seed = 42
"#,
        )
        .unwrap();

        assert_eq!(config.upstream.assets, vec!["bitcoin", "ethereum"]);
        assert_eq!(config.upstream.timeout_secs, Some(10));
        assert_eq!(config.store.backend, StoreBackend::BigQuery);
        assert_eq!(config.store.ohlc_table.dataset(), "agg");
        assert_eq!(config.resample.bucket.as_millis(), 15 * 60 * 1000);
        assert_eq!(config.volume.seed, Some(42));
    }

    #[test]
    fn rejects_bad_bucket() {
        let err = PipelineConfig::from_toml("[resample]\nbucket = \"0h\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_bad_table_id() {
        let err = PipelineConfig::from_toml("[store]\nohlc_table = \"nodataset\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(PipelineConfig::from_toml("[upstream]\nretries = 3").is_err());
    }

    #[test]
    fn rejects_empty_and_duplicate_assets() {
        assert!(matches!(
            PipelineConfig::from_toml("[upstream]\nassets = []"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PipelineConfig::from_toml("[upstream]\nassets = [\"bitcoin\", \"bitcoin\"]"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PipelineConfig::from_toml("[upstream]\nassets = [\"a,b\"]"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn big_query_requires_project() {
        let err = PipelineConfig::from_toml("[store]\nbackend = \"big_query\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn same_table_twice_is_rejected() {
        let err = PipelineConfig::from_toml(
            "[store]\nobservations_table = \"a.b\"\nohlc_table = \"a.b\"",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = PipelineConfig::from_file(Path::new("/nonexistent/coinpulse.toml")).unwrap_err();
        match err {
            ConfigError::Read { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/coinpulse.toml"))
            }
            other => panic!("expected read error, got {other:?}"),
        }
    }
}
