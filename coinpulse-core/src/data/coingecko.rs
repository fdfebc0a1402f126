//! CoinGecko "simple price" quote source.
//!
//! One GET per run for the whole asset list. No retries: a failed fetch fails
//! the run and the external scheduler decides whether to try again.

use super::provider::{FetchError, QuoteSnapshot, QuoteSource};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Longest slice of an error body carried into a [`FetchError`].
const EXCERPT_LEN: usize = 200;

/// CoinGecko quote source over an injected blocking HTTP client.
pub struct CoinGeckoClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl CoinGeckoClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.coingecko.com/api/v3";

    pub fn new(client: reqwest::blocking::Client) -> Self {
        Self {
            client,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn price_url(&self) -> String {
        format!("{}/simple/price", self.base_url)
    }

    /// Query parameters for the simple price endpoint.
    fn query(asset_ids: &[String]) -> [(&'static str, String); 6] {
        [
            ("ids", asset_ids.join(",")),
            ("vs_currencies", "usd".to_string()),
            ("include_market_cap", "true".to_string()),
            ("include_24hr_vol", "true".to_string()),
            ("include_24hr_change", "true".to_string()),
            ("include_last_updated_at", "true".to_string()),
        ]
    }

    /// Parse a response body into a snapshot ordered like `requested`.
    ///
    /// Ids upstream returned without being asked for are appended after the
    /// requested ones, in lexical order.
    pub fn parse_body(requested: &[String], body: &str) -> Result<QuoteSnapshot, FetchError> {
        let mut map: Map<String, Value> = serde_json::from_str(body)
            .map_err(|e| FetchError::MalformedBody(format!("expected a JSON object: {e}")))?;

        let mut snapshot = QuoteSnapshot::new();
        for id in requested {
            if let Some(record) = map.remove(id) {
                snapshot.push(id.clone(), record);
            }
        }
        for (id, record) in map {
            snapshot.push(id, record);
        }
        Ok(snapshot)
    }

    /// Non-2xx statuses become [`FetchError::HttpStatus`]; 2xx bodies are parsed.
    fn parse_response(
        requested: &[String],
        status: u16,
        body: &str,
    ) -> Result<QuoteSnapshot, FetchError> {
        if !(200..300).contains(&status) {
            return Err(FetchError::HttpStatus {
                status,
                excerpt: excerpt(body),
            });
        }
        Self::parse_body(requested, body)
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(EXCERPT_LEN).collect()
}

impl QuoteSource for CoinGeckoClient {
    fn name(&self) -> &str {
        "coingecko"
    }

    fn fetch(&self, asset_ids: &[String]) -> Result<QuoteSnapshot, FetchError> {
        let url = self.price_url();
        debug!(%url, assets = asset_ids.len(), "requesting quotes");

        let resp = self
            .client
            .get(&url)
            .query(&Self::query(asset_ids))
            .send()
            .map_err(|e| FetchError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|e| FetchError::NetworkUnreachable(format!("reading body: {e}")))?;

        let snapshot = Self::parse_response(asset_ids, status, &body)?;
        info!(coins = ?snapshot.asset_ids(), "coins received");
        let missing = snapshot.missing(asset_ids);
        if !missing.is_empty() {
            warn!(?missing, "upstream omitted requested assets");
        }
        Ok(snapshot)
    }
}
