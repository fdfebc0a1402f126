//! BigQuery streaming-insert store (`tabledata.insertAll`).
//!
//! The HTTP client and the bearer token are handed in; minting credentials is
//! the caller's business. Each row carries an `insertId` derived from its
//! content so BigQuery's best-effort dedup absorbs an identical re-send.

use super::{RowError, StoreError, TableStore};
use crate::domain::{Observation, OhlcRow, TableId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

const EXCERPT_LEN: usize = 200;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertErrors>,
}

#[derive(Debug, Deserialize)]
struct InsertErrors {
    index: usize,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Streaming-insert client for one BigQuery project.
pub struct BigQueryStore {
    client: reqwest::blocking::Client,
    endpoint: String,
    project: String,
    access_token: String,
}

impl BigQueryStore {
    pub const DEFAULT_ENDPOINT: &'static str = "https://bigquery.googleapis.com/bigquery/v2";

    pub fn new(
        client: reqwest::blocking::Client,
        project: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            project: project.into(),
            access_token: access_token.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn insert_all_url(&self, table: &TableId) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables/{}/insertAll",
            self.endpoint,
            self.project,
            table.dataset(),
            table.table()
        )
    }

    /// Request body with one `{insertId, json}` entry per row.
    fn request_body<T: Serialize>(table: &TableId, rows: &[T]) -> Result<Value, StoreError> {
        let rows = rows
            .iter()
            .map(|row| {
                let json = serde_json::to_value(row)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                let mut hasher = blake3::Hasher::new();
                hasher.update(table.to_string().as_bytes());
                hasher.update(json.to_string().as_bytes());
                let insert_id = hasher.finalize().to_hex()[..32].to_string();
                Ok(json!({ "insertId": insert_id, "json": json }))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(json!({
            "kind": "bigquery#tableDataInsertAllRequest",
            "rows": rows,
        }))
    }

    /// Map an insertAll response body to per-row errors.
    fn parse_response(body: &str) -> Result<Vec<RowError>, StoreError> {
        let resp: InsertAllResponse = serde_json::from_str(body)
            .map_err(|e| StoreError::Serialization(format!("insertAll response: {e}")))?;
        Ok(resp
            .insert_errors
            .into_iter()
            .map(|entry| {
                let reason = entry
                    .errors
                    .iter()
                    .map(|e| {
                        format!(
                            "{}: {}",
                            e.reason.as_deref().unwrap_or("unknown"),
                            e.message.as_deref().unwrap_or("")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                RowError::row(entry.index, reason)
            })
            .collect())
    }

    fn insert<T: Serialize>(&self, table: &TableId, rows: &[T]) -> Result<Vec<RowError>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.insert_all_url(table);
        let body = Self::request_body(table, rows)?;
        debug!(%url, rows = rows.len(), "insertAll");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .map_err(|e| StoreError::Request(format!("reading body: {e}")))?;
        Self::settle_response(status, &text)
    }

    /// Non-2xx statuses fail the whole request; 2xx bodies carry per-row errors.
    fn settle_response(status: u16, body: &str) -> Result<Vec<RowError>, StoreError> {
        if !(200..300).contains(&status) {
            return Err(StoreError::HttpStatus {
                status,
                excerpt: body.chars().take(EXCERPT_LEN).collect(),
            });
        }
        Self::parse_response(body)
    }
}

/// Collapse a request-level failure into one batch-wide row error.
fn into_row_errors(result: Result<Vec<RowError>, StoreError>) -> Vec<RowError> {
    result.unwrap_or_else(|e| vec![RowError::from(e)])
}

impl TableStore for BigQueryStore {
    fn name(&self) -> &str {
        "bigquery"
    }

    fn append_observations(&self, table: &TableId, rows: &[Observation]) -> Vec<RowError> {
        into_row_errors(self.insert(table, rows))
    }

    fn append_ohlc(&self, table: &TableId, rows: &[OhlcRow]) -> Vec<RowError> {
        into_row_errors(self.insert(table, rows))
    }
}
