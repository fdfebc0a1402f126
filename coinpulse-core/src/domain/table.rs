//! Fully-qualified table identifiers (`dataset.table`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TableIdError {
    #[error("table id '{0}' must have the form dataset.table")]
    Malformed(String),

    #[error("table id '{0}' contains an invalid character")]
    InvalidCharacter(String),
}

/// A table inside a dataset of the analytic store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableId {
    dataset: String,
    table: String,
}

impl TableId {
    pub fn new(dataset: &str, table: &str) -> Result<Self, TableIdError> {
        format!("{dataset}.{table}").parse()
    }

    /// Build from components known to be valid, such as built-in defaults.
    pub(crate) fn from_parts(dataset: &'static str, table: &'static str) -> Self {
        debug_assert!(valid_component(dataset) && !dataset.is_empty());
        debug_assert!(valid_component(table) && !table.is_empty());
        Self {
            dataset: dataset.to_string(),
            table: table.to_string(),
        }
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

fn valid_component(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl FromStr for TableId {
    type Err = TableIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let (Some(dataset), Some(table), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(TableIdError::Malformed(s.to_string()));
        };
        if dataset.is_empty() || table.is_empty() {
            return Err(TableIdError::Malformed(s.to_string()));
        }
        if !valid_component(dataset) || !valid_component(table) {
            return Err(TableIdError::InvalidCharacter(s.to_string()));
        }
        Ok(Self {
            dataset: dataset.to_string(),
            table: table.to_string(),
        })
    }
}

impl TryFrom<String> for TableId {
    type Error = TableIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TableId> for String {
    fn from(id: TableId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}
