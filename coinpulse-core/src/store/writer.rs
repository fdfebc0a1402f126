//! Store writers: empty batches never reach the store, rejections are logged
//! and reported, never raised.

use super::{RowError, TableStore};
use crate::domain::{Observation, OhlcRow, TableId};
use tracing::{error, info};

/// What happened to one bulk append.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// No rows, no store call.
    Skipped,
    /// The store accepted every row.
    Written { rows: usize },
    /// The store reported errors for some or all rows.
    Rejected { rows: usize, errors: Vec<RowError> },
}

impl WriteOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Append observation rows to `table`.
pub fn write_observations(
    store: &dyn TableStore,
    table: &TableId,
    rows: &[Observation],
) -> WriteOutcome {
    if rows.is_empty() {
        info!(%table, "no observation rows, skipping append");
        return WriteOutcome::Skipped;
    }
    let errors = store.append_observations(table, rows);
    settle(store, table, rows.len(), errors)
}

/// Append OHLC rows to `table`.
pub fn write_ohlc(store: &dyn TableStore, table: &TableId, rows: &[OhlcRow]) -> WriteOutcome {
    if rows.is_empty() {
        info!(%table, "no OHLC rows, skipping append");
        return WriteOutcome::Skipped;
    }
    let errors = store.append_ohlc(table, rows);
    settle(store, table, rows.len(), errors)
}

fn settle(store: &dyn TableStore, table: &TableId, rows: usize, errors: Vec<RowError>) -> WriteOutcome {
    if errors.is_empty() {
        info!(%table, rows, store = store.name(), "rows inserted");
        return WriteOutcome::Written { rows };
    }
    for e in &errors {
        error!(%table, store = store.name(), error = %e, "insert error");
    }
    error!(
        %table,
        rows,
        rejected = errors.len(),
        "append reported errors; continuing with in-memory rows"
    );
    WriteOutcome::Rejected { rows, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingStore {
        calls: AtomicUsize,
        reject: bool,
    }

    impl TableStore for CountingStore {
        fn name(&self) -> &str {
            "counting"
        }

        fn append_observations(&self, _table: &TableId, rows: &[Observation]) -> Vec<RowError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                vec![RowError::row(rows.len() - 1, "rejected")]
            } else {
                Vec::new()
            }
        }

        fn append_ohlc(&self, _table: &TableId, _rows: &[OhlcRow]) -> Vec<RowError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        }
    }

    fn table() -> TableId {
        "crypto_data.crypto_prices".parse().unwrap()
    }

    fn row() -> Observation {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Observation {
            timestamp: ts,
            symbol: "BITCOIN".into(),
            price_usd: 1.0,
            market_cap_usd: 0.0,
            vol_24h_usd: 0.0,
            change_24h_pct: 0.0,
            last_updated_at: ts,
            volume: 1_000.0,
        }
    }

    #[test]
    fn empty_observations_make_no_call() {
        let store = CountingStore::default();
        assert_eq!(write_observations(&store, &table(), &[]), WriteOutcome::Skipped);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_ohlc_make_no_call() {
        let store = CountingStore::default();
        assert_eq!(write_ohlc(&store, &table(), &[]), WriteOutcome::Skipped);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn accepted_rows_are_written() {
        let store = CountingStore::default();
        let outcome = write_observations(&store, &table(), &[row(), row()]);
        assert_eq!(outcome, WriteOutcome::Written { rows: 2 });
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejected_rows_are_reported_not_raised() {
        let store = CountingStore {
            reject: true,
            ..Default::default()
        };
        let outcome = write_observations(&store, &table(), &[row(), row()]);
        assert!(outcome.is_rejected());
        match outcome {
            WriteOutcome::Rejected { rows, errors } => {
                assert_eq!(rows, 2);
                assert_eq!(errors, vec![RowError::row(1, "rejected")]);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
