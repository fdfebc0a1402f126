//! Local Parquet table store with Hive-style date partitioning.
//!
//! Layout: `{root}/{dataset}/{table}/date={YYYY-MM-DD}/part-{written_ms}-{hash8}.parquet`
//!
//! - Append-only: every append creates new part files, nothing is rewritten
//! - Atomic writes (write to .tmp, rename into place)
//! - Rows failing row-level invariants are rejected individually; the rest land
//! - Metadata sidecar per part file (row count, BLAKE3 hash, time range)
//! - Unreadable part files are skipped on scan with a warning

use super::{RowError, StoreError, TableStore};
use crate::data::{ObservationSchema, OhlcSchema};
use crate::domain::{Observation, OhlcRow, TableId};
use crate::frame::{self, FrameError};
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Metadata sidecar for one part file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartMeta {
    pub table: String,
    pub rows: usize,
    pub data_hash: String,
    pub min_timestamp: DateTime<Utc>,
    pub max_timestamp: DateTime<Utc>,
    pub written_at: DateTime<Utc>,
}

/// The Parquet store.
pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{dataset}/{table}/`
    fn table_dir(&self, table: &TableId) -> PathBuf {
        self.root.join(table.dataset()).join(table.table())
    }

    /// `{root}/{dataset}/{table}/date={YYYY-MM-DD}/`
    fn partition_dir(&self, table: &TableId, date: NaiveDate) -> PathBuf {
        self.table_dir(table)
            .join(format!("date={}", date.format("%Y-%m-%d")))
    }

    /// Observations with `timestamp >= cutoff`, ordered by timestamp then symbol.
    pub fn scan_observations(
        &self,
        table: &TableId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Observation>, StoreError> {
        let mut rows = Vec::new();
        for path in self.part_files(table, cutoff.date_naive())? {
            match read_part(&path, |df| {
                ObservationSchema::validate(df).map_err(|e| e.to_string())?;
                frame::observations_from_frame(df).map_err(|e| e.to_string())
            }) {
                Ok(part) => rows.extend(part.into_iter().filter(|r| r.timestamp >= cutoff)),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable part file"),
            }
        }
        rows.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        Ok(rows)
    }

    /// OHLC rows whose bucket starts at or after `cutoff`, ordered by bucket then symbol.
    pub fn scan_ohlc(
        &self,
        table: &TableId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OhlcRow>, StoreError> {
        let mut rows = Vec::new();
        for path in self.part_files(table, cutoff.date_naive())? {
            match read_part(&path, |df| {
                OhlcSchema::validate(df).map_err(|e| e.to_string())?;
                frame::ohlc_from_frame(df).map_err(|e| e.to_string())
            }) {
                Ok(part) => rows.extend(part.into_iter().filter(|r| r.timestamp >= cutoff)),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable part file"),
            }
        }
        rows.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        Ok(rows)
    }

    /// Read the sidecar written next to a part file.
    pub fn part_meta(part: &Path) -> Option<PartMeta> {
        let content = fs::read_to_string(part.with_extension("meta.json")).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Part files in partitions dated on or after `from`, in path order.
    fn part_files(&self, table: &TableId, from: NaiveDate) -> Result<Vec<PathBuf>, StoreError> {
        let table_dir = self.table_dir(table);
        if !table_dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let partitions =
            fs::read_dir(&table_dir).map_err(|e| StoreError::Io(format!("read dir: {e}")))?;
        for partition in partitions {
            let partition = partition.map_err(|e| StoreError::Io(format!("dir entry: {e}")))?;
            let name = partition.file_name().to_string_lossy().to_string();
            let Some(date) = name
                .strip_prefix("date=")
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            else {
                continue;
            };
            if date < from {
                continue;
            }

            let entries = fs::read_dir(partition.path())
                .map_err(|e| StoreError::Io(format!("read partition: {e}")))?;
            for entry in entries {
                let path = entry
                    .map_err(|e| StoreError::Io(format!("dir entry: {e}")))?
                    .path();
                // Skip sidecars and in-flight .tmp files
                if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Write `rows` grouped by the UTC date of `timestamp_of`, one part file per date.
    ///
    /// Returns row errors for every row of a partition that failed to land.
    fn append_partitioned<T: Clone + Serialize>(
        &self,
        table: &TableId,
        rows: Vec<(usize, T)>,
        timestamp_of: impl Fn(&T) -> DateTime<Utc>,
        to_frame: impl Fn(&[T]) -> Result<DataFrame, FrameError>,
    ) -> Vec<RowError> {
        let mut by_date: BTreeMap<NaiveDate, Vec<(usize, T)>> = BTreeMap::new();
        for (index, row) in rows {
            by_date
                .entry(timestamp_of(&row).date_naive())
                .or_default()
                .push((index, row));
        }

        let mut errors = Vec::new();
        for (date, indexed) in by_date {
            let (indices, part): (Vec<usize>, Vec<T>) = indexed.into_iter().unzip();
            if let Err(e) = self.write_part(table, date, &part, &timestamp_of, &to_frame) {
                errors.extend(indices.into_iter().map(|i| RowError::row(i, e.to_string())));
            }
        }
        errors
    }

    fn write_part<T: Serialize>(
        &self,
        table: &TableId,
        date: NaiveDate,
        rows: &[T],
        timestamp_of: &impl Fn(&T) -> DateTime<Utc>,
        to_frame: &impl Fn(&[T]) -> Result<DataFrame, FrameError>,
    ) -> Result<PathBuf, StoreError> {
        let dir = self.partition_dir(table, date);
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::Io(format!("failed to create dir: {e}")))?;

        let data_hash = blake3::hash(
            &serde_json::to_vec(rows)
                .map_err(|e| StoreError::Serialization(format!("hash serialization: {e}")))?,
        )
        .to_hex()
        .to_string();
        let written_at = Utc::now();
        let stem = format!("part-{}-{}", written_at.timestamp_millis(), &data_hash[..8]);
        let mut path = dir.join(format!("{stem}.parquet"));
        let mut attempt = 1;
        while path.exists() {
            path = dir.join(format!("{stem}-{attempt}.parquet"));
            attempt += 1;
        }
        let tmp_path = path.with_extension("parquet.tmp");

        let mut df = to_frame(rows).map_err(|e| StoreError::Parquet(e.to_string()))?;
        write_parquet(&mut df, &tmp_path)?;

        // Atomic rename
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io(format!("atomic rename failed: {e}"))
        })?;

        let (min_timestamp, max_timestamp) = rows
            .iter()
            .map(timestamp_of)
            .fold((None, None), |(lo, hi), ts| {
                (
                    Some(lo.map_or(ts, |l: DateTime<Utc>| l.min(ts))),
                    Some(hi.map_or(ts, |h: DateTime<Utc>| h.max(ts))),
                )
            });
        let meta = PartMeta {
            table: table.to_string(),
            rows: rows.len(),
            data_hash,
            min_timestamp: min_timestamp.unwrap_or(written_at),
            max_timestamp: max_timestamp.unwrap_or(written_at),
            written_at,
        };
        // Rows have landed once the rename succeeds; the sidecar is advisory.
        if let Err(e) = write_sidecar(&path, &meta) {
            warn!(path = %path.display(), error = %e, "part written without metadata sidecar");
        }

        debug!(path = %path.display(), rows = rows.len(), "wrote part file");
        Ok(path)
    }
}

fn write_sidecar(part: &Path, meta: &PartMeta) -> Result<(), StoreError> {
    let meta_json = serde_json::to_string_pretty(meta)
        .map_err(|e| StoreError::Serialization(format!("meta serialization: {e}")))?;
    fs::write(part.with_extension("meta.json"), meta_json)
        .map_err(|e| StoreError::Io(format!("meta write: {e}")))
}

/// Split rows into `(original index, row)` for sane rows and errors for the rest.
fn screen<T: Clone>(
    rows: &[T],
    check: impl Fn(&T) -> Option<String>,
) -> (Vec<(usize, T)>, Vec<RowError>) {
    let mut accepted = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        match check(row) {
            None => accepted.push((i, row.clone())),
            Some(reason) => errors.push(RowError::row(i, reason)),
        }
    }
    (accepted, errors)
}

impl TableStore for ParquetStore {
    fn name(&self) -> &str {
        "parquet"
    }

    fn append_observations(&self, table: &TableId, rows: &[Observation]) -> Vec<RowError> {
        let (accepted, mut errors) = screen(rows, |r| {
            (!r.is_sane()).then(|| {
                format!(
                    "invalid observation for '{}': price_usd={}",
                    r.symbol, r.price_usd
                )
            })
        });
        errors.extend(self.append_partitioned(
            table,
            accepted,
            |r: &Observation| r.timestamp,
            frame::observations_to_frame,
        ));
        errors.sort_by_key(|e| e.index);
        errors
    }

    fn append_ohlc(&self, table: &TableId, rows: &[OhlcRow]) -> Vec<RowError> {
        let (accepted, mut errors) = screen(rows, |r| {
            (!r.is_sane()).then(|| {
                format!(
                    "invalid OHLC for '{}' at {}: o={} h={} l={} c={}",
                    r.symbol, r.timestamp, r.open, r.high, r.low, r.close
                )
            })
        });
        errors.extend(self.append_partitioned(
            table,
            accepted,
            |r: &OhlcRow| r.timestamp,
            frame::ohlc_to_frame,
        ));
        errors.sort_by_key(|e| e.index);
        errors
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), StoreError> {
    let file =
        fs::File::create(path).map_err(|e| StoreError::Parquet(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| StoreError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn read_part<T>(
    path: &Path,
    convert: impl Fn(&DataFrame) -> Result<Vec<T>, String>,
) -> Result<Vec<T>, String> {
    let file = fs::File::open(path).map_err(|e| format!("open: {e}"))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| format!("read: {e}"))?;
    convert(&df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn observations_table() -> TableId {
        "crypto_data.crypto_prices".parse().unwrap()
    }

    fn ohlc_table() -> TableId {
        "crypto_data.crypto_ohlc_hourly".parse().unwrap()
    }

    fn obs(symbol: &str, ts: DateTime<Utc>, price: f64) -> Observation {
        Observation {
            timestamp: ts,
            symbol: symbol.into(),
            price_usd: price,
            market_cap_usd: 1.0,
            vol_24h_usd: 2.0,
            change_24h_pct: 3.0,
            last_updated_at: ts - Duration::seconds(30),
            volume: 1_234.5,
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn append_and_scan_observations() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let rows = vec![obs("BITCOIN", noon(), 50_000.0), obs("ETHEREUM", noon(), 3_000.0)];

        let errors = store.append_observations(&observations_table(), &rows);
        assert!(errors.is_empty(), "{errors:?}");

        let loaded = store
            .scan_observations(&observations_table(), noon() - Duration::hours(1))
            .unwrap();
        assert_eq!(loaded, rows);
    }

    #[test]
    fn appends_accumulate_and_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let table = observations_table();

        store.append_observations(&table, &[obs("BITCOIN", noon(), 1.0)]);
        store.append_observations(&table, &[obs("BITCOIN", noon() + Duration::hours(1), 2.0)]);

        let loaded = store.scan_observations(&table, noon()).unwrap();
        let prices: Vec<f64> = loaded.iter().map(|r| r.price_usd).collect();
        assert_eq!(prices, vec![1.0, 2.0]);
    }

    #[test]
    fn scan_respects_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let table = observations_table();
        let yesterday = noon() - Duration::days(1);

        store.append_observations(&table, &[obs("BITCOIN", yesterday, 1.0)]);
        store.append_observations(&table, &[obs("BITCOIN", noon(), 2.0)]);

        let recent = store.scan_observations(&table, noon() - Duration::minutes(30)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].price_usd, 2.0);

        let all = store.scan_observations(&table, yesterday).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn partitions_by_utc_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        store.append_observations(&observations_table(), &[obs("BITCOIN", noon(), 1.0)]);

        let partition = dir
            .path()
            .join("crypto_data/crypto_prices/date=2024-06-01");
        let parts: Vec<_> = fs::read_dir(&partition)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("parquet"))
            .collect();
        assert_eq!(parts.len(), 1);

        let meta = ParquetStore::part_meta(&parts[0]).unwrap();
        assert_eq!(meta.rows, 1);
        assert_eq!(meta.table, "crypto_data.crypto_prices");
        assert_eq!(meta.min_timestamp, noon());
    }

    #[test]
    fn sidecar_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("part-1-abcdef12.parquet");
        // A directory squatting on the sidecar path makes the write fail
        fs::create_dir(part.with_extension("meta.json")).unwrap();
        let meta = PartMeta {
            table: "crypto_data.crypto_prices".into(),
            rows: 1,
            data_hash: "abcdef12".into(),
            min_timestamp: noon(),
            max_timestamp: noon(),
            written_at: noon(),
        };

        assert!(matches!(write_sidecar(&part, &meta), Err(StoreError::Io(_))));
    }

    #[test]
    fn parts_without_sidecar_still_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let table = observations_table();
        let rows = vec![obs("BITCOIN", noon(), 50_000.0)];
        assert!(store.append_observations(&table, &rows).is_empty());

        let partition = dir.path().join("crypto_data/crypto_prices/date=2024-06-01");
        let part = fs::read_dir(&partition)
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| p.extension().and_then(|e| e.to_str()) == Some("parquet"))
            .unwrap();
        fs::remove_file(part.with_extension("meta.json")).unwrap();

        assert!(ParquetStore::part_meta(&part).is_none());
        assert_eq!(store.scan_observations(&table, noon()).unwrap(), rows);
    }

    #[test]
    fn invalid_rows_are_rejected_individually() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let table = observations_table();
        let rows = vec![
            obs("BITCOIN", noon(), 1.0),
            obs("BROKEN", noon(), -5.0),
            obs("SOLANA", noon(), 2.0),
        ];

        let errors = store.append_observations(&table, &rows);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].index, Some(1));

        let loaded = store.scan_observations(&table, noon()).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn ohlc_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let row = OhlcRow {
            symbol: "ETH".into(),
            timestamp: noon(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 98.0,
        };

        assert!(store.append_ohlc(&ohlc_table(), std::slice::from_ref(&row)).is_empty());
        assert_eq!(store.scan_ohlc(&ohlc_table(), noon()).unwrap(), vec![row]);
    }

    #[test]
    fn inverted_ohlc_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let row = OhlcRow {
            symbol: "ETH".into(),
            timestamp: noon(),
            open: 100.0,
            high: 95.0,
            low: 98.0,
            close: 98.0,
        };
        let errors = store.append_ohlc(&ohlc_table(), &[row]);
        assert_eq!(errors.len(), 1);
        assert!(store.scan_ohlc(&ohlc_table(), noon()).unwrap().is_empty());
    }

    #[test]
    fn scan_of_missing_table_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        assert!(store
            .scan_observations(&observations_table(), noon())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn corrupt_part_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let table = observations_table();
        store.append_observations(&table, &[obs("BITCOIN", noon(), 1.0)]);

        let partition = dir.path().join("crypto_data/crypto_prices/date=2024-06-01");
        fs::write(partition.join("part-0-garbage.parquet"), b"not parquet").unwrap();

        let loaded = store.scan_observations(&table, noon()).unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
