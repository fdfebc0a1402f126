//! One-shot ingest-and-resample run.
//!
//! Phases:
//! 1. Fetching: one upstream request for the configured assets
//! 2. Normalizing: quote entries become observation rows
//! 3. WritingRaw: append observations to the raw table
//! 4. Resampling: observations become OHLC rows
//! 5. WritingOhlc: append OHLC rows to the aggregate table
//!
//! A fetch error fails the run. An empty batch ends it early. Store errors are
//! logged and reported but never fail the run.

use crate::data::{normalize, FetchError, QuoteSource};
use crate::domain::{batch_instant, BucketWidth, TableId};
use crate::resample::Resampler;
use crate::rng::VolumeSource;
use crate::store::{write_observations, write_ohlc, TableStore, WriteOutcome};
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// Phase of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Fetching,
    Normalizing,
    WritingRaw,
    Resampling,
    WritingOhlc,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetching => "FETCHING",
            Self::Normalizing => "NORMALIZING",
            Self::WritingRaw => "WRITING_RAW",
            Self::Resampling => "RESAMPLING",
            Self::WritingOhlc => "WRITING_OHLC",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The upstream returned nothing usable. Nothing was written.
    EmptyBatch,
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Batch timestamp shared by every observation row.
    pub fetched_at: Option<DateTime<Utc>>,
    pub phase: RunPhase,
    pub outcome: RunOutcome,
    pub prepared: usize,
    pub skipped: usize,
    pub raw_write: WriteOutcome,
    pub ohlc_rows: usize,
    pub ohlc_write: WriteOutcome,
}

impl RunReport {
    fn empty(fetched_at: Option<DateTime<Utc>>, skipped: usize) -> Self {
        Self {
            fetched_at,
            phase: RunPhase::Failed,
            outcome: RunOutcome::EmptyBatch,
            prepared: 0,
            skipped,
            raw_write: WriteOutcome::Skipped,
            ohlc_rows: 0,
            ohlc_write: WriteOutcome::Skipped,
        }
    }
}

/// Static settings for a run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub assets: Vec<String>,
    pub observations_table: TableId,
    pub ohlc_table: TableId,
    pub bucket: BucketWidth,
}

/// Wires a quote source, a table store and a volume source into one run.
pub struct Pipeline<'a> {
    source: &'a dyn QuoteSource,
    store: &'a dyn TableStore,
    volume: &'a mut dyn VolumeSource,
    settings: PipelineSettings,
    clock: fn() -> DateTime<Utc>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        source: &'a dyn QuoteSource,
        store: &'a dyn TableStore,
        volume: &'a mut dyn VolumeSource,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            store,
            volume,
            settings,
            clock: Utc::now,
        }
    }

    /// Replace the wall clock used to stamp the batch.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Execute one run end to end.
    pub fn run(&mut self) -> Result<RunReport, PipelineError> {
        let mut phase = RunPhase::Fetching;
        info!(
            %phase,
            source = self.source.name(),
            assets = self.settings.assets.len(),
            "pipeline run started"
        );

        let snapshot = match self.source.fetch(&self.settings.assets) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "fetch failed");
                transition(&mut phase, RunPhase::Failed);
                return Err(e.into());
            }
        };
        if snapshot.is_empty() {
            warn!("upstream returned no entries");
            transition(&mut phase, RunPhase::Failed);
            return Ok(RunReport::empty(None, 0));
        }

        transition(&mut phase, RunPhase::Normalizing);
        let fetched_at = batch_instant((self.clock)());
        let batch = normalize(&snapshot, fetched_at, &mut *self.volume);
        if batch.is_empty() {
            warn!(skipped = batch.skipped.len(), "no usable rows in batch");
            transition(&mut phase, RunPhase::Failed);
            return Ok(RunReport::empty(Some(fetched_at), batch.skipped.len()));
        }

        transition(&mut phase, RunPhase::WritingRaw);
        let raw_write = write_observations(self.store, &self.settings.observations_table, &batch.rows);

        transition(&mut phase, RunPhase::Resampling);
        let resampler = Resampler::new(self.settings.bucket);
        let (ohlc_rows, ohlc_write) = match resampler.resample(&batch.rows) {
            Ok(ohlc) => {
                transition(&mut phase, RunPhase::WritingOhlc);
                let outcome = write_ohlc(self.store, &self.settings.ohlc_table, &ohlc);
                (ohlc.len(), outcome)
            }
            Err(e) => {
                error!(error = %e, "resampling failed, skipping OHLC append");
                (0, WriteOutcome::Skipped)
            }
        };

        transition(&mut phase, RunPhase::Done);
        let report = RunReport {
            fetched_at: Some(fetched_at),
            phase,
            outcome: RunOutcome::Completed,
            prepared: batch.rows.len(),
            skipped: batch.skipped.len(),
            raw_write,
            ohlc_rows,
            ohlc_write,
        };
        info!(
            fetched_at = %fetched_at,
            prepared = report.prepared,
            skipped = report.skipped,
            ohlc_rows = report.ohlc_rows,
            raw_rejected = report.raw_write.is_rejected(),
            ohlc_rejected = report.ohlc_write.is_rejected(),
            "pipeline run finished"
        );
        Ok(report)
    }
}

fn transition(phase: &mut RunPhase, next: RunPhase) {
    info!(from = %phase, to = %next, "phase transition");
    *phase = next;
}
