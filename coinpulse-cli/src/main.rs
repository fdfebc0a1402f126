//! CoinPulse CLI: one-shot ingest run and store inspection.
//!
//! Commands:
//! - (none) or `run`: fetch quotes, append observations, resample, append OHLC
//! - `tail`: print the latest observation per symbol from a Parquet store
//!
//! Without `--config`, the path in `COINPULSE_CONFIG` is used, falling back to
//! built-in defaults.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use coinpulse_core::config::{PipelineConfig, StoreBackend};
use coinpulse_core::data::CoinGeckoClient;
use coinpulse_core::domain::Observation;
use coinpulse_core::pipeline::{Pipeline, PipelineSettings, RunOutcome, RunReport};
use coinpulse_core::rng::FillerVolume;
use coinpulse_core::store::{BigQueryStore, ParquetStore, TableStore, WriteOutcome};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "COINPULSE_CONFIG";
const BQ_TOKEN_ENV: &str = "COINPULSE_BQ_TOKEN";

#[derive(Parser)]
#[command(
    name = "coinpulse",
    about = "CoinPulse: crypto quote ingestion and OHLC resampling"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingest pipeline once.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the latest observation per symbol from the Parquet store.
    Tail {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Look back this many minutes.
        #[arg(long, default_value_t = 60)]
        minutes: i64,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        None => run_pipeline(None),
        Some(Commands::Run { config }) => run_pipeline(config.as_deref()),
        Some(Commands::Tail { config, minutes }) => run_tail(config.as_deref(), minutes),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            PipelineConfig::from_file(&path)
                .with_context(|| format!("loading config from {}", path.display()))
        }
        None => {
            info!("no config given, using defaults");
            Ok(PipelineConfig::default())
        }
    }
}

fn http_client(config: &PipelineConfig) -> Result<reqwest::blocking::Client> {
    let mut builder = reqwest::blocking::Client::builder();
    if let Some(secs) = config.upstream.timeout_secs {
        builder = builder.timeout(std::time::Duration::from_secs(secs));
    }
    builder.build().context("building HTTP client")
}

fn build_store(config: &PipelineConfig, client: reqwest::blocking::Client) -> Result<Box<dyn TableStore>> {
    match config.store.backend {
        StoreBackend::Parquet => Ok(Box::new(ParquetStore::new(config.store.root.clone()))),
        StoreBackend::BigQuery => {
            let Some(project) = config.store.project.clone() else {
                bail!("store.project is required for the big_query backend");
            };
            let token = std::env::var(BQ_TOKEN_ENV)
                .with_context(|| format!("{BQ_TOKEN_ENV} must hold a BigQuery access token"))?;
            let mut store = BigQueryStore::new(client, project, token);
            if let Some(endpoint) = &config.store.endpoint {
                store = store.with_endpoint(endpoint.clone());
            }
            Ok(Box::new(store))
        }
    }
}

fn run_pipeline(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let client = http_client(&config)?;

    let source = CoinGeckoClient::new(client.clone()).with_base_url(config.upstream.base_url.clone());
    let store = build_store(&config, client)?;
    let mut volume = FillerVolume::from_seed(config.volume.seed);

    let settings = PipelineSettings {
        assets: config.upstream.assets.clone(),
        observations_table: config.store.observations_table.clone(),
        ohlc_table: config.store.ohlc_table.clone(),
        bucket: config.resample.bucket,
    };

    let report = Pipeline::new(&source, store.as_ref(), &mut volume, settings).run()?;
    print_summary(&report);
    Ok(())
}

/// Start of the `tail` window, `minutes` before `now`.
fn tail_cutoff(now: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>> {
    if minutes <= 0 {
        bail!("--minutes must be positive");
    }
    Duration::try_minutes(minutes)
        .and_then(|window| now.checked_sub_signed(window))
        .with_context(|| format!("--minutes {minutes} reaches past the supported time range"))
}

fn run_tail(config_path: Option<&Path>, minutes: i64) -> Result<()> {
    let cutoff = tail_cutoff(Utc::now(), minutes)?;
    let config = load_config(config_path)?;
    if config.store.backend != StoreBackend::Parquet {
        bail!("tail reads the local Parquet store only");
    }

    let store = ParquetStore::new(config.store.root.clone());
    let rows = store.scan_observations(&config.store.observations_table, cutoff)?;
    let ohlc = store.scan_ohlc(&config.store.ohlc_table, cutoff)?;

    println!("Store: {}", store.root().display());
    println!("Since: {}", cutoff.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Observations: {}  OHLC rows: {}", rows.len(), ohlc.len());
    println!();

    let latest = latest_per_symbol(&rows);
    if latest.is_empty() {
        println!("No observations in window.");
        return Ok(());
    }

    println!(
        "{:<20} {:>16} {:>10} {:>20}",
        "Symbol", "Price (USD)", "24h %", "Fetched"
    );
    println!("{}", "-".repeat(69));
    for row in latest.values() {
        println!(
            "{:<20} {:>16.4} {:>10.2} {:>20}",
            row.symbol,
            row.price_usd,
            row.change_24h_pct,
            row.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn latest_per_symbol(rows: &[Observation]) -> BTreeMap<&str, &Observation> {
    let mut latest: BTreeMap<&str, &Observation> = BTreeMap::new();
    for row in rows {
        match latest.get(row.symbol.as_str()) {
            Some(seen) if seen.timestamp > row.timestamp => {}
            _ => {
                latest.insert(row.symbol.as_str(), row);
            }
        }
    }
    latest
}

fn describe(outcome: &WriteOutcome) -> String {
    match outcome {
        WriteOutcome::Skipped => "skipped".to_string(),
        WriteOutcome::Written { rows } => format!("{rows} rows"),
        WriteOutcome::Rejected { rows, errors } => {
            format!("{rows} rows, {} error(s)", errors.len())
        }
    }
}

fn print_summary(report: &RunReport) {
    println!();
    println!("=== Pipeline Run ===");
    match report.fetched_at {
        Some(at) => println!("Batch:          {}", at.format("%Y-%m-%d %H:%M:%S%.3f UTC")),
        None => println!("Batch:          -"),
    }
    println!("Final phase:    {}", report.phase);
    println!("Prepared:       {}", report.prepared);
    println!("Skipped:        {}", report.skipped);
    println!("Raw append:     {}", describe(&report.raw_write));
    println!("OHLC rows:      {}", report.ohlc_rows);
    println!("OHLC append:    {}", describe(&report.ohlc_write));
    if report.outcome == RunOutcome::EmptyBatch {
        println!();
        println!("WARNING: empty batch, nothing written");
    }
    println!();
}
