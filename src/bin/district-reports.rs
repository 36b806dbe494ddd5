//! CLI entry point for the district report snapshot pipeline — grounded on
//! the teacher's `proxmox-backup-client` binary: a `clap` derive tree of
//! subcommands, `env_logger` initialized from `RUST_LOG`, and a
//! process-exit-code convention instead of panicking on pipeline failures
//! (spec §6: "CLI exit-code convention for pipeline orchestration").

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Error;
use async_trait::async_trait;
use clap::{Parser, Subcommand};

use district_report_store::{integrity, RawCsvCache, SnapshotStore, TimeSeriesStore};
use district_report_types::{CsvRecord, DistrictId};
use district_reports::backfill_controller::BackfillController;
use district_reports::reconciliation_scheduler::{ReconciliationOrchestrator, ReconciliationScheduler};
use district_reports::snapshot_builder::{BuildOutcome, SnapshotBuilder};
use district_reports::{DistrictReports, FetchSource, PipelineConfig};

const EXIT_ALL_FAILED: i32 = 2;
const EXIT_NO_CACHED_INPUTS: i32 = 3;
const EXIT_INVALID_REQUEST: i32 = 64;

#[derive(Parser)]
#[command(name = "district-reports", about = "District report snapshot pipeline")]
struct Cli {
    /// Path to the pipeline's TOML config file.
    #[arg(long, default_value = "district-reports.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Builds a snapshot for one date from whatever is already cached.
    Build { date: String },
    /// Validates (and, where possible, repairs) the raw cache for one date.
    Validate { date: String },
    /// Starts a multi-date backfill for one district.
    Backfill {
        district_id: String,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Runs one reconciliation scheduling + retry pass immediately.
    ReconcileTick,
}

/// The external fetch transport is explicitly out of scope for this core
/// (spec §1); this stands in for it so `backfill`/`reconcile-tick` remain
/// runnable end to end, always classifying as upstream-unavailable.
struct UnconfiguredFetchSource;

#[async_trait]
impl FetchSource for UnconfiguredFetchSource {
    async fn fetch_all_districts(&self, _date: &str) -> anyhow::Result<Vec<CsvRecord>> {
        anyhow::bail!("dashboard returned no transport: fetch source is not configured")
    }

    async fn fetch_district(&self, _district_id: &str, _date: &str) -> anyhow::Result<DistrictReports> {
        anyhow::bail!("dashboard returned no transport: fetch source is not configured")
    }
}

struct BuilderOrchestrator {
    raw_cache: Arc<RawCsvCache>,
    snapshot_store: Arc<SnapshotStore>,
    time_series_store: Arc<TimeSeriesStore>,
}

#[async_trait]
impl ReconciliationOrchestrator for BuilderOrchestrator {
    async fn reconcile(&self, district_id: &DistrictId, target_month: &str) -> Result<(), Error> {
        let date = format!("{target_month}-01");
        let builder = SnapshotBuilder {
            raw_cache: &self.raw_cache,
            snapshot_store: &self.snapshot_store,
            time_series_store: &self.time_series_store,
            configured_districts: std::slice::from_ref(district_id),
        };
        builder.build(&date).map(|_| ())
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            EXIT_INVALID_REQUEST
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<i32, Error> {
    let config = PipelineConfig::load(&cli.config)?;
    let raw_cache = Arc::new(RawCsvCache::new(config.cache_dir.clone()));
    let snapshot_store = Arc::new(SnapshotStore::new(config.snapshot_dir()));
    let time_series_store = Arc::new(TimeSeriesStore::new(config.time_series_dir()));
    let configured_districts: Vec<DistrictId> = config
        .configured_districts
        .iter()
        .map(|id| DistrictId::from_str(id))
        .collect::<Result<_, _>>()?;

    match cli.command {
        Command::Build { date } => {
            let builder = SnapshotBuilder {
                raw_cache: &raw_cache,
                snapshot_store: &snapshot_store,
                time_series_store: &time_series_store,
                configured_districts: &configured_districts,
            };
            match builder.build(&date) {
                Ok(BuildOutcome::Built(result)) => {
                    println!("snapshot {} status={:?}", result.snapshot_id, result.status);
                    Ok(exit_code_for_status(&result.status, result.successful_districts.len()))
                }
                Ok(BuildOutcome::Skipped { snapshot_id, reason }) => {
                    println!("snapshot {snapshot_id} skipped: {reason}");
                    Ok(0)
                }
                Err(err) if err.to_string().contains("No cached data") => {
                    eprintln!("error: {err}");
                    Ok(EXIT_NO_CACHED_INPUTS)
                }
                Err(err) => Err(err),
            }
        }
        Command::Validate { date } => {
            let present = district_report_types::report::ReportKind::PER_DISTRICT
                .iter()
                .any(|kind| configured_districts.iter().any(|id| raw_cache.has(&date, *kind, Some(id))))
                || raw_cache.has(&date, district_report_types::report::ReportKind::AllDistricts, None);
            if !present {
                eprintln!("error: no cached data for {date}");
                return Ok(EXIT_NO_CACHED_INPUTS);
            }

            let metadata = raw_cache.load_metadata_for(&date)?;
            let date_dir = raw_cache.base().join(&date);
            let report = integrity::validate(&date_dir, &metadata, config.integrity_size_tolerance_bytes)?;
            if report.is_valid() {
                println!("cache for {date} is valid");
            } else {
                for issue in &report.issues {
                    println!("issue: {issue}");
                }
            }
            Ok(0)
        }
        Command::Backfill { district_id, start, end } => {
            let district_id = DistrictId::from_str(&district_id)?;
            let start = start.map(|s| chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")).transpose()?;
            let end = end.map(|s| chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")).transpose()?;

            let fetch_source = Arc::new(UnconfiguredFetchSource);
            let controller = BackfillController::new(fetch_source, raw_cache, config);
            let id = controller.initiate(district_id, start, end).await?;
            println!("backfill job {id} started");
            Ok(0)
        }
        Command::ReconcileTick => {
            let orchestrator = Arc::new(BuilderOrchestrator {
                raw_cache,
                snapshot_store,
                time_series_store,
            });
            let scheduler = ReconciliationScheduler::new(orchestrator, configured_districts, config);
            scheduler.tick().await;
            println!("reconciliation tick complete");
            Ok(0)
        }
    }
}

fn exit_code_for_status(status: &district_report_types::SnapshotStatus, successful: usize) -> i32 {
    use district_report_types::SnapshotStatus::*;
    match status {
        Success => 0,
        Partial if successful > 0 => 0,
        Partial | Failed => EXIT_ALL_FAILED,
    }
}
