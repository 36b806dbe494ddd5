//! District report snapshot pipeline: ingest, validate, rank, and index
//! per-district dashboard reports into immutable dated snapshots.

pub mod aggregator_cache;
pub mod backfill_controller;
pub mod config;
pub mod fetch_source;
pub mod normalizer;
pub mod reconciliation_scheduler;
pub mod snapshot_builder;

pub use config::PipelineConfig;
pub use fetch_source::{DistrictReports, FetchSource};
pub use snapshot_builder::{BuildOutcome, BuildResult, SnapshotBuilder};
