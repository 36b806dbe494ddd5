//! Shared types for the district report snapshot pipeline.
//!
//! This crate holds the data model the rest of the workspace builds on: the
//! validated record types that flow out of the CSV parser, the snapshot and
//! time-series artifacts the datastore crate persists, the job bookkeeping
//! types the background controllers use, and the error taxonomy every
//! fallible operation in the pipeline returns.

pub mod cache;
pub mod district;
pub mod error;
pub mod jobs;
pub mod manifest;
pub mod ranking;
pub mod report;
pub mod statistics;
pub mod time_series;

pub use cache::{DownloadStats, IntegrityInfo, PresenceFlags, RawCacheMetadata};
pub use district::DistrictId;
pub use error::PipelineError;
pub use jobs::{BackfillJob, BackfillProgress, BackfillStatus, ReconciliationStatus, ScheduledReconciliation};
pub use manifest::{DistrictErrorEntry, SnapshotManifest, SnapshotStatus};
pub use ranking::RankingRow;
pub use report::{CsvRecord, CsvValue, ReportKind};
pub use statistics::{ClubHealth, DistrictStatistics, EducationSummary, MembershipSummary};
pub use time_series::{DataPoint, ProgramYearIndex};
