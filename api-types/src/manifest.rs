//! The snapshot manifest (spec §3, §4.5, §4.6) — grounded on the teacher's
//! `pbs-datastore::manifest::BackupManifest`, generalized from one backup's
//! file list to one date's set of per-district artifacts.

use serde::{Deserialize, Serialize};

use crate::district::DistrictId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Success,
    Partial,
    Failed,
}

/// An absorbed per-district error (spec §7: "all absorbed errors carry
/// `{districtId, op, error, timestamp, shouldRetry}`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictErrorEntry {
    pub district_id: DistrictId,
    pub op: String,
    pub error: String,
    pub should_retry: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Schema/calculation/ranking versions carried by every persisted artifact
/// so readers can reject files produced by an incompatible pipeline
/// version (spec §4.5: "two files are compatible only when their major
/// schema, calculation, and ranking versions match").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactVersions {
    pub schema_version: (u32, u32, u32),
    pub calculation_version: (u32, u32, u32),
    pub ranking_version: (u32, u32, u32),
}

impl ArtifactVersions {
    pub const CURRENT: ArtifactVersions = ArtifactVersions {
        schema_version: (1, 0, 0),
        calculation_version: (1, 0, 0),
        ranking_version: (1, 0, 0),
    };

    /// Two artifacts are compatible only when the major component of every
    /// version triple matches.
    pub fn compatible_with(&self, other: &ArtifactVersions) -> bool {
        self.schema_version.0 == other.schema_version.0
            && self.calculation_version.0 == other.calculation_version.0
            && self.ranking_version.0 == other.ranking_version.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub snapshot_id: String,
    pub versions: ArtifactVersions,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub status: SnapshotStatus,
    pub configured_districts: Vec<DistrictId>,
    pub successful_districts: Vec<DistrictId>,
    pub failed_districts: Vec<DistrictId>,
    pub district_errors: Vec<DistrictErrorEntry>,
    pub processing_duration_ms: u64,
    pub data_as_of_date: String,
    pub is_closing_period_data: bool,
    pub collection_date: String,
    pub logical_date: String,
    pub write_complete: bool,
    pub write_failed_districts: Vec<DistrictId>,
}

impl SnapshotManifest {
    pub fn district_count(&self) -> usize {
        self.configured_districts.len()
    }
}
