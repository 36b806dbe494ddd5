//! Raw CSV cache metadata shapes (spec §3 `RawCacheMetadata`, §4.4).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadStats {
    pub total_downloads: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub last_accessed: Option<chrono::DateTime<chrono::Utc>>,
}

/// File-count/size/checksum accounting for one date's cache directory
/// (spec §3: "`integrity.fileCount` equals the count of `.csv` files under
/// the date dir").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityInfo {
    pub file_count: usize,
    pub total_size: u64,
    pub checksums: BTreeMap<String, String>,
}

/// Which of the four report files are present for one cached date, keyed
/// by relative path (`all-districts.csv`, `district-<id>/district-performance.csv`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresenceFlags {
    pub all_districts: bool,
    pub districts: BTreeMap<String, DistrictPresence>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistrictPresence {
    pub district_performance: bool,
    pub division_performance: bool,
    pub club_performance: bool,
}

impl DistrictPresence {
    pub fn is_complete(&self) -> bool {
        self.district_performance && self.division_performance && self.club_performance
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCacheMetadata {
    pub date: String,
    pub program_year: String,
    pub presence: PresenceFlags,
    pub integrity: IntegrityInfo,
    pub download_stats: DownloadStats,
    pub source: String,
    pub cache_version: u32,
}

impl RawCacheMetadata {
    pub fn new(date: &str, program_year: &str) -> Self {
        RawCacheMetadata {
            date: date.to_string(),
            program_year: program_year.to_string(),
            presence: PresenceFlags::default(),
            integrity: IntegrityInfo::default(),
            download_stats: DownloadStats::default(),
            source: "dashboard".to_string(),
            cache_version: 1,
        }
    }
}
