//! Pipeline configuration (SPEC_FULL §1.NEW, §4.NEW) — grounded on the
//! teacher's `pbs-config` per-domain structs: plain `serde`-deserialized
//! sections with sane defaults, minus the privileged-user/ACL/section-config
//! machinery that's tied to a multi-tenant REST server this core doesn't
//! have. Loaded from a small TOML file plus environment overrides.

use std::path::PathBuf;

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};

fn default_integrity_size_tolerance_bytes() -> u64 {
    100
}
fn default_reconciliation_member_threshold() -> i64 {
    100
}
fn default_aggregator_cache_capacity() -> usize {
    50
}
fn default_aggregator_cache_ttl_seconds() -> u64 {
    300
}
fn default_reconciliation_interval_minutes() -> u64 {
    60
}
fn default_backfill_inter_date_delay_ms() -> u64 {
    2000
}
fn default_max_reconciliation_attempts() -> u32 {
    3
}
fn default_backfill_job_gc_age_seconds() -> u64 {
    3600
}
fn default_reconciliation_gc_age_seconds() -> u64 {
    86_400
}

/// Every tunable SPEC_FULL §9 calls out as parameterizable, with the
/// defaults from SPEC_FULL §4.NEW. `cache_dir` and `configured_districts`
/// are required: the spec explicitly rejects a hard-coded district-id
/// fallback (§9 Open Questions), so callers must supply the configured set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub cache_dir: PathBuf,
    pub snapshot_dir: Option<PathBuf>,
    pub time_series_dir: Option<PathBuf>,
    pub configured_districts: Vec<String>,

    #[serde(default = "default_integrity_size_tolerance_bytes")]
    pub integrity_size_tolerance_bytes: u64,
    #[serde(default = "default_reconciliation_member_threshold")]
    pub reconciliation_member_threshold: i64,
    #[serde(default = "default_aggregator_cache_capacity")]
    pub aggregator_cache_capacity: usize,
    #[serde(default = "default_aggregator_cache_ttl_seconds")]
    pub aggregator_cache_ttl_seconds: u64,
    #[serde(default = "default_reconciliation_interval_minutes")]
    pub reconciliation_interval_minutes: u64,
    #[serde(default = "default_backfill_inter_date_delay_ms")]
    pub backfill_inter_date_delay_ms: u64,
    #[serde(default = "default_max_reconciliation_attempts")]
    pub max_reconciliation_attempts: u32,
    #[serde(default = "default_backfill_job_gc_age_seconds")]
    pub backfill_job_gc_age_seconds: u64,
    #[serde(default = "default_reconciliation_gc_age_seconds")]
    pub reconciliation_gc_age_seconds: u64,
}

impl PipelineConfig {
    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_dir
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("snapshots"))
    }

    pub fn time_series_dir(&self) -> PathBuf {
        self.time_series_dir
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("time-series"))
    }

    /// Loads a TOML config file, then applies `DISTRICT_REPORTS_*`
    /// environment overrides for the fields most often tuned per-deployment
    /// (matching `pbs-config`'s pattern of a base file plus narrow runtime
    /// overrides, without a hot-reload watcher).
    pub fn load(path: &std::path::Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("unable to read {:?}", path))?;
        let mut config: PipelineConfig = toml::from_str(&raw).with_context(|| format!("unable to parse {:?}", path))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("DISTRICT_REPORTS_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Ok(value) = std::env::var("DISTRICT_REPORTS_RECONCILIATION_INTERVAL_MINUTES") {
            if let Ok(parsed) = value.parse() {
                self.reconciliation_interval_minutes = parsed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_toml_omits_tunables() {
        let toml = r#"
            cache_dir = "/var/lib/district-reports/cache"
            configured_districts = ["42", "61"]
        "#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.integrity_size_tolerance_bytes, 100);
        assert_eq!(config.aggregator_cache_capacity, 50);
        assert_eq!(config.snapshot_dir(), PathBuf::from("/var/lib/district-reports/cache/snapshots"));
    }

    #[test]
    fn explicit_dirs_override_derived_defaults() {
        let toml = r#"
            cache_dir = "/data/cache"
            snapshot_dir = "/data/snap"
            configured_districts = []
        "#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.snapshot_dir(), PathBuf::from("/data/snap"));
    }
}
