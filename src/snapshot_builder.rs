//! Orchestrates validation, normalization, ranking, and persistence for one
//! date (spec §4.6) — grounded on the teacher's `pbs-datastore::datastore`
//! backup-finish sequencing (validate inputs, write chunks, then the
//! manifest last so readers never see a manifest referencing undurable
//! data), generalized from one backup run to one dated snapshot across many
//! districts.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Instant;

use anyhow::{bail, Error};
use chrono::NaiveDate;

use district_report_store::district_filter::filter_records;
use district_report_store::ranking_engine::{compute_rankings, order_by_aggregate_score, RankingInput};
use district_report_store::{csv_parser, RawCsvCache, SnapshotStore, TimeSeriesStore};
use district_report_types::manifest::{ArtifactVersions, DistrictErrorEntry, SnapshotManifest, SnapshotStatus};
use district_report_types::report::ReportKind;
use district_report_types::statistics::{ClosingPeriodInfo, DistrictStatistics};
use district_report_types::time_series::DataPoint;
use district_report_types::{CsvRecord, DistrictId, RankingRow};

use crate::normalizer::{percent_field, DataNormalizer};

const CLUB_GROWTH_KEYS: &[&str] = &["Club Growth %", "Club Growth Percent", "Net Club Growth %"];
const PAYMENT_GROWTH_KEYS: &[&str] = &["Payment Growth %", "Payment Growth Percent"];
const DISTINGUISHED_KEYS: &[&str] = &["% Distinguished Clubs", "Distinguished %", "Distinguished Percent"];

/// The outcome of one [`SnapshotBuilder::build`] call (spec §4.6: "Returned
/// `BuildResult` reports status, included/missing districts, errors, and
/// `snapshotId` on success").
#[derive(Debug)]
pub enum BuildOutcome {
    Built(BuildResult),
    /// The closing-period update rule (spec §4.6 step 4, §8 invariant 7)
    /// rejected this build because a newer collection already exists at the
    /// same logical date.
    Skipped { snapshot_id: String, reason: String },
}

#[derive(Debug)]
pub struct BuildResult {
    pub snapshot_id: String,
    pub status: SnapshotStatus,
    pub successful_districts: Vec<DistrictId>,
    pub missing_districts: Vec<DistrictId>,
    pub district_errors: Vec<DistrictErrorEntry>,
}

pub struct SnapshotBuilder<'a> {
    pub raw_cache: &'a RawCsvCache,
    pub snapshot_store: &'a SnapshotStore,
    pub time_series_store: &'a TimeSeriesStore,
    pub configured_districts: &'a [DistrictId],
}

impl<'a> SnapshotBuilder<'a> {
    pub fn build(&self, date: &str) -> Result<BuildOutcome, Error> {
        let start = Instant::now();

        let global_present = self.raw_cache.has(date, ReportKind::AllDistricts, None);
        let any_district_present = self
            .configured_districts
            .iter()
            .any(|id| self.district_fully_cached(date, id));

        if !global_present && !any_district_present {
            bail!("No cached data for {date}");
        }

        let global_rankings = self.compute_global_rankings(date)?;

        // Phase 1: normalize every fully-cached district (pure computation,
        // no store writes) so the closing-period update rule can be decided
        // before anything is persisted. Writing per-district artifacts ahead
        // of that decision would overwrite live data with stale data on a
        // rejected rebuild (spec §8 invariant 7).
        let mut missing = Vec::new();
        let mut district_errors = Vec::new();
        let mut normalized: Vec<(DistrictId, DistrictStatistics)> = Vec::new();

        for district_id in self.configured_districts {
            if !self.district_fully_cached(date, district_id) {
                missing.push(district_id.clone());
                district_errors.push(DistrictErrorEntry {
                    district_id: district_id.clone(),
                    op: "read".to_string(),
                    error: format!("no cached data for {date}"),
                    should_retry: true,
                    timestamp: chrono::Utc::now(),
                });
                continue;
            }

            match self.normalize_one_district(date, district_id) {
                Ok(stats) => normalized.push((district_id.clone(), stats)),
                Err(err) => {
                    missing.push(district_id.clone());
                    district_errors.push(DistrictErrorEntry {
                        district_id: district_id.clone(),
                        op: "normalize".to_string(),
                        error: err.to_string(),
                        should_retry: true,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
        }

        let closing_period = normalized
            .first()
            .map(|(_, stats)| stats.closing_period.clone())
            .unwrap_or(ClosingPeriodInfo {
                is_closing_period_data: false,
                collection_date: date.to_string(),
                logical_date: date.to_string(),
            });
        let snapshot_id = closing_period.logical_date.clone();

        if let Some(existing) = self.snapshot_store.get_snapshot_manifest(&snapshot_id)? {
            if closing_period.collection_date < existing.collection_date {
                return Ok(BuildOutcome::Skipped {
                    snapshot_id,
                    reason: "existing_is_newer".to_string(),
                });
            }
        }

        // Phase 2: this build wins the closing-period check, so persist it.
        let mut successful = Vec::new();
        for (district_id, stats) in &normalized {
            match self.write_one_district(&snapshot_id, district_id, stats, &global_rankings) {
                Ok(()) => successful.push(district_id.clone()),
                Err(err) => {
                    missing.push(district_id.clone());
                    district_errors.push(DistrictErrorEntry {
                        district_id: district_id.clone(),
                        op: "write".to_string(),
                        error: err.to_string(),
                        should_retry: true,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
        }

        let status = if successful.is_empty() {
            SnapshotStatus::Failed
        } else if missing.is_empty() {
            SnapshotStatus::Success
        } else {
            SnapshotStatus::Partial
        };

        if !global_rankings.is_empty() {
            let ordered = order_by_aggregate_score(global_rankings.values().cloned().collect());
            self.snapshot_store.write_analytics(&snapshot_id, "manifest.json", &ordered)?;
        }

        let manifest = SnapshotManifest {
            snapshot_id: snapshot_id.clone(),
            versions: ArtifactVersions::CURRENT,
            created_at: chrono::Utc::now(),
            status,
            configured_districts: self.configured_districts.to_vec(),
            successful_districts: successful.clone(),
            failed_districts: missing.clone(),
            district_errors,
            processing_duration_ms: start.elapsed().as_millis() as u64,
            data_as_of_date: closing_period.logical_date.clone(),
            is_closing_period_data: closing_period.is_closing_period_data,
            collection_date: closing_period.collection_date.clone(),
            logical_date: closing_period.logical_date.clone(),
            write_complete: true,
            write_failed_districts: Vec::new(),
        };
        self.snapshot_store.write_manifest(&manifest)?;

        Ok(BuildOutcome::Built(BuildResult {
            snapshot_id,
            status,
            successful_districts: successful,
            missing_districts: missing,
            district_errors: manifest.district_errors,
        }))
    }

    fn district_fully_cached(&self, date: &str, district_id: &DistrictId) -> bool {
        ReportKind::PER_DISTRICT
            .iter()
            .all(|kind| self.raw_cache.has(date, *kind, Some(district_id)))
    }

    fn read_and_parse(&self, date: &str, kind: ReportKind, district_id: Option<&DistrictId>) -> Result<Vec<CsvRecord>, Error> {
        let (content, _checksum) = self.raw_cache.get(date, kind, district_id)?;
        Ok(csv_parser::parse_report(&String::from_utf8_lossy(&content)))
    }

    /// Parses and filters the global summary, computing a [`RankingRow`]
    /// per valid district id (spec §4.6 step 3: "Compute Rankings with the
    /// engine on the global summary").
    fn compute_global_rankings(&self, date: &str) -> Result<BTreeMap<DistrictId, RankingRow>, Error> {
        if !self.raw_cache.has(date, ReportKind::AllDistricts, None) {
            return Ok(BTreeMap::new());
        }
        let records = self.read_and_parse(date, ReportKind::AllDistricts, None)?;
        let filtered = filter_records(records);

        let input: Vec<RankingInput> = filtered
            .valid
            .iter()
            .map(|(id, record)| RankingInput {
                district_id: id.clone(),
                club_growth_percent: percent_field(record, CLUB_GROWTH_KEYS),
                payment_growth_percent: percent_field(record, PAYMENT_GROWTH_KEYS),
                distinguished_percent: percent_field(record, DISTINGUISHED_KEYS),
            })
            .collect();

        let rankings = compute_rankings(input);
        Ok(rankings.into_iter().map(|r| (r.district_id.clone(), r)).collect())
    }

    /// Reads, filters, and normalizes one district's cached reports. Pure:
    /// touches no store writer, so it is safe to call before the
    /// closing-period update rule decides whether this build will persist.
    fn normalize_one_district(&self, date: &str, district_id: &DistrictId) -> Result<DistrictStatistics, Error> {
        let district_records = self.read_and_parse(date, ReportKind::DistrictPerformance, Some(district_id))?;
        let club_records = self.read_and_parse(date, ReportKind::ClubPerformance, Some(district_id))?;

        let district_valid = filter_records(district_records).valid.into_iter().map(|(_, r)| r).collect::<Vec<_>>();
        let club_valid = filter_records(club_records).valid.into_iter().map(|(_, r)| r).collect::<Vec<_>>();

        Ok(DataNormalizer::normalize(district_id.clone(), date, &district_valid, &club_valid))
    }

    /// Persists one already-normalized district's files plus its ranking
    /// analytics and time-series point, keyed by the winning `snapshot_id`.
    fn write_one_district(
        &self,
        snapshot_id: &str,
        district_id: &DistrictId,
        stats: &DistrictStatistics,
        global_rankings: &BTreeMap<DistrictId, RankingRow>,
    ) -> Result<(), Error> {
        self.snapshot_store.write_district_data(snapshot_id, district_id, stats)?;
        self.snapshot_store
            .write_analytics(snapshot_id, &format!("district_{district_id}_membership.json"), &stats.membership)?;
        self.snapshot_store
            .write_analytics(snapshot_id, &format!("district_{district_id}_clubhealth.json"), &stats.clubs)?;

        if let Some(ranking) = global_rankings.get(district_id) {
            self.snapshot_store
                .write_analytics(snapshot_id, &format!("district_{district_id}_analytics.json"), ranking)?;

            let date_naive = NaiveDate::from_str(snapshot_id)?;
            let point = DataPoint {
                date: snapshot_id.to_string(),
                aggregate_score: ranking.aggregate_score,
                clubs_rank: ranking.club_growth_rank,
                payments_rank: ranking.payment_growth_rank,
                distinguished_rank: ranking.distinguished_rank,
                membership_total: stats.membership.total,
                club_count: stats.clubs.total,
                distinguished_count: stats.clubs.distinguished,
            };
            self.time_series_store.upsert_data_point(district_id, date_naive, point)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use district_report_types::report::CsvValue;

    fn global_row(id: &str, club: f64, payment: f64, distinguished: f64) -> String {
        format!("{id},{club},{payment},{distinguished}\n")
    }

    fn write_global_csv(dir: &tempfile::TempDir, date: &str) {
        let mut content = "DISTRICT,Club Growth %,Payment Growth %,% Distinguished Clubs\n".to_string();
        content.push_str(&global_row("42", 5.0, 10.0, 20.0));
        content.push_str(&global_row("61", 3.0, 12.0, 40.0));
        let cache = RawCsvCache::new(dir.path());
        cache.put(date, ReportKind::AllDistricts, None, content.as_bytes()).unwrap();
    }

    fn write_district_csvs(dir: &tempfile::TempDir, date: &str, district: &str) {
        let cache = RawCsvCache::new(dir.path());
        let id = DistrictId::from_str(district).unwrap();
        let district_csv = "DISTRICT\n".to_string() + district + "\n";
        let club_csv = format!(
            "DISTRICT,Club Number,Active Members,Mem. Base,Club Status,Club Distinguished Status\n{district},1,20,18,Active,Distinguished\n"
        );
        cache
            .cache_district_data(&id, date, district_csv.as_bytes(), b"DISTRICT\n", club_csv.as_bytes())
            .unwrap();
    }

    /// Like [`write_district_csvs`], but stamps the district report with an
    /// "As Of" date so `ClosingPeriodDetector` resolves a logical date
    /// distinct from the cache date, and takes a member count so two builds
    /// at the same logical date can be told apart by their data.
    fn write_closing_period_district_csvs(dir: &tempfile::TempDir, cache_date: &str, as_of: &str, district: &str, members: i64) {
        let cache = RawCsvCache::new(dir.path());
        let id = DistrictId::from_str(district).unwrap();
        let district_csv = format!("DISTRICT,As Of\n{district},{as_of}\n");
        let club_csv = format!(
            "DISTRICT,Club Number,Active Members,Mem. Base,Club Status,Club Distinguished Status\n{district},1,{members},{members},Active,Distinguished\n"
        );
        cache
            .cache_district_data(&id, cache_date, district_csv.as_bytes(), b"DISTRICT\n", club_csv.as_bytes())
            .unwrap();
    }

    #[test]
    fn builds_a_success_snapshot_for_fully_cached_districts() {
        let dir = tempfile::tempdir().unwrap();
        write_global_csv(&dir, "2024-07-01");
        write_district_csvs(&dir, "2024-07-01", "42");
        write_district_csvs(&dir, "2024-07-01", "61");

        let raw_cache = RawCsvCache::new(dir.path());
        let snapshot_store = SnapshotStore::new(dir.path().join("snapshots"));
        let time_series_store = TimeSeriesStore::new(dir.path().join("time-series"));
        let configured = vec![DistrictId::from_str("42").unwrap(), DistrictId::from_str("61").unwrap()];

        let builder = SnapshotBuilder {
            raw_cache: &raw_cache,
            snapshot_store: &snapshot_store,
            time_series_store: &time_series_store,
            configured_districts: &configured,
        };

        let outcome = builder.build("2024-07-01").unwrap();
        match outcome {
            BuildOutcome::Built(result) => {
                assert_eq!(result.status, SnapshotStatus::Success);
                assert_eq!(result.successful_districts.len(), 2);
                assert!(result.missing_districts.is_empty());
            }
            BuildOutcome::Skipped { .. } => panic!("expected a built snapshot"),
        }

        let manifest = snapshot_store.get_snapshot_manifest("2024-07-01").unwrap().unwrap();
        assert_eq!(manifest.successful_districts.len(), 2);

        let stats: district_report_types::DistrictStatistics =
            snapshot_store.read_district_data("2024-07-01", &DistrictId::from_str("42").unwrap()).unwrap().unwrap();
        assert_eq!(stats.membership.total, 20);

        let trend = time_series_store.get_trend_data(
            &DistrictId::from_str("42").unwrap(),
            NaiveDate::from_str("2024-07-01").unwrap(),
            NaiveDate::from_str("2024-07-01").unwrap(),
        );
        assert_eq!(trend.len(), 1);
        assert_eq!(trend[0].clubs_rank, 1);
    }

    #[test]
    fn fails_with_no_cached_data_message() {
        let dir = tempfile::tempdir().unwrap();
        let raw_cache = RawCsvCache::new(dir.path());
        let snapshot_store = SnapshotStore::new(dir.path().join("snapshots"));
        let time_series_store = TimeSeriesStore::new(dir.path().join("time-series"));
        let configured = vec![DistrictId::from_str("42").unwrap()];

        let builder = SnapshotBuilder {
            raw_cache: &raw_cache,
            snapshot_store: &snapshot_store,
            time_series_store: &time_series_store,
            configured_districts: &configured,
        };

        let err = builder.build("2024-07-01").unwrap_err();
        assert!(err.to_string().contains("No cached data for 2024-07-01"));
    }

    #[test]
    fn partial_status_when_some_districts_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_global_csv(&dir, "2024-07-01");
        write_district_csvs(&dir, "2024-07-01", "42");

        let raw_cache = RawCsvCache::new(dir.path());
        let snapshot_store = SnapshotStore::new(dir.path().join("snapshots"));
        let time_series_store = TimeSeriesStore::new(dir.path().join("time-series"));
        let configured = vec![DistrictId::from_str("42").unwrap(), DistrictId::from_str("61").unwrap()];

        let builder = SnapshotBuilder {
            raw_cache: &raw_cache,
            snapshot_store: &snapshot_store,
            time_series_store: &time_series_store,
            configured_districts: &configured,
        };

        match builder.build("2024-07-01").unwrap() {
            BuildOutcome::Built(result) => {
                assert_eq!(result.status, SnapshotStatus::Partial);
                assert_eq!(result.missing_districts, vec![DistrictId::from_str("61").unwrap()]);
            }
            BuildOutcome::Skipped { .. } => panic!("expected a built snapshot"),
        }
    }

    #[test]
    fn stale_rebuild_is_skipped_without_overwriting_any_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let raw_cache = RawCsvCache::new(dir.path());
        let snapshot_store = SnapshotStore::new(dir.path().join("snapshots"));
        let time_series_store = TimeSeriesStore::new(dir.path().join("time-series"));
        let configured = vec![DistrictId::from_str("42").unwrap()];

        let builder = SnapshotBuilder {
            raw_cache: &raw_cache,
            snapshot_store: &snapshot_store,
            time_series_store: &time_series_store,
            configured_districts: &configured,
        };

        // First, newer collection: cache date 2024-07-05, as-of 2024-06-30.
        write_closing_period_district_csvs(&dir, "2024-07-05", "6/30/2024", "42", 100);
        match builder.build("2024-07-05").unwrap() {
            BuildOutcome::Built(result) => assert_eq!(result.status, SnapshotStatus::Success),
            BuildOutcome::Skipped { .. } => panic!("expected the first build to persist"),
        }

        let manifest = snapshot_store.get_snapshot_manifest("2024-06-30").unwrap().unwrap();
        assert_eq!(manifest.collection_date, "2024-07-05");
        let stats: district_report_types::DistrictStatistics =
            snapshot_store.read_district_data("2024-06-30", &DistrictId::from_str("42").unwrap()).unwrap().unwrap();
        assert_eq!(stats.membership.total, 100);

        // Now a stale rebuild: an older collection date with different
        // (would-be-wrong) data for the same logical date.
        write_closing_period_district_csvs(&dir, "2024-07-02", "6/30/2024", "42", 5);
        let outcome = builder.build("2024-07-02").unwrap();
        match outcome {
            BuildOutcome::Skipped { snapshot_id, reason } => {
                assert_eq!(snapshot_id, "2024-06-30");
                assert_eq!(reason, "existing_is_newer");
            }
            BuildOutcome::Built(_) => panic!("expected the stale rebuild to be skipped"),
        }

        // Neither the manifest nor the per-district artifacts were touched.
        let manifest = snapshot_store.get_snapshot_manifest("2024-06-30").unwrap().unwrap();
        assert_eq!(manifest.collection_date, "2024-07-05");
        let stats: district_report_types::DistrictStatistics =
            snapshot_store.read_district_data("2024-06-30", &DistrictId::from_str("42").unwrap()).unwrap().unwrap();
        assert_eq!(stats.membership.total, 100);
    }

    #[allow(unused)]
    fn silence_unused_csvvalue_import(_v: CsvValue) {}
}
