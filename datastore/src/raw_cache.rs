//! Content-addressed dated store for fetched CSVs (spec §3 `CachedReport`,
//! §4.4) — grounded on the teacher's `ChunkStore`: atomic write-then-rename
//! per file, a single mutex serializing metadata updates, and download
//! counters bumped on every access.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Error};
use district_report_types::cache::{DistrictPresence, IntegrityInfo, RawCacheMetadata};
use district_report_types::report::ReportKind;
use district_report_types::time_series::program_year_for;
use district_report_types::DistrictId;
use district_report_tools::fs::{ensure_dir_exists, replace_file};
use district_report_tools::sha::sha256_digest;

pub struct RawCsvCache {
    base: PathBuf,
    metadata_lock: Mutex<()>,
}

fn date_dir(base: &Path, date: &str) -> PathBuf {
    base.join(date)
}

fn relative_path(kind: ReportKind, district_id: Option<&DistrictId>) -> PathBuf {
    match district_id {
        None => PathBuf::from(kind.file_name()),
        Some(id) => PathBuf::from(format!("district-{id}")).join(kind.file_name()),
    }
}

impl RawCsvCache {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        RawCsvCache {
            base: base.into(),
            metadata_lock: Mutex::new(()),
        }
    }

    fn metadata_path(&self, date: &str) -> PathBuf {
        date_dir(&self.base, date).join("metadata.json")
    }

    fn load_metadata(&self, date: &str) -> Result<RawCacheMetadata, Error> {
        let path = self.metadata_path(date);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)
                .with_context(|| format!("unable to parse {:?}", path))?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let program_year = parse_date(date)
                    .map(program_year_for)
                    .unwrap_or_default();
                Ok(RawCacheMetadata::new(date, &program_year))
            }
            Err(err) => Err(err).with_context(|| format!("unable to read {:?}", path)),
        }
    }

    fn save_metadata(&self, date: &str, metadata: &RawCacheMetadata) -> Result<(), Error> {
        let data = serde_json::to_vec_pretty(metadata)?;
        replace_file(&self.metadata_path(date), &data)
    }

    fn mark_present(metadata: &mut RawCacheMetadata, kind: ReportKind, district_id: Option<&DistrictId>) {
        match district_id {
            None => metadata.presence.all_districts = true,
            Some(id) => {
                let entry = metadata
                    .presence
                    .districts
                    .entry(id.as_str().to_string())
                    .or_insert_with(DistrictPresence::default);
                match kind {
                    ReportKind::DistrictPerformance => entry.district_performance = true,
                    ReportKind::DivisionPerformance => entry.division_performance = true,
                    ReportKind::ClubPerformance => entry.club_performance = true,
                    ReportKind::AllDistricts => {}
                }
            }
        }
    }

    /// Writes one report file atomically and updates the date's metadata
    /// (checksum table, file count/size, download stats).
    pub fn put(
        &self,
        date: &str,
        kind: ReportKind,
        district_id: Option<&DistrictId>,
        content: &[u8],
    ) -> Result<(), Error> {
        let dir = date_dir(&self.base, date);
        let rel = relative_path(kind, district_id);
        let path = dir.join(&rel);
        ensure_dir_exists(path.parent().unwrap())?;
        replace_file(&path, content)?;

        let _guard = self.metadata_lock.lock().unwrap();
        let mut metadata = self.load_metadata(date)?;
        Self::mark_present(&mut metadata, kind, district_id);
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        let is_new = !metadata.integrity.checksums.contains_key(&rel_str);
        metadata
            .integrity
            .checksums
            .insert(rel_str, sha256_digest(content));
        if is_new {
            metadata.integrity.file_count += 1;
        }
        metadata.integrity.total_size = recompute_total_size(&dir, &metadata.integrity);
        metadata.download_stats.total_downloads += 1;
        metadata.download_stats.last_accessed = Some(chrono::Utc::now());
        self.save_metadata(date, &metadata)?;

        Ok(())
    }

    /// Reads a cached file's content and its recorded checksum.
    pub fn get(
        &self,
        date: &str,
        kind: ReportKind,
        district_id: Option<&DistrictId>,
    ) -> Result<(Vec<u8>, String), Error> {
        let dir = date_dir(&self.base, date);
        let rel = relative_path(kind, district_id);
        let path = dir.join(&rel);
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(err) => {
                let _guard = self.metadata_lock.lock().unwrap();
                if let Ok(mut metadata) = self.load_metadata(date) {
                    metadata.download_stats.total_downloads += 1;
                    metadata.download_stats.cache_misses += 1;
                    metadata.download_stats.last_accessed = Some(chrono::Utc::now());
                    let _ = ensure_dir_exists(&dir).and_then(|()| self.save_metadata(date, &metadata));
                }
                return Err(err).with_context(|| format!("unable to read {:?}", path));
            }
        };
        let checksum = sha256_digest(&content);

        let _guard = self.metadata_lock.lock().unwrap();
        let mut metadata = self.load_metadata(date)?;
        metadata.download_stats.total_downloads += 1;
        metadata.download_stats.cache_hits += 1;
        metadata.download_stats.last_accessed = Some(chrono::Utc::now());
        self.save_metadata(date, &metadata)?;

        Ok((content, checksum))
    }

    pub fn has(&self, date: &str, kind: ReportKind, district_id: Option<&DistrictId>) -> bool {
        date_dir(&self.base, date)
            .join(relative_path(kind, district_id))
            .is_file()
    }

    /// Enumerates cached dates, sorted ascending.
    pub fn list_dates(&self) -> Result<Vec<String>, Error> {
        if !self.base.is_dir() {
            return Ok(Vec::new());
        }
        let mut dates = Vec::new();
        for entry in std::fs::read_dir(&self.base)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if parse_date(name).is_some() {
                        dates.push(name.to_string());
                    }
                }
            }
        }
        dates.sort();
        Ok(dates)
    }

    /// Enumerates dates for which a complete set of per-district reports
    /// exists for `district_id`.
    pub fn get_cached_dates_for(&self, district_id: &DistrictId) -> Result<Vec<String>, Error> {
        let mut dates = Vec::new();
        for date in self.list_dates()? {
            let all_present = ReportKind::PER_DISTRICT
                .iter()
                .all(|kind| self.has(&date, *kind, Some(district_id)));
            if all_present {
                dates.push(date);
            }
        }
        Ok(dates)
    }

    /// Atomically caches all three per-district reports for one date: if
    /// any write fails, all three are removed (spec §4.4, scenario D).
    pub fn cache_district_data(
        &self,
        district_id: &DistrictId,
        date: &str,
        district_records: &[u8],
        division_records: &[u8],
        club_records: &[u8],
    ) -> Result<(), Error> {
        let kinds_and_content = [
            (ReportKind::DistrictPerformance, district_records),
            (ReportKind::DivisionPerformance, division_records),
            (ReportKind::ClubPerformance, club_records),
        ];

        for (kind, content) in kinds_and_content {
            if let Err(err) = self.put(date, kind, Some(district_id), content) {
                self.remove_district_date(district_id, date)?;
                return Err(err).context("atomic per-district cache write failed, rolled back");
            }
        }

        Ok(())
    }

    /// Removes a district's files for one date and strips their entries out
    /// of the date's shared metadata, so `integrity.fileCount`/`checksums`
    /// keep matching what's actually on disk after a rollback.
    fn remove_district_date(&self, district_id: &DistrictId, date: &str) -> Result<(), Error> {
        let dir = date_dir(&self.base, date).join(format!("district-{district_id}"));
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err).with_context(|| format!("unable to remove {:?}", dir)),
        }

        let _guard = self.metadata_lock.lock().unwrap();
        let mut metadata = self.load_metadata(date)?;
        let prefix = format!("district-{district_id}/");
        let removed: Vec<String> = metadata
            .integrity
            .checksums
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect();
        for key in &removed {
            metadata.integrity.checksums.remove(key);
        }
        metadata.integrity.file_count = metadata.integrity.file_count.saturating_sub(removed.len());
        metadata.integrity.total_size = recompute_total_size(&date_dir(&self.base, date), &metadata.integrity);
        metadata.presence.districts.remove(district_id.as_str());
        self.save_metadata(date, &metadata)?;

        Ok(())
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn load_metadata_for(&self, date: &str) -> Result<RawCacheMetadata, Error> {
        self.load_metadata(date)
    }
}

fn recompute_total_size(dir: &Path, integrity: &IntegrityInfo) -> u64 {
    integrity
        .checksums
        .keys()
        .filter_map(|rel| std::fs::metadata(dir.join(rel)).ok())
        .map(|m| m.len())
        .sum()
}

fn parse_date(date: &str) -> Option<chrono::NaiveDate> {
    if date.len() != 10 {
        return None;
    }
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn put_then_get_roundtrips_and_updates_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RawCsvCache::new(dir.path());
        let id = DistrictId::from_str("42").unwrap();

        cache
            .put("2024-07-01", ReportKind::DistrictPerformance, Some(&id), b"a,b\n1,2\n")
            .unwrap();

        assert!(cache.has("2024-07-01", ReportKind::DistrictPerformance, Some(&id)));
        let (content, _checksum) = cache.get("2024-07-01", ReportKind::DistrictPerformance, Some(&id)).unwrap();
        assert_eq!(content, b"a,b\n1,2\n");

        let metadata = cache.load_metadata_for("2024-07-01").unwrap();
        assert_eq!(metadata.integrity.file_count, 1);
        assert!(metadata.presence.districts["42"].district_performance);
    }

    #[test]
    fn cache_district_data_rolls_back_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RawCsvCache::new(dir.path());
        let id = DistrictId::from_str("42").unwrap();

        // Simulate a third-write failure by pre-creating the destination as
        // a directory, which makes the atomic rename fail.
        let district_dir = date_dir(dir.path(), "2025-01-10").join("district-42");
        std::fs::create_dir_all(&district_dir).unwrap();
        std::fs::create_dir_all(district_dir.join("club-performance.csv")).unwrap();

        let result = cache.cache_district_data(&id, "2025-01-10", b"a\n1\n", b"a\n1\n", b"a\n1\n");
        assert!(result.is_err());

        let remaining: Vec<_> = std::fs::read_dir(&district_dir)
            .map(|d| d.filter_map(|e| e.ok()).collect())
            .unwrap_or_default();
        assert!(remaining.is_empty());

        let metadata = cache.load_metadata_for("2025-01-10").unwrap();
        assert_eq!(metadata.integrity.file_count, 0);
        assert!(metadata.integrity.checksums.is_empty());
        assert!(!metadata.presence.districts.contains_key("42"));
    }

    #[test]
    fn get_on_missing_file_records_a_cache_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RawCsvCache::new(dir.path());
        let id = DistrictId::from_str("42").unwrap();

        let err = cache.get("2024-07-01", ReportKind::DistrictPerformance, Some(&id));
        assert!(err.is_err());

        let metadata = cache.load_metadata_for("2024-07-01").unwrap();
        assert_eq!(metadata.download_stats.cache_misses, 1);
        assert_eq!(metadata.download_stats.cache_hits, 0);
    }

    #[test]
    fn list_dates_sorted_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RawCsvCache::new(dir.path());
        cache.put("2024-07-05", ReportKind::AllDistricts, None, b"a\n1\n").unwrap();
        cache.put("2024-07-01", ReportKind::AllDistricts, None, b"a\n1\n").unwrap();
        assert_eq!(cache.list_dates().unwrap(), vec!["2024-07-01", "2024-07-05"]);
    }
}
