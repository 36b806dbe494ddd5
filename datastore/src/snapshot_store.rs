//! Manifest + per-district data files; discovery and batch reads
//! (spec §4.5) — grounded on the teacher's `hierarchy` directory-listing
//! iterators and `DataStore`'s path-escape guards, generalized from backup
//! groups/snapshots to one dated manifest with per-district files.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Error};
use district_report_types::error::PipelineError;
use district_report_types::manifest::{ArtifactVersions, SnapshotManifest};
use district_report_types::DistrictId;
use district_report_tools::fs::{ensure_dir_exists, replace_file};
use once_cell::sync::Lazy;
use regex::Regex;

static SNAPSHOT_ID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

pub struct SnapshotStore {
    base: PathBuf,
}

/// Rejects snapshot ids and district ids that could escape the store root;
/// both are validated against strict formats before touching the
/// filesystem (spec §4.5: "reads reject paths that escape the store root").
fn validate_snapshot_id(snapshot_id: &str) -> Result<(), Error> {
    if !SNAPSHOT_ID_REGEX.is_match(snapshot_id) {
        bail!("invalid snapshot id '{snapshot_id}'");
    }
    Ok(())
}

impl SnapshotStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        SnapshotStore { base: base.into() }
    }

    fn snapshot_dir(&self, snapshot_id: &str) -> Result<PathBuf, Error> {
        validate_snapshot_id(snapshot_id)?;
        Ok(self.base.join(snapshot_id))
    }

    fn manifest_path(&self, snapshot_id: &str) -> Result<PathBuf, Error> {
        Ok(self.snapshot_dir(snapshot_id)?.join("manifest.json"))
    }

    fn district_path(&self, snapshot_id: &str, district_id: &DistrictId) -> Result<PathBuf, Error> {
        Ok(self
            .snapshot_dir(snapshot_id)?
            .join("districts")
            .join(format!("district_{district_id}.json")))
    }

    fn analytics_path(&self, snapshot_id: &str, name: &str) -> Result<PathBuf, Error> {
        Ok(self.snapshot_dir(snapshot_id)?.join("analytics").join(name))
    }

    pub fn write_manifest(&self, manifest: &SnapshotManifest) -> Result<(), Error> {
        let path = self.manifest_path(&manifest.snapshot_id)?;
        ensure_dir_exists(path.parent().unwrap())?;
        let data = serde_json::to_vec_pretty(manifest)?;
        replace_file(&path, &data)
    }

    /// Reads the manifest and rejects one written by an incompatible
    /// pipeline version (spec §4.5/§7: "schema-incompatible — on read,
    /// return a failure naming the offending version").
    pub fn get_snapshot_manifest(&self, snapshot_id: &str) -> Result<Option<SnapshotManifest>, Error> {
        let manifest: Option<SnapshotManifest> = read_json_or_none(&self.manifest_path(snapshot_id)?)?;
        if let Some(manifest) = &manifest {
            if !manifest.versions.compatible_with(&ArtifactVersions::CURRENT) {
                return Err(PipelineError::SchemaIncompatible {
                    found: format!("{:?}", manifest.versions),
                    expected: format!("{:?}", ArtifactVersions::CURRENT),
                }
                .into());
            }
        }
        Ok(manifest)
    }

    /// Lightweight per-snapshot summary, equivalent to the manifest for now
    /// but kept as its own method so callers asking for metadata don't
    /// depend on the full manifest shape.
    pub fn get_snapshot_metadata(&self, snapshot_id: &str) -> Result<Option<SnapshotManifest>, Error> {
        self.get_snapshot_manifest(snapshot_id)
    }

    pub fn get_snapshot_metadata_batch(&self, snapshot_ids: &[String]) -> Vec<(String, Option<SnapshotManifest>)> {
        snapshot_ids
            .iter()
            .map(|id| {
                let manifest = self.get_snapshot_metadata(id).unwrap_or(None);
                (id.clone(), manifest)
            })
            .collect()
    }

    /// Writes one district's validated statistics file.
    pub fn write_district_data<T: serde::Serialize>(
        &self,
        snapshot_id: &str,
        district_id: &DistrictId,
        data: &T,
    ) -> Result<(), Error> {
        let path = self.district_path(snapshot_id, district_id)?;
        ensure_dir_exists(path.parent().unwrap())?;
        let bytes = serde_json::to_vec_pretty(data)?;
        replace_file(&path, &bytes)
    }

    pub fn read_district_data<T: serde::de::DeserializeOwned>(
        &self,
        snapshot_id: &str,
        district_id: &DistrictId,
    ) -> Result<Option<T>, Error> {
        read_json_or_none(&self.district_path(snapshot_id, district_id)?)
    }

    pub fn write_analytics<T: serde::Serialize>(&self, snapshot_id: &str, name: &str, data: &T) -> Result<(), Error> {
        let path = self.analytics_path(snapshot_id, name)?;
        ensure_dir_exists(path.parent().unwrap())?;
        let bytes = serde_json::to_vec_pretty(data)?;
        replace_file(&path, &bytes)
    }

    pub fn read_analytics<T: serde::de::DeserializeOwned>(&self, snapshot_id: &str, name: &str) -> Result<Option<T>, Error> {
        read_json_or_none(&self.analytics_path(snapshot_id, name)?)
    }

    /// Enumerates district ids that have a data file in this snapshot, by
    /// listing the `districts/` directory.
    pub fn list_districts_in_snapshot(&self, snapshot_id: &str) -> Result<Vec<String>, Error> {
        let dir = self.snapshot_dir(snapshot_id)?.join("districts");
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(id) = name
                    .strip_prefix("district_")
                    .and_then(|rest| rest.strip_suffix(".json"))
                {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Cheap prefix listing of snapshot ids — must not read any manifest
    /// (spec §4.5).
    pub fn list_snapshot_ids(&self) -> Result<Vec<String>, Error> {
        if !self.base.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.base)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if SNAPSHOT_ID_REGEX.is_match(name) {
                        ids.push(name.to_string());
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn has_all_districts_rankings(&self, snapshot_id: &str) -> Result<bool, Error> {
        Ok(self.analytics_path(snapshot_id, "manifest.json")?.is_file())
    }

    pub fn read_all_districts_rankings<T: serde::de::DeserializeOwned>(&self, snapshot_id: &str) -> Result<Option<T>, Error> {
        self.read_analytics(snapshot_id, "manifest.json")
    }
}

fn read_json_or_none<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, Error> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(
            serde_json::from_slice(&bytes).with_context(|| format!("unable to parse {:?}", path))?,
        )),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("unable to read {:?}", path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use district_report_types::manifest::{ArtifactVersions, SnapshotStatus};
    use std::str::FromStr;

    fn sample_manifest(date: &str) -> SnapshotManifest {
        SnapshotManifest {
            snapshot_id: date.to_string(),
            versions: ArtifactVersions::CURRENT,
            created_at: chrono::Utc::now(),
            status: SnapshotStatus::Success,
            configured_districts: vec![],
            successful_districts: vec![],
            failed_districts: vec![],
            district_errors: vec![],
            processing_duration_ms: 0,
            data_as_of_date: date.to_string(),
            is_closing_period_data: false,
            collection_date: date.to_string(),
            logical_date: date.to_string(),
            write_complete: true,
            write_failed_districts: vec![],
        }
    }

    #[test]
    fn write_and_read_manifest_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.write_manifest(&sample_manifest("2024-07-01")).unwrap();
        let read = store.get_snapshot_manifest("2024-07-01").unwrap().unwrap();
        assert_eq!(read.snapshot_id, "2024-07-01");
    }

    #[test]
    fn rejects_invalid_snapshot_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.get_snapshot_manifest("../../etc/passwd").is_err());
    }

    #[test]
    fn rejects_manifest_with_incompatible_major_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let mut manifest = sample_manifest("2024-07-03");
        manifest.versions.schema_version = (2, 0, 0);
        store.write_manifest(&manifest).unwrap();

        let err = store.get_snapshot_manifest("2024-07-03").unwrap_err();
        assert!(err.to_string().contains("schema incompatible"));
    }

    #[test]
    fn list_districts_in_snapshot_reads_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let id42 = DistrictId::from_str("42").unwrap();
        store.write_district_data("2024-07-01", &id42, &serde_json::json!({"ok": true})).unwrap();
        let ids = store.list_districts_in_snapshot("2024-07-01").unwrap();
        assert_eq!(ids, vec!["42".to_string()]);
    }

    #[test]
    fn list_snapshot_ids_does_not_read_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.write_manifest(&sample_manifest("2024-07-02")).unwrap();
        // Corrupt the manifest; list_snapshot_ids must still succeed since
        // it only lists directory names.
        std::fs::write(dir.path().join("2024-07-02").join("manifest.json"), b"not json").unwrap();
        assert_eq!(store.list_snapshot_ids().unwrap(), vec!["2024-07-02".to_string()]);
    }
}
