//! File system helper utilities.
//!
//! Grounded on the teacher's `pbs_tools::fs` directory-scanning helpers,
//! reimplemented over `std::fs` instead of raw `nix` directory handles since
//! this pipeline has no need for openat-relative scanning, and extended with
//! the atomic replace-file routine the snapshot store and raw cache rely on
//! for crash-safe writes (spec §4.3, §4.5: "write to a temp file in the same
//! directory, then rename").

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Error};
use regex::Regex;

/// Scan a directory for entries whose file name matches `regex`, calling
/// `callback` with each matching name. Non-UTF8 names are skipped silently.
pub fn scandir<F>(dir: &Path, regex: &Regex, mut callback: F) -> Result<(), Error>
where
    F: FnMut(&str, std::fs::FileType) -> Result<(), Error>,
{
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("unable to read directory {:?}", dir))?;

    for entry in entries {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if !regex.is_match(&name) {
            continue;
        }
        let file_type = entry
            .file_type()
            .with_context(|| format!("unable to detect file type for {:?}", entry.path()))?;
        callback(&name, file_type)?;
    }

    Ok(())
}

/// Write `data` to `path` atomically: write to a `.tmp` sibling file in the
/// same directory, `fsync`, then rename over the destination. A reader never
/// observes a partially-written file (spec invariant: "snapshot files are
/// never observed partially written").
pub fn replace_file(path: &Path, data: &[u8]) -> Result<(), Error> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path {:?} has no parent directory", path))?;

    let tmp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file"),
        std::process::id(),
    ));

    let mut file = File::create(&tmp_path)
        .with_context(|| format!("unable to create temporary file {:?}", tmp_path))?;
    file.write_all(data)
        .with_context(|| format!("unable to write temporary file {:?}", tmp_path))?;
    file.sync_all()
        .with_context(|| format!("unable to fsync temporary file {:?}", tmp_path))?;
    drop(file);

    std::fs::rename(&tmp_path, path).with_context(|| {
        format!("unable to rename {:?} to {:?}", tmp_path, path)
    })?;

    Ok(())
}

/// Create `dir` if it does not already exist, erroring if the path exists
/// and is not a directory.
pub fn ensure_dir_exists(dir: &Path) -> Result<(), Error> {
    match std::fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => {
            if dir.is_dir() {
                Ok(())
            } else {
                bail!("unable to create directory {:?} - {}", dir, err)
            }
        }
    }
}
