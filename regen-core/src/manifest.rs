//! Manifest store — persisted record of every generated file.
//!
//! Persists a [`Manifest`] JSON document at `<root>/.regen/manifest.json`.
//! Writes go to `<path>.tmp` and are renamed into place, so a crash mid-write
//! leaves the previous manifest intact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{io_err, StoreError};
use crate::history;
use crate::paths::manifest_path;
use crate::types::{Fingerprint, ManagedFile, Manifest, RelPath};

/// Load the manifest under `root`.
///
/// Returns `Ok(None)` when no manifest exists yet, and also when the stored
/// document is malformed: a corrupt store degrades to a full regeneration.
pub fn load(root: &Path) -> Result<Option<Manifest>, StoreError> {
    let path = manifest_path(root);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) if err.kind() == ErrorKind::InvalidData => {
            tracing::warn!(path = %path.display(), "manifest is not UTF-8; treating as absent");
            return Ok(None);
        }
        Err(err) => return Err(io_err(&path, err)),
    };
    match serde_json::from_str::<Manifest>(&contents) {
        Ok(manifest) => Ok(Some(manifest)),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "manifest is corrupt; treating as no prior generation"
            );
            Ok(None)
        }
    }
}

/// Save the manifest under `root` atomically.
pub fn save(root: &Path, manifest: &Manifest) -> Result<(), StoreError> {
    let path = manifest_path(root);
    let json = serde_json::to_string_pretty(manifest)?;
    write_atomic(&path, json.as_bytes())
}

/// Insert or overwrite the entry for `path` as freshly generated content.
pub fn record_file(manifest: &mut Manifest, path: RelPath, fingerprint: Fingerprint) {
    manifest
        .files
        .insert(path, ManagedFile::generated(fingerprint, Utc::now()));
}

/// Snapshot the live manifest into the history archive.
///
/// Returns `None` when there is no manifest to archive yet.
pub fn archive(root: &Path) -> Result<Option<PathBuf>, StoreError> {
    history::archive(root)
}

/// Write `bytes` to `<path>.tmp` then rename onto `path`.
///
/// Creates parent directories. The `.tmp` sibling lives in the same directory
/// as the target, so the rename never crosses filesystems.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("path has no parent")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let tmp = tmp_path(path);
    std::fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
