//! History archive — timestamped, read-only copies of the manifest and the
//! detection summary.
//!
//! Snapshots live in `<root>/.regen/history/<id>/` where `<id>` is the UTC
//! time of the archive (`20260101T120000.000000Z`, with a `-NNN` suffix on a
//! same-microsecond collision). Ids sort lexicographically in creation order,
//! which is what pruning relies on.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{io_err, StoreError};
use crate::manifest::write_atomic;
use crate::paths::{detection_path, history_dir, manifest_path, DETECTION_FILE, MANIFEST_FILE};
use crate::types::Manifest;

/// Snapshots kept after a successful regeneration unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// An archived snapshot on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: String,
    pub path: PathBuf,
    /// `generated_at` of the archived manifest, when it parses.
    pub generated_at: Option<DateTime<Utc>>,
    pub file_count: usize,
    pub has_detection: bool,
}

/// Copy the live manifest (and detection summary, if any) into a new snapshot.
///
/// Returns `None` without touching the filesystem when no manifest exists.
/// The live files are only read.
pub fn archive(root: &Path) -> Result<Option<PathBuf>, StoreError> {
    let manifest = manifest_path(root);
    if !manifest.exists() {
        return Ok(None);
    }

    let dir = create_snapshot_dir(root)?;
    let target = dir.join(MANIFEST_FILE);
    std::fs::copy(&manifest, &target).map_err(|e| io_err(&manifest, e))?;
    set_read_only(&target)?;

    let detection = detection_path(root);
    if detection.exists() {
        let target = dir.join(DETECTION_FILE);
        std::fs::copy(&detection, &target).map_err(|e| io_err(&detection, e))?;
        set_read_only(&target)?;
    }

    tracing::info!(snapshot = %dir.display(), "archived manifest");
    Ok(Some(dir))
}

/// Remove the oldest snapshots so that at most `keep` remain.
///
/// Returns the removed snapshot directories, oldest first.
pub fn prune(root: &Path, keep: usize) -> Result<Vec<PathBuf>, StoreError> {
    let ids = snapshot_ids(root)?;
    if ids.len() <= keep {
        return Ok(vec![]);
    }

    let excess = ids.len() - keep;
    let mut removed = Vec::with_capacity(excess);
    for id in ids.into_iter().take(excess) {
        let dir = history_dir(root).join(&id);
        std::fs::remove_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        tracing::debug!(snapshot = %dir.display(), "pruned snapshot");
        removed.push(dir);
    }
    Ok(removed)
}

/// All snapshots, oldest first.
pub fn list(root: &Path) -> Result<Vec<Snapshot>, StoreError> {
    let mut snapshots = Vec::new();
    for id in snapshot_ids(root)? {
        let path = history_dir(root).join(&id);
        let manifest = std::fs::read_to_string(path.join(MANIFEST_FILE))
            .ok()
            .and_then(|s| serde_json::from_str::<Manifest>(&s).ok());
        snapshots.push(Snapshot {
            generated_at: manifest.as_ref().map(|m| m.generated_at),
            file_count: manifest.as_ref().map_or(0, |m| m.files.len()),
            has_detection: path.join(DETECTION_FILE).exists(),
            id,
            path,
        });
    }
    Ok(snapshots)
}

/// Make snapshot `id` the live state again.
///
/// The current state is archived first, so a rollback can itself be rolled
/// back. Returns the snapshot holding the pre-rollback state, if there was one.
pub fn rollback(root: &Path, id: &str) -> Result<Option<PathBuf>, StoreError> {
    let snapshot = history_dir(root).join(id);
    let snapshot_manifest = snapshot.join(MANIFEST_FILE);
    if !snapshot_manifest.exists() {
        return Err(StoreError::SnapshotNotFound { path: snapshot });
    }
    let manifest_bytes =
        std::fs::read(&snapshot_manifest).map_err(|e| io_err(&snapshot_manifest, e))?;
    // Refuse to restore something the store could not load afterwards.
    serde_json::from_slice::<Manifest>(&manifest_bytes)?;

    let previous = archive(root)?;

    write_atomic(&manifest_path(root), &manifest_bytes)?;

    let snapshot_detection = snapshot.join(DETECTION_FILE);
    let live_detection = detection_path(root);
    if snapshot_detection.exists() {
        let bytes =
            std::fs::read(&snapshot_detection).map_err(|e| io_err(&snapshot_detection, e))?;
        write_atomic(&live_detection, &bytes)?;
    } else {
        match std::fs::remove_file(&live_detection) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(&live_detection, err)),
        }
    }

    tracing::info!(snapshot = %id, "rolled back manifest");
    Ok(previous)
}

fn snapshot_ids(root: &Path) -> Result<Vec<String>, StoreError> {
    let dir = history_dir(root);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(io_err(&dir, err)),
    };
    let mut ids: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    ids.sort();
    Ok(ids)
}

fn create_snapshot_dir(root: &Path) -> Result<PathBuf, StoreError> {
    let base_dir = history_dir(root);
    std::fs::create_dir_all(&base_dir).map_err(|e| io_err(&base_dir, e))?;

    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();
    for n in 0u32.. {
        let id = if n == 0 {
            stamp.clone()
        } else {
            format!("{stamp}-{n:03}")
        };
        let dir = base_dir.join(id);
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(io_err(&dir, err)),
        }
    }
    unreachable!("u32 range exhausted while naming a snapshot")
}

#[cfg(unix)]
fn set_read_only(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o444))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_read_only(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}
