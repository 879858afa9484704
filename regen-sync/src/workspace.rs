//! Writable-root traversal and clean-slate clearing.
//!
//! The state directory and VCS metadata (see
//! [`regen_core::paths::PRESERVED_ENTRIES`]) are invisible to both operations.

use std::path::Path;

use walkdir::WalkDir;

use regen_core::paths::is_preserved_entry;
use regen_core::RelPath;

use crate::error::{io_err, SyncError};

/// Every regular file under `root`, sorted by path.
pub fn list_files(root: &Path) -> Result<Vec<RelPath>, SyncError> {
    if !root.exists() {
        return Ok(vec![]);
    }
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && is_preserved_entry(&e.file_name().to_string_lossy())));

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(rel) = RelPath::from_path(root, entry.path()) {
            files.push(rel);
        }
    }
    files.sort();
    Ok(files)
}

/// Remove every top-level entry of `root` except preserved ones.
///
/// Returns the number of top-level entries removed.
pub fn clear(root: &Path) -> Result<usize, SyncError> {
    let entries = std::fs::read_dir(root).map_err(|e| io_err(root, e))?;
    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(root, e))?;
        if is_preserved_entry(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;
        if file_type.is_dir() {
            std::fs::remove_dir_all(&path).map_err(|e| io_err(&path, e))?;
        } else {
            std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        }
        removed += 1;
    }
    tracing::debug!(root = %root.display(), removed, "cleared writable root");
    Ok(removed)
}
