//! Unified diffs for pending conflicts (`regen diff`).
//!
//! A pending conflict is a `<path>.new` sibling left by a forked resolution.
//! The diff runs from the user's copy (`a/<path>`) to the generated one
//! (`b/<path>.new`).

use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use similar::TextDiff;

use regen_core::RelPath;

use crate::error::{io_err, SyncError};
use crate::resolve::FORK_SUFFIX;
use crate::workspace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    /// The user's file.
    pub path: RelPath,
    /// The generated sibling.
    pub sibling: RelPath,
    pub unified_diff: String,
}

/// Diff every pending `.new` sibling under `root`, or only the one for `only`.
///
/// `only` may name either the file or its `.new` sibling.
pub fn pending_conflicts(root: &Path, only: Option<&RelPath>) -> Result<Vec<FileDiff>, SyncError> {
    let only = only.map(|p| {
        p.as_str()
            .strip_suffix(FORK_SUFFIX)
            .map(RelPath::from)
            .unwrap_or_else(|| p.clone())
    });

    let mut diffs = Vec::new();
    for sibling in workspace::list_files(root)? {
        let Some(base) = sibling.as_str().strip_suffix(FORK_SUFFIX) else {
            continue;
        };
        let path = RelPath::from(base);
        if only.as_ref().is_some_and(|o| o != &path) {
            continue;
        }

        let old = read_text_or_empty(&path.to_path(root))?;
        let new = read_text_or_empty(&sibling.to_path(root))?;
        if old == new {
            continue;
        }
        let unified_diff = match (old, new) {
            (Some(old), Some(new)) => TextDiff::from_lines(&old, &new)
                .unified_diff()
                .header(&format!("a/{path}"), &format!("b/{sibling}"))
                .context_radius(3)
                .to_string(),
            _ => format!("Binary files a/{path} and b/{sibling} differ\n"),
        };
        diffs.push(FileDiff {
            path,
            sibling,
            unified_diff,
        });
    }
    Ok(diffs)
}

/// `Some(text)` with normalised line endings, `Some("")` when missing,
/// `None` when the bytes are not UTF-8.
fn read_text_or_empty(path: &Path) -> Result<Option<String>, SyncError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8(bytes)
            .ok()
            .map(|s| normalize_line_endings(&s))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Some(String::new())),
        Err(err) => Err(io_err(path, err)),
    }
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}
