//! Pre-generation copies of every file the generator must not clobber.
//!
//! # Layout
//!
//! ```text
//! <root>/.regen/stash/
//!   index.json      written last; its presence marks a complete stash
//!   files/<rel>     byte copies of files that existed
//! ```
//!
//! A stash left behind by an interrupted run is restored before the next run
//! does anything else.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use regen_core::digest::digest;
use regen_core::manifest::write_atomic;
use regen_core::paths::stash_dir;
use regen_core::{Fingerprint, RelPath};

use crate::error::{io_err, SyncError};

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Serialize, Deserialize)]
struct StashIndex {
    created_at: DateTime<Utc>,
    /// Pre-run fingerprint per path; `absent` means the path did not exist.
    entries: BTreeMap<RelPath, Fingerprint>,
}

/// Pre-run state of the protected files under a writable root.
#[derive(Debug)]
pub struct Stash {
    root: PathBuf,
    entries: BTreeMap<RelPath, Fingerprint>,
}

impl Stash {
    /// Copy `paths` (relative to `root`) into a fresh stash.
    pub fn capture<'a, I>(root: &Path, paths: I) -> Result<Self, SyncError>
    where
        I: IntoIterator<Item = &'a RelPath>,
    {
        let dir = stash_dir(root);
        remove_dir_if_exists(&dir)?;

        let mut entries = BTreeMap::new();
        for path in paths {
            let source = path.to_path(root);
            let fingerprint = digest(&source)?;
            if !fingerprint.is_absent() {
                let target = path.to_path(&dir.join("files"));
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
                }
                std::fs::copy(&source, &target).map_err(|e| io_err(&source, e))?;
            }
            entries.insert(path.clone(), fingerprint);
        }

        let index = StashIndex {
            created_at: Utc::now(),
            entries,
        };
        let json = serde_json::to_string_pretty(&index)?;
        write_atomic(&dir.join(INDEX_FILE), json.as_bytes())?;
        tracing::debug!(files = index.entries.len(), "stashed protected files");

        Ok(Self {
            root: root.to_path_buf(),
            entries: index.entries,
        })
    }

    /// Pre-run fingerprint of `path`, if it was stashed.
    pub fn original(&self, path: &RelPath) -> Option<&Fingerprint> {
        self.entries.get(path)
    }

    /// Pre-run bytes of `path`; `None` if it did not exist (or was not stashed).
    pub fn read(&self, path: &RelPath) -> Result<Option<Vec<u8>>, SyncError> {
        match self.entries.get(path) {
            Some(fp) if !fp.is_absent() => {
                let file = self.file_path(path);
                std::fs::read(&file).map(Some).map_err(|e| io_err(&file, e))
            }
            _ => Ok(None),
        }
    }

    /// Put `path` back into its pre-run state. No-op when it already is.
    ///
    /// Returns `true` if the filesystem was changed.
    pub fn restore(&self, path: &RelPath) -> Result<bool, SyncError> {
        let Some(original) = self.entries.get(path) else {
            return Ok(false);
        };
        let target = path.to_path(&self.root);
        if &digest(&target)? == original {
            return Ok(false);
        }
        match self.read(path)? {
            Some(bytes) => write_atomic(&target, &bytes)?,
            None => remove_file_if_exists(&target)?,
        }
        tracing::debug!(path = %path, "restored from stash");
        Ok(true)
    }

    /// Delete the stash once the pass has been reconciled.
    pub fn discard(self) -> Result<(), SyncError> {
        remove_dir_if_exists(&stash_dir(&self.root))
    }

    /// Restore a stash left by an interrupted run, then delete it.
    ///
    /// Returns the number of files put back. A stash without an index was
    /// never completed and protects nothing, so it is just removed.
    pub fn recover_stale(root: &Path) -> Result<usize, SyncError> {
        let dir = stash_dir(root);
        let index_path = dir.join(INDEX_FILE);
        let contents = match std::fs::read_to_string(&index_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                remove_dir_if_exists(&dir)?;
                return Ok(0);
            }
            Err(err) => return Err(io_err(&index_path, err)),
        };
        let index: StashIndex = serde_json::from_str(&contents)?;
        tracing::warn!(
            created_at = %index.created_at,
            files = index.entries.len(),
            "found stash from an interrupted run; restoring protected files"
        );

        let stash = Self {
            root: root.to_path_buf(),
            entries: index.entries,
        };
        let mut restored = 0;
        for path in stash.entries.keys() {
            if stash.restore(path)? {
                restored += 1;
            }
        }
        stash.discard()?;
        Ok(restored)
    }

    fn file_path(&self, path: &RelPath) -> PathBuf {
        path.to_path(&stash_dir(&self.root).join("files"))
    }
}

fn remove_dir_if_exists(dir: &Path) -> Result<(), SyncError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(dir, err)),
    }
}

pub(crate) fn remove_file_if_exists(path: &Path) -> Result<(), SyncError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(path, err)),
    }
}
