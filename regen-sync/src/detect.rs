//! Change detection: which managed files has a human touched since the last
//! regeneration?
//!
//! Detection is a pure read of the filesystem. Running it twice with no
//! change in between yields identical reports.
//!
//! Signal precedence for [`DriftReport::signal`]:
//! 1. `NeverGenerated` (no manifest)
//! 2. `Modified` (a tracked file's bytes differ, or it was deleted)
//! 3. `Untracked` (files on disk the manifest does not know)
//! 4. `SpecChanged` (the specification text differs from the one generated from)
//! 5. `Current`

use std::collections::BTreeSet;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use regen_core::digest::digest;
use regen_core::{Fingerprint, Manifest, RelPath};

use crate::error::SyncError;
use crate::workspace;

/// Detection result for one tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    pub path: RelPath,
    pub generated: Fingerprint,
    pub current: Fingerprint,
    pub user_modified: bool,
}

impl FileStatus {
    /// The user deleted a tracked file.
    pub fn is_missing(&self) -> bool {
        self.current.is_absent()
    }
}

/// Outcome of one detection pass over a writable root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub manifest_present: bool,
    /// One status per manifest entry, sorted by path.
    pub files: Vec<FileStatus>,
    /// Files on disk with no manifest entry, sorted by path.
    pub untracked: Vec<RelPath>,
    /// `Some(true)` when a specification was supplied and its fingerprint
    /// differs from the manifest's input fingerprint.
    pub spec_changed: Option<bool>,
}

/// Summary classification of a [`DriftReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftSignal {
    NeverGenerated,
    Current,
    Modified { files: Vec<RelPath> },
    Untracked { files: Vec<RelPath> },
    SpecChanged,
}

/// Recompute current fingerprints for every entry of `manifest`.
///
/// `spec` is the fingerprint of the specification about to be used, if known.
pub fn detect(
    root: &Path,
    manifest: Option<&Manifest>,
    spec: Option<&Fingerprint>,
) -> Result<DriftReport, SyncError> {
    let Some(manifest) = manifest else {
        return Ok(DriftReport {
            manifest_present: false,
            files: vec![],
            untracked: workspace::list_files(root)?,
            spec_changed: None,
        });
    };

    let mut files = Vec::with_capacity(manifest.files.len());
    for (path, entry) in &manifest.files {
        let current = digest(&path.to_path(root))?;
        let user_modified = current != entry.generated_fingerprint;
        if user_modified {
            tracing::debug!(path = %path, missing = current.is_absent(), "drift detected");
        }
        files.push(FileStatus {
            path: path.clone(),
            generated: entry.generated_fingerprint.clone(),
            current,
            user_modified,
        });
    }

    let tracked: BTreeSet<&RelPath> = manifest.files.keys().collect();
    let untracked = workspace::list_files(root)?
        .into_iter()
        .filter(|p| !tracked.contains(p))
        .collect();

    Ok(DriftReport {
        manifest_present: true,
        files,
        untracked,
        spec_changed: spec.map(|fp| fp != &manifest.input_fingerprint),
    })
}

impl DriftReport {
    pub fn modified(&self) -> impl Iterator<Item = &FileStatus> {
        self.files.iter().filter(|f| f.user_modified)
    }

    pub fn status(&self, path: &RelPath) -> Option<&FileStatus> {
        self.files
            .binary_search_by(|f| f.path.cmp(path))
            .ok()
            .map(|i| &self.files[i])
    }

    /// Write the recomputed fingerprints and flags back into `manifest`.
    pub fn refresh(&self, manifest: &mut Manifest) {
        let now = Utc::now();
        for status in &self.files {
            if let Some(entry) = manifest.files.get_mut(&status.path) {
                entry.current_fingerprint = status.current.clone();
                entry.user_modified = status.user_modified;
                entry.last_updated = now;
            }
        }
    }

    pub fn signal(&self) -> DriftSignal {
        if !self.manifest_present {
            return DriftSignal::NeverGenerated;
        }
        let modified: Vec<RelPath> = self.modified().map(|f| f.path.clone()).collect();
        if !modified.is_empty() {
            return DriftSignal::Modified { files: modified };
        }
        if !self.untracked.is_empty() {
            return DriftSignal::Untracked {
                files: self.untracked.clone(),
            };
        }
        if self.spec_changed == Some(true) {
            return DriftSignal::SpecChanged;
        }
        DriftSignal::Current
    }
}
