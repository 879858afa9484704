//! Conflict resolution around a regeneration pass.
//!
//! The generator writes straight into the writable root and retries clear it,
//! so resolution happens in two halves:
//!
//! 1. [`plan`] (before generation) decides one [`Action`] per known path. Every
//!    path not planned as [`Action::Overwrite`] is stashed by the caller, and
//!    [`vacate`] then removes user content from the root, so whatever sits at
//!    those paths after generation was written by the generator.
//! 2. [`apply`] (after the retry loop, success or failure) compares what the
//!    generator left behind with the stash and settles each path.
//!
//! [`rebuild`] then derives the next manifest from the settled tree.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use regen_core::digest::digest;
use regen_core::manifest::{record_file, write_atomic};
use regen_core::types::in_scope;
use regen_core::{ComponentScope, Fingerprint, Manifest, RelPath};

use crate::detect::DriftReport;
use crate::error::{io_err, SyncError};
use crate::stash::{remove_file_if_exists, Stash};
use crate::workspace;

/// Suffix of the sibling that receives generated content for a user-modified file.
pub const FORK_SUFFIX: &str = ".new";
/// Suffix of the sibling that keeps user content before a forced overwrite.
pub const BACKUP_SUFFIX: &str = ".bak";

// ---------------------------------------------------------------------------
// Policy and plan
// ---------------------------------------------------------------------------

/// Resolution policy for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    pub force_overwrite: bool,
    pub scope: Option<ComponentScope>,
}

/// Planned handling of one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Outside the component scope: content and manifest entry stay as they are.
    Untouched,
    /// Tracked and unmodified: the generator may replace it freely.
    Overwrite,
    /// User content; generated content goes to `<path>.new`.
    Fork,
    /// User content; copied to `<path>.bak`, then replaced.
    BackupAndOverwrite,
    /// A `.new` / `.bak` sibling from an earlier pass, kept as-is.
    Artifact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedFile {
    pub path: RelPath,
    pub action: Action,
    /// The path has a manifest entry.
    pub tracked: bool,
}

/// Per-path decisions for one pass, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct ResolutionPlan {
    pub policy: Policy,
    pub files: BTreeMap<RelPath, PlannedFile>,
}

impl ResolutionPlan {
    pub fn action(&self, path: &RelPath) -> Option<Action> {
        self.files.get(path).map(|f| f.action)
    }

    /// Paths whose pre-run bytes must be stashed.
    pub fn protected(&self) -> impl Iterator<Item = &RelPath> {
        self.files
            .values()
            .filter(|f| f.action != Action::Overwrite)
            .map(|f| &f.path)
    }

    fn with_action(&self, action: Action) -> impl Iterator<Item = &PlannedFile> {
        self.files.values().filter(move |f| f.action == action)
    }
}

/// `true` if `path` is a `.new` / `.bak` sibling of a known file, tracked or
/// present on disk.
fn is_artifact(path: &RelPath, known: &BTreeSet<&RelPath>) -> bool {
    [FORK_SUFFIX, BACKUP_SUFFIX].iter().any(|suffix| {
        path.as_str()
            .strip_suffix(suffix)
            .is_some_and(|base| known.contains(&RelPath::from(base)))
    })
}

/// Decide the handling of every tracked and every untracked path in `report`.
pub fn plan(report: &DriftReport, policy: &Policy) -> ResolutionPlan {
    let scope = policy.scope.as_ref();
    let user_content = if policy.force_overwrite {
        Action::BackupAndOverwrite
    } else {
        Action::Fork
    };

    let mut files = BTreeMap::new();
    for status in &report.files {
        let action = if !in_scope(scope, &status.path) {
            Action::Untouched
        } else if !status.user_modified {
            Action::Overwrite
        } else {
            user_content
        };
        files.insert(
            status.path.clone(),
            PlannedFile {
                path: status.path.clone(),
                action,
                tracked: true,
            },
        );
    }

    let known: BTreeSet<&RelPath> = report
        .files
        .iter()
        .map(|f| &f.path)
        .chain(report.untracked.iter())
        .collect();
    for path in &report.untracked {
        // Untracked files on disk are user-created.
        let action = if is_artifact(path, &known) {
            Action::Artifact
        } else if !in_scope(scope, path) {
            Action::Untouched
        } else {
            user_content
        };
        files.insert(
            path.clone(),
            PlannedFile {
                path: path.clone(),
                action,
                tracked: false,
            },
        );
    }

    for file in files.values() {
        tracing::debug!(path = %file.path, action = ?file.action, "planned");
    }
    ResolutionPlan {
        policy: policy.clone(),
        files,
    }
}

/// Remove every file planned as user content from `root` before generation.
///
/// Call only after the stash holds their bytes; [`apply`] puts them back.
/// Returns the number of files removed.
pub fn vacate(root: &Path, plan: &ResolutionPlan) -> Result<usize, SyncError> {
    let mut removed = 0;
    for file in plan
        .with_action(Action::Fork)
        .chain(plan.with_action(Action::BackupAndOverwrite))
    {
        let abs = file.path.to_path(root);
        if abs.is_file() {
            remove_file_if_exists(&abs)?;
            removed += 1;
        }
    }
    tracing::debug!(removed, "vacated user content before generation");
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Resolutions
// ---------------------------------------------------------------------------

/// How a path was settled after generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Outcome {
    /// Generated content in place; tracked from now on.
    Overwritten,
    /// Out of scope or a prior conflict artifact; left as it was before the pass.
    Untouched,
    /// User content kept; the generator produced nothing at this path.
    Preserved,
    /// User content kept; generated content written to `sibling`.
    Forked { sibling: RelPath },
    /// Generated content in place; prior user content copied to `backup`.
    BackedUp { backup: RelPath },
    /// Generator output under an excluded prefix, removed.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub path: RelPath,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Resolution {
    fn new(path: &RelPath, outcome: Outcome) -> Self {
        Self {
            path: path.clone(),
            outcome,
        }
    }
}

/// Settle every path after the retry loop.
///
/// Returns one [`Resolution`] per path that exists (or was removed) after the
/// pass, sorted by path.
pub fn apply(root: &Path, plan: &ResolutionPlan, stash: &Stash) -> Result<Vec<Resolution>, SyncError> {
    let scope = plan.policy.scope.as_ref();
    let produced = workspace::list_files(root)?;
    let mut resolutions = Vec::new();

    // Pass 1: paths that must look exactly as before the pass.
    for file in plan
        .with_action(Action::Untouched)
        .chain(plan.with_action(Action::Artifact))
    {
        stash.restore(&file.path)?;
        resolutions.push(Resolution::new(&file.path, Outcome::Untouched));
    }
    for path in &produced {
        if plan.files.contains_key(path) || in_scope(scope, path) {
            continue;
        }
        let abs = path.to_path(root);
        remove_file_if_exists(&abs)?;
        prune_empty_parents(root, &abs);
        tracing::debug!(path = %path, "discarded out-of-scope output");
        resolutions.push(Resolution::new(path, Outcome::Discarded));
    }

    // Pass 2: user content.
    for file in plan.with_action(Action::Fork) {
        resolutions.push(fork(root, &file.path, stash)?);
    }
    for file in plan.with_action(Action::BackupAndOverwrite) {
        resolutions.push(backup_and_overwrite(root, &file.path, stash)?);
    }

    // Siblings rewritten above are reported through their base path only.
    let forked: BTreeSet<RelPath> = resolutions
        .iter()
        .filter_map(|r| match &r.outcome {
            Outcome::Forked { sibling } => Some(sibling.clone()),
            Outcome::BackedUp { backup } => Some(backup.clone()),
            _ => None,
        })
        .collect();
    resolutions.retain(|r| !(r.outcome == Outcome::Untouched && forked.contains(&r.path)));

    // Pass 3: the normal path.
    for path in &produced {
        let planned = plan.action(path);
        let fresh = planned.is_none() && in_scope(scope, path) && !forked.contains(path);
        if planned == Some(Action::Overwrite) || fresh {
            resolutions.push(Resolution::new(path, Outcome::Overwritten));
        }
    }
    for file in plan.with_action(Action::Overwrite) {
        if !path_exists(root, &file.path) {
            tracing::debug!(path = %file.path, "no longer generated");
        }
    }

    resolutions.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(resolutions)
}

fn fork(root: &Path, path: &RelPath, stash: &Stash) -> Result<Resolution, SyncError> {
    let abs = path.to_path(root);
    let generated = digest(&abs)?;
    let original = stash.original(path).cloned().unwrap_or(Fingerprint::Absent);

    if let Some(settled) = settle_trivial(path, &generated, &original, stash)? {
        return Ok(settled);
    }

    let sibling = path.with_suffix(FORK_SUFFIX);
    let sibling_abs = sibling.to_path(root);
    remove_file_if_exists(&sibling_abs)?;
    std::fs::rename(&abs, &sibling_abs).map_err(|e| io_err(&sibling_abs, e))?;
    stash.restore(path)?;
    tracing::info!(path = %path, sibling = %sibling, "conflict: generated content written beside user copy");
    Ok(Resolution::new(path, Outcome::Forked { sibling }))
}

fn backup_and_overwrite(root: &Path, path: &RelPath, stash: &Stash) -> Result<Resolution, SyncError> {
    let abs = path.to_path(root);
    let generated = digest(&abs)?;
    let original = stash.original(path).cloned().unwrap_or(Fingerprint::Absent);

    if let Some(settled) = settle_trivial(path, &generated, &original, stash)? {
        return Ok(settled);
    }

    // A user-deleted file has nothing to back up.
    let Some(bytes) = stash.read(path)? else {
        return Ok(Resolution::new(path, Outcome::Overwritten));
    };
    let backup = path.with_suffix(BACKUP_SUFFIX);
    write_atomic(&backup.to_path(root), &bytes)?;
    tracing::info!(path = %path, backup = %backup, "overwrote user content after backup");
    Ok(Resolution::new(path, Outcome::BackedUp { backup }))
}

/// Cases with no conflict: the generator did not emit the path, or emitted
/// exactly the bytes the user had. Relies on [`vacate`] having emptied the path.
fn settle_trivial(
    path: &RelPath,
    generated: &Fingerprint,
    original: &Fingerprint,
    stash: &Stash,
) -> Result<Option<Resolution>, SyncError> {
    if generated.is_absent() {
        stash.restore(path)?;
        tracing::debug!(path = %path, "preserved user content");
        return Ok(Some(Resolution::new(path, Outcome::Preserved)));
    }
    if generated == original {
        tracing::debug!(path = %path, "generated content matches user content");
        return Ok(Some(Resolution::new(path, Outcome::Overwritten)));
    }
    Ok(None)
}

fn path_exists(root: &Path, path: &RelPath) -> bool {
    path.to_path(root).is_file()
}

/// Remove now-empty directories between `file` and `root`.
fn prune_empty_parents(root: &Path, file: &Path) {
    let mut dir = file.parent();
    while let Some(d) = dir {
        if d == root || std::fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
}

// ---------------------------------------------------------------------------
// Manifest rebuild
// ---------------------------------------------------------------------------

/// Derive the next manifest from the settled tree.
///
/// - Overwritten / backed-up paths are (re)recorded with their on-disk digest.
/// - Untouched, preserved and forked paths keep their prior entry verbatim.
/// - Anything else (artifacts, untracked user files, discarded output) is not
///   tracked. Entries whose path no longer exists are dropped, except for
///   out-of-scope entries, which a scoped pass never alters.
pub fn rebuild(
    root: &Path,
    prior: Option<&Manifest>,
    resolutions: &[Resolution],
    generated_at: DateTime<Utc>,
    input_fingerprint: Fingerprint,
    upstream_revision: Option<String>,
) -> Result<Manifest, SyncError> {
    let mut next = Manifest::new(generated_at, input_fingerprint, upstream_revision);
    let prior_entry = |path: &RelPath| prior.and_then(|m| m.files.get(path)).cloned();

    for resolution in resolutions {
        let path = &resolution.path;
        match &resolution.outcome {
            Outcome::Overwritten | Outcome::BackedUp { .. } => {
                let fingerprint = digest(&path.to_path(root))?;
                if !fingerprint.is_absent() {
                    record_file(&mut next, path.clone(), fingerprint);
                }
            }
            Outcome::Untouched => {
                if let Some(entry) = prior_entry(path) {
                    next.files.insert(path.clone(), entry);
                }
            }
            Outcome::Preserved | Outcome::Forked { .. } => {
                if let Some(entry) = prior_entry(path) {
                    if path_exists(root, path) {
                        next.files.insert(path.clone(), entry);
                    }
                }
            }
            Outcome::Discarded => {}
        }
    }
    Ok(next)
}
