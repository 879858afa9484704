//! One regeneration pass, end to end. Shared entrypoint for `regen run`.
//!
//! Order: recover stale stash → load manifest → detect drift → plan →
//! stash protected files → vacate user content → archive history →
//! retry loop → apply resolutions →
//! rebuild and save manifest → discard stash → prune history (success only).

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;

use regen_core::config::Config;
use regen_core::digest::digest_bytes;
use regen_core::paths::{state_dir, templates_dir};
use regen_core::{history, manifest, Manifest};

use crate::collaborator::{Generator, Validator};
use crate::detect::{detect, DriftReport};
use crate::error::{io_err, SyncError};
use crate::feedback::FeedbackRenderer;
use crate::resolve::{self, Policy, Resolution};
use crate::retry::{AttemptContext, RetryOrchestrator, RetryOutcome};
use crate::stash::Stash;

/// Everything a pass needs, threaded explicitly.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub root: PathBuf,
    pub readable_roots: Vec<PathBuf>,
    pub policy: Policy,
    pub max_attempts: u32,
    pub history_limit: usize,
    pub upstream_revision: Option<String>,
}

impl RunContext {
    /// Build a context from config; the upstream revision is read from the
    /// first readable root.
    pub fn from_config(root: &Path, config: &Config, policy: Policy) -> Self {
        let readable_roots = config.resolved_readable_roots(root);
        let upstream_revision = upstream_revision(&readable_roots);
        Self {
            root: root.to_path_buf(),
            readable_roots,
            policy,
            max_attempts: config.max_attempts,
            history_limit: config.history_limit,
            upstream_revision,
        }
    }
}

/// Result of a pass. A failed retry loop is reported here, not as an `Err`.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RetryOutcome,
    /// Drift found before generation.
    pub drift: DriftReport,
    pub resolutions: Vec<Resolution>,
    pub manifest: Manifest,
    /// Snapshot of the prior state, if there was one.
    pub snapshot: Option<PathBuf>,
    pub pruned: Vec<PathBuf>,
    /// Files put back from a stash left by an interrupted run.
    pub recovered: usize,
}

pub fn run(
    ctx: &RunContext,
    spec: &str,
    generator: &dyn Generator,
    validator: &dyn Validator,
) -> Result<RunReport, SyncError> {
    let root = ctx.root.as_path();
    let state = state_dir(root);
    std::fs::create_dir_all(&state).map_err(|e| io_err(&state, e))?;

    let recovered = Stash::recover_stale(root)?;
    let prior = manifest::load(root)?;
    let input_fingerprint = digest_bytes(spec.as_bytes());
    let drift = detect(root, prior.as_ref(), Some(&input_fingerprint))?;
    tracing::info!(
        root = %root.display(),
        tracked = drift.files.len(),
        modified = drift.modified().count(),
        untracked = drift.untracked.len(),
        "detected drift"
    );

    let plan = resolve::plan(&drift, &ctx.policy);
    let stash = Stash::capture(root, plan.protected())?;
    resolve::vacate(root, &plan)?;
    let snapshot = history::archive(root)?;

    let feedback = FeedbackRenderer::new(Some(&templates_dir(root)))?;
    let mut retry = RetryOrchestrator::new(generator, validator, feedback, ctx.max_attempts);
    let attempt_ctx = AttemptContext {
        root,
        readable_roots: &ctx.readable_roots,
        scope: ctx.policy.scope.as_ref(),
    };
    let outcome = match retry.run(attempt_ctx, spec) {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Err(recovery) = Stash::recover_stale(root) {
                tracing::warn!(
                    error = %recovery,
                    "could not restore stashed files; stash left in place"
                );
            }
            return Err(err);
        }
    };

    let resolutions = resolve::apply(root, &plan, &stash)?;
    let next = resolve::rebuild(
        root,
        prior.as_ref(),
        &resolutions,
        Utc::now(),
        input_fingerprint,
        ctx.upstream_revision.clone(),
    )?;
    manifest::save(root, &next)?;
    stash.discard()?;

    let pruned = if outcome.is_success() {
        history::prune(root, ctx.history_limit)?
    } else {
        Vec::new()
    };
    tracing::info!(
        attempts = outcome.attempt_count(),
        success = outcome.is_success(),
        files = next.files.len(),
        "regeneration finished"
    );

    Ok(RunReport {
        outcome,
        drift,
        resolutions,
        manifest: next,
        snapshot,
        pruned,
        recovered,
    })
}

/// `git rev-parse HEAD` in the first readable root, if any.
pub fn upstream_revision(readable_roots: &[PathBuf]) -> Option<String> {
    let root = readable_roots.first()?;
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let revision = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!revision.is_empty()).then_some(revision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn no_readable_roots_means_no_revision() {
        assert_eq!(upstream_revision(&[]), None);
    }

    #[test]
    fn missing_root_has_no_revision() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(upstream_revision(&[tmp.path().join("missing")]), None);
    }

    #[test]
    fn context_takes_limits_from_config() {
        let config = Config {
            max_attempts: 5,
            history_limit: 2,
            readable_roots: vec![PathBuf::from("in")],
            ..Config::default()
        };
        let ctx = RunContext::from_config(Path::new("/work"), &config, Policy::default());
        assert_eq!(ctx.max_attempts, 5);
        assert_eq!(ctx.history_limit, 2);
        assert_eq!(ctx.readable_roots, vec![PathBuf::from("/work/in")]);
    }
}
