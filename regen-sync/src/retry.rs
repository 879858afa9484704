//! Retry orchestrator: generate → validate → retry with feedback, bounded.
//!
//! ```text
//! Idle → Generating → Validating ─┬─ 0 errors ──────────────→ Succeeded
//!           ↑                     ├─ errors, attempt < max ──→ Retrying ─┐
//!           └─────────────────────┼──────────────────────────────────────┘
//!                                 └─ errors, attempt = max ──→ Failed
//! ```
//!
//! Every attempt after the first starts from a cleared writable root.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use regen_core::manifest::write_atomic;
use regen_core::paths::attempts_dir;
use regen_core::{ComponentScope, ValidationError};

use crate::collaborator::{GenerationRequest, Generator, Validator};
use crate::error::{io_err, SyncError};
use crate::feedback::{compose, FeedbackRenderer};
use crate::workspace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum AttemptState {
    Idle,
    Generating { attempt: u32 },
    Validating { attempt: u32 },
    Retrying { attempt: u32, errors: usize },
    Succeeded { attempt: u32 },
    Failed { attempt: u32 },
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Succeeded { .. } | AttemptState::Failed { .. })
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptState::Idle => f.write_str("idle"),
            AttemptState::Generating { attempt } => write!(f, "generating (attempt {attempt})"),
            AttemptState::Validating { attempt } => write!(f, "validating (attempt {attempt})"),
            AttemptState::Retrying { attempt, errors } => {
                write!(f, "retrying after attempt {attempt} ({errors} errors)")
            }
            AttemptState::Succeeded { attempt } => write!(f, "succeeded on attempt {attempt}"),
            AttemptState::Failed { attempt } => write!(f, "failed after attempt {attempt}"),
        }
    }
}

/// What happened in one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub exit_code: Option<i32>,
    pub errors: Vec<ValidationError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RetryOutcome {
    Succeeded { attempts: Vec<AttemptRecord> },
    /// Ceiling reached with errors still present.
    Failed { attempts: Vec<AttemptRecord> },
}

impl RetryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            RetryOutcome::Succeeded { attempts } | RetryOutcome::Failed { attempts } => attempts,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts().len() as u32
    }

    /// Every error from every attempt, in order.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationError> {
        self.attempts().iter().flat_map(|a| a.errors.iter())
    }
}

/// Where the attempts run.
#[derive(Debug, Clone, Copy)]
pub struct AttemptContext<'a> {
    pub root: &'a Path,
    pub readable_roots: &'a [PathBuf],
    pub scope: Option<&'a ComponentScope>,
}

pub struct RetryOrchestrator<'a> {
    generator: &'a dyn Generator,
    validator: &'a dyn Validator,
    feedback: FeedbackRenderer,
    max_attempts: u32,
    transitions: Vec<AttemptState>,
}

impl<'a> RetryOrchestrator<'a> {
    /// `max_attempts` below 1 is treated as 1.
    pub fn new(
        generator: &'a dyn Generator,
        validator: &'a dyn Validator,
        feedback: FeedbackRenderer,
        max_attempts: u32,
    ) -> Self {
        Self {
            generator,
            validator,
            feedback,
            max_attempts: max_attempts.max(1),
            transitions: vec![AttemptState::Idle],
        }
    }

    pub fn state(&self) -> &AttemptState {
        self.transitions.last().unwrap_or(&AttemptState::Idle)
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn transitions(&self) -> &[AttemptState] {
        &self.transitions
    }

    fn enter(&mut self, state: AttemptState) {
        tracing::debug!(state = %state, "retry state");
        self.transitions.push(state);
    }

    /// Run attempts until validation passes or the ceiling is reached.
    ///
    /// Collaborator failures to start are errors; validation findings never are.
    pub fn run(&mut self, ctx: AttemptContext<'_>, spec: &str) -> Result<RetryOutcome, SyncError> {
        let dir = attempts_dir(ctx.root);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(&dir, err)),
        }

        let mut blocks: Vec<String> = Vec::new();
        let mut records: Vec<AttemptRecord> = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if attempt > 1 {
                workspace::clear(ctx.root)?;
            }

            let text = compose(spec, &blocks);
            let spec_file = dir.join(format!("attempt-{attempt}.md"));
            write_atomic(&spec_file, text.as_bytes())?;

            self.enter(AttemptState::Generating { attempt });
            tracing::info!(attempt, max = self.max_attempts, "generating");
            let outcome = self.generator.generate(&GenerationRequest {
                spec_text: &text,
                spec_file: &spec_file,
                writable_root: ctx.root,
                readable_roots: ctx.readable_roots,
                attempt,
            })?;
            if !outcome.is_success() {
                tracing::warn!(
                    attempt,
                    exit_code = ?outcome.exit_code,
                    "generator exited unsuccessfully; validating anyway"
                );
            }

            self.enter(AttemptState::Validating { attempt });
            let errors = self.validator.validate(ctx.root, ctx.scope)?;
            let error_count = errors.len();
            records.push(AttemptRecord {
                attempt,
                exit_code: outcome.exit_code,
                errors,
            });

            if error_count == 0 {
                self.enter(AttemptState::Succeeded { attempt });
                tracing::info!(attempt, "validation passed");
                return Ok(RetryOutcome::Succeeded { attempts: records });
            }

            tracing::info!(attempt, errors = error_count, "validation failed");
            if attempt >= self.max_attempts {
                self.enter(AttemptState::Failed { attempt });
                tracing::warn!(attempts = attempt, "attempt ceiling reached; manual intervention required");
                return Ok(RetryOutcome::Failed { attempts: records });
            }

            if let Some(last) = records.last() {
                blocks.push(self.feedback.render(attempt, &last.errors)?);
            }
            self.enter(AttemptState::Retrying {
                attempt,
                errors: error_count,
            });
        }
    }
}
