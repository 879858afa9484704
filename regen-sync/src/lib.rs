//! # regen-sync
//!
//! Regeneration passes over a writable root: drift detection, conflict
//! resolution, and the bounded generate/validate retry loop.
//!
//! Call [`pipeline::run`] with a [`RunContext`] and a [`Generator`] /
//! [`Validator`] pair to perform one full pass.

pub mod collaborator;
pub mod detect;
pub mod diff;
pub mod error;
pub mod feedback;
pub mod pipeline;
pub mod resolve;
pub mod retry;
pub mod stash;
pub mod workspace;

pub use collaborator::{
    CommandGenerator, CommandValidator, GenerationOutcome, GenerationRequest, Generator, Validator,
};
pub use detect::{detect, DriftReport, DriftSignal, FileStatus};
pub use diff::{pending_conflicts, FileDiff};
pub use error::SyncError;
pub use pipeline::{run, RunContext, RunReport};
pub use resolve::{Action, Outcome, Policy, Resolution, ResolutionPlan};
pub use retry::{AttemptRecord, AttemptState, RetryOrchestrator, RetryOutcome};
