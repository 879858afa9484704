//! Error types for regen-sync.

use std::path::PathBuf;

use thiserror::Error;

use regen_core::StoreError;

/// All errors that can arise from a regeneration pass.
///
/// Validation failures are not errors: they drive retries and, once the
/// attempt ceiling is reached, surface as a failed [`crate::RetryOutcome`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the manifest store, history archive, or config.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (stash index, validator output).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Feedback template failed to load or render.
    #[error("template error: {0}")]
    Render(#[from] tera::Error),

    /// A collaborator process could not be started or waited on.
    #[error("failed to run {program}: {source}")]
    Collaborator {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// No command configured for a collaborator.
    #[error("no {0} command configured; set `{0}.command` in .regen/config.yaml")]
    EmptyCommand(&'static str),

    /// Directory walk failure.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
