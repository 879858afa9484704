//! Error types for regen-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from store, history, and config operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (manifest write path).
    #[error("manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse error on config load — includes file path and line context.
    #[error("failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Config parsed but holds values the engine cannot run with.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A `--component` name that the config does not define.
    #[error("unknown component '{0}'")]
    UnknownComponent(String),

    /// A stored fingerprint that is neither a SHA-256 hex digest nor `absent`.
    #[error("invalid fingerprint '{0}'")]
    InvalidFingerprint(String),

    /// The requested history snapshot does not exist.
    #[error("history snapshot not found at {path}")]
    SnapshotNotFound { path: PathBuf },
}

/// Convenience constructor for [`StoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
