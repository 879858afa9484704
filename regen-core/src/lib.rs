//! regen core library — manifest data model, digests, persistence, errors.
//!
//! - [`types`] — fingerprints, managed files, the manifest aggregate
//! - [`digest`] — SHA-256 content fingerprints
//! - [`manifest`] — load / save / record / archive
//! - [`history`] — snapshot archive, pruning, rollback
//! - [`config`] — `.regen/config.yaml`
//! - [`error`] — [`StoreError`]

pub mod config;
pub mod digest;
pub mod error;
pub mod history;
pub mod manifest;
pub mod paths;
pub mod types;

pub use config::Config;
pub use error::StoreError;
pub use types::{
    ComponentScope, Fingerprint, ManagedFile, Manifest, RelPath, ValidationError,
    ValidationErrorKind,
};
