//! Content fingerprints.
//!
//! SHA-256 over the raw bytes, hex-encoded. No line-ending normalisation: the
//! fingerprint changes if and only if the byte content changes.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{io_err, StoreError};
use crate::types::Fingerprint;

/// Fingerprint the file at `path`.
///
/// A nonexistent path yields [`Fingerprint::Absent`]; only other I/O failures
/// (permissions, reading a directory) are errors.
pub fn digest(path: &Path) -> Result<Fingerprint, StoreError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Fingerprint::Absent),
        Err(err) => return Err(io_err(path, err)),
    };
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| io_err(path, e))?;
    Ok(Fingerprint::Sha256(hex::encode(hasher.finalize())))
}

/// Fingerprint an in-memory buffer (the specification text).
pub fn digest_bytes(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Fingerprint::Sha256(hex::encode(hasher.finalize()))
}
