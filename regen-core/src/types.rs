//! Domain types for the regen manifest.
//!
//! All types are serializable/deserializable via serde. Managed paths are kept
//! as `/`-separated strings relative to the writable root so a manifest written
//! on one platform reads the same on another.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Current manifest schema version.
pub const MANIFEST_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A managed file's path relative to the writable root, `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelPath(pub String);

impl RelPath {
    /// Build a `RelPath` for `path` under `root`.
    ///
    /// Returns `None` when `path` is not below `root` or contains `..`.
    pub fn from_path(root: &Path, path: &Path) -> Option<Self> {
        let relative = path.strip_prefix(root).ok()?;
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(Self(parts.join("/")))
    }

    /// Absolute location of this path under `root`.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for part in self.0.split('/') {
            path.push(part);
        }
        path
    }

    /// The sibling path with `suffix` appended to the file name (`a.txt` → `a.txt.new`).
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self(format!("{}{suffix}", self.0))
    }

    /// `true` if this path equals `prefix` or lies beneath it.
    pub fn is_under(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return true;
        }
        self.0 == prefix
            || (self.0.starts_with(prefix) && self.0.as_bytes().get(prefix.len()) == Some(&b'/'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RelPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RelPath {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A SHA-256 content fingerprint, or the sentinel for a path that does not exist.
///
/// Serialized as the lowercase hex digest, or the literal string `"absent"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Fingerprint {
    Absent,
    Sha256(String),
}

const ABSENT: &str = "absent";

impl Fingerprint {
    pub fn is_absent(&self) -> bool {
        matches!(self, Fingerprint::Absent)
    }

    /// First 12 hex characters, for display.
    pub fn short(&self) -> &str {
        match self {
            Fingerprint::Absent => ABSENT,
            Fingerprint::Sha256(hex) => &hex[..hex.len().min(12)],
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Absent => f.write_str(ABSENT),
            Fingerprint::Sha256(hex) => f.write_str(hex),
        }
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_string()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == ABSENT {
            return Ok(Fingerprint::Absent);
        }
        if s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Ok(Fingerprint::Sha256(s.to_ascii_lowercase()));
        }
        Err(StoreError::InvalidFingerprint(s))
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// One entry per generated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedFile {
    /// Digest taken right after the generator (re)wrote the file.
    pub generated_fingerprint: Fingerprint,
    /// Digest of the file as found on disk at the last detection pass.
    pub current_fingerprint: Fingerprint,
    /// `current_fingerprint != generated_fingerprint`, recomputed every run.
    #[serde(default)]
    pub user_modified: bool,
    pub last_updated: DateTime<Utc>,
}

impl ManagedFile {
    /// A freshly generated entry: both fingerprints equal, not modified.
    pub fn generated(fingerprint: Fingerprint, at: DateTime<Utc>) -> Self {
        Self {
            generated_fingerprint: fingerprint.clone(),
            current_fingerprint: fingerprint,
            user_modified: false,
            last_updated: at,
        }
    }
}

/// Aggregate root: the state of the writable root as of the last regeneration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    /// Digest of the specification text the files were generated from.
    pub input_fingerprint: Fingerprint,
    /// Opaque revision marker of the input repository; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_revision: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<RelPath, ManagedFile>,
}

impl Manifest {
    pub fn new(
        generated_at: DateTime<Utc>,
        input_fingerprint: Fingerprint,
        upstream_revision: Option<String>,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION,
            generated_at,
            input_fingerprint,
            upstream_revision,
            files: BTreeMap::new(),
        }
    }

    pub fn is_tracked(&self, path: &RelPath) -> bool {
        self.files.contains_key(path)
    }
}

// ---------------------------------------------------------------------------
// Validation findings
// ---------------------------------------------------------------------------

/// Category of a validator finding. Only counted and forwarded, never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationErrorKind {
    MissingFile,
    MalformedDocument,
    UnbalancedMarkup,
    MissingRequiredSection,
    MalformedScript,
    /// Validator output that carried no recognised kind.
    Other,
}

impl ValidationErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationErrorKind::MissingFile => "missing-file",
            ValidationErrorKind::MalformedDocument => "malformed-document",
            ValidationErrorKind::UnbalancedMarkup => "unbalanced-markup",
            ValidationErrorKind::MissingRequiredSection => "missing-required-section",
            ValidationErrorKind::MalformedScript => "malformed-script",
            ValidationErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "missing-file" => Ok(Self::MissingFile),
            "malformed-document" => Ok(Self::MalformedDocument),
            "unbalanced-markup" => Ok(Self::UnbalancedMarkup),
            "missing-required-section" => Ok(Self::MissingRequiredSection),
            "malformed-script" => Ok(Self::MalformedScript),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown validation error kind '{other}'")),
        }
    }
}

/// A single validator finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
    /// The validator's own line, when the finding came from line output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw: None,
        }
    }

    /// Parse one validator output line. `kind: message` when the prefix names a
    /// known kind, otherwise the whole line becomes an `Other` finding. The line
    /// itself is kept as [`raw`](Self::raw) and is what `Display` prints.
    pub fn parse_line(line: &str) -> Self {
        let mut error = match line.split_once(':') {
            Some((prefix, rest)) => match prefix.parse::<ValidationErrorKind>() {
                Ok(kind) if kind != ValidationErrorKind::Other => {
                    Self::new(kind, rest.trim_start())
                }
                _ => Self::new(ValidationErrorKind::Other, line),
            },
            None => Self::new(ValidationErrorKind::Other, line),
        };
        error.raw = Some(line.to_string());
        error
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(raw) = &self.raw {
            return f.write_str(raw);
        }
        match self.kind {
            ValidationErrorKind::Other => f.write_str(&self.message),
            kind => write!(f, "{kind}: {}", self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// Component scope
// ---------------------------------------------------------------------------

/// A set of path prefixes a regeneration pass is restricted to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComponentScope {
    pub prefixes: Vec<String>,
}

impl ComponentScope {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut prefixes: Vec<String> = prefixes
            .into_iter()
            .map(|p| p.into().trim_matches('/').to_string())
            .collect();
        prefixes.sort();
        prefixes.dedup();
        Self { prefixes }
    }

    pub fn contains(&self, path: &RelPath) -> bool {
        self.prefixes.iter().any(|prefix| path.is_under(prefix))
    }
}

/// `true` if `path` is inside `scope`, or no scope restricts the pass.
pub fn in_scope(scope: Option<&ComponentScope>, path: &RelPath) -> bool {
    scope.map_or(true, |s| s.contains(path))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
