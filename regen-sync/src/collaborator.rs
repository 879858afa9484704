//! External collaborators: the generator that writes output files and the
//! validator that checks them.
//!
//! Both are traits so a pass can be driven by in-process fakes in tests and by
//! configured commands ([`CommandGenerator`], [`CommandValidator`]) in the CLI.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;

use regen_core::config::CommandConfig;
use regen_core::{ComponentScope, ValidationError, ValidationErrorKind};

use crate::error::SyncError;

/// Everything a generator needs for one attempt.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    /// Original specification plus any accumulated feedback.
    pub spec_text: &'a str,
    /// `spec_text`, persisted under `.regen/attempts/`.
    pub spec_file: &'a Path,
    pub writable_root: &'a Path,
    pub readable_roots: &'a [PathBuf],
    /// 1-based.
    pub attempt: u32,
}

/// What the generator reported. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub exit_code: Option<i32>,
}

impl GenerationOutcome {
    pub fn success() -> Self {
        Self { exit_code: Some(0) }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub trait Generator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<GenerationOutcome, SyncError>;
}

/// Must not mutate `root`; must be safe to call repeatedly.
pub trait Validator {
    fn validate(
        &self,
        root: &Path,
        scope: Option<&ComponentScope>,
    ) -> Result<Vec<ValidationError>, SyncError>;
}

// ---------------------------------------------------------------------------
// Command-backed collaborators
// ---------------------------------------------------------------------------

/// Runs a configured argv in the writable root.
///
/// Placeholders `{spec_file}` and `{root}` in any argument are substituted.
/// The child also sees `REGEN_SPEC_FILE`, `REGEN_WRITABLE_ROOT`,
/// `REGEN_READABLE_ROOTS` (platform path list) and `REGEN_ATTEMPT`.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    argv: Vec<String>,
}

impl CommandGenerator {
    pub fn new(config: &CommandConfig) -> Result<Self, SyncError> {
        if !config.is_configured() {
            return Err(SyncError::EmptyCommand("generator"));
        }
        Ok(Self {
            argv: config.command.clone(),
        })
    }
}

impl Generator for CommandGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<GenerationOutcome, SyncError> {
        let spec_file = request.spec_file.display().to_string();
        let root = request.writable_root.display().to_string();
        let argv: Vec<String> = self
            .argv
            .iter()
            .map(|arg| arg.replace("{spec_file}", &spec_file).replace("{root}", &root))
            .collect();
        let readable = std::env::join_paths(request.readable_roots)
            .unwrap_or_else(|_| OsString::new());

        tracing::debug!(program = %argv[0], attempt = request.attempt, "running generator");
        let status = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(request.writable_root)
            .env("REGEN_SPEC_FILE", request.spec_file)
            .env("REGEN_WRITABLE_ROOT", request.writable_root)
            .env("REGEN_READABLE_ROOTS", readable)
            .env("REGEN_ATTEMPT", request.attempt.to_string())
            .stdin(Stdio::null())
            .status()
            .map_err(|e| SyncError::Collaborator {
                program: argv[0].clone(),
                source: e,
            })?;

        Ok(GenerationOutcome {
            exit_code: status.code(),
        })
    }
}

/// Runs a configured argv and parses its findings from stdout.
///
/// Stdout is either a JSON array of `{"kind": ..., "message": ...}` objects or
/// plain text with one finding per non-empty line.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    argv: Vec<String>,
}

impl CommandValidator {
    pub fn new(config: &CommandConfig) -> Result<Self, SyncError> {
        if !config.is_configured() {
            return Err(SyncError::EmptyCommand("validator"));
        }
        Ok(Self {
            argv: config.command.clone(),
        })
    }
}

impl Validator for CommandValidator {
    fn validate(
        &self,
        root: &Path,
        scope: Option<&ComponentScope>,
    ) -> Result<Vec<ValidationError>, SyncError> {
        let root_str = root.display().to_string();
        let argv: Vec<String> = self
            .argv
            .iter()
            .map(|arg| arg.replace("{root}", &root_str))
            .collect();
        let prefixes = scope.map(|s| s.prefixes.join(",")).unwrap_or_default();

        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(root)
            .env("REGEN_WRITABLE_ROOT", root)
            .env("REGEN_COMPONENT_PREFIXES", prefixes)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| SyncError::Collaborator {
                program: argv[0].clone(),
                source: e,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut errors = parse_findings(&stdout);
        if errors.is_empty() && !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            errors.push(ValidationError::new(
                ValidationErrorKind::Other,
                format!("validator exited with {}: {stderr}", output.status),
            ));
        }
        Ok(errors)
    }
}

#[derive(Deserialize)]
struct Finding {
    #[serde(default = "other_kind")]
    kind: String,
    message: String,
}

fn other_kind() -> String {
    ValidationErrorKind::Other.as_str().to_string()
}

/// Parse validator stdout. A JSON array wins; anything else is line-based.
pub fn parse_findings(stdout: &str) -> Vec<ValidationError> {
    let trimmed = stdout.trim();
    if trimmed.starts_with('[') {
        if let Ok(findings) = serde_json::from_str::<Vec<Finding>>(trimmed) {
            return findings
                .into_iter()
                .map(|f| {
                    let kind = f.kind.parse().unwrap_or(ValidationErrorKind::Other);
                    ValidationError::new(kind, f.message)
                })
                .collect();
        }
    }
    stdout
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .map(ValidationError::parse_line)
        .collect()
}
