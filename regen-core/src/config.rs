//! Engine configuration (`.regen/config.yaml`).
//!
//! # Lookup order
//!
//! 1. An explicit path (`--config`)
//! 2. `<root>/.regen/config.yaml`
//! 3. `<home>/.regen/config.yaml`
//! 4. Built-in defaults
//!
//! Every mutating or loading function has an `_at(home)` form used by tests;
//! the plain form derives `home` from `dirs::home_dir()`.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, StoreError};
use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::manifest::write_atomic;
use crate::paths::{config_path, user_config_path};
use crate::types::ComponentScope;

/// Attempt ceiling for the retry loop unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// An external program invocation: `command[0]` is the program, the rest are args.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandConfig {
    #[serde(default)]
    pub command: Vec<String>,
}

impl CommandConfig {
    pub fn is_configured(&self) -> bool {
        !self.command.is_empty()
    }
}

/// Top-level engine configuration. Missing fields use defaults; a missing file
/// is all defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub generator: CommandConfig,

    #[serde(default)]
    pub validator: CommandConfig,

    /// Extra roots the generator may read; relative paths resolve against the
    /// writable root.
    #[serde(default)]
    pub readable_roots: Vec<PathBuf>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Named component groups: name → path prefixes under the writable root.
    #[serde(default)]
    pub components: BTreeMap<String, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generator: CommandConfig::default(),
            validator: CommandConfig::default(),
            readable_roots: Vec::new(),
            max_attempts: default_max_attempts(),
            history_limit: default_history_limit(),
            components: BTreeMap::new(),
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl Config {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.max_attempts == 0 {
            return Err(StoreError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.history_limit == 0 {
            return Err(StoreError::InvalidConfig(
                "history_limit must be at least 1".to_string(),
            ));
        }
        for (name, prefixes) in &self.components {
            if prefixes.iter().any(|p| p.trim_matches('/').is_empty()) {
                return Err(StoreError::InvalidConfig(format!(
                    "component '{name}' has an empty path prefix"
                )));
            }
        }
        Ok(())
    }

    /// Resolve component names into a scope. An empty list means "no scope".
    pub fn scope(&self, names: &[String]) -> Result<Option<ComponentScope>, StoreError> {
        if names.is_empty() {
            return Ok(None);
        }
        let mut prefixes = Vec::new();
        for name in names {
            let group = self
                .components
                .get(name)
                .ok_or_else(|| StoreError::UnknownComponent(name.clone()))?;
            prefixes.extend(group.iter().cloned());
        }
        Ok(Some(ComponentScope::new(prefixes)))
    }

    /// Readable roots made absolute against `root`.
    pub fn resolved_readable_roots(&self, root: &Path) -> Vec<PathBuf> {
        self.readable_roots
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { root.join(p) })
            .collect()
    }
}

/// Parse the config at `path`.
pub fn load_file(path: &Path) -> Result<Config, StoreError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let config: Config = serde_yaml::from_str(&contents).map_err(|e| StoreError::ConfigParse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

/// Load the config for `root`, falling back to `<home>/.regen/config.yaml`.
pub fn load_at(root: &Path, home: Option<&Path>) -> Result<Config, StoreError> {
    let candidates = std::iter::once(config_path(root)).chain(home.map(user_config_path));
    for path in candidates {
        match std::fs::metadata(&path) {
            Ok(_) => {
                tracing::debug!(path = %path.display(), "loading config");
                return load_file(&path);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&path, err)),
        }
    }
    Ok(Config::default())
}

/// `load_at` convenience wrapper.
pub fn load(root: &Path) -> Result<Config, StoreError> {
    load_at(root, dirs::home_dir().as_deref())
}

const SCAFFOLD: &str = r#"# regen configuration
#
# generator.command / validator.command are argv lists. Placeholders:
#   {spec_file}  path of the specification text for the current attempt
#   {root}       the writable root
generator:
  command: []
validator:
  command: []
# Directories the generator may read, relative to this root.
readable_roots: []
# Generation attempts before giving up.
max_attempts: 3
# History snapshots kept after a successful run.
history_limit: 10
# Named groups of path prefixes, selectable with --component.
components: {}
"#;

/// Write a commented default config under `root` unless one already exists.
///
/// Returns the config path and whether it was created by this call.
pub fn scaffold(root: &Path) -> Result<(PathBuf, bool), StoreError> {
    let path = config_path(root);
    if path.exists() {
        return Ok((path, false));
    }
    write_atomic(&path, SCAFFOLD.as_bytes())?;
    Ok((path, true))
}
