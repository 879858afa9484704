//! Locations of engine state under a writable root.
//!
//! ```text
//! <root>/
//!   .regen/
//!     manifest.json
//!     detection.json
//!     config.yaml
//!     history/<snapshot>/{manifest.json,detection.json}
//!     stash/{index.json,files/...}
//!     attempts/attempt-<n>.md
//!     templates/feedback.md.tera
//! ```

use std::path::{Path, PathBuf};

pub const STATE_DIR: &str = ".regen";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const DETECTION_FILE: &str = "detection.json";
pub const CONFIG_FILE: &str = "config.yaml";

/// Top-level entries a clean-slate retry never removes.
pub const PRESERVED_ENTRIES: &[&str] = &[STATE_DIR, ".git", ".hg", ".svn"];

pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

pub fn manifest_path(root: &Path) -> PathBuf {
    state_dir(root).join(MANIFEST_FILE)
}

pub fn detection_path(root: &Path) -> PathBuf {
    state_dir(root).join(DETECTION_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    state_dir(root).join(CONFIG_FILE)
}

pub fn history_dir(root: &Path) -> PathBuf {
    state_dir(root).join("history")
}

pub fn stash_dir(root: &Path) -> PathBuf {
    state_dir(root).join("stash")
}

pub fn attempts_dir(root: &Path) -> PathBuf {
    state_dir(root).join("attempts")
}

pub fn templates_dir(root: &Path) -> PathBuf {
    state_dir(root).join("templates")
}

/// `~/.regen/config.yaml` — fallback config shared by every root.
pub fn user_config_path(home: &Path) -> PathBuf {
    home.join(STATE_DIR).join(CONFIG_FILE)
}

/// `true` for a top-level entry name that belongs to the engine or to VCS metadata.
pub fn is_preserved_entry(name: &str) -> bool {
    PRESERVED_ENTRIES.contains(&name)
}
