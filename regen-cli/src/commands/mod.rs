pub mod diff;
pub mod history;
pub mod init;
pub mod rollback;
pub mod run;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use regen_core::config::{self, Config};

/// Canonical form of `--root`, creating the directory when asked to.
pub fn resolve_root(root: &Path, create: bool) -> Result<PathBuf> {
    if create {
        std::fs::create_dir_all(root)
            .with_context(|| format!("cannot create root '{}'", root.display()))?;
    }
    root.canonicalize()
        .with_context(|| format!("cannot resolve root '{}'", root.display()))
}

/// `--config` when given, otherwise the root's config, then the home config.
pub fn load_config(root: &Path, explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => config::load_file(path)
            .with_context(|| format!("failed to load config '{}'", path.display())),
        None => config::load_at(root, dirs::home_dir().as_deref())
            .context("failed to load .regen/config.yaml"),
    }
}

/// "3m ago" style age for a timestamp.
pub fn format_age(at: chrono::DateTime<chrono::Utc>) -> String {
    let secs = (chrono::Utc::now() - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
