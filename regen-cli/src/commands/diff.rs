//! `regen diff [PATH]` — unified diffs between user copies and pending `.new` siblings.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use regen_core::RelPath;
use regen_sync::pending_conflicts;

use super::resolve_root;

/// Arguments for `regen diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Only this file (relative to the root), or its `.new` sibling.
    pub path: Option<String>,

    /// Writable root to inspect.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let root = resolve_root(&self.root, false)?;
        let only = self.path.as_deref().map(|p| RelPath::from(p.trim_start_matches("./")));

        let diffs = pending_conflicts(&root, only.as_ref())
            .with_context(|| format!("diff failed in '{}'", root.display()))?;

        if diffs.is_empty() {
            println!("No pending conflicts.");
            return Ok(());
        }

        for diff in diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }
        Ok(())
    }
}
