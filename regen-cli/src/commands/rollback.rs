//! `regen rollback <SNAPSHOT>`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use regen_core::history;

use super::resolve_root;

/// Make an archived snapshot the live manifest again.
#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Snapshot id as printed by `regen history`.
    pub snapshot: String,

    /// Writable root to operate on.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

impl RollbackArgs {
    pub fn run(self) -> Result<()> {
        let root = resolve_root(&self.root, false)?;
        let previous = history::rollback(&root, &self.snapshot)
            .with_context(|| format!("failed to roll back to '{}'", self.snapshot))?;

        println!("✓ Manifest restored from snapshot '{}'", self.snapshot);
        if let Some(dir) = previous {
            let id = dir.file_name().map(|n| n.to_string_lossy().into_owned());
            println!("  Previous state archived as '{}'", id.unwrap_or_default());
        }
        Ok(())
    }
}
