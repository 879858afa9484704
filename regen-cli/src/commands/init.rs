//! `regen init [--root DIR]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use regen_core::config;

use super::resolve_root;

/// Scaffold `.regen/config.yaml`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Writable root the generator emits into. Created if missing.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let root = resolve_root(&self.root, true)?;
        let (path, created) = config::scaffold(&root)
            .with_context(|| format!("failed to write config under '{}'", root.display()))?;

        if created {
            println!("✓ Wrote {}", path.display());
            println!("  Set generator.command and validator.command, then run `regen run --spec <file>`.");
        } else {
            println!("✓ Config already exists: {}", path.display());
        }
        Ok(())
    }
}
