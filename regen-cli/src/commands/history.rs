//! `regen history` — archived manifest snapshots, oldest first.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use regen_core::history;

use super::{format_age, resolve_root};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Writable root to inspect.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "snapshot")]
    id: String,
    #[tabled(rename = "generated")]
    generated: String,
    #[tabled(rename = "files")]
    files: usize,
    #[tabled(rename = "detection")]
    detection: &'static str,
}

impl HistoryArgs {
    pub fn run(self) -> Result<()> {
        let root = resolve_root(&self.root, false)?;
        let snapshots = history::list(&root).context("failed to list history")?;
        if snapshots.is_empty() {
            println!("No snapshots.");
            return Ok(());
        }

        let rows: Vec<SnapshotRow> = snapshots
            .into_iter()
            .map(|s| SnapshotRow {
                id: s.id,
                generated: s.generated_at.map_or_else(|| "unreadable".to_string(), format_age),
                files: s.file_count,
                detection: if s.has_detection { "yes" } else { "no" },
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
