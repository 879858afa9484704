//! `regen status` — drift visibility.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use regen_core::digest::digest_bytes;
use regen_core::manifest;
use regen_sync::{detect, DriftReport, DriftSignal, FileStatus};

use super::{format_age, resolve_root};

/// Arguments for `regen status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Writable root to inspect.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Also report whether this specification differs from the last one used.
    #[arg(long)]
    pub spec: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let root = resolve_root(&self.root, false)?;
        let spec_fingerprint = match &self.spec {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("cannot read spec '{}'", path.display()))?;
                Some(digest_bytes(&bytes))
            }
            None => None,
        };

        let manifest = manifest::load(&root).context("failed to load manifest")?;
        let report = detect(&root, manifest.as_ref(), spec_fingerprint.as_ref())
            .context("drift detection failed")?;
        let last_run = manifest.as_ref().map(|m| m.generated_at);

        if self.json {
            print_json(&report, last_run)?;
        } else {
            print_table(&root, &report, last_run);
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    status: &'static str,
    last_run: Option<String>,
    #[serde(flatten)]
    report: &'a DriftReport,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "generated")]
    generated: String,
    #[tabled(rename = "current")]
    current: String,
}

fn print_json(report: &DriftReport, last_run: Option<chrono::DateTime<chrono::Utc>>) -> Result<()> {
    let payload = StatusJson {
        status: signal_key(&report.signal()),
        last_run: last_run.map(|at| at.to_rfc3339()),
        report,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(root: &Path, report: &DriftReport, last_run: Option<chrono::DateTime<chrono::Utc>>) {
    let signal = report.signal();
    let last = last_run.map_or_else(|| "never".to_string(), format_age);
    println!(
        "regen v{} | {} | {} tracked | {} modified | {} untracked | last run {}",
        env!("CARGO_PKG_VERSION"),
        signal_label(&signal),
        report.files.len(),
        report.modified().count(),
        report.untracked.len(),
        last,
    );

    if !report.manifest_present {
        println!("No manifest under {}. Run 'regen run --spec <file>' first.", root.display());
        return;
    }
    if report.spec_changed == Some(true) {
        println!("{} specification changed since the last run", "!".yellow().bold());
    }

    let mut rows: Vec<StatusTableRow> = report.files.iter().map(file_row).collect();
    rows.extend(report.untracked.iter().map(|path| StatusTableRow {
        path: path.to_string(),
        status: "UNTRACKED".to_string(),
        generated: "-".to_string(),
        current: "-".to_string(),
    }));
    if rows.is_empty() {
        println!("No files tracked.");
        return;
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if report.modified().next().is_some() {
        println!("Edited files are kept on the next run; generated content goes to '<file>.new'.");
    }
}

fn file_row(status: &FileStatus) -> StatusTableRow {
    let label = if status.is_missing() {
        "MISSING"
    } else if status.user_modified {
        "MODIFIED"
    } else {
        "CURRENT"
    };
    StatusTableRow {
        path: status.path.to_string(),
        status: label.to_string(),
        generated: status.generated.short().to_string(),
        current: status.current.short().to_string(),
    }
}

fn signal_key(signal: &DriftSignal) -> &'static str {
    match signal {
        DriftSignal::NeverGenerated => "never_generated",
        DriftSignal::Current => "current",
        DriftSignal::Modified { .. } => "modified",
        DriftSignal::Untracked { .. } => "untracked",
        DriftSignal::SpecChanged => "spec_changed",
    }
}

fn signal_label(signal: &DriftSignal) -> String {
    match signal {
        DriftSignal::NeverGenerated => "NEVER GENERATED".bright_black().bold().to_string(),
        DriftSignal::Current => "CURRENT".green().bold().to_string(),
        DriftSignal::Modified { .. } => "MODIFIED".red().bold().to_string(),
        DriftSignal::Untracked { .. } => "UNTRACKED".magenta().bold().to_string(),
        DriftSignal::SpecChanged => "SPEC CHANGED".yellow().bold().to_string(),
    }
}
