//! `regen run` — one full regeneration pass.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use regen_sync::{
    pipeline::{self, RunContext, RunReport},
    CommandGenerator, CommandValidator, Outcome, Policy,
};

use super::{load_config, resolve_root};

/// Arguments for `regen run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Specification text handed to the generator.
    #[arg(long, short = 's')]
    pub spec: PathBuf,

    /// Writable root the generator emits into. Created if missing.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Overwrite user-modified files, keeping a `.bak` copy, instead of
    /// writing generated content to `.new`.
    #[arg(long)]
    pub force: bool,

    /// Restrict the pass to a configured component (repeatable).
    #[arg(long = "component", short = 'c', value_name = "NAME")]
    pub components: Vec<String>,

    /// Attempt ceiling for this pass (overrides config).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,

    /// Config file to use instead of the root/home lookup.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl RunArgs {
    pub fn run(self) -> Result<ExitCode> {
        let root = resolve_root(&self.root, true)?;
        let spec = std::fs::read_to_string(&self.spec)
            .with_context(|| format!("cannot read spec '{}'", self.spec.display()))?;

        let mut config = load_config(&root, self.config.as_deref())?;
        if let Some(max) = self.max_attempts {
            config.max_attempts = max;
        }
        let scope = config.scope(&self.components)?;
        let generator = CommandGenerator::new(&config.generator)?;
        let validator = CommandValidator::new(&config.validator)?;

        let policy = Policy {
            force_overwrite: self.force,
            scope,
        };
        let ctx = RunContext::from_config(&root, &config, policy);
        let report = pipeline::run(&ctx, &spec, &generator, &validator)
            .with_context(|| format!("regeneration failed in '{}'", root.display()))?;

        print_report(&report);
        Ok(if report.outcome.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(1)
        })
    }
}

fn print_report(report: &RunReport) {
    if report.recovered > 0 {
        println!(
            "{} restored {} file(s) left by an interrupted run",
            "!".yellow().bold(),
            report.recovered
        );
    }

    let mut untouched = 0;
    let mut conflicts = 0;
    for r in &report.resolutions {
        match &r.outcome {
            Outcome::Overwritten => println!("  ✎  {}", r.path),
            Outcome::Untouched => untouched += 1,
            Outcome::Preserved => println!("  ·  {} (kept)", r.path),
            Outcome::Forked { sibling } => {
                conflicts += 1;
                println!("  {}  {} → {}", "⚠".yellow(), r.path, sibling);
            }
            Outcome::BackedUp { backup } => {
                println!("  {}  {} (backup: {})", "✎".yellow(), r.path, backup)
            }
            Outcome::Discarded => println!("  ✗  {} (out of scope, removed)", r.path),
        }
    }
    if untouched > 0 {
        println!("  ·  {untouched} file(s) untouched");
    }

    let attempts = report.outcome.attempt_count();
    if report.outcome.is_success() {
        println!(
            "{} regenerated {} file(s) in {} attempt(s)",
            "✓".green().bold(),
            report.manifest.files.len(),
            attempts
        );
    } else {
        println!(
            "{} validation still failing after {} attempt(s); manual intervention required",
            "✗".red().bold(),
            attempts
        );
        for error in report.outcome.errors() {
            println!("  - {error}");
        }
    }
    if conflicts > 0 {
        println!("{conflicts} conflict(s) pending. Run 'regen diff' to review.");
    }
}
