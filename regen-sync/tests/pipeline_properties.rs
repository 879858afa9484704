use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use regen_core::digest::digest_bytes;
use regen_core::paths::{history_dir, stash_dir};
use regen_core::{manifest, ComponentScope, RelPath, ValidationError};
use regen_sync::collaborator::{GenerationOutcome, GenerationRequest, Generator, Validator};
use regen_sync::stash::Stash;
use regen_sync::{run, Outcome, Policy, RunContext, RunReport, SyncError};
use rstest::rstest;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Writes a fixed file set on every call and records the spec text it saw.
struct Emit {
    files: Vec<(&'static str, &'static str)>,
    specs: RefCell<Vec<String>>,
}

impl Emit {
    fn new(files: &[(&'static str, &'static str)]) -> Self {
        Self {
            files: files.to_vec(),
            specs: RefCell::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.specs.borrow().len()
    }
}

impl Generator for Emit {
    fn generate(&self, req: &GenerationRequest<'_>) -> Result<GenerationOutcome, SyncError> {
        self.specs.borrow_mut().push(req.spec_text.to_string());
        for (rel, content) in &self.files {
            let path = RelPath::from(*rel).to_path(req.writable_root);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(path, content).expect("write");
        }
        Ok(GenerationOutcome::success())
    }
}

/// Fails the first `failures` validations with the given lines, then passes.
struct FailFirst {
    failures: u32,
    lines: Vec<&'static str>,
    calls: RefCell<u32>,
}

impl FailFirst {
    fn passing() -> Self {
        Self::times(0, &[])
    }

    fn times(failures: u32, lines: &[&'static str]) -> Self {
        Self {
            failures,
            lines: lines.to_vec(),
            calls: RefCell::new(0),
        }
    }

    fn never_passing(lines: &[&'static str]) -> Self {
        Self::times(u32::MAX, lines)
    }
}

impl Validator for FailFirst {
    fn validate(
        &self,
        _root: &Path,
        _scope: Option<&ComponentScope>,
    ) -> Result<Vec<ValidationError>, SyncError> {
        let mut calls = self.calls.borrow_mut();
        *calls += 1;
        if *calls > self.failures {
            return Ok(vec![]);
        }
        Ok(self.lines.iter().map(|l| ValidationError::parse_line(l)).collect())
    }
}

/// Damages the stash index, then fails to start.
struct Unstartable;

impl Generator for Unstartable {
    fn generate(&self, req: &GenerationRequest<'_>) -> Result<GenerationOutcome, SyncError> {
        fs::write(stash_dir(req.writable_root).join("index.json"), "{ torn").expect("write");
        Err(SyncError::Collaborator {
            program: "missing-generator".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ctx(root: &Path) -> RunContext {
    RunContext {
        root: root.to_path_buf(),
        readable_roots: Vec::<PathBuf>::new(),
        policy: Policy::default(),
        max_attempts: 3,
        history_limit: 10,
        upstream_revision: None,
    }
}

fn regenerate(ctx: &RunContext, files: &[(&'static str, &'static str)]) -> RunReport {
    run(ctx, "spec", &Emit::new(files), &FailFirst::passing()).expect("run")
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(RelPath::from(rel).to_path(root)).expect("read")
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = RelPath::from(rel).to_path(root);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write");
}

fn outcome<'a>(report: &'a RunReport, rel: &str) -> &'a Outcome {
    &report
        .resolutions
        .iter()
        .find(|r| r.path.as_str() == rel)
        .unwrap_or_else(|| panic!("no resolution for {rel}"))
        .outcome
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn first_run_tracks_generated_files() {
    let root = TempDir::new().expect("root");
    let report = regenerate(&ctx(root.path()), &[("index.html", "<html/>"), ("docs/a.md", "# a")]);

    assert!(report.outcome.is_success());
    assert!(report.snapshot.is_none(), "nothing to archive on first run");
    let saved = manifest::load(root.path()).expect("load").expect("manifest");
    assert_eq!(saved, report.manifest);
    assert_eq!(saved.files.len(), 2);
    assert_eq!(saved.input_fingerprint, digest_bytes(b"spec"));
    assert_eq!(
        saved.files[&RelPath::from("docs/a.md")].generated_fingerprint,
        digest_bytes(b"# a")
    );
    assert!(!stash_dir(root.path()).exists());
}

#[rstest]
#[case::preserve_and_fork(false)]
#[case::force_overwrite(true)]
fn user_edit_then_regenerate(#[case] force: bool) {
    let root = TempDir::new().expect("root");
    let mut ctx = ctx(root.path());
    regenerate(&ctx, &[("a.txt", "H1")]);
    let before = manifest::load(root.path()).expect("load").expect("manifest");

    write(root.path(), "a.txt", "H2");
    ctx.policy.force_overwrite = force;
    let report = regenerate(&ctx, &[("a.txt", "H3")]);
    let entry = &report.manifest.files[&RelPath::from("a.txt")];

    if force {
        assert_eq!(read(root.path(), "a.txt"), "H3");
        assert_eq!(read(root.path(), "a.txt.bak"), "H2");
        assert_eq!(entry.generated_fingerprint, digest_bytes(b"H3"));
        assert!(!entry.user_modified);
        assert!(matches!(outcome(&report, "a.txt"), Outcome::BackedUp { .. }));
    } else {
        assert_eq!(read(root.path(), "a.txt"), "H2");
        assert_eq!(read(root.path(), "a.txt.new"), "H3");
        assert_eq!(entry, &before.files[&RelPath::from("a.txt")]);
        assert!(matches!(outcome(&report, "a.txt"), Outcome::Forked { .. }));
    }
    assert!(!report.manifest.is_tracked(&RelPath::from("a.txt.new")));
    assert!(!report.manifest.is_tracked(&RelPath::from("a.txt.bak")));
}

#[test]
fn fork_survives_retries() {
    let root = TempDir::new().expect("root");
    let ctx = ctx(root.path());
    regenerate(&ctx, &[("a.txt", "H1")]);
    write(root.path(), "a.txt", "H2");

    let generator = Emit::new(&[("a.txt", "H3")]);
    let validator = FailFirst::times(2, &["missing-file: b.txt"]);
    let report = run(&ctx, "spec", &generator, &validator).expect("run");

    assert_eq!(report.outcome.attempt_count(), 3);
    assert_eq!(read(root.path(), "a.txt"), "H2");
    assert_eq!(read(root.path(), "a.txt.new"), "H3");
}

#[test]
fn untracked_user_file_is_not_clobbered() {
    let root = TempDir::new().expect("root");
    write(root.path(), "README.md", "my notes");

    let report = regenerate(&ctx(root.path()), &[("README.md", "generated"), ("app.js", "x")]);

    assert_eq!(read(root.path(), "README.md"), "my notes");
    assert_eq!(read(root.path(), "README.md.new"), "generated");
    assert!(!report.manifest.is_tracked(&RelPath::from("README.md")));
    assert!(report.manifest.is_tracked(&RelPath::from("app.js")));
}

#[test]
fn edited_file_the_generator_omits_is_left_alone() {
    let root = TempDir::new().expect("root");
    let ctx = ctx(root.path());
    regenerate(&ctx, &[("a.txt", "H1")]);
    let before = manifest::load(root.path()).expect("load").expect("manifest");
    write(root.path(), "a.txt", "H2");

    let report = regenerate(&ctx, &[("b.txt", "B")]);
    assert_eq!(outcome(&report, "a.txt"), &Outcome::Preserved);
    assert_eq!(read(root.path(), "a.txt"), "H2");
    let a = RelPath::from("a.txt");
    assert_eq!(report.manifest.files[&a], before.files[&a]);

    // The edit is still recognised on the pass after.
    let report = regenerate(&ctx, &[("a.txt", "H3")]);
    assert!(matches!(outcome(&report, "a.txt"), Outcome::Forked { .. }));
    assert_eq!(read(root.path(), "a.txt"), "H2");
    assert_eq!(read(root.path(), "a.txt.new"), "H3");
}

#[test]
fn untracked_file_the_generator_omits_stays_untracked() {
    let root = TempDir::new().expect("root");
    let ctx = ctx(root.path());
    write(root.path(), "notes.md", "mine");

    let report = regenerate(&ctx, &[("index.html", "<html/>")]);
    assert_eq!(outcome(&report, "notes.md"), &Outcome::Preserved);
    assert!(!report.manifest.is_tracked(&RelPath::from("notes.md")));

    regenerate(&ctx, &[("notes.md", "generated")]);
    assert_eq!(read(root.path(), "notes.md"), "mine");
    assert_eq!(read(root.path(), "notes.md.new"), "generated");
}

#[test]
fn repeated_runs_refresh_the_fork_of_an_untracked_file() {
    let root = TempDir::new().expect("root");
    let ctx = ctx(root.path());
    write(root.path(), "README.md", "mine");

    regenerate(&ctx, &[("README.md", "g1")]);
    let report = regenerate(&ctx, &[("README.md", "g2")]);

    assert_eq!(
        outcome(&report, "README.md"),
        &Outcome::Forked {
            sibling: RelPath::from("README.md.new")
        }
    );
    assert_eq!(read(root.path(), "README.md"), "mine");
    assert_eq!(read(root.path(), "README.md.new"), "g2");
    assert!(!root.path().join("README.md.new.new").exists());
    assert!(!report.manifest.is_tracked(&RelPath::from("README.md.new")));
}

#[test]
fn generator_start_failure_is_reported_even_if_restore_fails() {
    let root = TempDir::new().expect("root");
    let ctx = ctx(root.path());

    let err = run(&ctx, "spec", &Unstartable, &FailFirst::passing()).expect_err("run fails");
    assert!(
        matches!(&err, SyncError::Collaborator { program, .. } if program == "missing-generator"),
        "got {err:?}"
    );
    assert!(stash_dir(root.path()).exists(), "unreadable stash is left for inspection");
}

#[test]
fn new_output_without_prior_file_is_not_a_conflict() {
    let root = TempDir::new().expect("root");
    let ctx = ctx(root.path());
    regenerate(&ctx, &[("a.txt", "A")]);
    let report = regenerate(&ctx, &[("a.txt", "A"), ("b.txt", "B")]);

    assert_eq!(outcome(&report, "b.txt"), &Outcome::Overwritten);
    assert!(!root.path().join("b.txt.new").exists());
    assert!(report.manifest.is_tracked(&RelPath::from("b.txt")));
}

#[test]
fn files_no_longer_generated_are_dropped() {
    let root = TempDir::new().expect("root");
    let ctx = ctx(root.path());
    regenerate(&ctx, &[("a.txt", "A"), ("b.txt", "B")]);

    let generator = Emit::new(&[("a.txt", "A")]);
    let validator = FailFirst::times(1, &["malformed-document: a.txt"]);
    let report = run(&ctx, "spec", &generator, &validator).expect("run");

    assert!(!root.path().join("b.txt").exists(), "cleared by the retry");
    assert!(!report.manifest.is_tracked(&RelPath::from("b.txt")));
}

#[test]
fn scoped_pass_leaves_other_components_alone() {
    let root = TempDir::new().expect("root");
    let mut ctx = ctx(root.path());
    regenerate(&ctx, &[("api/a.rs", "A1"), ("web/index.html", "W1")]);
    write(root.path(), "web/notes.txt", "mine");
    let before = manifest::load(root.path()).expect("load").expect("manifest");

    ctx.policy.scope = Some(ComponentScope::new(["api"]));
    let generator = Emit::new(&[("api/a.rs", "A2"), ("web/index.html", "W2"), ("web/new.css", "C")]);
    let validator = FailFirst::times(1, &["missing-file: api/b.rs"]);
    let report = run(&ctx, "spec", &generator, &validator).expect("run");

    assert_eq!(read(root.path(), "api/a.rs"), "A2");
    assert_eq!(read(root.path(), "web/index.html"), "W1");
    assert_eq!(read(root.path(), "web/notes.txt"), "mine");
    assert!(!root.path().join("web/new.css").exists());
    let web = RelPath::from("web/index.html");
    assert_eq!(report.manifest.files[&web], before.files[&web]);
    assert!(!report.manifest.is_tracked(&RelPath::from("web/new.css")));
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(5)]
fn never_passing_validator_stops_at_ceiling(#[case] ceiling: u32) {
    let root = TempDir::new().expect("root");
    let mut ctx = ctx(root.path());
    ctx.max_attempts = ceiling;

    let generator = Emit::new(&[("index.html", "<div>")]);
    let validator = FailFirst::never_passing(&["unbalanced-markup: <div> never closed"]);
    let report = run(&ctx, "spec", &generator, &validator).expect("run");

    assert!(!report.outcome.is_success());
    assert_eq!(report.outcome.attempt_count(), ceiling);
    assert_eq!(generator.calls(), ceiling as usize);
    assert_eq!(report.outcome.errors().count(), ceiling as usize);
    // The failed output stays in place and is still tracked.
    assert_eq!(read(root.path(), "index.html"), "<div>");
    assert!(report.manifest.is_tracked(&RelPath::from("index.html")));
    assert!(report.pruned.is_empty());
}

#[test]
fn feedback_is_appended_verbatim() {
    let root = TempDir::new().expect("root");
    let generator = Emit::new(&[("index.html", "x")]);
    let validator = FailFirst::times(2, &["missing-required-section: <footer> & \"legal\""]);
    let report = run(&ctx(root.path()), "Make a page.", &generator, &validator).expect("run");

    assert!(report.outcome.is_success());
    let specs = generator.specs.borrow();
    assert_eq!(specs[0], "Make a page.");
    assert!(specs[1].starts_with("Make a page."));
    assert!(specs[1].contains("missing-required-section: <footer> & \"legal\""));
    assert_eq!(specs[2].matches("<footer> & \"legal\"").count(), 2);
}

#[test]
fn history_is_bounded_to_most_recent() {
    let root = TempDir::new().expect("root");
    let mut ctx = ctx(root.path());
    ctx.history_limit = 2;

    let mut snapshots = Vec::new();
    for _ in 0..5 {
        let report = regenerate(&ctx, &[("a.txt", "A")]);
        snapshots.extend(report.snapshot);
    }

    let mut kept: Vec<_> = fs::read_dir(history_dir(root.path()))
        .expect("history")
        .map(|e| e.expect("entry").path())
        .collect();
    kept.sort();
    assert_eq!(snapshots.len(), 4);
    assert_eq!(kept, snapshots[snapshots.len() - 2..].to_vec());
}

#[test]
fn interrupted_run_is_recovered() {
    let root = TempDir::new().expect("root");
    let ctx = ctx(root.path());
    regenerate(&ctx, &[("a.txt", "H1")]);
    write(root.path(), "a.txt", "H2");

    // Simulate a crash after the stash was taken and the generator overwrote a.txt.
    let stash = Stash::capture(root.path(), [&RelPath::from("a.txt")]).expect("stash");
    drop(stash);
    write(root.path(), "a.txt", "half-written");

    let report = regenerate(&ctx, &[("a.txt", "H3")]);
    assert_eq!(report.recovered, 1);
    assert_eq!(read(root.path(), "a.txt"), "H2");
    assert_eq!(read(root.path(), "a.txt.new"), "H3");
}

#[test]
fn corrupt_manifest_degrades_to_full_regeneration() {
    let root = TempDir::new().expect("root");
    let ctx = ctx(root.path());
    regenerate(&ctx, &[("a.txt", "A")]);
    fs::write(regen_core::paths::manifest_path(root.path()), "{ not json").expect("corrupt");

    let report = regenerate(&ctx, &[("a.txt", "A")]);
    assert!(!report.drift.manifest_present);
    // With no record a.txt counts as user content, but identical output is no conflict.
    assert_eq!(outcome(&report, "a.txt"), &Outcome::Overwritten);
    assert_eq!(read(root.path(), "a.txt"), "A");
    assert!(report.manifest.is_tracked(&RelPath::from("a.txt")));
}
