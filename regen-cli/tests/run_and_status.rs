#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use regen_core::manifest;

fn regen_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("regen"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("RUST_LOG", "warn");
    cmd
}

struct Fixture {
    home: TempDir,
    root: TempDir,
    spec: PathBuf,
}

impl Fixture {
    /// The generator copies the attempt's spec text into `a.txt` and counts
    /// its invocations in `.regen/calls`.
    fn new(validator: &str) -> Self {
        let home = TempDir::new().expect("home");
        let root = TempDir::new().expect("root");
        let spec = home.path().join("spec.md");
        fs::write(&spec, "H1").expect("spec");

        fs::create_dir_all(root.path().join(".regen")).expect("state dir");
        let config = format!(
            "generator:\n  command: ['sh', '-c', 'cp \"$REGEN_SPEC_FILE\" a.txt; echo x >> .regen/calls']\n\
             validator:\n  command: ['sh', '-c', '{validator}']\n"
        );
        fs::write(root.path().join(".regen/config.yaml"), config).expect("config");
        Self { home, root, spec }
    }

    fn cmd(&self) -> Command {
        regen_cmd(self.home.path())
    }

    fn run(&self, extra: &[&str]) -> assert_cmd::assert::Assert {
        let mut cmd = self.cmd();
        cmd.arg("run")
            .arg("--spec")
            .arg(&self.spec)
            .arg("--root")
            .arg(self.root.path())
            .args(extra);
        cmd.assert()
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root.path().join(rel)).expect("read")
    }

    fn write(&self, rel: &str, content: &str) {
        fs::write(self.root.path().join(rel), content).expect("write");
    }

    fn set_spec(&self, content: &str) {
        fs::write(&self.spec, content).expect("spec");
    }
}

#[test]
fn init_scaffolds_config_once() {
    let home = TempDir::new().expect("home");
    let root = TempDir::new().expect("root");

    regen_cmd(home.path())
        .args(["init", "--root"])
        .arg(root.path())
        .assert()
        .success()
        .stdout(contains("Wrote"));
    assert!(root.path().join(".regen/config.yaml").exists());

    regen_cmd(home.path())
        .args(["init", "--root"])
        .arg(root.path())
        .assert()
        .success()
        .stdout(contains("already exists"));
}

#[test]
fn run_without_generator_command_fails() {
    let home = TempDir::new().expect("home");
    let root = TempDir::new().expect("root");
    let spec = home.path().join("spec.md");
    fs::write(&spec, "spec").expect("spec");

    regen_cmd(home.path())
        .arg("run")
        .arg("--spec")
        .arg(&spec)
        .arg("--root")
        .arg(root.path())
        .assert()
        .failure()
        .stderr(contains("no generator command configured"));
}

#[test]
fn edited_file_is_forked_then_diffed() {
    let fx = Fixture::new("true");
    fx.run(&[]).success().stdout(contains("regenerated 1 file(s)"));
    assert_eq!(fx.read("a.txt"), "H1");

    fx.write("a.txt", "H2");
    fx.set_spec("H3");
    fx.run(&[]).success().stdout(contains("a.txt.new"));
    assert_eq!(fx.read("a.txt"), "H2");
    assert_eq!(fx.read("a.txt.new"), "H3");

    let assert = fx
        .cmd()
        .args(["diff", "--root"])
        .arg(fx.root.path())
        .assert()
        .success()
        .stdout(contains("+++ b/a.txt.new"));
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    assert!(stdout.lines().any(|l| l == "-H2"));
    assert!(stdout.lines().any(|l| l == "+H3"));
}

#[test]
fn force_keeps_backup() {
    let fx = Fixture::new("true");
    fx.run(&[]).success();
    fx.write("a.txt", "H2");
    fx.set_spec("H3");

    fx.run(&["--force"]).success().stdout(contains("a.txt.bak"));
    assert_eq!(fx.read("a.txt"), "H3");
    assert_eq!(fx.read("a.txt.bak"), "H2");
}

#[test]
fn failing_validation_exits_nonzero_after_ceiling() {
    let fx = Fixture::new("echo \"missing-file: index.html\"");

    fx.run(&["--max-attempts", "2"])
        .code(1)
        .stdout(contains("manual intervention required"))
        .stdout(contains("missing-file: index.html"));

    assert_eq!(fx.read(".regen/calls").lines().count(), 2);
    let attempt2 = fx.read(".regen/attempts/attempt-2.md");
    assert!(attempt2.starts_with("H1"));
    assert!(attempt2.contains("missing-file: index.html"));
    // The manifest still reflects what the last attempt left behind.
    let saved = manifest::load(fx.root.path()).expect("load").expect("manifest");
    assert!(saved.is_tracked(&"a.txt".into()));
}

#[test]
fn zero_max_attempts_is_rejected() {
    let fx = Fixture::new("true");
    fx.run(&["--max-attempts", "0"]).failure();
    assert!(!fx.root.path().join("a.txt").exists());
}

#[test]
fn status_json_reports_drift() {
    let fx = Fixture::new("true");
    fx.run(&[]).success();

    let status_json = |fx: &Fixture| -> serde_json::Value {
        let assert = fx
            .cmd()
            .args(["status", "--json", "--root"])
            .arg(fx.root.path())
            .arg("--spec")
            .arg(&fx.spec)
            .assert()
            .success();
        serde_json::from_slice(&assert.get_output().stdout).expect("status json")
    };

    let clean = status_json(&fx);
    assert_eq!(clean["status"], "current");
    assert_eq!(clean["spec_changed"], false);
    assert_eq!(clean["files"][0]["path"], "a.txt");

    fx.write("a.txt", "edited");
    let edited = status_json(&fx);
    assert_eq!(edited["status"], "modified");
    assert_eq!(edited["files"][0]["user_modified"], true);

    fx.cmd()
        .args(["status", "--root"])
        .arg(fx.root.path())
        .assert()
        .success()
        .stdout(contains("MODIFIED"));
}

#[test]
fn history_lists_snapshots_and_rollback_restores() {
    let fx = Fixture::new("true");
    fx.run(&[]).success();
    let first = manifest::load(fx.root.path()).expect("load").expect("manifest");
    fx.set_spec("H2");
    fx.run(&[]).success();

    let snapshots: Vec<String> = fs::read_dir(fx.root.path().join(".regen/history"))
        .expect("history dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(snapshots.len(), 1);

    fx.cmd()
        .args(["history", "--root"])
        .arg(fx.root.path())
        .assert()
        .success()
        .stdout(contains(snapshots[0].as_str()));

    fx.cmd()
        .args(["rollback", &snapshots[0], "--root"])
        .arg(fx.root.path())
        .assert()
        .success()
        .stdout(contains("Previous state archived"));
    let restored = manifest::load(fx.root.path()).expect("load").expect("manifest");
    assert_eq!(restored, first);

    fx.cmd()
        .args(["rollback", "no-such-snapshot", "--root"])
        .arg(fx.root.path())
        .assert()
        .failure();
}

#[test]
fn unknown_component_is_an_error() {
    let fx = Fixture::new("true");
    fx.run(&["--component", "api"])
        .failure()
        .stderr(contains("api"));
}
