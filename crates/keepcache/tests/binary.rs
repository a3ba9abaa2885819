//! Runs the keepcache binary the way a workflow job does: two separate
//! processes that only share the runner environment

#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::predicate;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A job's runner directories
struct Runner {
    _root: TempDir,
    temp: PathBuf,
    cache: PathBuf,
    output: PathBuf,
}

impl Runner {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let temp = root.path().join("_temp");
        let cache = root.path().join("tool-cache");
        fs::create_dir_all(&temp).unwrap();
        Self {
            temp,
            cache,
            output: root.path().join("output"),
            _root: root,
        }
    }

    /// Default cache path when `cache-local-path` is not given
    fn local_path(&self) -> PathBuf {
        self.temp.join("keepcache-cache")
    }

    /// A step with a clean environment plus the runner and input variables
    fn step(&self, name: &str, key: &str) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_keepcache"));
        cmd.env_clear()
            .env("RUNNER_TEMP", &self.temp)
            .env("KEEPCACHE_CACHE_DIR", &self.cache)
            .env("GITHUB_OUTPUT", &self.output)
            .env("INPUT_ENABLE-CACHE", "true")
            .env("INPUT_CACHE-KEY", key)
            .arg(name);
        cmd
    }
}

fn write_payload(dir: &Path, content: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("pkg.txt"), content).unwrap();
}

#[test]
fn restore_then_save_hand_keys_over_through_runner_temp() {
    let runner = Runner::new();

    runner
        .step("restore", "deps-abc")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("No cache found for key: deps-abc"));

    write_payload(&runner.local_path(), "v1");
    let saved = runner
        .step("save", "deps-abc")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("cache saved with the key: deps-abc"));
    let stdout = String::from_utf8_lossy(&saved.get_output().stdout).to_string();
    assert!(!stdout.contains("::warning::"), "unexpected warning: {stdout}");

    // Next job: fresh workspace, same key
    fs::remove_dir_all(&runner.local_path()).unwrap();
    runner
        .step("restore", "deps-abc")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("Cache restored from key: deps-abc"));
    assert_eq!(
        fs::read_to_string(runner.local_path().join("pkg.txt")).unwrap(),
        "v1"
    );
    assert!(
        fs::read_to_string(&runner.output)
            .unwrap()
            .ends_with("cache-hit=true\n")
    );

    runner
        .step("save", "deps-abc")
        .assert()
        .code(0)
        .stdout(predicate::str::contains(
            "Cache hit occurred on key deps-abc, not saving cache.",
        ));
}

#[test]
fn failed_save_still_exits_zero() {
    let runner = Runner::new();
    fs::write(runner.temp.join("keepcache-state"), "cache-key=deps-abc\n").unwrap();
    let missing = runner.temp.join("does-not-exist");

    runner
        .step("save", "deps-abc")
        .env("INPUT_CACHE-LOCAL-PATH", &missing)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("::error::"))
        .stdout(predicate::str::contains("does-not-exist"));
}

#[test]
fn save_without_recorded_key_warns_and_exits_zero() {
    let runner = Runner::new();
    write_payload(&runner.local_path(), "v1");

    runner
        .step("save", "deps-abc")
        .assert()
        .code(0)
        .stdout(predicate::str::contains(
            "::warning::Error retrieving cache key from state.",
        ));
    assert!(!runner.cache.exists() || fs::read_dir(&runner.cache).unwrap().count() == 0);
}

#[test]
fn disabled_steps_print_nothing() {
    let runner = Runner::new();

    runner
        .step("restore", "deps-abc")
        .env("INPUT_ENABLE-CACHE", "false")
        .assert()
        .code(0)
        .stdout(predicate::str::is_empty());
    assert!(!runner.temp.join("keepcache-state").exists());
}
