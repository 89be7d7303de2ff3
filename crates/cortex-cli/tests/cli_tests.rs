use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::TempDir;

struct Env {
    config_dir: TempDir,
    data_dir: TempDir,
    logs_dir: TempDir,
}

impl Env {
    fn new() -> Self {
        let env = Self {
            config_dir: TempDir::new().unwrap(),
            data_dir: TempDir::new().unwrap(),
            logs_dir: TempDir::new().unwrap(),
        };

        let config = format!(
            "me:\n  canonical_name: Test User\nadapters:\n  nexus:\n    type: nexus\n    options:\n      dir: {}\n  off:\n    type: bird\n    enabled: false\n",
            env.logs_dir.path().display()
        );
        std::fs::write(env.config_dir.path().join("config.yaml"), config).unwrap();

        let mut log = std::fs::File::create(env.logs_dir.path().join("log.jsonl")).unwrap();
        writeln!(
            log,
            r#"{{"id":"e1","session_id":"s1","content":"hello","ts":100}}"#
        )
        .unwrap();
        env
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("cortex").unwrap();
        cmd.env("CORTEX_CONFIG_DIR", self.config_dir.path())
            .env("CORTEX_DATA_DIR", self.data_dir.path());
        cmd
    }
}

#[test]
fn test_sync_all_succeeds_and_creates_store() {
    let env = Env::new();
    env.cmd()
        .args(["sync", "all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nexus"));
    assert!(env.data_dir.path().join("cortex.db").exists());
}

#[test]
fn test_sync_one_adapter() {
    let env = Env::new();
    env.cmd()
        .args(["sync", "nexus"])
        .assert()
        .success()
        .stdout(predicate::str::contains("events +1"));
}

#[test]
fn test_unknown_adapter_exits_2() {
    let env = Env::new();
    env.cmd()
        .args(["sync", "telegram"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no adapter named"));
}

#[test]
fn test_disabled_adapter_exits_2() {
    let env = Env::new();
    env.cmd()
        .args(["sync", "off"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("disabled"));
}

#[test]
fn test_full_resync_converges() {
    let env = Env::new();
    env.cmd().args(["sync", "all", "--full"]).assert().success();
    // Second incremental run imports nothing new.
    env.cmd()
        .args(["sync", "nexus"])
        .assert()
        .success()
        .stdout(predicate::str::contains("events +0"));
}

#[test]
fn test_status_lists_adapters() {
    let env = Env::new();
    env.cmd().args(["sync", "all"]).assert().success();
    env.cmd()
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nexus"))
        .stdout(predicate::str::contains("job=completed"));
}
