use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use assert_fs::TempDir;
use predicates::prelude::*;

fn envault(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("envault");
    cmd.current_dir(dir.path())
        .env("USER", "tester")
        .env_remove("ENVAULT_DIR")
        .env_remove("KEY_VAULT_NAME")
        .env_remove("AZURE_TENANT_ID")
        .env_remove("AZURE_CLIENT_ID")
        .env_remove("AZURE_CLIENT_SECRET")
        .env_remove("MAX_FILE_SIZE");
    cmd
}

fn audit_lines(dir: &TempDir) -> Vec<serde_json::Value> {
    std::fs::read_to_string(dir.path().join(".envault/audit.log"))
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

// ─── Audit / Log tests ───

#[test]
fn operations_are_recorded_with_outcome() {
    let dir = TempDir::new().unwrap();
    envault(&dir).arg("init").assert().success();
    envault(&dir).args(["keys", "create", "doc-key"]).assert().success();
    envault(&dir).args(["keys", "create", "doc-key"]).assert().failure();
    envault(&dir)
        .args(["encrypt", "-k", "doc-key", "--data", "audited"])
        .assert()
        .success();

    let entries = audit_lines(&dir);
    let actions: Vec<&str> = entries.iter().map(|e| e["action"].as_str().unwrap()).collect();
    assert_eq!(actions, ["init", "key_create", "key_create", "encrypt"]);

    assert_eq!(entries[1]["outcome"], "success");
    assert_eq!(entries[2]["outcome"], "failure");
    assert_eq!(entries[2]["key_name"], "doc-key");
    assert_eq!(entries[3]["author"], "tester");
    assert_eq!(entries[3]["state_hash"].as_str().unwrap().len(), 64);
}

#[test]
fn failed_decrypt_is_audited() {
    let dir = TempDir::new().unwrap();
    envault(&dir).arg("init").assert().success();
    envault(&dir).args(["keys", "create", "a-key"]).assert().success();
    envault(&dir).args(["keys", "create", "b-key"]).assert().success();

    let envelope = envault(&dir)
        .args(["encrypt", "-k", "a-key", "--data", "secret"])
        .output()
        .unwrap()
        .stdout;
    envault(&dir)
        .args(["decrypt", "-k", "b-key"])
        .write_stdin(envelope)
        .assert()
        .failure();

    let last = audit_lines(&dir).pop().unwrap();
    assert_eq!(last["action"], "decrypt");
    assert_eq!(last["outcome"], "failure");
    assert_eq!(last["key_name"], "b-key");
    assert!(last["detail"].as_str().unwrap().starts_with("Decryption failed"));
}

#[test]
fn log_filters_by_action() {
    let dir = TempDir::new().unwrap();
    envault(&dir).arg("init").assert().success();
    envault(&dir).args(["keys", "create", "doc-key"]).assert().success();

    envault(&dir)
        .args(["log", "--action", "key-create"])
        .assert()
        .success()
        .stdout(predicate::str::contains("envault log (1 entries)"))
        .stdout(predicate::str::contains("doc-key"));

    envault(&dir)
        .args(["log", "--last", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("key create"));
}

#[test]
fn log_rejects_unknown_action() {
    let dir = TempDir::new().unwrap();
    envault(&dir).arg("init").assert().success();

    envault(&dir)
        .args(["log", "--action", "rotate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown audit action 'rotate'"));
}

#[test]
fn log_rejects_bad_date() {
    let dir = TempDir::new().unwrap();
    envault(&dir).arg("init").assert().success();

    envault(&dir)
        .args(["log", "--since", "yesterday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid date format"));
}

#[test]
fn log_since_future_date_is_empty() {
    let dir = TempDir::new().unwrap();
    envault(&dir).arg("init").assert().success();

    envault(&dir)
        .args(["log", "--since", "2999-01-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No audit entries found"));
}
