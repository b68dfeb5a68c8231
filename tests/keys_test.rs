use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use assert_fs::TempDir;
use predicates::prelude::*;

/// Run envault in `dir` with no vault configured.
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

fn initialized() -> TempDir {
    let dir = TempDir::new().unwrap();
    envault(&dir).arg("init").assert().success();
    dir
}

#[test]
fn init_creates_envault_directory() {
    let dir = TempDir::new().unwrap();

    envault(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created .envault/"))
        .stdout(predicate::str::contains("config.toml"));

    assert!(dir.path().join(".envault/config.toml").exists());
    assert!(dir.path().join(".envault/documents").is_dir());
    let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert!(gitignore.contains(".envault/keys.json"));
}

#[test]
fn init_twice_fails() {
    let dir = initialized();

    envault(&dir)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn custom_directory_is_honoured() {
    let dir = TempDir::new().unwrap();

    envault(&dir).args(["--dir", "secrets", "init"]).assert().success();
    assert!(dir.path().join("secrets/config.toml").exists());

    envault(&dir)
        .args(["--dir", "secrets", "keys", "create", "doc-key"])
        .assert()
        .success();
    assert!(dir.path().join("secrets/keys.json").exists());
}

#[test]
fn keys_without_init_fails() {
    let dir = TempDir::new().unwrap();

    envault(&dir)
        .args(["keys", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn create_and_list_symmetric_key() {
    let dir = initialized();

    envault(&dir)
        .args(["keys", "create", "doc-key", "--type", "AES", "--size", "128"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created key 'doc-key'"))
        .stdout(predicate::str::contains("128 bits"))
        .stdout(predicate::str::contains("local"));

    envault(&dir)
        .args(["keys", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("doc-key"))
        .stdout(predicate::str::contains("AES"));
}

#[test]
fn duplicate_key_name_fails() {
    let dir = initialized();

    envault(&dir).args(["keys", "create", "doc-key"]).assert().success();
    envault(&dir)
        .args(["keys", "create", "doc-key", "-t", "RSA"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn invalid_length_is_rejected() {
    let dir = initialized();

    envault(&dir)
        .args(["keys", "create", "bad-key", "-t", "AES", "-s", "192"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid key length 192"));
}

#[test]
fn unsupported_type_is_rejected() {
    let dir = initialized();

    envault(&dir)
        .args(["keys", "create", "bad-key", "-t", "DSA"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported key type"));
}

#[test]
fn curve_key_is_a_tagged_rsa_pair() {
    let dir = initialized();

    envault(&dir)
        .args(["keys", "create", "curve-key", "-t", "EC", "-s", "P-384"])
        .assert()
        .success()
        .stdout(predicate::str::contains("P-384 (2048 bits)"))
        .stdout(predicate::str::contains("-----BEGIN PUBLIC KEY-----"));

    envault(&dir)
        .args(["keys", "get", "curve-key"])
        .assert()
        .success()
        .stdout(predicate::str::contains("EC"))
        .stdout(predicate::str::contains("PRIVATE").not());
}

#[test]
fn get_json_describes_symmetric_key() {
    let dir = initialized();
    envault(&dir).args(["keys", "create", "doc-key"]).assert().success();

    let output = envault(&dir)
        .args(["keys", "get", "doc-key", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["name"], "doc-key");
    assert_eq!(json["material"], "symmetric");
    assert_eq!(json["storage"], "Local");
    assert!(json["secret"].as_str().is_some());
}

#[test]
fn get_unknown_key_fails() {
    let dir = initialized();

    envault(&dir)
        .args(["keys", "get", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Key 'ghost' not found"));
}
