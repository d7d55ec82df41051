use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const SCHEMA: &str = r#"
[users.alice]
password = "Sup3rSecret"

[types.fullname]
keyspace = "ks1"
fields = { fname = "text", lname = "text" }

[keyspaces.ks1]
replication = { class = "SimpleStrategy", replication_factor = 3 }
"#;

fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn plan_prints_statements_in_dependency_order() {
    let tmp = TempDir::new().expect("tmpdir");
    let file = write(&tmp, "schema.toml", SCHEMA);

    let assert = std::process::Command::new(assert_cmd::cargo::cargo_bin!("cqlsync"))
        .arg("plan")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATE KEYSPACE IF NOT EXISTS ks1"))
        .stdout(predicate::str::contains(
            "CREATE TYPE IF NOT EXISTS ks1.fullname (fname text, lname text)",
        ))
        .stdout(predicate::str::contains("Sup3rSecret").not());

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let keyspace = stdout.find("keyspace ks1").unwrap();
    let ty = stdout.find("type ks1.fullname").unwrap();
    let user = stdout.find("user alice").unwrap();
    assert!(keyspace < ty && ty < user, "{stdout}");
}

#[test]
fn plan_json_envelope_lists_steps() {
    let tmp = TempDir::new().expect("tmpdir");
    let file = write(&tmp, "schema.toml", SCHEMA);

    let assert = std::process::Command::new(assert_cmd::cargo::cargo_bin!("cqlsync"))
        .args(["plan", "--json"])
        .arg(&file)
        .assert()
        .success();
    let output = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&output).expect("json");
    let steps = json["data"].as_array().expect("steps");
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0]["kind"], "keyspace");
    assert_eq!(steps[0]["read"], "DESC KEYSPACES");
    assert_eq!(steps[2]["read"], "LIST ROLES");
    assert!(
        steps[2]["write"]
            .as_str()
            .unwrap_or_default()
            .contains("PASSWORD = ******")
    );
}

#[test]
fn duplicate_names_are_a_configuration_error() {
    let tmp = TempDir::new().expect("tmpdir");
    let file = write(
        &tmp,
        "dup.toml",
        r#"
[keyspaces.a]
name = "ks1"
replication = { class = "SimpleStrategy", replication_factor = 1 }

[keyspaces.b]
name = "ks1"
replication = { class = "SimpleStrategy", replication_factor = 1 }
"#,
    );

    std::process::Command::new(assert_cmd::cargo::cargo_bin!("cqlsync"))
        .arg("plan")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"))
        .stderr(predicate::str::contains("declared twice"));
}

#[test]
fn unreadable_file_fails_cleanly() {
    let tmp = TempDir::new().expect("tmpdir");
    std::process::Command::new(assert_cmd::cargo::cargo_bin!("cqlsync"))
        .arg("plan")
        .arg(tmp.path().join("missing.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot load desired state"));
}
