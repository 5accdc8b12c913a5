use assert_cmd::Command;
use predicates::prelude::*;

const CONFIG: &str = r#"
name = "CLI Smoke"
entity_type = "company"

[[fields]]
field = "company_name"
algorithm = "token-jaro-winkler"
weight = 3.0

[[fields]]
field = "tax_id"
algorithm = "exact"
weight = 2.0
threshold = 1.0
required = true

[blocking]
[[blocking.keys]]
name = "tax4"
[[blocking.keys.components]]
field = "tax_id"
transform = "digits"
length = 4

[sources.crm]
file = "crm.csv"
id_column = "id"
observed_at_column = "updated_at"
tenant_id = "t1"

[sources.crm.fields]
company_name = "name"
tax_id = "vat"
"#;

const CSV: &str = "\
id,name,vat,updated_at
c1,Acme Corp,991234,2026-01-10
c2,ACME Corp.,991234,2026-01-15
c3,Zenith Ltd,775511,2026-01-12
";

fn write_fixture(dir: &std::path::Path) -> std::path::PathBuf {
    let config_path = dir.join("smoke.resolve.toml");
    std::fs::write(&config_path, CONFIG).unwrap();
    std::fs::write(dir.join("crm.csv"), CSV).unwrap();
    config_path
}

#[test]
fn run_merges_duplicates_and_exits_clean() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_fixture(dir.path());

    Command::cargo_bin("aurum")
        .unwrap()
        .arg("run")
        .arg(&config_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("2 golden records"))
        .stderr(predicate::str::contains("1 matches"));
}

#[test]
fn run_json_emits_outcome_on_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_fixture(dir.path());

    let assert = Command::cargo_bin("aurum")
        .unwrap()
        .arg("run")
        .arg(&config_path)
        .arg("--json")
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(outcome["summary"]["golden_records"], 2);
    assert_eq!(outcome["golden_records"][0]["source_record_ids"].as_array().unwrap().len(), 2);
}

#[test]
fn run_writes_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_fixture(dir.path());
    let out_path = dir.path().join("result.json");

    Command::cargo_bin("aurum")
        .unwrap()
        .arg("run")
        .arg(&config_path)
        .arg("--output")
        .arg(&out_path)
        .assert()
        .success();

    let written = std::fs::read_to_string(&out_path).unwrap();
    assert!(written.contains("golden_records"));
}

#[test]
fn validate_reports_config_shape() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_fixture(dir.path());

    Command::cargo_bin("aurum")
        .unwrap()
        .arg("validate")
        .arg(&config_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("valid:"))
        .stderr(predicate::str::contains("2 field(s)"));
}

#[test]
fn invalid_config_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("bad.resolve.toml");
    std::fs::write(&config_path, CONFIG.replace("weight = 3.0", "weight = -1.0")).unwrap();

    Command::cargo_bin("aurum")
        .unwrap()
        .arg("validate")
        .arg(&config_path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("weight"));
}
