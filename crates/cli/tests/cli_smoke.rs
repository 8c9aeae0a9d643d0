use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PRODUCTS: &str = r#"[
    {"item_name": "Blue Mug", "sku": "MUG-1", "price": "12.5"},
    {"item_name": "Red Mug", "sku": "MUG-2", "price": 9}
]"#;

const MAPPINGS: &str = r#"[
    {"source_field": "item_name", "target_field": "title", "confidence": 90},
    {"source_field": "sku", "target_field": "sku", "confidence": 90},
    {"source_field": "price", "target_field": "price", "confidence": 90}
]"#;

fn posmigrate() -> Command {
    let mut cmd = Command::cargo_bin("posmigrate").expect("binary built");
    cmd.env_remove("RUST_LOG").env("LLM_PROVIDER", "none");
    cmd
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write fixture");
    path
}

#[test]
fn help_lists_every_subcommand() {
    posmigrate()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("suggest"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("verify"));
}

#[test]
fn suggest_offline_maps_known_columns() {
    let dir = TempDir::new().expect("temp dir");
    let sample = write(dir.path(), "sample.json", PRODUCTS);

    posmigrate()
        .args(["suggest", "--offline", "--sample"])
        .arg(&sample)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""target_field": "title""#))
        .stdout(predicate::str::contains(r#""target_field": "price""#));
}

#[test]
fn plan_json_lists_the_stages() {
    let dir = TempDir::new().expect("temp dir");
    let records = write(dir.path(), "products.json", PRODUCTS);
    let mappings = write(dir.path(), "mappings.json", MAPPINGS);

    posmigrate()
        .args(["plan", "--json", "--resource", "product", "--records"])
        .arg(&records)
        .arg("--mappings")
        .arg(&mappings)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind": "products""#))
        .stdout(predicate::str::contains(r#""total_records": 2"#));
}

#[test]
fn dry_run_migration_reports_full_success() {
    let dir = TempDir::new().expect("temp dir");
    let records = write(dir.path(), "products.json", PRODUCTS);
    let mappings = write(dir.path(), "mappings.json", MAPPINGS);
    let report = dir.path().join("report.json");

    posmigrate()
        .args(["migrate", "--dry-run", "--resource", "product", "--records"])
        .arg(&records)
        .arg("--mappings")
        .arg(&mappings)
        .arg("--report")
        .arg(&report)
        .assert()
        .success();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).expect("report written")).expect("json");
    assert_eq!(json["report"]["summary"]["completed"], 2);
    assert_eq!(json["report"]["summary"]["success_rate"], 100.0);
    assert_eq!(json["integrity"]["integrity_percent"], 100.0);
}

#[test]
fn migration_without_resource_tags_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let records = write(dir.path(), "products.json", PRODUCTS);
    let mappings = write(dir.path(), "mappings.json", MAPPINGS);

    posmigrate()
        .args(["migrate", "--dry-run", "--records"])
        .arg(&records)
        .arg("--mappings")
        .arg(&mappings)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--resource"));
}

#[test]
fn verify_fails_when_a_record_is_missing() {
    let dir = TempDir::new().expect("temp dir");
    let original = write(
        dir.path(),
        "original.json",
        r#"[{"sku": "A", "title": "One"}, {"sku": "B", "title": "Two"}]"#,
    );
    let migrated = write(dir.path(), "migrated.json", r#"[{"sku": "A", "title": "One"}]"#);

    posmigrate()
        .args(["verify", "--original"])
        .arg(&original)
        .arg("--migrated")
        .arg(&migrated)
        .assert()
        .failure()
        .stdout(predicate::str::contains("missing_records"))
        .stderr(predicate::str::contains("1 missing"));
}

#[test]
fn verify_applies_mappings_to_the_original_rows() {
    let dir = TempDir::new().expect("temp dir");
    let original = write(dir.path(), "original.json", PRODUCTS);
    let mappings = write(dir.path(), "mappings.json", MAPPINGS);
    let migrated = write(
        dir.path(),
        "migrated.json",
        r#"[
            {"id": 1, "title": "Blue Mug", "sku": "MUG-1", "price": "12.50"},
            {"id": 2, "title": "Red Mug", "sku": "MUG-2", "price": "9.00"}
        ]"#,
    );

    posmigrate()
        .args(["verify", "--original"])
        .arg(&original)
        .arg("--migrated")
        .arg(&migrated)
        .arg("--mappings")
        .arg(&mappings)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""integrity_percent": 100.0"#));
}
