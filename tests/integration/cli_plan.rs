#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

const CATALOG: &str = r#"
[[tables]]
name = "orders"
partition_column = "o_id"
columns = [
  { name = "o_id", type = "integer", nullable = false },
  { name = "cust", type = "varchar" },
  { name = "amount", type = "float" },
]
indexes = [{ name = "orders_pk", columns = ["o_id"], unique = true }]

[[tables]]
name = "regions"
columns = [
  { name = "r_id", type = "integer" },
  { name = "name", type = "varchar" },
]
"#;

fn setup() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("catalog.toml");
    fs::write(&path, CATALOG).expect("write catalog");
    (dir, path)
}

fn stdout_of(args: &[&str], catalog: &PathBuf) -> String {
    let output = cargo_bin_cmd!("keel")
        .arg("--catalog")
        .arg(catalog)
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8(output).expect("utf8")
}

#[test]
fn plan_prints_shape_and_routing() {
    let (_dir, catalog) = setup();
    let text = stdout_of(&["plan", "SELECT CUST FROM ORDERS WHERE O_ID = 7"], &catalog);
    assert!(text.starts_with("Plan: SEND("), "{text}");
    assert!(text.contains("routing=single-partition"), "{text}");
    assert!(text.contains("parameterized=true fallback=false"), "{text}");
    assert!(text.contains("parameters: integer"), "{text}");
    assert!(text.contains("columns: CUST"), "{text}");
}

#[test]
fn plan_emits_json() {
    let (_dir, catalog) = setup();
    let output = stdout_of(
        &["--format", "json", "plan", "SELECT NAME FROM REGIONS WHERE R_ID = 2"],
        &catalog,
    );
    let json: Value = serde_json::from_str(&output).expect("valid json");
    assert_eq!(json["single_partition"], Value::Bool(true));
    assert_eq!(json["read_only"], Value::Bool(true));
    assert_eq!(json["parameter_types"], serde_json::json!(["integer"]));
    assert_eq!(json["columns"], serde_json::json!(["NAME"]));
    assert!(json["plan_hash"].as_str().is_some_and(|h| h.len() == 16));
    assert!(json["shape"].as_str().is_some_and(|s| s.starts_with("SEND(")));
}

#[test]
fn no_parameterize_plans_the_statement_as_written() {
    let (_dir, catalog) = setup();
    let text = stdout_of(
        &["plan", "--no-parameterize", "SELECT CUST FROM ORDERS WHERE AMOUNT > 1.5"],
        &catalog,
    );
    assert!(text.contains("routing=multi-partition"), "{text}");
    assert!(text.contains("parameterized=false"), "{text}");
    assert!(!text.contains("parameters:"), "{text}");
}

#[test]
fn parameterize_shows_token_and_literals() {
    let (_dir, catalog) = setup();
    let text = stdout_of(
        &["parameterize", "SELECT CUST FROM ORDERS WHERE O_ID = 5 AND CUST = 'x'"],
        &catalog,
    );
    assert!(text.starts_with("Token: "), "{text}");
    assert!(text.contains("literals: 5, 'x'"), "{text}");

    let text = stdout_of(&["parameterize", "SELECT CUST FROM ORDERS WHERE O_ID = ?"], &catalog);
    assert!(text.contains("no literals extracted (user parameters: 1)"), "{text}");
}

#[test]
fn planner_errors_exit_with_status_one() {
    let (_dir, catalog) = setup();
    let output = cargo_bin_cmd!("keel")
        .arg("--catalog")
        .arg(&catalog)
        .args(["plan", "SELECT X FROM MISSING"])
        .assert()
        .code(1)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf8");
    assert!(stderr.contains("error:"), "{stderr}");
}

#[test]
fn missing_catalog_file_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let output = cargo_bin_cmd!("keel")
        .arg("--catalog")
        .arg(dir.path().join("absent.toml"))
        .args(["plan", "SELECT 1"])
        .assert()
        .code(1)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf8");
    assert!(stderr.contains("failed to read"), "{stderr}");
}
