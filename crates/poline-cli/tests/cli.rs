//! Command-line behaviour of the `poline` binary.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const INVOICE: &str = "Invoice # CS003837319\n\
Order Date: 03/07/2024\n\
Item | UPC | Description | Ord | Alloc | Ship | BkOrd | U/M | List Price | Your Price | Amount\n\
XS9826A | 191009727774 | 6\"H Metal Ballerina Ornament | 24 | 0 | 0 | 24 | each | 2.00 | 1.60 | 38.40\n";

fn poline() -> Command {
    Command::cargo_bin("poline").unwrap()
}

/// An empty config file, so tests never read the user's configuration.
fn config_file(dir: &Path) -> PathBuf {
    let path = dir.join("config.json");
    fs::write(&path, "{}").unwrap();
    path
}

#[test]
fn process_writes_csv_rows() {
    let dir = TempDir::new().unwrap();
    let config = config_file(dir.path());
    let input = dir.path().join("invoice.txt");
    fs::write(&input, INVOICE).unwrap();

    poline()
        .arg("--config")
        .arg(&config)
        .args(["process", "--format", "csv", "--vendor", "Creative-Coop"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Order Date,Vendor,Invoice Number,Description,Unit Price,Quantity",
        ))
        .stdout(predicate::str::contains("03/07/2024,Creative-Coop,CS003837319,"))
        .stdout(predicate::str::contains("Metal Ballerina Ornament"))
        .stdout(predicate::str::contains(",$1.60,24"));
}

#[test]
fn process_writes_json_to_output_file() {
    let dir = TempDir::new().unwrap();
    let config = config_file(dir.path());
    let input = dir.path().join("invoice.txt");
    let output = dir.path().join("items.json");
    fs::write(&input, INVOICE).unwrap();

    poline()
        .arg("--config")
        .arg(&config)
        .arg("process")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(json["items"][0]["product_code"], "XS9826A");
    assert_eq!(json["items"][0]["quantity"], 24);
    assert_eq!(json["report"]["candidates"], 1);
}

#[test]
fn process_rejects_missing_input() {
    poline()
        .args(["process", "does-not-exist.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn process_rejects_unsupported_format() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("scan.png");
    fs::write(&input, [0u8; 4]).unwrap();

    poline()
        .arg("process")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported file format"));
}

#[test]
fn batch_writes_outputs_and_summary() {
    let dir = TempDir::new().unwrap();
    let config = config_file(dir.path());
    let inputs = dir.path().join("inputs");
    let out = dir.path().join("out");
    fs::create_dir_all(&inputs).unwrap();
    fs::write(inputs.join("a.txt"), INVOICE).unwrap();
    fs::write(inputs.join("b.txt"), "DF6802 | Stoneware Vase | 12 | each | 6.80\n").unwrap();

    poline()
        .arg("--config")
        .arg(&config)
        .arg("batch")
        .arg(format!("{}/*.txt", inputs.display()))
        .arg("--output-dir")
        .arg(&out)
        .args(["--format", "csv", "--summary"])
        .assert()
        .success()
        .stderr(predicate::str::contains("2 successful"));

    assert!(out.join("a.csv").exists());
    assert!(fs::read_to_string(out.join("b.csv")).unwrap().contains("DF6802 - Stoneware Vase"));

    let summary = fs::read_to_string(out.join("summary.csv")).unwrap();
    assert!(summary.starts_with("filename,status,invoice_number"));
    assert!(summary.contains("a.txt,success,CS003837319,03/07/2024,1,"));
}

#[test]
fn batch_without_matches_fails() {
    let dir = TempDir::new().unwrap();

    poline()
        .arg("batch")
        .arg(format!("{}/*.json", dir.path().display()))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No matching files"));
}

#[test]
fn config_init_get_and_set() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("poline.json");

    poline()
        .args(["config", "init", "--output"])
        .arg(&path)
        .assert()
        .success();

    poline()
        .arg("--config")
        .arg(&path)
        .args(["config", "get", "processing.parallel_page_threshold"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10"));

    poline()
        .arg("--config")
        .arg(&path)
        .args(["config", "set", "processing.parallel", "false"])
        .assert()
        .success();

    let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["processing"]["parallel"], false);

    poline()
        .arg("--config")
        .arg(&path)
        .args(["config", "get", "processing.nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration key not found"));
}

#[test]
fn config_init_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("poline.json");
    fs::write(&path, "{}").unwrap();

    poline()
        .args(["config", "init", "--output"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn config_validate_reports_broken_pattern() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("poline.json");
    fs::write(
        &path,
        r#"{ "extraction": { "code_families": [ { "name": "broken", "pattern": "(\\d+" } ] } }"#,
    )
    .unwrap();

    poline()
        .arg("--config")
        .arg(&path)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken"));
}
