#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::process::Command;
use tempfile::tempdir;

mod common;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: seed a handful of payments
    let seeded = Command::new(cargo_bin!("pulsepay"))
        .args(["seed", "--count", "5", "--seed", "11", "--db-path"])
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(seeded.status.success());
    let seeded_rows = common::data_lines(&seeded);
    assert_eq!(seeded_rows.len(), 5);

    // 2. Second run: the same payments come back from disk
    let listed = Command::new(cargo_bin!("pulsepay"))
        .args(["payments", "--db-path"])
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(listed.status.success());
    assert_eq!(common::data_lines(&listed), seeded_rows);

    // 3. Third run: a simulation adds one settled payment on top
    let config = common::fast_config(dir.path());
    let simulated = Command::new(cargo_bin!("pulsepay"))
        .args(["simulate", "--duration-ms", "50", "--interval-ms", "60000", "--seed", "3"])
        .arg("--config")
        .arg(&config)
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(simulated.status.success());
    assert_eq!(common::stdout_json(&simulated)["totalPayments"], 1);

    let relisted = Command::new(cargo_bin!("pulsepay"))
        .args(["payments", "--db-path"])
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert_eq!(common::data_lines(&relisted).len(), 6);
}
