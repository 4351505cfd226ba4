#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Output;

pub const FIXTURE: &str = "tests/fixtures/payments.csv";

/// Writes a simulator config whose steps take a few milliseconds, so a
/// simulated payment settles almost immediately.
pub fn fast_config(dir: &Path) -> PathBuf {
    let path = dir.join("simulator.json");
    let config = serde_json::json!({
        "authorize_delay": { "min_ms": 1, "max_ms": 5 },
        "capture_delay": { "min_ms": 1, "max_ms": 5 },
        "refund_delay_ms": 1
    });
    std::fs::write(&path, config.to_string()).unwrap();
    path
}

pub fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

/// CSV rows after the header.
pub fn data_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}
