use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use std::process::Command;

mod common;

fn metrics(args: &[&str]) -> serde_json::Value {
    let output = Command::new(cargo_bin!("pulsepay"))
        .args(["metrics", "--input", common::FIXTURE])
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    common::stdout_json(&output)
}

#[test]
fn test_summary_over_explicit_window() {
    let summary = metrics(&[
        "summary",
        "--from",
        "2024-03-01T00:00:00Z",
        "--to",
        "2024-03-01T23:59:59Z",
    ]);

    assert_eq!(summary["totalPayments"], 2);
    assert_eq!(summary["totalAmountCents"], 500);
    assert_eq!(summary["capturedCount"], 1);
    assert_eq!(summary["failedCount"], 1);
    assert_eq!(summary["refundedCount"], 0);
    assert_eq!(summary["successRate"], 0.5);
    assert_eq!(summary["avgAmountCents"], 250.0);
}

#[test]
fn test_summary_defaults_to_last_day() {
    // The fixture is long in the past.
    let summary = metrics(&["summary"]);
    assert_eq!(summary["totalPayments"], 0);
    assert_eq!(summary["successRate"], 0.0);
    assert_eq!(summary["avgAmountCents"], 0.0);
}

#[test]
fn test_daily_timeseries_is_zero_filled() {
    let buckets = metrics(&[
        "timeseries",
        "--from",
        "2024-03-01T12:00:00Z",
        "--to",
        "2024-03-04T12:00:00Z",
    ]);

    let starts: Vec<&str> = buckets
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["bucketStart"].as_str().unwrap())
        .collect();
    assert_eq!(
        starts,
        vec![
            "2024-03-01T00:00:00Z",
            "2024-03-02T00:00:00Z",
            "2024-03-03T00:00:00Z",
            "2024-03-04T00:00:00Z"
        ]
    );
    // The morning payments of the 1st fall before `from`.
    assert_eq!(buckets[0]["paymentsCreated"], 0);
    assert_eq!(buckets[1]["refunded"], 1);
    assert_eq!(buckets[2]["paymentsCreated"], 1);
    assert_eq!(buckets[3]["paymentsCreated"], 1);
}

#[test]
fn test_hourly_timeseries() {
    let buckets = metrics(&[
        "timeseries",
        "--from",
        "2024-03-01T10:00:00Z",
        "--to",
        "2024-03-01T11:59:59Z",
        "--bucket",
        "hour",
    ]);
    assert_eq!(
        buckets,
        json!([
            {
                "bucketStart": "2024-03-01T10:00:00Z",
                "paymentsCreated": 1,
                "captured": 1,
                "failed": 0,
                "refunded": 0,
                "amountCapturedCents": 500
            },
            {
                "bucketStart": "2024-03-01T11:00:00Z",
                "paymentsCreated": 1,
                "captured": 0,
                "failed": 1,
                "refunded": 0,
                "amountCapturedCents": 0
            }
        ])
    );
}

#[test]
fn test_imported_payments_have_no_failure_events() {
    let reasons = metrics(&["failure-reasons", "--from", "2024-01-01T00:00:00Z"]);
    assert_eq!(reasons, json!([]));
}

#[test]
fn test_invalid_parameters_are_rejected() {
    let mut cmd = Command::new(cargo_bin!("pulsepay"));
    cmd.args(["metrics", "timeseries", "--bucket", "week"]);
    cmd.assert().failure().stderr(predicate::str::contains("week"));

    let mut cmd = Command::new(cargo_bin!("pulsepay"));
    cmd.args(["metrics", "summary", "--from", "yesterday"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("RFC 3339"));
}

#[test]
fn test_oversized_timeseries_window_is_rejected() {
    let mut cmd = Command::new(cargo_bin!("pulsepay"));
    cmd.args([
        "metrics",
        "timeseries",
        "--from",
        "0001-01-01T00:00:00Z",
        "--to",
        "9999-12-31T23:59:59Z",
        "--bucket",
        "hour",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("buckets"));
}
