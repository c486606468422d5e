/*!
 * End-to-end tests against the `paystream` binary with on-disk databases
 */

use std::path::Path;
use std::process::{Command, Output};

use anyhow::Result;
use serde_json::Value;
use tempfile::tempdir;

const EMPLOYER: &str = "0x1111111111111111111111111111111111111111";
const EMPLOYEE: &str = "0x2222222222222222222222222222222222222222";

fn paystream(dir: &Path, args: &[&str]) -> Result<Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_paystream"))
        .arg("--streams-db")
        .arg(dir.join("streams.db"))
        .arg("--audit-db")
        .arg(dir.join("audit.db"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()?;
    Ok(output)
}

fn envelope(output: &Output) -> Result<Value> {
    Ok(serde_json::from_slice(&output.stdout)?)
}

fn create(dir: &Path) -> Result<Output> {
    paystream(
        dir,
        &[
            "stream",
            "create",
            "--employer",
            EMPLOYER,
            "--employee",
            EMPLOYEE,
            "--monthly-salary",
            "5000",
            "--rate-per-second",
            "0.0019",
            "--duration-months",
            "6",
        ],
    )
}

#[test]
fn test_state_persists_across_invocations() -> Result<()> {
    let dir = tempdir()?;

    let first = create(dir.path())?;
    assert_eq!(first.status.code(), Some(0));
    let created = envelope(&first)?;
    assert_eq!(created["success"], true);

    let second = create(dir.path())?;
    assert_eq!(second.status.code(), Some(1));
    let conflict = envelope(&second)?;
    assert_eq!(conflict["code"], "conflict");
    assert_eq!(conflict["existing"]["id"], created["stream"]["id"]);

    let paused = paystream(
        dir.path(),
        &["stream", "pause", "--employer", EMPLOYER, "--employee", EMPLOYEE],
    )?;
    assert_eq!(envelope(&paused)?["stream"]["status"], "paused");

    Ok(())
}

#[test]
fn test_audit_records_flushed_before_exit() -> Result<()> {
    let dir = tempdir()?;
    create(dir.path())?;

    let output = paystream(dir.path(), &["logs", "query", "--tag", "created"])?;
    assert_eq!(output.status.code(), Some(0));
    let page = envelope(&output)?;
    assert_eq!(page["pagination"]["total"], 1);
    assert_eq!(page["logs"][0]["category"], "business");
    assert_eq!(page["logs"][0]["userAddress"], EMPLOYER);
    Ok(())
}

#[test]
fn test_validation_failure_exit_code() -> Result<()> {
    let dir = tempdir()?;
    let output = paystream(dir.path(), &["logs", "export", "--limit", "10001"])?;

    assert_eq!(output.status.code(), Some(1));
    let body = envelope(&output)?;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "validation");
    Ok(())
}

#[test]
fn test_bad_config_file_is_fatal() -> Result<()> {
    let dir = tempdir()?;
    let config = dir.path().join("paystream.toml");
    std::fs::write(&config, "retention_days = 0\n")?;

    let output = paystream(dir.path(), &["--config", config.to_str().unwrap_or_default(), "logs", "stats"])?;
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(envelope(&output)?["code"], "config");
    Ok(())
}

#[test]
fn test_missing_config_file_reports_config_error() -> Result<()> {
    let dir = tempdir()?;
    let config = dir.path().join("absent.toml");

    let output = paystream(dir.path(), &["--config", config.to_str().unwrap_or_default(), "logs", "stats"])?;
    assert_eq!(output.status.code(), Some(2));
    let body = envelope(&output)?;
    assert_eq!(body["code"], "config");
    assert!(body["error"].as_str().unwrap_or_default().contains("absent.toml"));
    Ok(())
}
