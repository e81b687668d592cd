//! Integration tests for `cargo convoy release` paths that stop before any build

use crate::helpers::*;
use anyhow::Result;

fn workspace(version: &str) -> Result<TestWorkspace> {
  let ws = TestWorkspace::new()?;
  ws.add_crate("alpha", "1.2.0", &[])?;
  ws.add_crate("beta", version, &[])?;
  ws.configure(&["alpha", "beta"], &["x86_64-unknown-linux-gnu"])?;
  Ok(ws)
}

#[test]
fn test_release_gate_failure_builds_nothing() -> Result<()> {
  let ws = workspace("1.1.9")?;

  let output = run_convoy_raw(&ws.path, &["convoy", "release", "--ref", "refs/tags/v1.2.0"])?;
  assert_eq!(output.status.code(), Some(3));
  assert!(stderr(&output).contains("crates/beta/Cargo.toml"));
  assert!(!ws.file_exists("dist"));
  Ok(())
}

#[test]
fn test_release_accepts_bare_tag_name() -> Result<()> {
  let ws = workspace("1.1.9")?;

  // The gate runs (and fails) instead of a silent validation build
  let output = run_convoy_raw(&ws.path, &["convoy", "release", "--ref", "v1.2.0"])?;
  assert_eq!(output.status.code(), Some(3));
  assert!(stderr(&output).contains("crates/beta/Cargo.toml"));
  Ok(())
}

#[test]
fn test_release_json_reports_failed_state() -> Result<()> {
  let ws = workspace("1.1.9")?;

  let output = run_convoy_raw(
    &ws.path,
    &["convoy", "release", "--ref", "refs/tags/v1.2.0", "--json"],
  )?;
  assert_eq!(output.status.code(), Some(3));

  let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
  assert_eq!(report["tag"], "v1.2.0");
  assert_eq!(report["state"], "Failed");
  let failures = report["failures"].as_array().expect("failures");
  assert_eq!(failures.len(), 1);
  assert_eq!(failures[0]["kind"], "ConfigMismatch");
  assert_eq!(failures[0]["retryable"], false);
  assert!(failures[0]["message"].as_str().is_some_and(|m| m.contains("crates/beta/Cargo.toml")));
  Ok(())
}

#[test]
fn test_release_missing_ancillary_is_a_user_error() -> Result<()> {
  let ws = workspace("1.2.0")?;
  std::fs::remove_file(ws.path.join("README.md"))?;

  let output = run_convoy_raw(&ws.path, &["convoy", "release", "--ref", "refs/tags/v1.2.0"])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(stderr(&output).contains("README.md"));
  Ok(())
}
