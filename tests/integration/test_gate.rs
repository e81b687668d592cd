//! Integration tests for `cargo convoy gate`

use crate::helpers::*;
use anyhow::Result;

const LINUX: &str = "x86_64-unknown-linux-gnu";

fn three_crates(versions: [&str; 3]) -> Result<TestWorkspace> {
  let ws = TestWorkspace::new()?;
  ws.add_crate("alpha", versions[0], &[])?;
  ws.add_crate("beta", versions[1], &[])?;
  ws.add_crate("gamma", versions[2], &[])?;
  ws.configure(&["alpha", "beta", "gamma"], &[LINUX])?;
  Ok(ws)
}

#[test]
fn test_gate_passes_when_every_manifest_matches() -> Result<()> {
  let ws = three_crates(["1.2.0", "1.2.0", "1.2.0"])?;

  let output = run_convoy(&ws.path, &["convoy", "gate", "--tag", "v1.2.0"])?;
  let out = stdout(&output);
  assert!(out.contains("Version gate passed"), "stdout: {}", out);
  assert!(out.contains("3 manifest(s)"), "stdout: {}", out);
  Ok(())
}

#[test]
fn test_gate_names_the_offending_manifest() -> Result<()> {
  let ws = three_crates(["1.2.0", "1.1.9", "1.2.0"])?;

  let output = run_convoy_raw(&ws.path, &["convoy", "gate", "--tag", "v1.2.0"])?;
  assert_eq!(output.status.code(), Some(3));

  let err = stderr(&output);
  assert!(err.contains("ConfigMismatch"), "stderr: {}", err);
  assert!(err.contains("crates/beta/Cargo.toml"), "stderr: {}", err);
  assert!(err.contains("1.1.9"), "stderr: {}", err);
  Ok(())
}

#[test]
fn test_gate_is_exact_about_build_metadata() -> Result<()> {
  let ws = three_crates(["1.2.0+build", "1.2.0", "1.2.0"])?;

  let output = run_convoy_raw(&ws.path, &["convoy", "gate", "--tag", "v1.2.0"])?;
  assert_eq!(output.status.code(), Some(3));
  assert!(stderr(&output).contains("1.2.0+build"));
  Ok(())
}

#[test]
fn test_gate_resolves_workspace_inherited_versions() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_inheriting_crate("alpha")?;
  ws.add_crate("beta", "1.2.0", &[])?;
  ws.configure(&["alpha", "beta"], &[LINUX])?;

  run_convoy(&ws.path, &["convoy", "gate", "--tag", "v1.2.0"])?;
  Ok(())
}

#[test]
fn test_gate_rejects_non_release_tag() -> Result<()> {
  let ws = three_crates(["1.2.0", "1.2.0", "1.2.0"])?;

  let output = run_convoy_raw(&ws.path, &["convoy", "gate", "--tag", "nightly"])?;
  assert_eq!(output.status.code(), Some(3));
  assert!(stderr(&output).contains("not a release tag"));
  Ok(())
}

#[test]
fn test_gate_json_lists_every_mismatch() -> Result<()> {
  let ws = three_crates(["1.1.9", "1.2.0", "1.0.0"])?;

  let output = run_convoy_raw(&ws.path, &["convoy", "gate", "--tag", "v1.2.0", "--json"])?;
  assert_eq!(output.status.code(), Some(3));

  let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
  assert_eq!(report["passed"], false);
  assert_eq!(report["version"], "1.2.0");
  assert_eq!(report["manifests_checked"], 3);

  let mismatches = report["mismatches"].as_array().expect("mismatches array");
  let packages: Vec<&str> = mismatches.iter().filter_map(|m| m["package"].as_str()).collect();
  assert_eq!(packages, vec!["alpha", "gamma"]);
  Ok(())
}

#[test]
fn test_gate_without_config_is_a_user_error() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_crate("alpha", "1.2.0", &[])?;

  let output = run_convoy_raw(&ws.path, &["convoy", "gate", "--tag", "v1.2.0"])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(stderr(&output).contains("cargo convoy init"));
  Ok(())
}
