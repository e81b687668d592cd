//! Integration tests for `cargo convoy plan`

use crate::helpers::*;
use anyhow::Result;

#[test]
fn test_plan_orders_dependencies_first() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_crate("cli", "0.3.0", &["core", "proto"])?;
  ws.add_crate("proto", "0.3.0", &["core"])?;
  ws.add_crate("core", "0.3.0", &[])?;
  ws.configure(&["cli", "proto", "core"], &["x86_64-unknown-linux-gnu", "aarch64-apple-darwin"])?;

  let output = run_convoy(&ws.path, &["convoy", "plan", "--tag", "v0.3.0", "--json"])?;
  let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;

  assert_eq!(report["gate_passes"], true);
  let order: Vec<&str> = report["publish_order"]
    .as_array()
    .expect("publish order")
    .iter()
    .filter_map(|s| s["package"].as_str())
    .collect();
  assert_eq!(order, vec!["core", "proto", "cli"]);

  let archives: Vec<&str> = report["archives"]
    .as_array()
    .expect("archives")
    .iter()
    .filter_map(|a| a.as_str())
    .collect();
  assert_eq!(
    archives,
    vec![
      "tool-0.3.0-x86_64-unknown-linux-gnu.tar.gz",
      "tool-0.3.0-aarch64-apple-darwin.tar.gz",
    ]
  );
  Ok(())
}

#[test]
fn test_plan_reports_gate_failure_without_failing() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_crate("core", "0.2.9", &[])?;
  ws.configure(&["core"], &["x86_64-unknown-linux-gnu"])?;

  let output = run_convoy(&ws.path, &["convoy", "plan", "--tag", "v0.3.0"])?;
  let out = stdout(&output);
  assert!(out.contains("Version gate: 1 manifest(s) disagree"), "stdout: {}", out);
  assert!(out.contains("0.2.9"), "stdout: {}", out);
  Ok(())
}

#[test]
fn test_plan_marks_unpublished_packages() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_crate("core", "1.0.0", &[])?;
  ws.write_file(
    "crates/xtask/Cargo.toml",
    "[package]\nname = \"xtask\"\nversion = \"1.0.0\"\nedition = \"2021\"\npublish = false\n",
  )?;
  ws.write_file("crates/xtask/src/lib.rs", "")?;
  ws.configure(&["core", "xtask"], &["x86_64-unknown-linux-gnu"])?;

  let output = run_convoy(&ws.path, &["convoy", "plan", "--tag", "v1.0.0"])?;
  let out = stdout(&output);
  assert!(out.contains("xtask (publish = false, skipped)"), "stdout: {}", out);
  Ok(())
}

#[test]
fn test_plan_rejects_unknown_target() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_crate("core", "1.0.0", &[])?;
  ws.configure(&["core"], &["not a triple"])?;

  let output = run_convoy_raw(&ws.path, &["convoy", "plan", "--tag", "v1.0.0"])?;
  assert_eq!(output.status.code(), Some(1));
  Ok(())
}
