//! Integration tests for `cargo convoy init`

use crate::helpers::*;
use anyhow::Result;

fn binary_workspace() -> Result<TestWorkspace> {
  let ws = TestWorkspace::new()?;
  ws.write_file(
    "Cargo.toml",
    "[package]\nname = \"tool\"\nversion = \"0.1.0\"\nedition = \"2021\"\n\n[workspace]\n",
  )?;
  ws.write_file("src/main.rs", "fn main() {}\n")?;
  Ok(ws)
}

#[test]
fn test_init_writes_config() -> Result<()> {
  let ws = binary_workspace()?;

  run_convoy(
    &ws.path,
    &[
      "convoy",
      "init",
      "--target",
      "x86_64-unknown-linux-gnu",
      "--target",
      "aarch64-apple-darwin",
    ],
  )?;

  assert!(ws.file_exists("convoy.toml"));
  let config = ws.read_file("convoy.toml")?;
  assert!(config.contains("[release]"));
  assert!(config.contains("x86_64-unknown-linux-gnu"));
  assert!(config.contains("aarch64-apple-darwin"));
  assert!(config.contains("product = \"tool\""), "config: {}", config);
  Ok(())
}

#[test]
fn test_init_refuses_to_overwrite() -> Result<()> {
  let ws = binary_workspace()?;
  ws.write_file("convoy.toml", "# hand-written\n")?;

  let output = run_convoy_raw(&ws.path, &["convoy", "init", "--target", "x86_64-unknown-linux-gnu"])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(stderr(&output).contains("--force"));
  assert_eq!(ws.read_file("convoy.toml")?, "# hand-written\n");

  run_convoy(
    &ws.path,
    &["convoy", "init", "--target", "x86_64-unknown-linux-gnu", "--force"],
  )?;
  assert!(ws.read_file("convoy.toml")?.contains("[release]"));
  Ok(())
}

#[test]
fn test_init_rejects_invalid_target() -> Result<()> {
  let ws = binary_workspace()?;

  let output = run_convoy_raw(&ws.path, &["convoy", "init", "--target", "linux"])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(!ws.file_exists("convoy.toml"));
  Ok(())
}
