//! Test helpers for integration tests

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// A Cargo workspace with a license, a readme and a convoy.toml
pub struct TestWorkspace {
  _root: TempDir,
  pub path: PathBuf,
}

impl TestWorkspace {
  /// Create an empty workspace (`crates/*` members)
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().to_path_buf();

    std::fs::write(
      path.join("Cargo.toml"),
      r#"[workspace]
members = ["crates/*"]
resolver = "2"

[workspace.package]
version = "1.2.0"
edition = "2021"
license = "MIT"
"#,
    )?;
    std::fs::write(path.join("LICENSE"), "MIT License\n")?;
    std::fs::write(path.join("README.md"), "# tool\n")?;

    Ok(Self { _root: root, path })
  }

  /// Add a library crate; `deps` are other workspace crates it depends on
  pub fn add_crate(&self, name: &str, version: &str, deps: &[&str]) -> Result<PathBuf> {
    let crate_path = self.path.join("crates").join(name);
    std::fs::create_dir_all(crate_path.join("src"))?;

    let mut cargo_toml = format!(
      r#"[package]
name = "{}"
version = "{}"
edition.workspace = true
license.workspace = true

[dependencies]
"#,
      name, version
    );
    for dep in deps {
      cargo_toml.push_str(&format!("{} = {{ path = \"../{}\", version = \"{}\" }}\n", dep, dep, version));
    }

    std::fs::write(crate_path.join("Cargo.toml"), cargo_toml)?;
    std::fs::write(crate_path.join("src/lib.rs"), format!("//! {} crate\n", name))?;
    Ok(crate_path)
  }

  /// Add a crate that takes its version from `[workspace.package]`
  pub fn add_inheriting_crate(&self, name: &str) -> Result<PathBuf> {
    let crate_path = self.path.join("crates").join(name);
    std::fs::create_dir_all(crate_path.join("src"))?;
    std::fs::write(
      crate_path.join("Cargo.toml"),
      format!(
        "[package]\nname = \"{}\"\nversion.workspace = true\nedition.workspace = true\n",
        name
      ),
    )?;
    std::fs::write(crate_path.join("src/lib.rs"), "")?;
    Ok(crate_path)
  }

  /// Write convoy.toml releasing the given crates as product `tool`
  pub fn configure(&self, crates: &[&str], targets: &[&str]) -> Result<()> {
    let packages: Vec<String> = crates.iter().map(|c| format!("\"crates/{}\"", c)).collect();
    let targets: Vec<String> = targets.iter().map(|t| format!("\"{}\"", t)).collect();
    self.write_file(
      "convoy.toml",
      &format!(
        r#"[release]
product = "tool"
targets = [{}]
packages = [{}]
ancillary = ["LICENSE", "README.md"]
"#,
        targets.join(", "),
        packages.join(", ")
      ),
    )
  }

  pub fn write_file(&self, path: &str, content: &str) -> Result<()> {
    let full = self.path.join(path);
    if let Some(parent) = full.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(full, content)?;
    Ok(())
  }

  pub fn file_exists(&self, path: &str) -> bool {
    self.path.join(path).exists()
  }

  pub fn read_file(&self, path: &str) -> Result<String> {
    Ok(std::fs::read_to_string(self.path.join(path))?)
  }
}

/// Run cargo-convoy and return its output whatever the exit status
pub fn run_convoy_raw(cwd: &Path, args: &[&str]) -> Result<Output> {
  let bin = env!("CARGO_BIN_EXE_cargo-convoy");

  Command::new(bin)
    .current_dir(cwd)
    .args(args)
    // CI runners set these; tests must not pick them up
    .env_remove("GITHUB_REF")
    .env_remove("CARGO_REGISTRY_TOKEN")
    .env_remove("GITHUB_TOKEN")
    .env_remove("GH_TOKEN")
    .output()
    .context("Failed to run cargo-convoy")
}

/// Run cargo-convoy and fail unless it exits successfully
pub fn run_convoy(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = run_convoy_raw(cwd, args)?;

  if !output.status.success() {
    anyhow::bail!(
      "cargo-convoy command failed: cargo {}\nstdout: {}\nstderr: {}",
      args.join(" "),
      String::from_utf8_lossy(&output.stdout),
      String::from_utf8_lossy(&output.stderr)
    );
  }

  Ok(output)
}

pub fn stdout(output: &Output) -> String {
  String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
  String::from_utf8_lossy(&output.stderr).to_string()
}
