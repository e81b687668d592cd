//! Cargo toolchain backend: builds, registry lookups and publishing

use crate::cargo::manifest::PackageManifest;
use crate::core::error::{ConvoyError, ConvoyResult};
use crate::release::BuildTarget;
use crate::release::matrix::Builder;
use crate::release::publish::{PublishOutcome, Registry, Secret, registry_token_var};
use crate::system::process::{self, ToolError, scrubbed};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

const REGISTRY_TIMEOUT: Duration = Duration::from_secs(120);
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1800);

/// `cargo` invoked from the workspace root
pub struct CargoToolchain {
  workspace_root: PathBuf,
  target_dir: PathBuf,
  product: String,
  registry: Option<String>,
}

impl CargoToolchain {
  pub fn new(workspace_root: &Path, target_dir: &Path, product: &str, registry: Option<String>) -> Self {
    Self {
      workspace_root: workspace_root.to_path_buf(),
      target_dir: target_dir.to_path_buf(),
      product: product.to_string(),
      registry,
    }
  }

  /// Target directory of one branch
  ///
  /// Branches sharing a target directory serialize on cargo's build lock,
  /// and the wait would count against each branch's time budget.
  pub fn branch_target_dir(&self, target: &BuildTarget) -> PathBuf {
    self.target_dir.join("convoy").join(target.triple())
  }

  /// Where the branch build for `target` leaves the product binary
  pub fn binary_path(&self, target: &BuildTarget) -> PathBuf {
    self
      .branch_target_dir(target)
      .join(target.triple())
      .join("release")
      .join(target.binary_name(&self.product))
  }

  fn build_command(&self, target: &BuildTarget) -> Command {
    let mut cmd = scrubbed("cargo");
    cmd
      .current_dir(&self.workspace_root)
      .args(["build", "--release", "--locked", "--target", target.triple(), "--bin", &self.product])
      .arg("--target-dir")
      .arg(self.branch_target_dir(target));
    cmd
  }

  fn registry_args(&self, cmd: &mut Command) {
    if let Some(registry) = &self.registry {
      cmd.args(["--registry", registry]);
    }
  }
}

impl Builder for CargoToolchain {
  fn build(&self, target: &BuildTarget, timeout: Duration) -> Result<PathBuf, ToolError> {
    process::run(self.build_command(target), Some(timeout))?;

    let binary = self.binary_path(target);
    if !binary.is_file() {
      return Err(ToolError::failed(
        "cargo",
        format!("build succeeded but {} is missing", binary.display()),
      ));
    }
    Ok(binary)
  }
}

impl Registry for CargoToolchain {
  fn is_visible(&self, name: &str, version: &str) -> Result<bool, ToolError> {
    let mut cmd = scrubbed("cargo");
    // Outside the workspace, so the registry is asked rather than the local member
    cmd.current_dir(std::env::temp_dir()).args(["info", &format!("{}@{}", name, version)]);
    self.registry_args(&mut cmd);

    match process::run(cmd, Some(REGISTRY_TIMEOUT)) {
      Ok(_) => Ok(true),
      Err(ToolError::Failed { detail, .. }) if detail.contains("could not find") => Ok(false),
      Err(e) => Err(e),
    }
  }

  fn publish(&self, manifest: &PackageManifest, token: &Secret) -> Result<PublishOutcome, ToolError> {
    let mut cmd = scrubbed("cargo");
    cmd
      .current_dir(&self.workspace_root)
      .arg("publish")
      .arg("--manifest-path")
      .arg(&manifest.manifest_path)
      .env(registry_token_var(self.registry.as_deref()), token.expose());
    self.registry_args(&mut cmd);

    match process::run(cmd, Some(PUBLISH_TIMEOUT)) {
      Ok(_) => Ok(PublishOutcome::Published),
      Err(ToolError::Failed { detail, .. }) if is_already_published(&detail) => Ok(PublishOutcome::AlreadyPublished),
      Err(e) => Err(e),
    }
  }
}

/// crates.io and cargo phrase a duplicate version differently across releases
fn is_already_published(stderr: &str) -> bool {
  stderr.contains("already uploaded") || stderr.contains("already exists")
}

/// The host target triple reported by `rustc -vV`
pub fn host_triple() -> ConvoyResult<String> {
  let mut cmd = Command::new("rustc");
  cmd.arg("-vV");
  let output = process::run(cmd, Some(REGISTRY_TIMEOUT)).map_err(|e| ConvoyError::message(e.to_string()))?;
  parse_host_triple(&String::from_utf8_lossy(&output.stdout))
    .ok_or_else(|| ConvoyError::message("`rustc -vV` did not report a host triple"))
}

fn parse_host_triple(version_info: &str) -> Option<String> {
  version_info
    .lines()
    .find_map(|line| line.strip_prefix("host: "))
    .map(|host| host.trim().to_string())
}
