//! Release context: config, workspace layout and manifests, loaded once
//!
//! `cargo metadata` is only consulted when something actually needs it: the
//! target directory for builds, or the member list and product name when
//! convoy.toml leaves them out. Gate-only runs on a fully configured
//! workspace never spawn cargo.

use crate::cargo::manifest::PackageManifest;
use crate::cargo::metadata::WorkspaceMetadata;
use crate::core::config::ConvoyConfig;
use crate::core::error::{ConfigError, ConvoyError, ConvoyResult};
use crate::release::matrix::validate_targets;
use crate::release::pipeline::PipelineConfig;
use crate::release::BuildTarget;
use std::path::{Path, PathBuf};

/// Everything a command needs to know about the workspace being released
pub struct ReleaseContext {
  /// Workspace root directory (absolute path)
  pub root: PathBuf,

  /// convoy.toml
  pub config: ConvoyConfig,

  metadata: Option<WorkspaceMetadata>,
}

impl ReleaseContext {
  /// Load config; load cargo metadata when `for_build` or when config leaves gaps
  pub fn build(workspace_root: &Path, for_build: bool) -> ConvoyResult<Self> {
    let config = ConvoyConfig::load(workspace_root)?;
    let needs_metadata = for_build || config.release.packages.is_empty() || config.release.product.is_none();
    let metadata = if needs_metadata {
      Some(WorkspaceMetadata::load(workspace_root)?)
    } else {
      None
    };

    Ok(Self {
      root: workspace_root.to_path_buf(),
      config,
      metadata,
    })
  }

  fn resolve(&self, path: &Path) -> PathBuf {
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.root.join(path)
    }
  }

  pub fn tag_prefix(&self) -> &str {
    &self.config.release.tag_prefix
  }

  /// Manifests taking part in the release (configured packages, else every member)
  pub fn manifests(&self) -> ConvoyResult<Vec<PackageManifest>> {
    let packages = match (&self.metadata, self.config.release.packages.is_empty()) {
      (Some(metadata), true) => metadata.member_manifests(),
      _ => self.config.release.packages.clone(),
    };
    PackageManifest::load_all(&self.root, &packages)
  }

  pub fn product(&self) -> ConvoyResult<String> {
    if let Some(product) = &self.config.release.product {
      return Ok(product.clone());
    }
    match &self.metadata {
      Some(metadata) => metadata.default_product(),
      None => Err(ConvoyError::Config(ConfigError::MissingField {
        field: "release.product".to_string(),
      })),
    }
  }

  pub fn targets(&self) -> ConvoyResult<Vec<BuildTarget>> {
    validate_targets(&self.config.release.targets)
  }

  pub fn dist_dir(&self) -> PathBuf {
    self.resolve(&self.config.release.dist_dir)
  }

  /// Cargo's target directory (honours CARGO_TARGET_DIR and .cargo/config.toml)
  pub fn target_dir(&self) -> PathBuf {
    match &self.metadata {
      Some(metadata) => metadata.target_directory().to_path_buf(),
      None => self.root.join("target"),
    }
  }

  /// Ancillary files as absolute paths; every one must exist
  pub fn ancillary(&self) -> ConvoyResult<Vec<PathBuf>> {
    let files: Vec<PathBuf> = self
      .config
      .release
      .ancillary
      .iter()
      .map(|f| self.resolve(f))
      .collect();

    if let Some(missing) = files.iter().find(|f| !f.is_file()) {
      return Err(ConvoyError::Config(ConfigError::Invalid {
        field: "release.ancillary".to_string(),
        reason: format!("{} does not exist", missing.display()),
      }));
    }
    Ok(files)
  }

  /// Resolved inputs for a pipeline run
  pub fn pipeline_config(&self) -> ConvoyResult<PipelineConfig> {
    Ok(PipelineConfig {
      product: self.product()?,
      targets: self.targets()?,
      ancillary: self.ancillary()?,
      dist_dir: self.dist_dir(),
      build_timeout: self.config.release.build_timeout(),
      package_timeout: self.config.release.package_timeout(),
      publish: self.config.publish.clone(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  fn workspace(config: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("convoy.toml"), config).unwrap();
    fs::create_dir_all(dir.path().join("crates/core")).unwrap();
    fs::write(
      dir.path().join("crates/core/Cargo.toml"),
      "[package]\nname = \"core\"\nversion = \"0.4.0\"\n",
    )
    .unwrap();
    fs::write(dir.path().join("LICENSE"), "MIT").unwrap();
    dir
  }

  #[test]
  fn test_fully_configured_workspace_needs_no_metadata() {
    let dir = workspace(
      r#"
[release]
product = "tool"
targets = ["x86_64-unknown-linux-gnu"]
packages = ["crates/core"]
ancillary = ["LICENSE"]
"#,
    );
    let ctx = ReleaseContext::build(dir.path(), false).unwrap();
    let manifests = ctx.manifests().unwrap();
    assert_eq!(manifests.len(), 1);
    assert_eq!(manifests[0].declared_version.as_deref(), Some("0.4.0"));

    let config = ctx.pipeline_config().unwrap();
    assert_eq!(config.product, "tool");
    assert_eq!(config.dist_dir, dir.path().join("dist"));
    assert_eq!(config.ancillary, vec![dir.path().join("LICENSE")]);
    assert_eq!(ctx.target_dir(), dir.path().join("target"));
  }

  #[test]
  fn test_missing_ancillary_is_a_config_error() {
    let dir = workspace(
      r#"
[release]
product = "tool"
targets = ["x86_64-unknown-linux-gnu"]
packages = ["crates/core"]
ancillary = ["LICENSE", "README.md"]
"#,
    );
    let ctx = ReleaseContext::build(dir.path(), false).unwrap();
    let err = ctx.pipeline_config().unwrap_err();
    assert!(err.to_string().contains("README.md"));
  }

  #[test]
  fn test_missing_config() {
    let dir = TempDir::new().unwrap();
    let err = ReleaseContext::build(dir.path(), false).err().unwrap();
    assert!(matches!(err, ConvoyError::Config(ConfigError::NotFound { .. })));
  }
}
