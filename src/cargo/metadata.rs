use crate::core::error::{ConvoyError, ConvoyResult};
use cargo_metadata::{MetadataCommand, Package};
use std::path::{Path, PathBuf};

/// Workspace introspection using cargo_metadata
#[derive(Clone)]
pub struct WorkspaceMetadata {
  metadata: cargo_metadata::Metadata,
}

impl WorkspaceMetadata {
  pub fn load(workspace_root: &Path) -> ConvoyResult<Self> {
    let metadata = MetadataCommand::new()
      .manifest_path(workspace_root.join("Cargo.toml"))
      .no_deps()
      .exec()?;
    Ok(Self { metadata })
  }

  pub fn list_crates(&self) -> Vec<&Package> {
    self.metadata.workspace_packages()
  }

  /// Manifest paths of every workspace member, sorted for stable reporting
  pub fn member_manifests(&self) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = self
      .list_crates()
      .into_iter()
      .map(|pkg| pkg.manifest_path.clone().into_std_path_buf())
      .collect();
    paths.sort();
    paths
  }

  /// Binary targets of the root package (the product candidates)
  pub fn root_binaries(&self) -> Vec<String> {
    self
      .metadata
      .root_package()
      .map(|pkg| {
        pkg
          .targets
          .iter()
          .filter(|target| target.is_bin())
          .map(|target| target.name.clone())
          .collect()
      })
      .unwrap_or_default()
  }

  /// Resolve the product name when the config leaves it out: the root package must have exactly one binary
  pub fn default_product(&self) -> ConvoyResult<String> {
    let mut binaries = self.root_binaries();
    match binaries.len() {
      1 => Ok(binaries.remove(0)),
      0 => Err(ConvoyError::with_help(
        "Root package has no binary target to release",
        "Set `release.product` in convoy.toml",
      )),
      _ => Err(ConvoyError::with_help(
        format!("Root package has several binaries: {}", binaries.join(", ")),
        "Set `release.product` in convoy.toml to pick one",
      )),
    }
  }

  pub fn target_directory(&self) -> &Path {
    self.metadata.target_directory.as_std_path()
  }
}
