//! Read-only view of package manifests
//!
//! Manifests are parsed with `toml_edit` rather than through `cargo metadata`
//! so the version gate compares the text a maintainer actually declared,
//! not a normalised `semver::Version`.

use crate::core::error::{ConvoyError, ConvoyResult, ResultExt};
use std::fs;
use std::path::{Path, PathBuf};
use toml_edit::{DocumentMut, Item, TableLike};

/// A package taking part in the release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
  pub name: String,
  pub manifest_path: PathBuf,
  /// Declared version text, after resolving `version.workspace = true`
  pub declared_version: Option<String>,
  /// `publish = false` packages are version-gated but never sent to the registry
  pub publishable: bool,
  /// Names of normal and build dependencies (dev-dependencies never affect publish order)
  pub dependencies: Vec<String>,
}

/// `[workspace.package]` values a member may inherit
#[derive(Debug, Clone, Default)]
struct WorkspaceDefaults {
  version: Option<String>,
  publishable: Option<bool>,
}

impl PackageManifest {
  /// Load every manifest under the given package directories (or manifest files)
  pub fn load_all(workspace_root: &Path, packages: &[PathBuf]) -> ConvoyResult<Vec<Self>> {
    let defaults = WorkspaceDefaults::load(workspace_root)?;

    packages
      .iter()
      .map(|path| {
        let path = if path.is_absolute() {
          path.clone()
        } else {
          workspace_root.join(path)
        };
        let manifest_path = if path.file_name().is_some_and(|n| n == "Cargo.toml") {
          path
        } else {
          path.join("Cargo.toml")
        };
        Self::load_with(&manifest_path, &defaults)
      })
      .collect()
  }

  fn load_with(manifest_path: &Path, defaults: &WorkspaceDefaults) -> ConvoyResult<Self> {
    let content = fs::read_to_string(manifest_path)
      .with_context(|| format!("Failed to read manifest {}", manifest_path.display()))?;
    Self::parse(manifest_path, &content, defaults)
  }

  fn parse(manifest_path: &Path, content: &str, defaults: &WorkspaceDefaults) -> ConvoyResult<Self> {
    let doc = content
      .parse::<DocumentMut>()
      .with_context(|| format!("Failed to parse manifest {}", manifest_path.display()))?;

    let package = doc.get("package").and_then(Item::as_table_like).ok_or_else(|| {
      ConvoyError::message(format!("No [package] section in {}", manifest_path.display()))
    })?;

    let name = package
      .get("name")
      .and_then(Item::as_str)
      .ok_or_else(|| ConvoyError::message(format!("Package in {} has no name", manifest_path.display())))?
      .to_string();

    let declared_version = match package.get("version") {
      Some(item) if inherits_from_workspace(item) => defaults.version.clone(),
      Some(item) => item.as_str().map(str::to_string),
      None => None,
    };

    let publishable = match package.get("publish") {
      Some(item) if inherits_from_workspace(item) => defaults.publishable.unwrap_or(true),
      Some(item) => publish_flag(item),
      None => true,
    };

    let mut dependencies = Vec::new();
    for table_name in ["dependencies", "build-dependencies"] {
      if let Some(table) = doc.get(table_name).and_then(Item::as_table_like) {
        collect_dependency_names(table, &mut dependencies);
      }
    }
    // [target.'cfg(..)'.dependencies]
    if let Some(targets) = doc.get("target").and_then(Item::as_table_like) {
      for (_, platform) in targets.iter() {
        for table_name in ["dependencies", "build-dependencies"] {
          if let Some(table) = platform.get(table_name).and_then(Item::as_table_like) {
            collect_dependency_names(table, &mut dependencies);
          }
        }
      }
    }
    dependencies.sort();
    dependencies.dedup();

    Ok(Self {
      name,
      manifest_path: manifest_path.to_path_buf(),
      declared_version,
      publishable,
      dependencies,
    })
  }
}

impl WorkspaceDefaults {
  fn load(workspace_root: &Path) -> ConvoyResult<Self> {
    let root_manifest = workspace_root.join("Cargo.toml");
    if !root_manifest.exists() {
      return Ok(Self::default());
    }

    let content = fs::read_to_string(&root_manifest)
      .with_context(|| format!("Failed to read manifest {}", root_manifest.display()))?;
    let doc = content
      .parse::<DocumentMut>()
      .with_context(|| format!("Failed to parse manifest {}", root_manifest.display()))?;

    let Some(package) = doc
      .get("workspace")
      .and_then(|ws| ws.get("package"))
      .and_then(Item::as_table_like)
    else {
      return Ok(Self::default());
    };

    Ok(Self {
      version: package.get("version").and_then(Item::as_str).map(str::to_string),
      publishable: package.get("publish").map(publish_flag),
    })
  }
}

/// `key.workspace = true` or `key = { workspace = true }`
fn inherits_from_workspace(item: &Item) -> bool {
  item
    .as_table_like()
    .and_then(|t| t.get("workspace"))
    .and_then(Item::as_bool)
    .unwrap_or(false)
}

/// `publish = false` and `publish = []` both forbid publishing
fn publish_flag(item: &Item) -> bool {
  if let Some(flag) = item.as_bool() {
    return flag;
  }
  if let Some(registries) = item.as_array() {
    return !registries.is_empty();
  }
  true
}

fn collect_dependency_names(table: &dyn TableLike, names: &mut Vec<String>) {
  for (key, item) in table.iter() {
    // Renamed dependencies: `alias = { package = "real-name", .. }`
    let real = item
      .as_table_like()
      .and_then(|t| t.get("package"))
      .and_then(Item::as_str)
      .unwrap_or(key);
    names.push(real.to_string());
  }
}
