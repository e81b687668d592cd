//! Artifacts and the publish record
//!
//! Artifacts are produced once per target by the build+package branches.
//! The publish record is written once, after the registry step succeeded,
//! to `{dist}/{tag}.release.json`.

use crate::core::error::{ConvoyResult, ResultExt};
use crate::release::BuildTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Output of one successful build+package branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
  pub target: BuildTarget,
  pub version: String,
  pub binary_path: PathBuf,
  pub archive_path: PathBuf,
  /// SHA-256 of the archive file
  pub archive_sha256: String,
  /// SHA-256 over the staging tree (names, modes, contents)
  pub staging_digest: String,
}

impl Artifact {
  pub fn archive_file_name(&self) -> String {
    self
      .archive_path
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_default()
  }
}

/// How the registry responded for one package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
  Published,
  AlreadyPublished,
  /// `publish = false`: gated, never sent to the registry
  Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPackage {
  pub name: String,
  pub version: String,
  pub status: PublishStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedAsset {
  pub target: BuildTarget,
  pub file_name: String,
  pub sha256: String,
}

/// Outcome of a successful release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRecord {
  pub tag: String,
  pub version: String,
  /// Packages in the order they were published
  pub packages: Vec<PublishedPackage>,
  /// Archives attached to the release record
  pub assets: Vec<AttachedAsset>,
  /// Archives that could not be attached yet (retry with `cargo convoy attach`)
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub pending_assets: Vec<AttachedAsset>,
  #[serde(default)]
  pub release_url: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl PublishRecord {
  pub fn is_complete(&self) -> bool {
    self.pending_assets.is_empty()
  }

  /// Location of the record for a tag inside the dist directory
  ///
  /// Namespaced tags (`cli/v1.2.0`) map to a flat file name (`cli-v1.2.0`).
  pub fn path_for(dist_dir: &Path, tag: &str) -> PathBuf {
    dist_dir.join(format!("{}.release.json", tag.replace(['/', '\\'], "-")))
  }

  pub fn save(&self, dist_dir: &Path) -> ConvoyResult<PathBuf> {
    fs::create_dir_all(dist_dir).with_context(|| format!("Failed to create {}", dist_dir.display()))?;
    let path = Self::path_for(dist_dir, &self.tag);
    let json = serde_json::to_string_pretty(self)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
  }

  pub fn load(dist_dir: &Path, tag: &str) -> ConvoyResult<Self> {
    let path = Self::path_for(dist_dir, tag);
    let json = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&json)?)
  }
}
