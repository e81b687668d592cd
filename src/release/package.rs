//! Artifact packaging: strip, stage, archive
//!
//! The staging directory is rebuilt from scratch on every run. Contents are
//! copied byte-for-byte and modes normalised, so packaging the same inputs
//! twice yields the same staging tree. The tree digest proves it; archive
//! container metadata (mtimes, gzip header) is not part of the digest.

use crate::core::error::ReleaseError;
use crate::release::{Artifact, BuildTarget, archive_name, archive_stem};
use crate::system::process::ToolError;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BINARY_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// External tools used to shrink and archive a binary
pub trait ArchiveTools: Sync {
  /// Remove debug symbols from `binary` in place
  fn strip(&self, binary: &Path, target: &BuildTarget, timeout: Duration) -> Result<(), ToolError>;

  /// Write a gzip tarball of `entries` (relative to `staging_dir`, flat) to `dest`
  fn archive(&self, staging_dir: &Path, entries: &[String], dest: &Path, timeout: Duration) -> Result<(), ToolError>;
}

/// Whether symbols can be stripped with the host's `strip` for this target
///
/// MSVC binaries keep their symbols in a separate .pdb already.
pub fn needs_strip(target: &BuildTarget) -> bool {
  !target.triple().ends_with("windows-msvc")
}

/// Packages one built binary per target into a distributable archive
pub struct ArtifactPackager<'a, T: ArchiveTools> {
  tools: &'a T,
  product: &'a str,
  ancillary: &'a [PathBuf],
  dist_dir: &'a Path,
  timeout: Duration,
}

impl<'a, T: ArchiveTools> ArtifactPackager<'a, T> {
  pub fn new(tools: &'a T, product: &'a str, ancillary: &'a [PathBuf], dist_dir: &'a Path, timeout: Duration) -> Self {
    Self {
      tools,
      product,
      ancillary,
      dist_dir,
      timeout,
    }
  }

  pub fn staging_dir(&self, version: &str, target: &BuildTarget) -> PathBuf {
    self
      .dist_dir
      .join("staging")
      .join(archive_stem(self.product, version, target))
  }

  pub fn archive_path(&self, version: &str, target: &BuildTarget) -> PathBuf {
    self.dist_dir.join(archive_name(self.product, version, target))
  }

  /// Strip, stage and archive one binary
  pub fn package(&self, target: &BuildTarget, version: &str, binary: &Path) -> Result<Artifact, ReleaseError> {
    let fail = |reason: String| ReleaseError::Packaging {
      target: target.to_string(),
      reason,
    };

    if !binary.is_file() {
      return Err(fail(format!("binary not found at {}", binary.display())));
    }

    let staging = self.staging_dir(version, target);
    let entries = self
      .stage(target, binary, &staging)
      .map_err(|e| fail(format!("staging {}: {}", staging.display(), e)))?;

    let binary_entry = staging.join(target.binary_name(self.product));
    if needs_strip(target) {
      self
        .tools
        .strip(&binary_entry, target, self.timeout)
        .map_err(|e| fail(e.to_string()))?;
    } else {
      tracing::debug!(triple = target.triple(), "skipping strip");
    }

    let staging_digest = staging_digest(&staging, &entries).map_err(|e| fail(format!("hashing staging tree: {}", e)))?;

    let archive_path = self.archive_path(version, target);
    if archive_path.exists() {
      fs::remove_file(&archive_path).map_err(|e| fail(format!("removing old archive: {}", e)))?;
    }
    self
      .tools
      .archive(&staging, &entries, &archive_path, self.timeout)
      .map_err(|e| fail(e.to_string()))?;

    let archive_sha256 = crate::utils::sha256_file(&archive_path)
      .map_err(|e| fail(format!("reading {}: {}", archive_path.display(), e)))?;

    tracing::info!(
      triple = target.triple(),
      archive = %archive_path.display(),
      "packaged"
    );

    Ok(Artifact {
      target: target.clone(),
      version: version.to_string(),
      binary_path: binary_entry,
      archive_path,
      archive_sha256,
      staging_digest,
    })
  }

  /// Recreate the staging directory; returns its sorted entry names
  fn stage(&self, target: &BuildTarget, binary: &Path, staging: &Path) -> io::Result<Vec<String>> {
    if staging.exists() {
      fs::remove_dir_all(staging)?;
    }
    fs::create_dir_all(staging)?;

    let mut entries = Vec::with_capacity(self.ancillary.len() + 1);

    let binary_name = target.binary_name(self.product);
    copy_with_mode(binary, &staging.join(&binary_name), BINARY_MODE)?;
    entries.push(binary_name);

    for file in self.ancillary {
      let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("{} has no file name", file.display())))?;
      if entries.contains(&name) {
        return Err(io::Error::new(
          io::ErrorKind::AlreadyExists,
          format!("two archive entries are named '{}'", name),
        ));
      }
      copy_with_mode(file, &staging.join(&name), FILE_MODE)
        .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", file.display(), e)))?;
      entries.push(name);
    }

    entries.sort();
    Ok(entries)
  }
}

fn copy_with_mode(from: &Path, to: &Path, mode: u32) -> io::Result<()> {
  fs::copy(from, to)?;
  set_mode(to, mode)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
  Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> io::Result<u32> {
  use std::os::unix::fs::PermissionsExt;
  Ok(fs::metadata(path)?.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> io::Result<u32> {
  Ok(0)
}

/// SHA-256 over the staging tree: every entry's name, mode and contents
pub fn staging_digest(staging: &Path, entries: &[String]) -> io::Result<String> {
  let mut sorted: Vec<&String> = entries.iter().collect();
  sorted.sort();

  let mut hasher = Sha256::new();
  for entry in sorted {
    let path = staging.join(entry);
    let contents = fs::read(&path)?;
    hasher.update(entry.as_bytes());
    hasher.update([0]);
    hasher.update(file_mode(&path)?.to_be_bytes());
    hasher.update((contents.len() as u64).to_be_bytes());
    hasher.update(&contents);
  }
  Ok(format!("{:x}", hasher.finalize()))
}

/// Check the joined artifact set: exactly one artifact per target, named as expected
pub fn verify_artifact_set(
  artifacts: &[Artifact],
  targets: &[BuildTarget],
  product: &str,
  version: &str,
) -> Result<(), ReleaseError> {
  let invariant = |reason: String| ReleaseError::Invariant { reason };

  if artifacts.len() != targets.len() {
    return Err(invariant(format!(
      "expected {} artifact(s), found {}",
      targets.len(),
      artifacts.len()
    )));
  }

  let expected: HashSet<&BuildTarget> = targets.iter().collect();
  let mut seen: HashMap<&BuildTarget, usize> = HashMap::new();
  for artifact in artifacts {
    if !expected.contains(&artifact.target) {
      return Err(invariant(format!("unexpected artifact for target {}", artifact.target)));
    }
    *seen.entry(&artifact.target).or_default() += 1;

    let name = archive_name(product, version, &artifact.target);
    if artifact.version != version || artifact.archive_file_name() != name {
      return Err(invariant(format!(
        "artifact {} does not match expected name {}",
        artifact.archive_path.display(),
        name
      )));
    }
  }

  if let Some((target, _)) = seen.iter().find(|(_, n)| **n > 1) {
    return Err(invariant(format!("more than one artifact for target {}", target)));
  }
  Ok(())
}
