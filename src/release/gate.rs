//! Version gate: the tag's version must be declared by every manifest
//!
//! The comparison is textual and exact. `1.2.0` does not match `1.2.0+build`
//! or `v1.2.0`, even though semver would treat some of those as equivalent.

use crate::cargo::manifest::PackageManifest;
use crate::core::error::ReleaseError;
use crate::release::tag::ReleaseTag;
use std::path::PathBuf;

/// Proof that the gate passed for a tag
///
/// Only [`check`] can construct one, so holding a `GatePass` is how later
/// stages know the gate ran and succeeded.
#[derive(Debug, Clone)]
pub struct GatePass {
  tag: ReleaseTag,
  manifests_checked: usize,
}

impl GatePass {
  pub fn tag(&self) -> &ReleaseTag {
    &self.tag
  }

  pub fn manifests_checked(&self) -> usize {
    self.manifests_checked
  }
}

/// One manifest that disagrees with the tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
  pub manifest: PathBuf,
  pub package: String,
  pub found: Option<String>,
}

/// Every manifest whose declared version differs from the tag's version text
pub fn mismatches(tag: &ReleaseTag, manifests: &[PackageManifest]) -> Vec<Mismatch> {
  manifests
    .iter()
    .filter(|m| m.declared_version.as_deref() != Some(tag.version_text()))
    .map(|m| Mismatch {
      manifest: m.manifest_path.clone(),
      package: m.name.clone(),
      found: m.declared_version.clone(),
    })
    .collect()
}

/// Run the gate. All manifests are checked; the first mismatch is reported.
pub fn check(tag: &ReleaseTag, manifests: &[PackageManifest]) -> Result<GatePass, ReleaseError> {
  let failed = mismatches(tag, manifests);

  for mismatch in &failed {
    tracing::warn!(
      manifest = %mismatch.manifest.display(),
      expected = tag.version_text(),
      found = mismatch.found.as_deref().unwrap_or("<missing>"),
      "version mismatch"
    );
  }

  if let Some(first) = failed.first() {
    return Err(ReleaseError::VersionMismatch {
      manifest: first.manifest.clone(),
      expected: tag.version_text().to_string(),
      found: first.found.clone(),
      total_mismatches: failed.len(),
    });
  }

  tracing::debug!(tag = tag.name(), manifests = manifests.len(), "version gate passed");
  Ok(GatePass {
    tag: tag.clone(),
    manifests_checked: manifests.len(),
  })
}
