//! Release tags and pipeline triggers
//!
//! A release tag is `{prefix}{semver}`, e.g. `v1.2.0`. Anything else that
//! reaches the pipeline (branch pushes, pull requests, non-release tags) only
//! triggers a validation build.

use crate::core::error::ReleaseError;
use semver::Version;
use serde::Serialize;
use std::fmt;

const TAG_REF_PREFIX: &str = "refs/tags/";

/// A validated release tag; immutable once parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseTag {
  name: String,
  version_text: String,
  #[serde(skip)]
  version: Version,
}

impl ReleaseTag {
  /// Parse a tag name (or `refs/tags/...` ref) with the given namespace prefix
  pub fn parse(tag: &str, prefix: &str) -> Result<Self, ReleaseError> {
    let name = tag.strip_prefix(TAG_REF_PREFIX).unwrap_or(tag);

    let version_text = name.strip_prefix(prefix).ok_or_else(|| ReleaseError::InvalidTag {
      tag: name.to_string(),
      reason: format!("expected prefix '{}'", prefix),
    })?;

    let version = Version::parse(version_text).map_err(|e| ReleaseError::InvalidTag {
      tag: name.to_string(),
      reason: format!("'{}' is not a valid version: {}", version_text, e),
    })?;

    Ok(Self {
      name: name.to_string(),
      version_text: version_text.to_string(),
      version,
    })
  }

  /// Full tag name, e.g. `v1.2.0`
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Version component exactly as written in the tag
  pub fn version_text(&self) -> &str {
    &self.version_text
  }

  pub fn is_prerelease(&self) -> bool {
    !self.version.pre.is_empty()
  }
}

impl fmt::Display for ReleaseTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name)
  }
}

/// What an incoming VCS event unlocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
  /// A release tag: gate, build, package, publish
  Release(ReleaseTag),
  /// Any other ref: build-only validation
  Validate { reference: String },
}

impl Trigger {
  /// Classify a git ref; a bare name (`v1.2.0`) is read as a tag name
  pub fn from_ref(reference: &str, prefix: &str) -> Self {
    let tag_name = match reference.strip_prefix(TAG_REF_PREFIX) {
      Some(name) => Some(name),
      None if !reference.starts_with("refs/") => Some(reference),
      None => None,
    };
    if let Some(name) = tag_name
      && let Ok(tag) = ReleaseTag::parse(name, prefix)
    {
      return Trigger::Release(tag);
    }
    Trigger::Validate {
      reference: reference.to_string(),
    }
  }

  /// Resolve the trigger from an explicit ref or the CI environment (`GITHUB_REF`)
  pub fn detect(explicit: Option<&str>, prefix: &str) -> Self {
    match explicit
      .map(str::to_string)
      .or_else(|| crate::utils::env_var("GITHUB_REF"))
    {
      Some(reference) => Self::from_ref(&reference, prefix),
      None => Trigger::Validate {
        reference: "HEAD".to_string(),
      },
    }
  }
}
