//! Release pipeline: gate, build matrix, packaging, ordered publish
//!
//! # Core Invariants
//!
//! 1. **The tag is the source of truth**
//!    - Every manifest must declare exactly the tag's version before anything builds
//!    - The tag is parsed once into a [`ReleaseTag`] and never changes afterwards
//!
//! 2. **All or nothing**
//!    - One independent branch per target (build, then package)
//!    - A single failed branch stops the release: nothing reaches the registry
//!      and no release record is created
//!
//! 3. **Dependencies publish first**
//!    - Packages publish strictly one at a time in dependency order
//!    - A dependent is only published once its dependencies are visible in the registry
//!
//! # Architecture
//!
//! ```text
//! Trigger (tag ref) ──▶ gate ──▶ matrix ─┬─ build ▶ package (target A) ─┐
//!                                        └─ build ▶ package (target B) ─┴─▶ join ──▶ publish
//! ```
//!
//! - **tag**: tag / ref parsing and trigger classification
//! - **gate**: version gate over package manifests
//! - **matrix**: parallel per-target branches and the join barrier
//! - **package**: strip, stage, archive
//! - **graph**: dependency-ordered publish plan
//! - **publish**: registry publication and release record creation
//! - **pipeline**: the state machine driving all of the above
//! - **record**: artifacts and the final publish record

pub mod gate;
pub mod graph;
pub mod matrix;
pub mod package;
pub mod pipeline;
pub mod publish;
pub mod record;
pub mod tag;

#[cfg(test)]
pub(crate) mod fakes;

pub use record::{Artifact, PublishRecord};
pub use tag::{ReleaseTag, Trigger};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A platform/architecture triple to build for
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildTarget(String);

impl BuildTarget {
  pub fn new(triple: impl Into<String>) -> Self {
    Self(triple.into())
  }

  pub fn triple(&self) -> &str {
    &self.0
  }

  /// Binary file name for this target (`.exe` on Windows)
  pub fn binary_name(&self, product: &str) -> String {
    format!("{}{}", product, crate::utils::exe_suffix(&self.0))
  }
}

impl fmt::Display for BuildTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Deterministic archive file name: `{product}-{version}-{target}.tar.gz`
pub fn archive_name(product: &str, version: &str, target: &BuildTarget) -> String {
  format!("{}.tar.gz", archive_stem(product, version, target))
}

/// Archive name without extension, also used for the staging directory
pub fn archive_stem(product: &str, version: &str, target: &BuildTarget) -> String {
  format!("{}-{}-{}", product, version, target)
}
