//! Publish gatekeeper: ordered registry publication, then the release record
//!
//! The gatekeeper is the only component that ever sees credentials. It
//! refuses to start without a [`GatePass`] and a complete artifact set, so a
//! partial matrix can never reach the registry.

use crate::cargo::manifest::PackageManifest;
use crate::core::config::PublishSettings;
use crate::core::error::{AssetFailure, ConfigError, ConvoyError, ConvoyResult, ReleaseError};
use crate::release::gate::GatePass;
use crate::release::graph::PublishGraph;
use crate::release::package::verify_artifact_set;
use crate::release::record::{AttachedAsset, PublishStatus, PublishedPackage};
use crate::release::tag::ReleaseTag;
use crate::release::{Artifact, BuildTarget, PublishRecord};
use crate::system::process::ToolError;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

/// A credential value that never shows up in logs or debug output
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
  pub fn new(value: impl Into<String>) -> Self {
    Self(value.into())
  }

  pub fn expose(&self) -> &str {
    &self.0
  }
}

impl fmt::Debug for Secret {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Secret(***)")
  }
}

/// Tokens for the registry and the release host
#[derive(Debug, Clone)]
pub struct Credentials {
  pub registry: Secret,
  pub release_host: Secret,
}

impl Credentials {
  /// Read both tokens from the environment; empty values count as missing
  pub fn from_env(registry: Option<&str>) -> ConvoyResult<Self> {
    Ok(Self {
      registry: registry_token(registry)?,
      release_host: release_host_token()?,
    })
  }
}

/// Environment variable holding the token for a registry
pub fn registry_token_var(registry: Option<&str>) -> String {
  match registry {
    Some(name) if name != "crates-io" => {
      format!("CARGO_REGISTRIES_{}_TOKEN", name.to_uppercase().replace('-', "_"))
    }
    _ => "CARGO_REGISTRY_TOKEN".to_string(),
  }
}

pub fn registry_token(registry: Option<&str>) -> ConvoyResult<Secret> {
  let var = registry_token_var(registry);
  crate::utils::env_var(&var)
    .map(Secret::new)
    .ok_or(ConvoyError::Config(ConfigError::MissingCredential { variable: var }))
}

pub fn release_host_token() -> ConvoyResult<Secret> {
  crate::utils::env_var("GITHUB_TOKEN")
    .or_else(|| crate::utils::env_var("GH_TOKEN"))
    .map(Secret::new)
    .ok_or_else(|| {
      ConvoyError::Config(ConfigError::MissingCredential {
        variable: "GITHUB_TOKEN".to_string(),
      })
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
  Published,
  /// The registry already holds this exact version
  AlreadyPublished,
}

/// A package registry
pub trait Registry {
  /// Whether `name@version` can be resolved by dependents
  fn is_visible(&self, name: &str, version: &str) -> Result<bool, ToolError>;

  fn publish(&self, manifest: &PackageManifest, token: &Secret) -> Result<PublishOutcome, ToolError>;
}

/// Hosts user-facing release records with downloadable assets
pub trait ReleaseHost {
  /// Create the release for `tag`, or reuse the existing one. Returns its URL.
  fn ensure_release(&self, tag: &ReleaseTag, draft: bool, token: &Secret) -> Result<String, ToolError>;

  fn upload_asset(&self, tag: &ReleaseTag, asset: &Path, token: &Secret) -> Result<(), ToolError>;
}

/// Packages in publish order, with their internal dependencies
#[derive(Debug, Clone)]
pub struct PublishPlan {
  steps: Vec<PublishStep>,
}

#[derive(Debug, Clone)]
pub struct PublishStep {
  pub manifest: PackageManifest,
  /// Released packages this one depends on
  pub internal_deps: Vec<String>,
}

impl PublishPlan {
  /// Order the packages and reject plans the registry could never accept
  pub fn new(manifests: &[PackageManifest]) -> ConvoyResult<Self> {
    let graph = PublishGraph::from_manifests(manifests);
    let order = graph.publish_order()?;
    let by_name: HashMap<&str, &PackageManifest> = manifests.iter().map(|m| (m.name.as_str(), m)).collect();

    let unpublishable: HashSet<&str> = manifests
      .iter()
      .filter(|m| !m.publishable)
      .map(|m| m.name.as_str())
      .collect();

    let mut steps = Vec::with_capacity(order.len());
    for name in order {
      let manifest = by_name[name.as_str()];
      let internal_deps = graph.dependencies_of(&name).unwrap_or_default();

      if manifest.publishable
        && let Some(dep) = internal_deps.iter().find(|d| unpublishable.contains(d.as_str()))
      {
        return Err(ConvoyError::Config(ConfigError::Invalid {
          field: format!("{} dependencies", manifest.name),
          reason: format!("depends on '{}', which has `publish = false`", dep),
        }));
      }

      steps.push(PublishStep {
        manifest: manifest.clone(),
        internal_deps,
      });
    }
    Ok(Self { steps })
  }

  pub fn steps(&self) -> &[PublishStep] {
    &self.steps
  }
}

/// Registry publication plus release record creation
pub struct PublishGatekeeper<'a, R: Registry, H: ReleaseHost> {
  registry: &'a R,
  attacher: ReleaseAttacher<'a, H>,
  settings: &'a PublishSettings,
}

impl<'a, R: Registry, H: ReleaseHost> PublishGatekeeper<'a, R, H> {
  pub fn new(registry: &'a R, host: &'a H, settings: &'a PublishSettings) -> Self {
    Self {
      registry,
      attacher: ReleaseAttacher::new(host, settings),
      settings,
    }
  }

  /// Publish every package, then create the release and attach the archives
  ///
  /// Returns the record even when some uploads failed; those are listed in
  /// `pending_assets`. A registry failure returns an error and creates no
  /// release record.
  pub fn publish(
    &self,
    gate: &GatePass,
    plan: &PublishPlan,
    artifacts: &[Artifact],
    targets: &[BuildTarget],
    product: &str,
    credentials: &Credentials,
  ) -> Result<PublishRecord, ReleaseError> {
    let tag = gate.tag();
    verify_artifact_set(artifacts, targets, product, tag.version_text())?;

    let packages = self.publish_packages(tag, plan, &credentials.registry)?;
    let (release_url, assets, pending_assets) = self.attacher.attach_assets(tag, artifacts, &credentials.release_host);

    Ok(PublishRecord {
      tag: tag.name().to_string(),
      version: tag.version_text().to_string(),
      packages,
      assets,
      pending_assets,
      release_url,
      created_at: Utc::now(),
    })
  }

  /// Publish in plan order, one package at a time
  pub fn publish_packages(
    &self,
    tag: &ReleaseTag,
    plan: &PublishPlan,
    token: &Secret,
  ) -> Result<Vec<PublishedPackage>, ReleaseError> {
    let version = tag.version_text();
    let mut confirmed: HashSet<String> = HashSet::new();
    let mut published = Vec::with_capacity(plan.steps().len());

    for step in plan.steps() {
      let name = &step.manifest.name;
      let failure = |reason: String| ReleaseError::Publish {
        package: name.clone(),
        version: version.to_string(),
        reason,
      };

      if !step.manifest.publishable {
        tracing::info!(package = %name, "publish = false, skipping registry");
        published.push(PublishedPackage {
          name: name.clone(),
          version: version.to_string(),
          status: PublishStatus::Skipped,
        });
        continue;
      }

      for dep in &step.internal_deps {
        if !confirmed.contains(dep) {
          self.wait_until_visible(dep, version).map_err(&failure)?;
          confirmed.insert(dep.clone());
        }
      }

      let already = self.registry.is_visible(name, version).map_err(|e| failure(e.to_string()))?;
      let status = if already {
        PublishStatus::AlreadyPublished
      } else {
        tracing::info!(package = %name, version, "publishing");
        match self.registry.publish(&step.manifest, token) {
          Ok(PublishOutcome::Published) => PublishStatus::Published,
          Ok(PublishOutcome::AlreadyPublished) => PublishStatus::AlreadyPublished,
          Err(e) => return Err(failure(e.to_string())),
        }
      };

      if status == PublishStatus::AlreadyPublished {
        tracing::info!(package = %name, version, "already published, skipping");
        confirmed.insert(name.clone());
      }

      published.push(PublishedPackage {
        name: name.clone(),
        version: version.to_string(),
        status,
      });
    }

    Ok(published)
  }

  /// Poll the registry until `name@version` resolves or the deadline passes
  fn wait_until_visible(&self, name: &str, version: &str) -> Result<(), String> {
    let deadline = Instant::now() + self.settings.visibility_timeout();
    loop {
      match self.registry.is_visible(name, version) {
        Ok(true) => {
          tracing::debug!(package = name, version, "visible in registry");
          return Ok(());
        }
        Ok(false) => {}
        Err(e) => tracing::warn!(package = name, error = %e, "registry lookup failed"),
      }
      if Instant::now() >= deadline {
        return Err(format!(
          "dependency {}@{} did not become visible within {}s",
          name,
          version,
          self.settings.visibility_timeout().as_secs()
        ));
      }
      thread::sleep(self.settings.poll_interval());
    }
  }
}

/// Creates the release record and uploads archives to it
pub struct ReleaseAttacher<'a, H: ReleaseHost> {
  host: &'a H,
  settings: &'a PublishSettings,
}

impl<'a, H: ReleaseHost> ReleaseAttacher<'a, H> {
  pub fn new(host: &'a H, settings: &'a PublishSettings) -> Self {
    Self { host, settings }
  }

  /// Ensure the release record exists and upload every archive (with retries)
  ///
  /// Returns the release URL, attached assets and assets still pending.
  pub fn attach_assets(
    &self,
    tag: &ReleaseTag,
    artifacts: &[Artifact],
    token: &Secret,
  ) -> (Option<String>, Vec<AttachedAsset>, Vec<AttachedAsset>) {
    let uploads = artifacts
      .iter()
      .map(|a| {
        let asset = AttachedAsset {
          target: a.target.clone(),
          file_name: a.archive_file_name(),
          sha256: a.archive_sha256.clone(),
        };
        (asset, a.archive_path.clone())
      })
      .collect();
    self.attach(tag, uploads, token)
  }

  /// Retry the pending uploads of an earlier run, updating the record in place
  pub fn reattach(&self, tag: &ReleaseTag, record: &mut PublishRecord, dist_dir: &Path, token: &Secret) {
    let uploads = record
      .pending_assets
      .drain(..)
      .map(|asset| {
        let path = dist_dir.join(&asset.file_name);
        (asset, path)
      })
      .collect();
    let (url, attached, pending) = self.attach(tag, uploads, token);
    record.assets.extend(attached);
    record.pending_assets = pending;
    if url.is_some() {
      record.release_url = url;
    }
  }

  fn attach(
    &self,
    tag: &ReleaseTag,
    uploads: Vec<(AttachedAsset, PathBuf)>,
    token: &Secret,
  ) -> (Option<String>, Vec<AttachedAsset>, Vec<AttachedAsset>) {
    let url = match self.retrying(|| self.host.ensure_release(tag, self.settings.draft, token)) {
      Ok(url) => url,
      Err(e) => {
        tracing::error!(tag = tag.name(), error = %e, "could not create release record");
        return (None, Vec::new(), uploads.into_iter().map(|(asset, _)| asset).collect());
      }
    };

    let mut attached = Vec::new();
    let mut pending = Vec::new();
    for (asset, path) in uploads {
      match self.retrying(|| self.host.upload_asset(tag, &path, token)) {
        Ok(()) => attached.push(asset),
        Err(e) => {
          tracing::error!(asset = %path.display(), error = %e, "upload failed");
          pending.push(asset);
        }
      }
    }
    (Some(url), attached, pending)
  }

  fn retrying<T>(&self, mut op: impl FnMut() -> Result<T, ToolError>) -> Result<T, ToolError> {
    let attempts = self.settings.upload_attempts.max(1);
    let mut attempt = 1;
    loop {
      match op() {
        Ok(value) => return Ok(value),
        Err(e) if attempt < attempts => {
          tracing::warn!(attempt, error = %e, "release host call failed, retrying");
          thread::sleep(self.settings.retry_delay());
          attempt += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }
}

/// Turn pending uploads into the retryable release error
pub fn upload_failure(record: &PublishRecord, dist_dir: &Path) -> Option<ReleaseError> {
  if record.is_complete() {
    return None;
  }
  Some(ReleaseError::ReleaseUpload {
    tag: record.tag.clone(),
    failed: record
      .pending_assets
      .iter()
      .map(|a| AssetFailure {
        asset: dist_dir.join(&a.file_name),
        reason: "upload did not succeed after retries".to_string(),
      })
      .collect(),
  })
}
