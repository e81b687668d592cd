//! In-memory collaborators for pipeline tests
//!
//! Every fake appends to a shared [`EventLog`] so tests can assert on the
//! order of side effects across stages.

use crate::cargo::manifest::PackageManifest;
use crate::release::BuildTarget;
use crate::release::matrix::Builder;
use crate::release::package::ArchiveTools;
use crate::release::publish::{PublishOutcome, Registry, ReleaseHost, Secret};
use crate::release::tag::ReleaseTag;
use crate::system::process::ToolError;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
  pub fn push(&self, event: impl Into<String>) {
    self.0.lock().unwrap().push(event.into());
  }

  pub fn entries(&self) -> Vec<String> {
    self.0.lock().unwrap().clone()
  }

  pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
    self.entries().into_iter().filter(|e| e.starts_with(prefix)).collect()
  }

  pub fn position(&self, event: &str) -> Option<usize> {
    self.entries().iter().position(|e| e == event)
  }
}

pub struct FakeBuilder {
  out: TempDir,
  failing: HashSet<String>,
  timing_out: HashSet<String>,
  log: EventLog,
}

impl FakeBuilder {
  pub fn new() -> Self {
    Self {
      out: TempDir::new().unwrap(),
      failing: HashSet::new(),
      timing_out: HashSet::new(),
      log: EventLog::default(),
    }
  }

  pub fn with_log(mut self, log: EventLog) -> Self {
    self.log = log;
    self
  }

  pub fn failing(mut self, target: &str) -> Self {
    self.failing.insert(target.to_string());
    self
  }

  pub fn timing_out(mut self, target: &str) -> Self {
    self.timing_out.insert(target.to_string());
    self
  }

  /// Targets that produced a binary
  pub fn built(&self) -> Vec<String> {
    self
      .log
      .with_prefix("build ")
      .into_iter()
      .map(|e| e.trim_start_matches("build ").to_string())
      .collect()
  }
}

impl Builder for FakeBuilder {
  fn build(&self, target: &BuildTarget, timeout: Duration) -> Result<PathBuf, ToolError> {
    if self.failing.contains(target.triple()) {
      return Err(ToolError::failed("cargo", format!("could not compile for {}", target)));
    }
    if self.timing_out.contains(target.triple()) {
      return Err(ToolError::TimedOut {
        program: "cargo".to_string(),
        after: timeout,
      });
    }

    let dir = self.out.path().join(target.triple()).join("release");
    fs::create_dir_all(&dir).unwrap();
    let binary = dir.join(target.binary_name("tool"));
    fs::write(&binary, format!("binary for {}", target)).unwrap();
    self.log.push(format!("build {}", target));
    Ok(binary)
  }
}

/// Writes a deterministic pseudo-archive: entry names and contents in order
#[derive(Default)]
pub struct FakeArchiver {
  failing_strip: HashSet<String>,
  timing_out: HashSet<String>,
  log: EventLog,
}

impl FakeArchiver {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_log(mut self, log: EventLog) -> Self {
    self.log = log;
    self
  }

  pub fn failing_strip(mut self, target: &str) -> Self {
    self.failing_strip.insert(target.to_string());
    self
  }

  /// `tar` exceeds its budget for archives of this target
  pub fn timing_out(mut self, target: &str) -> Self {
    self.timing_out.insert(target.to_string());
    self
  }
}

impl ArchiveTools for FakeArchiver {
  fn strip(&self, _binary: &Path, target: &BuildTarget, _timeout: Duration) -> Result<(), ToolError> {
    if self.failing_strip.contains(target.triple()) {
      return Err(ToolError::failed("strip", "file format not recognized"));
    }
    self.log.push(format!("strip {}", target));
    Ok(())
  }

  fn archive(&self, staging_dir: &Path, entries: &[String], dest: &Path, timeout: Duration) -> Result<(), ToolError> {
    let name = dest.file_name().unwrap().to_string_lossy().to_string();
    if self.timing_out.iter().any(|t| name.contains(t.as_str())) {
      return Err(ToolError::TimedOut {
        program: "tar".to_string(),
        after: timeout,
      });
    }
    let mut bytes = Vec::new();
    for entry in entries {
      bytes.extend_from_slice(entry.as_bytes());
      bytes.push(b'\n');
      bytes.extend(fs::read(staging_dir.join(entry)).unwrap());
    }
    fs::write(dest, bytes).unwrap();
    self.log.push(format!("archive {}", name));
    Ok(())
  }
}

/// Registry where published versions appear after a number of polls
#[derive(Default)]
pub struct FakeRegistry {
  visible: Mutex<HashSet<String>>,
  /// Remaining `is_visible` polls before a freshly published version shows up
  lagging: Mutex<HashMap<String, usize>>,
  lag: usize,
  rejecting: HashSet<String>,
  tokens: Mutex<Vec<String>>,
  log: EventLog,
}

impl FakeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_log(mut self, log: EventLog) -> Self {
    self.log = log;
    self
  }

  pub fn with_lag(mut self, polls: usize) -> Self {
    self.lag = polls;
    self
  }

  pub fn with_existing(self, name: &str, version: &str) -> Self {
    self.visible.lock().unwrap().insert(format!("{}@{}", name, version));
    self
  }

  pub fn rejecting(mut self, name: &str) -> Self {
    self.rejecting.insert(name.to_string());
    self
  }

  pub fn published(&self) -> Vec<String> {
    self
      .log
      .with_prefix("publish ")
      .into_iter()
      .map(|e| e.trim_start_matches("publish ").to_string())
      .collect()
  }

  pub fn tokens(&self) -> Vec<String> {
    self.tokens.lock().unwrap().clone()
  }
}

impl Registry for FakeRegistry {
  fn is_visible(&self, name: &str, version: &str) -> Result<bool, ToolError> {
    let key = format!("{}@{}", name, version);
    let mut lagging = self.lagging.lock().unwrap();
    if let Some(remaining) = lagging.get_mut(&key) {
      if *remaining > 0 {
        *remaining -= 1;
        return Ok(false);
      }
      lagging.remove(&key);
      self.visible.lock().unwrap().insert(key.clone());
      self.log.push(format!("visible {}", name));
    }
    Ok(self.visible.lock().unwrap().contains(&key))
  }

  fn publish(&self, manifest: &PackageManifest, token: &Secret) -> Result<PublishOutcome, ToolError> {
    self.tokens.lock().unwrap().push(token.expose().to_string());
    if self.rejecting.contains(&manifest.name) {
      return Err(ToolError::failed("cargo", "crate name is reserved"));
    }

    let version = manifest.declared_version.clone().unwrap_or_default();
    let key = format!("{}@{}", manifest.name, version);
    if self.visible.lock().unwrap().contains(&key) {
      return Ok(PublishOutcome::AlreadyPublished);
    }

    self.log.push(format!("publish {}", manifest.name));
    if self.lag == 0 {
      self.visible.lock().unwrap().insert(key);
      self.log.push(format!("visible {}", manifest.name));
    } else {
      self.lagging.lock().unwrap().insert(key, self.lag);
    }
    Ok(PublishOutcome::Published)
  }
}

/// Release host with per-asset scripted upload failures
#[derive(Default)]
pub struct FakeReleaseHost {
  releases: Mutex<Vec<String>>,
  uploads: Mutex<Vec<String>>,
  /// Failures left per asset file name before uploads succeed
  flaky: Mutex<HashMap<String, usize>>,
  log: EventLog,
}

impl FakeReleaseHost {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_log(mut self, log: EventLog) -> Self {
    self.log = log;
    self
  }

  pub fn with_release(self, tag: &str) -> Self {
    self.releases.lock().unwrap().push(tag.to_string());
    self
  }

  pub fn flaky(self, file_name: &str, failures: usize) -> Self {
    self.flaky.lock().unwrap().insert(file_name.to_string(), failures);
    self
  }

  pub fn releases(&self) -> Vec<String> {
    self.releases.lock().unwrap().clone()
  }

  pub fn uploads(&self) -> Vec<String> {
    self.uploads.lock().unwrap().clone()
  }
}

impl ReleaseHost for FakeReleaseHost {
  fn ensure_release(&self, tag: &ReleaseTag, _draft: bool, _token: &Secret) -> Result<String, ToolError> {
    let mut releases = self.releases.lock().unwrap();
    if !releases.iter().any(|t| t == tag.name()) {
      releases.push(tag.name().to_string());
      self.log.push(format!("release {}", tag));
    }
    Ok(format!("https://releases.invalid/{}", tag))
  }

  fn upload_asset(&self, _tag: &ReleaseTag, asset: &Path, _token: &Secret) -> Result<(), ToolError> {
    let name = asset.file_name().unwrap().to_string_lossy().to_string();
    let mut flaky = self.flaky.lock().unwrap();
    if let Some(left) = flaky.get_mut(&name)
      && *left > 0
    {
      *left -= 1;
      return Err(ToolError::failed("gh", "HTTP 502"));
    }
    self.uploads.lock().unwrap().push(name.clone());
    self.log.push(format!("upload {}", name));
    Ok(())
  }
}
