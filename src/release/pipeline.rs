//! Release pipeline state machine
//!
//! ```text
//! Idle ──▶ Gated ──▶ Building ──▶ Packaging ──▶ Publishing ──▶ Done
//!   └────────┴──────────┴────────────┴─────────────┴──────────▶ Failed
//! ```
//!
//! Each stage hands the next one a typed result. Every branch builds and
//! then packages its target while the run is `Building`, so a packaging
//! failure shows up as `Building -> Failed` with a `PackagingFailure` in
//! [`ReleasePipeline::failures`]. The matrix join sits between `Building`
//! and `Packaging`; `Packaging` is the verified, complete artifact set. Credentials are requested after that join,
//! so no secret exists while untrusted build scripts run.

use crate::cargo::manifest::PackageManifest;
use crate::core::config::PublishSettings;
use crate::core::error::{ConvoyError, ConvoyResult, ReleaseError};
use crate::release::matrix::{BranchFailures, BuildMatrixRunner, Builder, run_branches};
use crate::release::package::{ArchiveTools, ArtifactPackager, verify_artifact_set};
use crate::release::publish::{Credentials, PublishGatekeeper, PublishPlan, Registry, ReleaseHost, upload_failure};
use crate::release::tag::ReleaseTag;
use crate::release::{Artifact, BuildTarget, PublishRecord, gate};
use crate::ui::progress::MultiProgress;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
  Idle,
  Gated,
  Building,
  Packaging,
  Publishing,
  Done,
  Failed,
}

impl PipelineState {
  pub fn is_terminal(self) -> bool {
    matches!(self, PipelineState::Done | PipelineState::Failed)
  }

  pub fn can_transition_to(self, next: PipelineState) -> bool {
    use PipelineState::*;
    match (self, next) {
      (from, Failed) => !from.is_terminal(),
      (Idle, Gated) | (Gated, Building) | (Building, Packaging) | (Packaging, Publishing) | (Publishing, Done) => true,
      _ => false,
    }
  }
}

impl fmt::Display for PipelineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self, f)
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct Transition {
  pub from: PipelineState,
  pub to: PipelineState,
  pub at: DateTime<Utc>,
}

/// Current state plus the timestamped history of every transition
#[derive(Debug, Clone)]
pub struct StateMachine {
  state: PipelineState,
  history: Vec<Transition>,
}

impl StateMachine {
  pub fn new() -> Self {
    Self {
      state: PipelineState::Idle,
      history: Vec::new(),
    }
  }

  pub fn state(&self) -> PipelineState {
    self.state
  }

  pub fn history(&self) -> &[Transition] {
    &self.history
  }

  pub fn transition(&mut self, to: PipelineState) -> Result<(), ReleaseError> {
    if !self.state.can_transition_to(to) {
      return Err(ReleaseError::Invariant {
        reason: format!("illegal transition {} -> {}", self.state, to),
      });
    }
    tracing::debug!(from = %self.state, to = %to, "pipeline transition");
    self.history.push(Transition {
      from: self.state,
      to,
      at: Utc::now(),
    });
    self.state = to;
    Ok(())
  }

  /// Move to `Failed` unless already terminal
  pub fn fail(&mut self) {
    if !self.state.is_terminal() {
      // Cannot fail: every non-terminal state may move to Failed
      let _ = self.transition(PipelineState::Failed);
    }
  }
}

impl Default for StateMachine {
  fn default() -> Self {
    Self::new()
  }
}

/// Resolved inputs of one release run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub product: String,
  pub targets: Vec<BuildTarget>,
  /// Absolute paths of files shipped next to the binary
  pub ancillary: Vec<PathBuf>,
  pub dist_dir: PathBuf,
  pub build_timeout: Duration,
  pub package_timeout: Duration,
  pub publish: PublishSettings,
}

/// External collaborators, one per stage
pub struct Toolchain<'a, B, A, R, H> {
  pub builder: &'a B,
  pub archiver: &'a A,
  pub registry: &'a R,
  pub host: &'a H,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
  Publish,
  /// Gate, build and package; stop before anything is published
  DryRun,
}

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
  Published(PublishRecord),
  DryRun(Vec<Artifact>),
}

/// One release run, driven from `Idle` to a terminal state
pub struct ReleasePipeline<'a, B, A, R, H> {
  config: &'a PipelineConfig,
  tools: Toolchain<'a, B, A, R, H>,
  machine: StateMachine,
  progress: Option<MultiProgress>,
  quiet: bool,
  failures: Vec<ReleaseError>,
}

impl<'a, B, A, R, H> ReleasePipeline<'a, B, A, R, H>
where
  B: Builder,
  A: ArchiveTools,
  R: Registry,
  H: ReleaseHost,
{
  pub fn new(config: &'a PipelineConfig, tools: Toolchain<'a, B, A, R, H>) -> Self {
    Self {
      config,
      tools,
      machine: StateMachine::new(),
      progress: None,
      quiet: false,
      failures: Vec::new(),
    }
  }

  pub fn with_progress(mut self, progress: MultiProgress) -> Self {
    self.progress = Some(progress);
    self
  }

  /// Suppress status lines on stdout (machine-readable output)
  pub fn quiet(mut self) -> Self {
    self.quiet = true;
    self
  }

  fn status(&self, line: impl fmt::Display) {
    if !self.quiet {
      println!("{}", line);
    }
  }

  pub fn state(&self) -> PipelineState {
    self.machine.state()
  }

  pub fn history(&self) -> &[Transition] {
    self.machine.history()
  }

  /// Every failure of the run (all failed branches, not just the headline)
  pub fn failures(&self) -> &[ReleaseError] {
    &self.failures
  }

  /// Run the pipeline for a release tag
  ///
  /// `credentials` is only called once every artifact exists and the run is
  /// about to publish.
  pub fn run<C>(
    &mut self,
    tag: &ReleaseTag,
    manifests: &[PackageManifest],
    mode: RunMode,
    credentials: C,
  ) -> ConvoyResult<PipelineOutcome>
  where
    C: FnOnce() -> ConvoyResult<Credentials>,
  {
    let result = self.drive(tag, manifests, mode, credentials);
    if let Err(err) = &result {
      if let Some(release) = err.as_release()
        && self.failures.is_empty()
      {
        self.failures.push(release.clone());
      }
      self.machine.fail();
      tracing::error!(state = %self.machine.state(), error = %err, "release failed");
    }
    result
  }

  fn drive<C>(
    &mut self,
    tag: &ReleaseTag,
    manifests: &[PackageManifest],
    mode: RunMode,
    credentials: C,
  ) -> ConvoyResult<PipelineOutcome>
  where
    C: FnOnce() -> ConvoyResult<Credentials>,
  {
    let config = self.config;

    let pass = gate::check(tag, manifests)?;
    let plan = PublishPlan::new(manifests)?;
    self.machine.transition(PipelineState::Gated)?;
    self.status(format_args!(
      "✅ Version gate passed: {} manifest(s) at {}",
      pass.manifests_checked(),
      tag.version_text()
    ));

    self.machine.transition(PipelineState::Building)?;
    self.status(format_args!("🔨 Building {} target(s)...", config.targets.len()));
    let artifacts = self.build_and_package(tag.version_text()).map_err(|failures| {
      for failure in &failures.failures {
        eprintln!("   ❌ {}", failure);
      }
      if !failures.discarded.is_empty() {
        eprintln!("   ⚠️  Discarding {} successful target(s): release is all-or-nothing", failures.discarded.len());
      }
      self.failures = failures.failures.clone();
      ConvoyError::Release(failures.into_headline())
    })?;

    self.machine.transition(PipelineState::Packaging)?;
    verify_artifact_set(&artifacts, &config.targets, &config.product, tag.version_text())?;
    for artifact in &artifacts {
      self.status(format_args!("📦 {}", artifact.archive_file_name()));
    }

    if mode == RunMode::DryRun {
      self.status("🔍 Dry run: stopping before publish");
      return Ok(PipelineOutcome::DryRun(artifacts));
    }

    let credentials = credentials()?;
    self.machine.transition(PipelineState::Publishing)?;
    self.status(format_args!("🚀 Publishing {} package(s) in dependency order...", plan.steps().len()));

    let gatekeeper = PublishGatekeeper::new(self.tools.registry, self.tools.host, &config.publish);
    let record = gatekeeper.publish(
      &pass,
      &plan,
      &artifacts,
      &config.targets,
      &config.product,
      &credentials,
    )?;
    // The registry and the release host already hold the release at this point
    match record.save(&config.dist_dir) {
      Ok(path) => tracing::info!(path = %path.display(), "release record written"),
      Err(e) => {
        tracing::error!(error = %e, "release record not written");
        eprintln!("   ⚠️  Release published, but the record could not be written: {}", e);
      }
    }

    if let Some(err) = upload_failure(&record, &config.dist_dir) {
      return Err(err.into());
    }

    self.machine.transition(PipelineState::Done)?;
    Ok(PipelineOutcome::Published(record))
  }

  /// One branch per target: build, then package. Joined all-or-nothing.
  fn build_and_package(&self, version: &str) -> Result<Vec<Artifact>, BranchFailures> {
    let config = self.config;
    let runner = BuildMatrixRunner::new(self.tools.builder, &config.targets, config.build_timeout);
    let packager = ArtifactPackager::new(
      self.tools.archiver,
      &config.product,
      &config.ancillary,
      &config.dist_dir,
      config.package_timeout,
    );

    run_branches(&config.targets, 2, self.progress.as_ref(), |target, tick| {
      let binary = runner.build_target(target)?;
      tick();
      let artifact = packager.package(target, version, &binary)?;
      tick();
      Ok(artifact)
    })
    .join()
  }
}
