//! Build matrix: one independent branch per target, joined by a full barrier
//!
//! Branches run on the rayon pool and share nothing mutable. The join waits
//! for every branch to reach a terminal state; any failure turns the whole
//! matrix into a failure, but every branch's result is still reported.

use crate::core::error::{ConfigError, ConvoyError, ConvoyResult, ReleaseError};
use crate::release::BuildTarget;
use crate::system::process::ToolError;
use crate::ui::progress::MultiProgress;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Builds the product binary for one target
///
/// Implementations must build in release mode with locked dependencies and
/// return the path of the single binary produced for that target.
pub trait Builder: Sync {
  fn build(&self, target: &BuildTarget, timeout: Duration) -> Result<PathBuf, ToolError>;
}

/// Turn configured triples into build targets (non-empty, unique)
pub fn validate_targets(triples: &[String]) -> ConvoyResult<Vec<BuildTarget>> {
  if triples.is_empty() {
    return Err(ConvoyError::Config(ConfigError::Invalid {
      field: "release.targets".to_string(),
      reason: "at least one target triple is required".to_string(),
    }));
  }

  let mut seen = HashSet::new();
  let mut targets = Vec::with_capacity(triples.len());
  for triple in triples {
    if !seen.insert(triple.as_str()) {
      return Err(ConvoyError::Config(ConfigError::Invalid {
        field: "release.targets".to_string(),
        reason: format!("target '{}' is listed twice", triple),
      }));
    }
    targets.push(BuildTarget::new(triple.clone()));
  }
  Ok(targets)
}

/// Terminal state of one branch
#[derive(Debug)]
pub struct BranchOutcome<T> {
  pub target: BuildTarget,
  pub result: Result<T, ReleaseError>,
}

/// Every branch's outcome, in configured target order
#[derive(Debug)]
pub struct MatrixOutcome<T> {
  pub branches: Vec<BranchOutcome<T>>,
}

/// The join found at least one failed branch
#[derive(Debug, Clone)]
pub struct BranchFailures {
  /// Failures in configured target order; the first is the headline
  pub failures: Vec<ReleaseError>,
  /// Targets that finished fine but are discarded with the release
  pub discarded: Vec<BuildTarget>,
}

impl BranchFailures {
  pub fn into_headline(mut self) -> ReleaseError {
    self.failures.swap_remove(0)
  }
}

impl<T> MatrixOutcome<T> {
  pub fn failed_targets(&self) -> Vec<&BuildTarget> {
    self
      .branches
      .iter()
      .filter(|b| b.result.is_err())
      .map(|b| &b.target)
      .collect()
  }

  /// All-or-nothing join: every value, or every failure
  pub fn join(self) -> Result<Vec<T>, BranchFailures> {
    let mut values = Vec::with_capacity(self.branches.len());
    let mut failures = Vec::new();
    let mut discarded = Vec::new();

    for branch in self.branches {
      match branch.result {
        Ok(value) => {
          discarded.push(branch.target);
          values.push(value);
        }
        Err(err) => failures.push(err),
      }
    }

    if failures.is_empty() {
      Ok(values)
    } else {
      Err(BranchFailures { failures, discarded })
    }
  }
}

/// Run one branch per target in parallel and wait for all of them
///
/// `branch` receives the target and a tick callback that advances the
/// target's progress bar by one step.
pub fn run_branches<T, F>(
  targets: &[BuildTarget],
  steps_per_branch: usize,
  progress: Option<&MultiProgress>,
  branch: F,
) -> MatrixOutcome<T>
where
  T: Send,
  F: Fn(&BuildTarget, &dyn Fn()) -> Result<T, ReleaseError> + Sync,
{
  let bars: Vec<_> = progress
    .map(|p| {
      targets
        .iter()
        .map(|t| p.add_bar(steps_per_branch, t.triple()))
        .collect()
    })
    .unwrap_or_default();

  let branches = targets
    .par_iter()
    .enumerate()
    .map(|(idx, target)| {
      let tick = || {
        if let (Some(p), Some(bar)) = (progress, bars.get(idx)) {
          p.inc(bar);
        }
      };
      let result = branch(target, &tick);
      if let Err(err) = &result {
        tracing::error!(triple = target.triple(), error = %err, "branch failed");
      }
      BranchOutcome {
        target: target.clone(),
        result,
      }
    })
    .collect();

  MatrixOutcome { branches }
}

/// Release-mode, locked builds across the target matrix
pub struct BuildMatrixRunner<'a, B: Builder> {
  builder: &'a B,
  targets: &'a [BuildTarget],
  timeout: Duration,
}

impl<'a, B: Builder> BuildMatrixRunner<'a, B> {
  pub fn new(builder: &'a B, targets: &'a [BuildTarget], timeout: Duration) -> Self {
    Self {
      builder,
      targets,
      timeout,
    }
  }

  /// Build a single target; failures are scoped to that target
  pub fn build_target(&self, target: &BuildTarget) -> Result<PathBuf, ReleaseError> {
    tracing::info!(triple = target.triple(), "building");
    self.builder.build(target, self.timeout).map_err(|e| ReleaseError::Build {
      target: target.to_string(),
      reason: e.to_string(),
    })
  }

  /// Build every target (validation runs: no packaging, no publish)
  pub fn run(&self, progress: Option<&MultiProgress>) -> MatrixOutcome<PathBuf> {
    run_branches(self.targets, 1, progress, |target, tick| {
      let binary = self.build_target(target)?;
      tick();
      Ok(binary)
    })
  }
}
