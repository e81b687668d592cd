//! GitHub release backend using the `gh` CLI
//!
//! The token is handed to `gh` through `GH_TOKEN` for each call and never
//! stored.

use crate::release::publish::{ReleaseHost, Secret};
use crate::release::tag::ReleaseTag;
use crate::system::process::{self, ToolError, scrubbed};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

const GH_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct ReleaseView {
  url: String,
}

/// Release records on the repository checked out at `repo_dir`
pub struct GhReleaseHost {
  repo_dir: PathBuf,
}

impl GhReleaseHost {
  pub fn new(repo_dir: &Path) -> Self {
    Self {
      repo_dir: repo_dir.to_path_buf(),
    }
  }

  fn gh(&self, token: &Secret) -> Command {
    let mut cmd = scrubbed("gh");
    cmd.current_dir(&self.repo_dir).env("GH_TOKEN", token.expose());
    cmd
  }

  /// URL of the existing release for `tag`, or `None` when there is none
  fn view(&self, tag: &ReleaseTag, token: &Secret) -> Result<Option<String>, ToolError> {
    let mut cmd = self.gh(token);
    cmd.args(["release", "view", tag.name(), "--json", "url"]);
    match process::run(cmd, Some(GH_TIMEOUT)) {
      Ok(output) => parse_view(&output.stdout).map(Some),
      Err(ToolError::Failed { detail, .. }) if detail.contains("release not found") => Ok(None),
      Err(e) => Err(e),
    }
  }
}

fn parse_view(stdout: &[u8]) -> Result<String, ToolError> {
  serde_json::from_slice::<ReleaseView>(stdout)
    .map(|view| view.url)
    .map_err(|e| ToolError::failed("gh", format!("unexpected `gh release view` output: {}", e)))
}

impl ReleaseHost for GhReleaseHost {
  fn ensure_release(&self, tag: &ReleaseTag, draft: bool, token: &Secret) -> Result<String, ToolError> {
    if let Some(url) = self.view(tag, token)? {
      tracing::info!(tag = tag.name(), "reusing existing release");
      return Ok(url);
    }

    let mut cmd = self.gh(token);
    cmd.args(["release", "create", tag.name(), "--verify-tag", "--title", tag.name(), "--notes", ""]);
    if draft {
      cmd.arg("--draft");
    }
    if tag.is_prerelease() {
      cmd.arg("--prerelease");
    }
    let output = process::run(cmd, Some(GH_TIMEOUT))?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  fn upload_asset(&self, tag: &ReleaseTag, asset: &Path, token: &Secret) -> Result<(), ToolError> {
    let mut cmd = self.gh(token);
    cmd.args(["release", "upload", tag.name()]).arg(asset).arg("--clobber");
    process::run(cmd, Some(GH_TIMEOUT)).map(|_| ())
  }
}
