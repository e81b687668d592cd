//! `strip` and `tar` backend for packaging

use crate::release::BuildTarget;
use crate::release::package::ArchiveTools;
use crate::system::process::{self, ToolError, scrubbed};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Host `strip` and `tar` binaries
pub struct SystemArchiver;

impl ArchiveTools for SystemArchiver {
  fn strip(&self, binary: &Path, target: &BuildTarget, timeout: Duration) -> Result<(), ToolError> {
    let mut cmd = scrubbed("strip");
    if target.triple().contains("apple") {
      // Keep global symbols Mach-O binaries need for dynamic lookup
      cmd.arg("-x");
    }
    cmd.arg(binary);
    process::run(cmd, Some(timeout)).map(|_| ())
  }

  fn archive(&self, staging_dir: &Path, entries: &[String], dest: &Path, timeout: Duration) -> Result<(), ToolError> {
    process::run(archive_command(staging_dir, entries, dest), Some(timeout)).map(|_| ())
  }
}

/// `tar -czf` with only the named entries, no AppleDouble `._*` companions
fn archive_command(staging_dir: &Path, entries: &[String], dest: &Path) -> Command {
  let mut cmd = scrubbed("tar");
  // bsdtar on macOS stores extended attributes as extra entries otherwise
  cmd.env("COPYFILE_DISABLE", "1");
  if cfg!(target_os = "macos") {
    cmd.arg("--no-mac-metadata");
  }
  cmd.arg("-czf").arg(dest).arg("-C").arg(staging_dir).args(entries);
  cmd
}
