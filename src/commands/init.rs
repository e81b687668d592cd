//! `cargo convoy init`: write a starter convoy.toml

use crate::cargo::metadata::WorkspaceMetadata;
use crate::core::config::ConvoyConfig;
use crate::core::error::{ConvoyError, ConvoyResult};
use crate::system::cargo::host_triple;
use std::path::Path;

/// Create convoy.toml for the workspace at `workspace_root`
///
/// Targets default to the host triple; the product defaults to the root
/// package's only binary when there is exactly one.
pub fn run_init(workspace_root: &Path, targets: Vec<String>, force: bool) -> ConvoyResult<()> {
  if ConvoyConfig::exists(workspace_root) && !force {
    return Err(ConvoyError::with_help(
      format!("Configuration already exists in {}", workspace_root.display()),
      "Pass --force to overwrite it.",
    ));
  }

  let targets = if targets.is_empty() {
    let host = host_triple()?;
    println!("🖥️  No targets given, using host triple {}", host);
    vec![host]
  } else {
    targets
  };

  let product = match WorkspaceMetadata::load(workspace_root).and_then(|m| m.default_product()) {
    Ok(product) => Some(product),
    Err(e) => {
      tracing::debug!(error = %e, "no default product");
      println!("⚠️  Could not infer the product binary; set `release.product` in convoy.toml");
      None
    }
  };

  let config = ConvoyConfig::new(product, targets);
  config.release.validate()?;
  config.save(workspace_root)?;

  println!("✅ Wrote {}", workspace_root.join("convoy.toml").display());
  println!("\nNext steps:");
  println!("  1. Review `release.ancillary` (files shipped in every archive)");
  println!("  2. Tag a release: git tag {}<version> && git push --tags", config.release.tag_prefix);
  println!("  3. Preview it:    cargo convoy plan --tag {}<version>", config.release.tag_prefix);
  Ok(())
}
