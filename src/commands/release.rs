//! Release commands: the full pipeline plus its individual stages
//!
//! `release` is what CI runs on every push. On a release tag it drives the
//! whole pipeline; on any other ref it only proves that every target still
//! builds.

use crate::core::config::ConvoyConfig;
use crate::core::context::ReleaseContext;
use crate::core::error::{ConvoyError, ConvoyResult};
use crate::release::matrix::BuildMatrixRunner;
use crate::release::pipeline::{PipelineOutcome, ReleasePipeline, RunMode, Toolchain};
use crate::release::publish::{Credentials, PublishPlan, ReleaseAttacher, release_host_token, upload_failure};
use crate::release::{PublishRecord, ReleaseTag, Trigger, archive_name, gate};
use crate::system::archive::SystemArchiver;
use crate::system::cargo::CargoToolchain;
use crate::system::github::GhReleaseHost;
use crate::ui::progress::MultiProgress;
use serde_json::json;
use std::path::Path;

/// Run the release pipeline for the triggering ref
pub fn run_release(workspace_root: &Path, reference: Option<String>, dry_run: bool, json: bool) -> ConvoyResult<()> {
  let ctx = ReleaseContext::build(workspace_root, true)?;

  let tag = match Trigger::detect(reference.as_deref(), ctx.tag_prefix()) {
    Trigger::Release(tag) => tag,
    Trigger::Validate { reference } => {
      if !json {
        println!("🔎 {} is not a release tag: validation build only", reference);
      }
      return build_matrix(&ctx, json);
    }
  };

  let config = ctx.pipeline_config()?;
  let manifests = ctx.manifests()?;
  let registry_name = ctx.config.publish.registry.clone();

  let cargo = CargoToolchain::new(&ctx.root, &ctx.target_dir(), &config.product, registry_name.clone());
  let host = GhReleaseHost::new(&ctx.root);
  let mut pipeline = ReleasePipeline::new(
    &config,
    Toolchain {
      builder: &cargo,
      archiver: &SystemArchiver,
      registry: &cargo,
      host: &host,
    },
  );
  if json {
    pipeline = pipeline.quiet();
  } else {
    println!("🏷️  Releasing {}", tag);
    pipeline = pipeline.with_progress(MultiProgress::new());
  }

  let mode = if dry_run { RunMode::DryRun } else { RunMode::Publish };
  let result = pipeline.run(&tag, &manifests, mode, || {
    Credentials::from_env(registry_name.as_deref())
  });

  if json {
    let failures: Vec<_> = pipeline
      .failures()
      .iter()
      .map(|f| {
        json!({
          "kind": f.kind(),
          "target": f.target(),
          "retryable": f.is_retryable(),
          "message": f.to_string(),
        })
      })
      .collect();
    let mut report = json!({
      "tag": tag.name(),
      "state": pipeline.state(),
      "history": pipeline.history(),
      "failures": failures,
    });
    match &result {
      Ok(PipelineOutcome::Published(record)) => report["record"] = serde_json::to_value(record)?,
      Ok(PipelineOutcome::DryRun(artifacts)) => report["artifacts"] = serde_json::to_value(artifacts)?,
      Err(_) => {}
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
  }

  match result? {
    PipelineOutcome::Published(record) if !json => print_record(&record),
    PipelineOutcome::DryRun(artifacts) if !json => {
      println!("\n✅ Dry run complete: {} archive(s) ready in {}", artifacts.len(), config.dist_dir.display());
    }
    _ => {}
  }
  Ok(())
}

fn print_record(record: &PublishRecord) {
  println!("\n🎉 Released {}", record.tag);
  for package in &record.packages {
    println!("   📦 {}@{} ({:?})", package.name, package.version, package.status);
  }
  for asset in &record.assets {
    println!("   📎 {}  sha256:{}", asset.file_name, asset.sha256);
  }
  if let Some(url) = &record.release_url {
    println!("   🔗 {}", url);
  }
}

/// Run the version gate only
pub fn run_gate(workspace_root: &Path, tag: &str, json: bool) -> ConvoyResult<()> {
  let ctx = ReleaseContext::build(workspace_root, false)?;
  let tag = ReleaseTag::parse(tag, ctx.tag_prefix())?;
  let manifests = ctx.manifests()?;

  if json {
    let mismatches: Vec<_> = gate::mismatches(&tag, &manifests)
      .into_iter()
      .map(|m| {
        json!({
          "package": m.package,
          "manifest": m.manifest,
          "found": m.found,
        })
      })
      .collect();
    let report = json!({
      "tag": tag.name(),
      "version": tag.version_text(),
      "manifests_checked": manifests.len(),
      "passed": mismatches.is_empty(),
      "mismatches": mismatches,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
  }

  let pass = gate::check(&tag, &manifests)?;
  if !json {
    println!(
      "✅ Version gate passed: {} manifest(s) declare {}",
      pass.manifests_checked(),
      pass.tag().version_text()
    );
  }
  Ok(())
}

/// Build every configured target, nothing else
pub fn run_build(workspace_root: &Path, json: bool) -> ConvoyResult<()> {
  let ctx = ReleaseContext::build(workspace_root, true)?;
  build_matrix(&ctx, json)
}

fn build_matrix(ctx: &ReleaseContext, json: bool) -> ConvoyResult<()> {
  let targets = ctx.targets()?;
  let product = ctx.product()?;
  let cargo = CargoToolchain::new(&ctx.root, &ctx.target_dir(), &product, None);
  let runner = BuildMatrixRunner::new(&cargo, &targets, ctx.config.release.build_timeout());

  if !json {
    println!("🔨 Building {} for {} target(s)...", product, targets.len());
  }
  let progress = (!json).then(MultiProgress::new);
  let outcome = runner.run(progress.as_ref());
  let failed = outcome.failed_targets().len();
  if failed > 0 {
    tracing::warn!(failed, total = targets.len(), "build matrix incomplete");
  }

  if json {
    let branches: Vec<_> = outcome
      .branches
      .iter()
      .map(|b| match &b.result {
        Ok(binary) => json!({ "target": b.target, "binary": binary }),
        Err(e) => json!({ "target": b.target, "error": e.to_string() }),
      })
      .collect();
    println!("{}", serde_json::to_string_pretty(&json!({ "branches": branches }))?);
  }

  match outcome.join() {
    Ok(binaries) => {
      if !json {
        for binary in &binaries {
          println!("   ✅ {}", binary.display());
        }
        println!("\n✅ All {} target(s) built", binaries.len());
      }
      Ok(())
    }
    Err(failures) => {
      for failure in &failures.failures {
        eprintln!("   ❌ {}", failure);
      }
      Err(ConvoyError::Release(failures.into_headline()))
    }
  }
}

/// Preview a release: gate status, publish order and archive names
pub fn run_plan(workspace_root: &Path, tag: &str, json: bool) -> ConvoyResult<()> {
  let ctx = ReleaseContext::build(workspace_root, false)?;
  let tag = ReleaseTag::parse(tag, ctx.tag_prefix())?;
  let manifests = ctx.manifests()?;
  let plan = PublishPlan::new(&manifests)?;
  let product = ctx.product()?;
  let targets = ctx.targets()?;
  let mismatches = gate::mismatches(&tag, &manifests);

  let archives: Vec<String> = targets
    .iter()
    .map(|t| archive_name(&product, tag.version_text(), t))
    .collect();

  if json {
    let steps: Vec<_> = plan
      .steps()
      .iter()
      .map(|s| {
        json!({
          "package": s.manifest.name,
          "publish": s.manifest.publishable,
          "depends_on": s.internal_deps,
        })
      })
      .collect();
    let report = json!({
      "tag": tag.name(),
      "version": tag.version_text(),
      "gate_passes": mismatches.is_empty(),
      "publish_order": steps,
      "archives": archives,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    return Ok(());
  }

  println!("📋 Release plan for {}\n", tag);
  if mismatches.is_empty() {
    println!("✅ Version gate: {} manifest(s) at {}", manifests.len(), tag.version_text());
  } else {
    println!("❌ Version gate: {} manifest(s) disagree with {}", mismatches.len(), tag.version_text());
    for m in &mismatches {
      println!(
        "   {} ({}): {}",
        m.package,
        m.manifest.display(),
        m.found.as_deref().unwrap_or("<missing>")
      );
    }
  }

  println!("\n📦 Publish order:");
  for (idx, step) in plan.steps().iter().enumerate() {
    let note = if step.manifest.publishable { "" } else { " (publish = false, skipped)" };
    println!("   {}. {}{}", idx + 1, step.manifest.name, note);
  }

  println!("\n📎 Archives:");
  for archive in &archives {
    println!("   {}", archive);
  }
  Ok(())
}

/// Retry attaching archives that a previous run could not upload
pub fn run_attach(workspace_root: &Path, tag: &str) -> ConvoyResult<()> {
  let config = ConvoyConfig::load(workspace_root)?;
  let tag = ReleaseTag::parse(tag, &config.release.tag_prefix)?;
  let dist_dir = workspace_root.join(&config.release.dist_dir);
  let mut record = PublishRecord::load(&dist_dir, tag.name()).map_err(|e| {
    e.context(format!(
      "No release record for {}; `attach` only retries uploads of a published release",
      tag
    ))
  })?;

  if record.is_complete() {
    println!("✅ Every archive is already attached to {}", tag);
    return Ok(());
  }

  println!("📎 Attaching {} pending archive(s) to {}...", record.pending_assets.len(), tag);
  let token = release_host_token()?;
  let host = GhReleaseHost::new(workspace_root);
  ReleaseAttacher::new(&host, &config.publish).reattach(&tag, &mut record, &dist_dir, &token);
  record.save(&dist_dir)?;

  if let Some(err) = upload_failure(&record, &dist_dir) {
    return Err(err.into());
  }
  println!("✅ All archives attached to {}", tag);
  Ok(())
}
