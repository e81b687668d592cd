//! Error types for cargo-convoy with contextual messages and exit codes
//!
//! One error type covers the whole tool. Pipeline failures live in
//! [`ReleaseError`], which mirrors the release taxonomy: a gate mismatch,
//! per-target build/packaging failures, registry failures and retryable
//! asset uploads. Every variant carries enough context (target, package,
//! expected vs. found version) to diagnose a failed run without re-running it.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Exit codes for cargo-convoy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid args, missing files)
  User = 1,
  /// System error (toolchain, registry, release host, I/O)
  System = 2,
  /// Validation failure (version gate)
  Validation = 3,
  /// Partial success that can be retried (asset uploads)
  Retryable = 4,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for cargo-convoy
#[derive(Debug)]
pub enum ConvoyError {
  /// Configuration errors
  Config(ConfigError),

  /// Release pipeline failures
  Release(ReleaseError),

  /// I/O errors
  Io(io::Error),

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

impl ConvoyError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    ConvoyError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    ConvoyError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  /// Add context to an existing error
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      ConvoyError::Message { message, context, help } => ConvoyError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      ConvoyError::Io(err) => ConvoyError::Message {
        message: format!("I/O error: {}", err),
        context: Some(ctx_str),
        help: None,
      },
      _ => self,
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      ConvoyError::Config(_) => ExitCode::User,
      ConvoyError::Release(e) => e.exit_code(),
      ConvoyError::Io(_) => ExitCode::System,
      ConvoyError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      ConvoyError::Config(e) => e.help_message(),
      ConvoyError::Release(e) => e.help_message(),
      ConvoyError::Message { help, .. } => help.clone(),
      ConvoyError::Io(_) => None,
    }
  }

  /// The pipeline failure behind this error, if any
  pub fn as_release(&self) -> Option<&ReleaseError> {
    match self {
      ConvoyError::Release(e) => Some(e),
      _ => None,
    }
  }
}

impl fmt::Display for ConvoyError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConvoyError::Config(e) => write!(f, "{}", e),
      ConvoyError::Release(e) => write!(f, "{}", e),
      ConvoyError::Io(e) => write!(f, "I/O error: {}", e),
      ConvoyError::Message { message, context, .. } => {
        write!(f, "{}", message)?;
        if let Some(ctx) = context {
          write!(f, "\n{}", ctx)?;
        }
        Ok(())
      }
    }
  }
}

impl std::error::Error for ConvoyError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      ConvoyError::Io(e) => Some(e),
      _ => None,
    }
  }
}

impl From<io::Error> for ConvoyError {
  fn from(err: io::Error) -> Self {
    ConvoyError::Io(err)
  }
}

impl From<ConfigError> for ConvoyError {
  fn from(err: ConfigError) -> Self {
    ConvoyError::Config(err)
  }
}

impl From<ReleaseError> for ConvoyError {
  fn from(err: ReleaseError) -> Self {
    ConvoyError::Release(err)
  }
}

impl From<toml_edit::TomlError> for ConvoyError {
  fn from(err: toml_edit::TomlError) -> Self {
    ConvoyError::message(format!("TOML parse error: {}", err))
  }
}

impl From<toml_edit::de::Error> for ConvoyError {
  fn from(err: toml_edit::de::Error) -> Self {
    ConvoyError::message(format!("TOML deserialization error: {}", err))
  }
}

impl From<toml_edit::ser::Error> for ConvoyError {
  fn from(err: toml_edit::ser::Error) -> Self {
    ConvoyError::message(format!("TOML serialization error: {}", err))
  }
}

impl From<cargo_metadata::Error> for ConvoyError {
  fn from(err: cargo_metadata::Error) -> Self {
    ConvoyError::message(format!("Cargo metadata error: {}", err))
  }
}

impl From<serde_json::Error> for ConvoyError {
  fn from(err: serde_json::Error) -> Self {
    ConvoyError::message(format!("JSON error: {}", err))
  }
}


/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
  /// convoy.toml not found
  NotFound { workspace_root: PathBuf },

  /// Missing required field
  MissingField { field: String },

  /// Field present but unusable
  Invalid { field: String, reason: String },

  /// A required secret is not set in the environment
  MissingCredential { variable: String },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::NotFound { .. } => Some("Run `cargo convoy init` to create a configuration file.".to_string()),
      ConfigError::MissingCredential { variable } => Some(format!(
        "Export {} in the publishing job only. Build jobs never need it.",
        variable
      )),
      ConfigError::Invalid { field, .. } => Some(format!("Fix `{}` in convoy.toml.", field)),
      ConfigError::MissingField { .. } => None,
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::NotFound { workspace_root } => {
        write!(
          f,
          "No cargo-convoy configuration found.\nExpected file: {}/convoy.toml",
          workspace_root.display()
        )
      }
      ConfigError::MissingField { field } => {
        write!(f, "Missing required field in config: {}", field)
      }
      ConfigError::Invalid { field, reason } => {
        write!(f, "Invalid config value for `{}`: {}", field, reason)
      }
      ConfigError::MissingCredential { variable } => {
        write!(f, "Credential {} is not set (or is empty)", variable)
      }
    }
  }
}

/// Failures of the release pipeline, one variant per stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseError {
  /// Tag does not carry a valid version after the namespace prefix
  InvalidTag { tag: String, reason: String },

  /// A manifest declares a different version than the tag (ConfigMismatch)
  VersionMismatch {
    manifest: PathBuf,
    expected: String,
    found: Option<String>,
    /// Number of manifests that failed the gate, including this one
    total_mismatches: usize,
  },

  /// A target failed to build
  Build { target: String, reason: String },

  /// A target built but could not be stripped, staged or archived
  Packaging { target: String, reason: String },

  /// The registry rejected a package
  Publish {
    package: String,
    version: String,
    reason: String,
  },

  /// Attaching archives to the release record failed (registry publish stands)
  ReleaseUpload { tag: String, failed: Vec<AssetFailure> },

  /// Pipeline invariant violated (illegal transition, incomplete artifact set)
  Invariant { reason: String },
}

/// One archive that could not be attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFailure {
  pub asset: PathBuf,
  pub reason: String,
}

impl ReleaseError {
  /// Taxonomy name used in reports
  pub fn kind(&self) -> &'static str {
    match self {
      ReleaseError::InvalidTag { .. } | ReleaseError::VersionMismatch { .. } => "ConfigMismatch",
      ReleaseError::Build { .. } => "BuildFailure",
      ReleaseError::Packaging { .. } => "PackagingFailure",
      ReleaseError::Publish { .. } => "PublishFailure",
      ReleaseError::ReleaseUpload { .. } => "ReleaseUploadFailure",
      ReleaseError::Invariant { .. } => "InvariantViolation",
    }
  }

  /// Only asset uploads can be retried without re-running the pipeline
  pub fn is_retryable(&self) -> bool {
    matches!(self, ReleaseError::ReleaseUpload { .. })
  }

  /// The build target this failure is scoped to, if any
  pub fn target(&self) -> Option<&str> {
    match self {
      ReleaseError::Build { target, .. } | ReleaseError::Packaging { target, .. } => Some(target),
      _ => None,
    }
  }

  fn exit_code(&self) -> ExitCode {
    match self {
      ReleaseError::InvalidTag { .. } | ReleaseError::VersionMismatch { .. } => ExitCode::Validation,
      ReleaseError::ReleaseUpload { .. } => ExitCode::Retryable,
      _ => ExitCode::System,
    }
  }

  fn help_message(&self) -> Option<String> {
    match self {
      ReleaseError::InvalidTag { .. } => {
        Some("Release tags look like `v1.2.3` (prefix configurable via `release.tag_prefix`).".to_string())
      }
      ReleaseError::VersionMismatch { expected, .. } => Some(format!(
        "Bump every manifest to {} (or delete and re-push the tag). Nothing was built.",
        expected
      )),
      ReleaseError::Build { target, .. } => Some(format!(
        "Check that `rustup target add {}` was run and Cargo.lock is committed (builds use --locked).",
        target
      )),
      ReleaseError::Packaging { .. } => Some("Check that `strip` and `tar` are installed on the runner.".to_string()),
      ReleaseError::Publish { .. } => Some(
        "Packages published before this one stay published; re-running is safe (already-published versions are skipped)."
          .to_string(),
      ),
      ReleaseError::ReleaseUpload { tag, .. } => Some(format!(
        "Registry publish is complete. Retry the uploads with `cargo convoy attach --tag {}`.",
        tag
      )),
      ReleaseError::Invariant { .. } => None,
    }
  }
}

impl fmt::Display for ReleaseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReleaseError::InvalidTag { tag, reason } => {
        write!(f, "ConfigMismatch: tag '{}' is not a release tag: {}", tag, reason)
      }
      ReleaseError::VersionMismatch {
        manifest,
        expected,
        found,
        total_mismatches,
      } => {
        write!(
          f,
          "ConfigMismatch: {} declares version {} but the tag requires {}",
          manifest.display(),
          found.as_deref().unwrap_or("<missing>"),
          expected
        )?;
        if *total_mismatches > 1 {
          write!(f, " ({} more manifest(s) mismatched)", total_mismatches - 1)?;
        }
        Ok(())
      }
      ReleaseError::Build { target, reason } => write!(f, "BuildFailure [{}]: {}", target, reason),
      ReleaseError::Packaging { target, reason } => write!(f, "PackagingFailure [{}]: {}", target, reason),
      ReleaseError::Publish {
        package,
        version,
        reason,
      } => write!(f, "PublishFailure: {}@{}: {}", package, version, reason),
      ReleaseError::ReleaseUpload { tag, failed } => {
        write!(f, "ReleaseUploadFailure: {} asset(s) not attached to {}", failed.len(), tag)?;
        for failure in failed {
          write!(f, "\n  {}: {}", failure.asset.display(), failure.reason)?;
        }
        Ok(())
      }
      ReleaseError::Invariant { reason } => write!(f, "Pipeline invariant violated: {}", reason),
    }
  }
}

/// Result type alias for cargo-convoy
pub type ConvoyResult<T> = Result<T, ConvoyError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> ConvoyResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> ConvoyResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<ConvoyError>,
{
  fn context(self, ctx: impl Into<String>) -> ConvoyResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> ConvoyResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &ConvoyError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}
