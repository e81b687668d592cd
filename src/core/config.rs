use crate::core::error::{ConfigError, ConvoyError, ConvoyResult, ResultExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for cargo-convoy
/// Searched in order: convoy.toml, .convoy.toml, .cargo/convoy.toml, .config/convoy.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvoyConfig {
  pub release: ReleaseSettings,
  #[serde(default)]
  pub publish: PublishSettings,
}

/// What gets released and how it is built and packaged
///
/// # Example
///
/// ```toml
/// [release]
/// product = "powerpack"
/// targets = ["x86_64-apple-darwin", "aarch64-apple-darwin"]
/// ancillary = ["LICENSE-MIT", "README.md"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseSettings {
  /// Binary and archive name. Defaults to the sole bin target of the root package.
  #[serde(default)]
  pub product: Option<String>,

  /// Tag namespace prefix stripped before version comparison
  #[serde(default = "default_tag_prefix")]
  pub tag_prefix: String,

  /// Target triples, one build branch each
  pub targets: Vec<String>,

  /// Files copied next to the binary in every archive (license, readme)
  #[serde(default = "default_ancillary")]
  pub ancillary: Vec<PathBuf>,

  /// Package directories (relative to workspace root) that take part in the release.
  /// Empty means every workspace member.
  #[serde(default)]
  pub packages: Vec<PathBuf>,

  /// Output directory for staging trees, archives and release records
  #[serde(default = "default_dist_dir")]
  pub dist_dir: PathBuf,

  #[serde(default = "default_build_timeout")]
  pub build_timeout_secs: u64,

  #[serde(default = "default_package_timeout")]
  pub package_timeout_secs: u64,
}

/// Registry and release-host behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSettings {
  /// Alternate registry name passed to `cargo publish --registry`
  #[serde(default)]
  pub registry: Option<String>,

  /// How long to wait for a published version to become resolvable
  #[serde(default = "default_visibility_timeout")]
  pub visibility_timeout_secs: u64,

  #[serde(default = "default_poll_interval")]
  pub poll_interval_secs: u64,

  /// Attempts per release asset before reporting a ReleaseUploadFailure
  #[serde(default = "default_upload_attempts")]
  pub upload_attempts: u32,

  #[serde(default = "default_retry_delay")]
  pub retry_delay_secs: u64,

  /// Create the release record as a draft
  #[serde(default)]
  pub draft: bool,
}

fn default_tag_prefix() -> String {
  "v".to_string()
}

fn default_ancillary() -> Vec<PathBuf> {
  vec![PathBuf::from("LICENSE"), PathBuf::from("README.md")]
}

fn default_dist_dir() -> PathBuf {
  PathBuf::from("dist")
}

fn default_build_timeout() -> u64 {
  3600
}

fn default_package_timeout() -> u64 {
  300
}

fn default_visibility_timeout() -> u64 {
  300
}

fn default_poll_interval() -> u64 {
  5
}

fn default_upload_attempts() -> u32 {
  3
}

fn default_retry_delay() -> u64 {
  2
}

impl Default for PublishSettings {
  fn default() -> Self {
    Self {
      registry: None,
      visibility_timeout_secs: default_visibility_timeout(),
      poll_interval_secs: default_poll_interval(),
      upload_attempts: default_upload_attempts(),
      retry_delay_secs: default_retry_delay(),
      draft: false,
    }
  }
}

impl ReleaseSettings {
  pub fn build_timeout(&self) -> Duration {
    Duration::from_secs(self.build_timeout_secs)
  }

  pub fn package_timeout(&self) -> Duration {
    Duration::from_secs(self.package_timeout_secs)
  }

  /// Validate release settings
  pub fn validate(&self) -> ConvoyResult<()> {
    if self.targets.is_empty() {
      return Err(ConvoyError::Config(ConfigError::Invalid {
        field: "release.targets".to_string(),
        reason: "at least one target triple is required".to_string(),
      }));
    }

    let mut seen = HashSet::new();
    for target in &self.targets {
      if target.split('-').count() < 2 || target.contains(char::is_whitespace) {
        return Err(ConvoyError::Config(ConfigError::Invalid {
          field: "release.targets".to_string(),
          reason: format!("'{}' is not a target triple", target),
        }));
      }
      if !seen.insert(target.as_str()) {
        return Err(ConvoyError::Config(ConfigError::Invalid {
          field: "release.targets".to_string(),
          reason: format!("target '{}' is listed twice", target),
        }));
      }
    }

    if let Some(product) = &self.product
      && (product.is_empty() || product.contains(['/', '\\']))
    {
      return Err(ConvoyError::Config(ConfigError::Invalid {
        field: "release.product".to_string(),
        reason: format!("'{}' must be a bare file name", product),
      }));
    }

    if self.ancillary.is_empty() {
      return Err(ConvoyError::Config(ConfigError::Invalid {
        field: "release.ancillary".to_string(),
        reason: "archives must ship at least a license or readme".to_string(),
      }));
    }

    if self.build_timeout_secs == 0 || self.package_timeout_secs == 0 {
      return Err(ConvoyError::Config(ConfigError::Invalid {
        field: "release.*_timeout_secs".to_string(),
        reason: "timeouts must be greater than zero".to_string(),
      }));
    }

    Ok(())
  }
}

impl PublishSettings {
  pub fn visibility_timeout(&self) -> Duration {
    Duration::from_secs(self.visibility_timeout_secs)
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_secs(self.poll_interval_secs)
  }

  pub fn retry_delay(&self) -> Duration {
    Duration::from_secs(self.retry_delay_secs)
  }

  /// Validate publish settings
  pub fn validate(&self) -> ConvoyResult<()> {
    if self.upload_attempts == 0 {
      return Err(ConvoyError::Config(ConfigError::Invalid {
        field: "publish.upload_attempts".to_string(),
        reason: "must be at least 1".to_string(),
      }));
    }
    if self.poll_interval_secs > self.visibility_timeout_secs {
      return Err(ConvoyError::Config(ConfigError::Invalid {
        field: "publish.poll_interval_secs".to_string(),
        reason: "must not exceed visibility_timeout_secs".to_string(),
      }));
    }
    Ok(())
  }
}

impl ConvoyConfig {
  /// Find config file in search order: convoy.toml, .convoy.toml, .cargo/convoy.toml, .config/convoy.toml
  pub fn find_config_path(path: &Path) -> Option<PathBuf> {
    let candidates = [
      path.join("convoy.toml"),
      path.join(".convoy.toml"),
      path.join(".cargo").join("convoy.toml"),
      path.join(".config").join("convoy.toml"),
    ];

    candidates.into_iter().find(|p| p.exists())
  }

  /// Load config (searches multiple locations)
  pub fn load(path: &Path) -> ConvoyResult<Self> {
    let config_path = Self::find_config_path(path).ok_or_else(|| {
      ConvoyError::Config(ConfigError::NotFound {
        workspace_root: path.to_path_buf(),
      })
    })?;

    let content = fs::read_to_string(&config_path)
      .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
    let config = Self::parse(&content).with_context(|| format!("Invalid config in {}", config_path.display()))?;

    tracing::debug!(path = %config_path.display(), targets = config.release.targets.len(), "loaded config");
    Ok(config)
  }

  /// Parse and validate config text
  pub fn parse(content: &str) -> ConvoyResult<Self> {
    let config: ConvoyConfig = toml_edit::de::from_str(content)?;
    config.release.validate()?;
    config.publish.validate()?;
    Ok(config)
  }

  /// Save config to convoy.toml (default location)
  pub fn save(&self, path: &Path) -> ConvoyResult<()> {
    let config_path = path.join("convoy.toml");
    let content = toml_edit::ser::to_string_pretty(self).context("Failed to serialize config to TOML")?;
    fs::write(&config_path, content).with_context(|| format!("Failed to write config to {}", config_path.display()))?;
    Ok(())
  }

  /// Check if config exists at the given path
  pub fn exists(path: &Path) -> bool {
    Self::find_config_path(path).is_some()
  }

  /// Create a starter config for the given targets
  pub fn new(product: Option<String>, targets: Vec<String>) -> Self {
    Self {
      release: ReleaseSettings {
        product,
        tag_prefix: default_tag_prefix(),
        targets,
        ancillary: default_ancillary(),
        packages: Vec::new(),
        dist_dir: default_dist_dir(),
        build_timeout_secs: default_build_timeout(),
        package_timeout_secs: default_package_timeout(),
      },
      publish: PublishSettings::default(),
    }
  }
}
