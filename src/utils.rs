//! Small helpers shared across the pipeline

use sha2::{Digest, Sha256};
use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Fetch an environment variable, mapping an empty value to `None`
///
/// CI systems commonly export unset secrets as empty strings; those must be
/// treated exactly like missing ones.
pub fn env_var<K: AsRef<OsStr>>(key: K) -> Option<String> {
  non_empty(std::env::var(key).ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.filter(|s| !s.is_empty())
}

/// Hex-encoded SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> io::Result<String> {
  let mut file = File::open(path)?;
  let mut hasher = Sha256::new();
  let mut buf = [0u8; 64 * 1024];
  loop {
    let read = file.read(&mut buf)?;
    if read == 0 {
      break;
    }
    hasher.update(&buf[..read]);
  }
  Ok(format!("{:x}", hasher.finalize()))
}

/// Executable suffix for a target triple
pub fn exe_suffix(target_triple: &str) -> &'static str {
  if target_triple.contains("windows") { ".exe" } else { "" }
}
