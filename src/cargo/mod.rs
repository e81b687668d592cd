//! Cargo workspace integration
//!
//! - **manifest**: read package manifests verbatim (declared version, publish flag, dependencies)
//! - **metadata**: workspace members, target directory and binaries via cargo_metadata

pub mod manifest;
pub mod metadata;
