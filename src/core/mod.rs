//! Core building blocks shared by every command
//!
//! - **config**: convoy.toml parsing and validation
//! - **context**: workspace, config and manifests loaded once per command
//! - **error**: error types with contextual help messages and exit codes

pub mod config;
pub mod context;
pub mod error;
