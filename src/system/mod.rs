//! System tool backends
//!
//! Every external effect goes through a system binary, the same way the
//! build itself does:
//!
//! - **process**: spawning with deadlines and a secret-free environment
//! - **cargo**: `cargo build`, `cargo publish`, `cargo info`, `rustc -vV`
//! - **archive**: `strip` and `tar`
//! - **github**: `gh release` for the release record

pub mod archive;
pub mod cargo;
pub mod github;
pub mod process;
