//! CLI commands for cargo-convoy
//!
//! - **init**: write a starter convoy.toml
//! - **release**: the full pipeline (`release`) and its stages on their own
//!   (`gate`, `build`, `plan`, `attach`)

pub mod init;
pub mod release;

pub use init::run_init;
pub use release::{run_attach, run_build, run_gate, run_plan, run_release};
