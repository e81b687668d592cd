//! End-to-end tests driving the compiled binary against temporary workspaces

mod helpers;
mod test_attach;
mod test_gate;
mod test_init;
mod test_plan;
mod test_release;
