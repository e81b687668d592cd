//! Integration tests for `cargo convoy attach`

use crate::helpers::*;
use anyhow::Result;

#[test]
fn test_attach_without_record_explains_itself() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_crate("core", "1.0.0", &[])?;
  ws.configure(&["core"], &["x86_64-unknown-linux-gnu"])?;

  let output = run_convoy_raw(&ws.path, &["convoy", "attach", "--tag", "v1.0.0"])?;
  assert!(!output.status.success());
  assert!(stderr(&output).contains("No release record for v1.0.0"));
  Ok(())
}
