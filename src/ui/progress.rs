//! Progress bars for the target matrix
//!
//! Uses `linya`, whose bars can be driven from many threads at once. One bar
//! per target branch; each step (build, package) advances it by one.

use linya::{Bar, Progress};
use std::sync::{Arc, Mutex, MutexGuard};

/// Thread-safe multi-bar progress shared by all branches
#[derive(Clone)]
pub struct MultiProgress {
  progress: Arc<Mutex<Progress>>,
}

impl MultiProgress {
  pub fn new() -> Self {
    Self {
      progress: Arc::new(Mutex::new(Progress::new())),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Progress> {
    // A panicking branch must not take the other bars down with it
    self.progress.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Add a bar for one branch
  pub fn add_bar(&self, total: usize, label: impl Into<String>) -> Bar {
    self.lock().bar(total, label.into())
  }

  /// Advance a bar by one step
  pub fn inc(&self, bar: &Bar) {
    self.lock().inc_and_draw(bar, 1);
  }
}

impl Default for MultiProgress {
  fn default() -> Self {
    Self::new()
  }
}
