//! Subprocess execution with deadlines and secret scrubbing

use std::fmt;
use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Environment variables that carry publishing secrets
pub const SECRET_VARS: &[&str] = &["CARGO_REGISTRY_TOKEN", "GITHUB_TOKEN", "GH_TOKEN"];

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_TAIL_LINES: usize = 20;

/// Failure of an external tool, opaque beyond pass/fail and a diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
  /// The program could not be started
  Spawn { program: String, reason: String },
  /// The program ran and reported failure
  Failed { program: String, detail: String },
  /// The program exceeded its time budget and was killed
  TimedOut { program: String, after: Duration },
}

impl ToolError {
  pub fn failed(program: impl Into<String>, detail: impl Into<String>) -> Self {
    ToolError::Failed {
      program: program.into(),
      detail: detail.into(),
    }
  }
}

impl fmt::Display for ToolError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ToolError::Spawn { program, reason } => write!(f, "failed to run `{}`: {}", program, reason),
      ToolError::Failed { program, detail } => write!(f, "`{}` failed: {}", program, detail),
      ToolError::TimedOut { program, after } => {
        write!(f, "`{}` timed out after {}s", program, after.as_secs())
      }
    }
  }
}

/// Build a command whose environment never contains publishing secrets
///
/// Build, strip and archive steps run through this; only the publish stage
/// adds a token back, explicitly, for the one process that needs it.
pub fn scrubbed(program: &str) -> Command {
  let mut cmd = Command::new(program);
  for var in SECRET_VARS {
    cmd.env_remove(var);
  }
  for (key, _) in std::env::vars_os() {
    if let Some(key) = key.to_str()
      && key.starts_with("CARGO_REGISTRIES_")
      && key.ends_with("_TOKEN")
    {
      cmd.env_remove(key);
    }
  }
  cmd
}

/// Run a command to completion, optionally killing it after `timeout`
///
/// Returns the captured output on success. A non-zero exit becomes
/// `ToolError::Failed` carrying the tail of stderr.
pub fn run(mut cmd: Command, timeout: Option<Duration>) -> Result<Output, ToolError> {
  let program = cmd.get_program().to_string_lossy().to_string();
  tracing::debug!(program = %program, args = ?cmd.get_args().collect::<Vec<_>>(), "spawning");

  let mut child = cmd
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .map_err(|e| ToolError::Spawn {
      program: program.clone(),
      reason: e.to_string(),
    })?;

  // Drain pipes on their own threads so a chatty child never blocks on a full pipe
  let stdout_reader = drain(child.stdout.take());
  let stderr_reader = drain(child.stderr.take());

  let deadline = timeout.map(|t| Instant::now() + t);
  let status = loop {
    match child.try_wait() {
      Ok(Some(status)) => break status,
      Ok(None) => {
        if let Some(deadline) = deadline
          && Instant::now() >= deadline
        {
          let _ = child.kill();
          let _ = child.wait();
          tracing::warn!(program = %program, "killed after exceeding time budget");
          return Err(ToolError::TimedOut {
            program,
            after: timeout.unwrap_or_default(),
          });
        }
        thread::sleep(POLL_INTERVAL);
      }
      Err(e) => {
        return Err(ToolError::failed(program, format!("wait failed: {}", e)));
      }
    }
  };

  // A grandchild that inherited the pipes keeps them open after the child exits;
  // the budget covers collecting output too.
  let timed_out = || {
    tracing::warn!(program = %program, "output still open after exceeding time budget");
    ToolError::TimedOut {
      program: program.clone(),
      after: timeout.unwrap_or_default(),
    }
  };
  let stdout = collect(&stdout_reader, deadline).ok_or_else(timed_out)?;
  let stderr = collect(&stderr_reader, deadline).ok_or_else(timed_out)?;
  let output = Output { status, stdout, stderr };

  if !output.status.success() {
    let code = output
      .status
      .code()
      .map(|c| c.to_string())
      .unwrap_or_else(|| "signal".to_string());
    return Err(ToolError::failed(
      program,
      format!("exit code {}\n{}", code, stderr_tail(&output.stderr)),
    ));
  }

  Ok(output)
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> Receiver<Vec<u8>> {
  let (tx, rx) = mpsc::channel();
  thread::spawn(move || {
    let mut buf = Vec::new();
    if let Some(mut source) = source {
      let _ = source.read_to_end(&mut buf);
    }
    let _ = tx.send(buf);
  });
  rx
}

/// Output of a drained pipe, or `None` once the deadline passes first
fn collect(reader: &Receiver<Vec<u8>>, deadline: Option<Instant>) -> Option<Vec<u8>> {
  let received = match deadline {
    Some(deadline) => reader.recv_timeout(deadline.saturating_duration_since(Instant::now())),
    None => reader.recv().map_err(|_| RecvTimeoutError::Disconnected),
  };
  match received {
    Ok(buf) => Some(buf),
    Err(RecvTimeoutError::Disconnected) => Some(Vec::new()),
    Err(RecvTimeoutError::Timeout) => None,
  }
}

/// Last lines of stderr, enough to diagnose without flooding the report
pub fn stderr_tail(stderr: &[u8]) -> String {
  let text = String::from_utf8_lossy(stderr);
  let lines: Vec<&str> = text.lines().collect();
  let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
  lines[start..].join("\n")
}
