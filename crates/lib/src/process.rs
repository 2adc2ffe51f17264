//! External process execution.
//!
//! Every external tool the orchestrator drives (the container engine CLI,
//! `git`, `manifest-tool`, build hooks, package query scripts) goes through a
//! [`ProcessRunner`] so it can be swapped out in tests and honors dry-run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

use crate::retry::Transient;

/// Errors that can occur while running an external process.
#[derive(Debug, Error)]
pub enum ProcessError {
  /// The process could not be started.
  #[error("failed to start '{command}': {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  /// The process exited with a non-zero status.
  #[error("command failed with exit code {code:?}: {command}\n{stderr}")]
  Failed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },
}

impl Transient for ProcessError {
  /// A command that ran and failed may succeed on another attempt; one that
  /// could not be started will not.
  fn is_transient(&self) -> bool {
    matches!(self, ProcessError::Failed { .. })
  }
}

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
  pub program: String,
  pub args: Vec<String>,
  pub working_dir: Option<PathBuf>,
}

impl ProcessCommand {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      working_dir: None,
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn current_dir(mut self, dir: &Path) -> Self {
    self.working_dir = Some(dir.to_path_buf());
    self
  }
}

impl fmt::Display for ProcessCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      write!(f, " {}", arg)?;
    }
    Ok(())
  }
}

/// Runs external processes.
pub trait ProcessRunner: Send + Sync {
  /// Run the command and return its trimmed stdout.
  ///
  /// In dry-run mode the command is only logged and `None` is returned.
  fn execute(&self, command: &ProcessCommand, dry_run: bool) -> Result<Option<String>, ProcessError>;
}

/// [`ProcessRunner`] backed by real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
  fn execute(&self, command: &ProcessCommand, dry_run: bool) -> Result<Option<String>, ProcessError> {
    if dry_run {
      info!(command = %command, "dry run: skipping command");
      return Ok(None);
    }

    info!(command = %command, "executing command");

    let mut process = Command::new(&command.program);
    process.args(&command.args);
    if let Some(dir) = &command.working_dir {
      process.current_dir(dir);
    }

    let output = process.output().map_err(|source| ProcessError::Spawn {
      command: command.to_string(),
      source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      if !stdout.is_empty() {
        debug!(stdout = %stdout, "command stdout");
      }
      return Err(ProcessError::Failed {
        command: command.to_string(),
        code: output.status.code(),
        stderr,
      });
    }

    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command output");
    }

    Ok(Some(stdout))
  }
}
