//! [`GitService`] backed by the `git` CLI.

use super::{GitError, GitService};
use crate::manifest::PlatformInfo;
use crate::process::{ProcessCommand, ProcessRunner};

pub struct GitCli<'a> {
  process: &'a dyn ProcessRunner,
}

impl<'a> GitCli<'a> {
  pub fn new(process: &'a dyn ProcessRunner) -> Self {
    Self { process }
  }
}

impl GitService for GitCli<'_> {
  fn get_dockerfile_commit_url(&self, platform: &PlatformInfo, source_repo_url: &str) -> Result<String, GitError> {
    let mut command = ProcessCommand::new("git").args([
      "log".to_string(),
      "-1".to_string(),
      "--format=format:%H".to_string(),
      "--".to_string(),
      platform.dockerfile_path.to_string_lossy().into_owned(),
    ]);
    if let Some(dir) = platform.dockerfile_path.parent() {
      command = command.current_dir(dir);
    }

    // Read-only, so dry runs execute it too.
    let sha = self
      .process
      .execute(&command, false)?
      .filter(|sha| !sha.is_empty())
      .ok_or_else(|| GitError::NoCommit(platform.dockerfile_path.clone()))?;

    Ok(format!(
      "{}/blob/{}/{}",
      source_repo_url.trim_end_matches('/'),
      sha,
      platform.dockerfile_path_relative_to_manifest
    ))
  }
}
