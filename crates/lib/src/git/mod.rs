//! Source control access.
//!
//! Two concerns live here: computing the commit URL of a Dockerfile in the
//! local checkout ([`GitService`]), and reading and updating the published
//! image info file in a remote repository ([`SourceCommitService`]).

mod cli;
mod github;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;
use thiserror::Error;

use crate::consts::GIT_TOKEN_ENV;
use crate::manifest::PlatformInfo;
use crate::process::ProcessError;
use crate::retry::Transient;

pub use cli::GitCli;
pub use github::GitHubCommitService;

/// Errors that can occur while talking to source control.
#[derive(Debug, Error)]
pub enum GitError {
  #[error(transparent)]
  Process(#[from] ProcessError),

  #[error("request to '{url}' failed: {source}")]
  Http {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("request to '{url}' returned HTTP {status}: {body}")]
  Status { url: String, status: u16, body: String },

  #[error("unexpected response from '{url}': {message}")]
  InvalidResponse { url: String, message: String },

  #[error("failed to extract repository archive: {0}")]
  Extract(#[source] std::io::Error),

  #[error("git returned no commit for '{0}'")]
  NoCommit(PathBuf),
}

impl Transient for GitError {
  /// Network failures, conflicting concurrent commits and server errors.
  fn is_transient(&self) -> bool {
    match self {
      GitError::Http { .. } => true,
      GitError::Status { status, .. } => matches!(status, 409 | 422) || *status >= 500,
      _ => false,
    }
  }
}

/// Location of a file in a remote repository, plus credentials.
#[derive(Debug, Clone, Default)]
pub struct GitOptions {
  pub owner: String,
  pub repo: String,
  pub branch: String,
  /// Path of the file within the repository.
  pub path: String,
  pub token: Option<String>,
  pub username: Option<String>,
  pub email: Option<String>,
}

impl GitOptions {
  /// The configured token, falling back to the environment.
  pub fn resolve_token(&self) -> Option<String> {
    self
      .token
      .clone()
      .filter(|t| !t.is_empty())
      .or_else(|| std::env::var(GIT_TOKEN_ENV).ok().filter(|t| !t.is_empty()))
  }

  /// Browser URL of the file on its branch.
  pub fn blob_url(&self) -> String {
    format!(
      "https://github.com/{}/{}/blob/{}/{}",
      self.owner, self.repo, self.branch, self.path
    )
  }

  /// Browser URL of a commit.
  pub fn commit_url(&self, sha: &str) -> String {
    format!("https://github.com/{}/{}/commit/{}", self.owner, self.repo, sha)
  }
}

/// Computes the commit URL of a platform's Dockerfile.
pub trait GitService: Send + Sync {
  /// `{source_repo_url}/blob/{sha}/{dockerfile}` for the latest commit touching the Dockerfile.
  fn get_dockerfile_commit_url(&self, platform: &PlatformInfo, source_repo_url: &str) -> Result<String, GitError>;
}

/// A repository extracted into a temporary directory.
///
/// The directory is removed when the checkout is dropped.
#[derive(Debug)]
pub struct RepoCheckout {
  _dir: TempDir,
  root: PathBuf,
}

impl RepoCheckout {
  pub fn new(dir: TempDir, root: PathBuf) -> Self {
    Self { _dir: dir, root }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }
}

/// Reads and commits files in a remote repository.
#[async_trait]
pub trait SourceCommitService: Send + Sync {
  /// Download the configured branch into a temporary checkout.
  async fn download_repo_archive(&self, options: &GitOptions) -> Result<RepoCheckout, GitError>;

  /// Commit `content` to the configured path and return the commit URL.
  async fn push_file_change(&self, message: &str, options: &GitOptions, content: &str) -> Result<String, GitError>;
}
