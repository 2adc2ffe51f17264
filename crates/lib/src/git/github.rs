//! [`SourceCommitService`] backed by the GitHub REST API.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::read::GzDecoder;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tar::Archive;
use tempfile::TempDir;
use tracing::{debug, info};

use super::{GitError, GitOptions, RepoCheckout, SourceCommitService};

const DEFAULT_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("imagebuilder/", env!("CARGO_PKG_VERSION"));

pub struct GitHubCommitService {
  client: reqwest::Client,
  api_url: String,
}

impl Default for GitHubCommitService {
  fn default() -> Self {
    Self::new(DEFAULT_API_URL)
  }
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
  sha: String,
}

#[derive(Debug, Serialize)]
struct Committer<'a> {
  name: &'a str,
  email: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateContentsRequest<'a> {
  message: &'a str,
  content: String,
  branch: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  sha: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  committer: Option<Committer<'a>>,
}

#[derive(Debug, Deserialize)]
struct UpdateContentsResponse {
  commit: CommitResponse,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
  sha: String,
}

impl GitHubCommitService {
  /// Create a service for the given API base URL.
  pub fn new(api_url: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      api_url: api_url.into().trim_end_matches('/').to_string(),
    }
  }

  fn request(&self, method: Method, url: &str, options: &GitOptions) -> RequestBuilder {
    let builder = self
      .client
      .request(method, url)
      .header(reqwest::header::USER_AGENT, USER_AGENT)
      .header(reqwest::header::ACCEPT, "application/vnd.github+json");

    match options.resolve_token() {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    }
  }

  fn contents_url(&self, options: &GitOptions) -> String {
    format!(
      "{}/repos/{}/{}/contents/{}",
      self.api_url,
      options.owner,
      options.repo,
      options.path.trim_start_matches('/')
    )
  }

  async fn send(&self, builder: RequestBuilder, url: &str) -> Result<reqwest::Response, GitError> {
    builder.send().await.map_err(|source| GitError::Http {
      url: url.to_string(),
      source,
    })
  }

  async fn error_for_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response, GitError> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GitError::Status {
      url: url.to_string(),
      status: status.as_u16(),
      body,
    })
  }

  async fn current_file_sha(&self, options: &GitOptions) -> Result<Option<String>, GitError> {
    let url = self.contents_url(options);
    let builder = self
      .request(Method::GET, &url, options)
      .query(&[("ref", options.branch.as_str())]);
    let response = self.send(builder, &url).await?;

    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }

    let response = Self::error_for_status(response, &url).await?;
    let contents: ContentsResponse = response.json().await.map_err(|source| GitError::Http {
      url: url.clone(),
      source,
    })?;
    Ok(Some(contents.sha))
  }
}

#[async_trait]
impl SourceCommitService for GitHubCommitService {
  async fn download_repo_archive(&self, options: &GitOptions) -> Result<RepoCheckout, GitError> {
    let url = format!(
      "{}/repos/{}/{}/tarball/{}",
      self.api_url, options.owner, options.repo, options.branch
    );
    info!(url = %url, "downloading repository archive");

    let response = self.send(self.request(Method::GET, &url, options), &url).await?;
    let response = Self::error_for_status(response, &url).await?;
    let bytes = response.bytes().await.map_err(|source| GitError::Http {
      url: url.clone(),
      source,
    })?;

    let dir = TempDir::new().map_err(GitError::Extract)?;
    let dest = dir.path().to_path_buf();
    let root = tokio::task::spawn_blocking(move || extract_tarball(&bytes, &dest))
      .await
      .map_err(|e| GitError::Extract(std::io::Error::other(e)))?
      .map_err(GitError::Extract)?;

    debug!(root = %root.display(), "repository extracted");
    Ok(RepoCheckout::new(dir, root))
  }

  async fn push_file_change(&self, message: &str, options: &GitOptions, content: &str) -> Result<String, GitError> {
    let url = self.contents_url(options);
    let sha = self.current_file_sha(options).await?;

    let committer = match (&options.username, &options.email) {
      (Some(name), Some(email)) => Some(Committer { name, email }),
      _ => None,
    };
    let body = UpdateContentsRequest {
      message,
      content: BASE64.encode(content),
      branch: &options.branch,
      sha,
      committer,
    };

    info!(path = %options.path, branch = %options.branch, "committing file");
    let response = self
      .send(self.request(Method::PUT, &url, options).json(&body), &url)
      .await?;
    let response = Self::error_for_status(response, &url).await?;
    let updated: UpdateContentsResponse = response.json().await.map_err(|source| GitError::Http {
      url: url.clone(),
      source,
    })?;

    if updated.commit.sha.is_empty() {
      return Err(GitError::InvalidResponse {
        url,
        message: "commit has no sha".to_string(),
      });
    }

    Ok(options.commit_url(&updated.commit.sha))
  }
}

/// Unpack a gzipped tarball and return the directory holding the repository.
///
/// GitHub wraps the tree in a single `{owner}-{repo}-{sha}` directory; that
/// directory is returned when present.
fn extract_tarball(bytes: &[u8], dest: &Path) -> std::io::Result<PathBuf> {
  let mut archive = Archive::new(GzDecoder::new(Cursor::new(bytes)));
  archive.unpack(dest)?;

  let entries: Vec<PathBuf> = std::fs::read_dir(dest)?
    .filter_map(|e| e.ok().map(|e| e.path()))
    .collect();

  match entries.as_slice() {
    [single] if single.is_dir() => Ok(single.clone()),
    _ => Ok(dest.to_path_buf()),
  }
}
