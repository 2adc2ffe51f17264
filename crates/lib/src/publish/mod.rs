//! Publishing image info to source control.
//!
//! The published file is the long-lived record of what has been built. A
//! build's fresh record is merged into it:
//!
//! 1. Load the fresh record and drop its run-only state
//! 2. Download the target branch and read the published file (if any)
//! 3. Prune the published record against the manifest, then merge the fresh
//!    record into it, replacing tags
//! 4. Commit the result, retrying transient failures, unless nothing changed

use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::consts::PUBLISH_COMMIT_MESSAGE;
use crate::git::{GitError, GitOptions, SourceCommitService};
use crate::image_info::{ImageInfoError, ImageInfoMergeOptions, merge, remove_out_of_date_content, storage};
use crate::manifest::Manifest;
use crate::retry::{RetryPolicy, retry};

#[derive(Debug, Clone)]
pub struct PublishOptions {
  /// The fresh record produced by a build.
  pub image_info_path: PathBuf,
  pub git: GitOptions,
  pub dry_run: bool,
  pub retry: RetryPolicy,
}

/// What publishing did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
  /// The published file already has the merged content.
  NoChanges,
  /// Dry run; `content` is what would have been committed.
  DryRun { content: String },
  Updated { commit_url: String },
}

#[derive(Debug, Error)]
pub enum PublishError {
  #[error(transparent)]
  ImageInfo(#[from] ImageInfoError),

  #[error(transparent)]
  Git(#[from] GitError),

  #[error("failed to read published image info '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Merge the fresh record into the published one and commit the result.
pub async fn publish_image_info(
  manifest: &Manifest,
  options: &PublishOptions,
  service: &dyn SourceCommitService,
) -> Result<PublishOutcome, PublishError> {
  let mut fresh = storage::load(&options.image_info_path)?;
  fresh.strip_internal_state();

  let (original, content) = {
    let checkout = service.download_repo_archive(&options.git).await?;
    let published_path = checkout.root().join(&options.git.path);
    debug!(path = %published_path.display(), "reading published image info");

    let original = match tokio::fs::read_to_string(&published_path).await {
      Ok(content) => Some(content),
      Err(e) if e.kind() == ErrorKind::NotFound => None,
      Err(source) => {
        return Err(PublishError::Read {
          path: published_path,
          source,
        });
      }
    };

    let result = match &original {
      None => {
        info!(path = %options.git.path, "no published image info, publishing the fresh record as is");
        fresh
      }
      Some(content) => {
        let mut published = storage::from_json(content)?;
        remove_out_of_date_content(&mut published, manifest)?;
        merge(
          &fresh,
          &mut published,
          &ImageInfoMergeOptions {
            replace_tags: true,
            manifest: Some(manifest),
          },
        );
        published
      }
    };

    let mut content = storage::to_json(&result)?;
    content.push('\n');
    (original, content)
  };

  if original.as_deref() == Some(content.as_str()) {
    info!("published image info is already up to date");
    return Ok(PublishOutcome::NoChanges);
  }

  info!(blob = %options.git.blob_url(), "image info changed");
  if options.dry_run {
    return Ok(PublishOutcome::DryRun { content });
  }

  let commit_url = retry(options.retry, "commit image info", || {
    service.push_file_change(PUBLISH_COMMIT_MESSAGE, &options.git, &content)
  })
  .await?;

  info!(commit = %commit_url, "image info published");
  Ok(PublishOutcome::Updated { commit_url })
}
