//! The manifest: the declarative description of repos, images and platforms.
//!
//! [`types`] holds the serialized model; [`info`] resolves it into the view
//! used by the build and publish commands.

pub mod dockerfile;
pub mod info;
pub mod types;

use std::path::PathBuf;

use thiserror::Error;

pub use info::{ImageInfo, Manifest, ManifestFilter, ManifestOptions, PlatformId, PlatformInfo, RepoInfo, TagInfo};
pub use types::{Architecture, OsType};

/// Errors that can occur while loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse manifest '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("manifest does not specify a registry")]
  MissingRegistry,

  #[error("failed to read Dockerfile '{path}': {source}")]
  DockerfileRead {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// A platform is listed before the platform producing its base image.
  #[error("platform '{platform}' depends on '{tag}' which is produced by '{dependency}' listed after it")]
  OutOfOrder {
    platform: String,
    dependency: String,
    tag: String,
  },
}
