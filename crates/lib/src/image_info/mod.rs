//! The image info record: what each build produced, per platform.

pub mod merge;
pub mod storage;
pub mod types;

use std::path::PathBuf;

use thiserror::Error;

pub use merge::{ImageInfoMergeOptions, find_manifest_image, merge, remove_out_of_date_content};
pub use types::{Component, ImageArtifactDetails, ImageData, ManifestData, PlatformData, RepoData};

/// Errors that can occur while handling image info.
#[derive(Debug, Error)]
pub enum ImageInfoError {
  #[error("failed to read '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse image info: {source}")]
  Parse {
    path: Option<PathBuf>,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize image info: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// Pruning removed every repo, which indicates a corrupt record or manifest.
  #[error("removing out-of-date content left the image info without any repos")]
  EmptyResult,

  #[error("no image info files found in '{0}'")]
  NoSourceFiles(PathBuf),
}
