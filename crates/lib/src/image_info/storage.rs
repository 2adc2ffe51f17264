//! Reading and writing image info files.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::ImageInfoError;
use super::merge::{ImageInfoMergeOptions, merge};
use super::types::ImageArtifactDetails;
use crate::manifest::Manifest;

/// Parse image info from JSON.
pub fn from_json(content: &str) -> Result<ImageArtifactDetails, ImageInfoError> {
  serde_json::from_str(content).map_err(|source| ImageInfoError::Parse { path: None, source })
}

/// Load an image info file.
pub fn load(path: &Path) -> Result<ImageArtifactDetails, ImageInfoError> {
  let content = fs::read_to_string(path).map_err(|source| ImageInfoError::Read {
    path: path.to_path_buf(),
    source,
  })?;

  serde_json::from_str(&content).map_err(|source| ImageInfoError::Parse {
    path: Some(path.to_path_buf()),
    source,
  })
}

/// Serialize to indented JSON, without a trailing newline.
pub fn to_json(details: &ImageArtifactDetails) -> Result<String, ImageInfoError> {
  serde_json::to_string_pretty(details).map_err(ImageInfoError::Serialize)
}

/// Write an image info file.
///
/// The content is written to a sibling temp file and renamed into place.
pub fn save(path: &Path, details: &ImageArtifactDetails) -> Result<(), ImageInfoError> {
  let mut content = to_json(details)?;
  content.push('\n');

  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent).map_err(|source| ImageInfoError::Write {
      path: parent.to_path_buf(),
      source,
    })?;
  }

  let mut temp_path = path.as_os_str().to_owned();
  temp_path.push(".tmp");
  let temp_path = PathBuf::from(temp_path);

  fs::write(&temp_path, &content).map_err(|source| ImageInfoError::Write {
    path: temp_path.clone(),
    source,
  })?;
  fs::rename(&temp_path, path).map_err(|source| ImageInfoError::Write {
    path: path.to_path_buf(),
    source,
  })?;

  debug!(path = %path.display(), "wrote image info");
  Ok(())
}

/// Merge every `*.json` file in a directory into a single record.
///
/// Files are merged in file-name order and tags are unioned.
pub fn merge_directory(dir: &Path, manifest: &Manifest) -> Result<ImageArtifactDetails, ImageInfoError> {
  let entries = fs::read_dir(dir).map_err(|source| ImageInfoError::Read {
    path: dir.to_path_buf(),
    source,
  })?;

  let mut files = Vec::new();
  for entry in entries {
    let path = entry
      .map_err(|source| ImageInfoError::Read {
        path: dir.to_path_buf(),
        source,
      })?
      .path();
    if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
      files.push(path);
    }
  }
  files.sort();

  if files.is_empty() {
    return Err(ImageInfoError::NoSourceFiles(dir.to_path_buf()));
  }

  let options = ImageInfoMergeOptions {
    replace_tags: false,
    manifest: Some(manifest),
  };

  let mut target = ImageArtifactDetails::default();
  for file in &files {
    info!(path = %file.display(), "merging image info file");
    let source = load(file)?;
    merge(&source, &mut target, &options);
  }

  Ok(target)
}
