//! Image info record types.
//!
//! The record mirrors the manifest tree (repo, image, platform) and carries
//! what a build produced for each platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::manifest::{PlatformId, PlatformInfo};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageArtifactDetails {
  #[serde(default)]
  pub repos: Vec<RepoData>,
}

impl ImageArtifactDetails {
  /// Clear flags that only have meaning within a single build run.
  pub fn strip_internal_state(&mut self) {
    for platform in self.platforms_mut() {
      platform.is_unchanged = false;
    }
  }

  pub fn platforms(&self) -> impl Iterator<Item = &PlatformData> {
    self
      .repos
      .iter()
      .flat_map(|r| r.images.iter())
      .flat_map(|i| i.platforms.iter())
  }

  pub fn platforms_mut(&mut self) -> impl Iterator<Item = &mut PlatformData> {
    self
      .repos
      .iter_mut()
      .flat_map(|r| r.images.iter_mut())
      .flat_map(|i| i.platforms.iter_mut())
  }

  pub fn find_repo(&self, name: &str) -> Option<&RepoData> {
    self.repos.iter().find(|r| r.repo == name)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoData {
  /// Registry-unqualified repo name.
  pub repo: String,
  #[serde(default)]
  pub images: Vec<ImageData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub product_version: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub manifest: Option<ManifestData>,
  #[serde(default)]
  pub platforms: Vec<PlatformData>,
}

impl ImageData {
  /// Sorted shared tags; an image without a manifest block has none.
  pub fn shared_tags(&self) -> Vec<String> {
    let mut tags = self.manifest.as_ref().map(|m| m.shared_tags.clone()).unwrap_or_default();
    tags.sort();
    tags
  }

  pub fn find_platform(&self, id: &PlatformId) -> Option<&PlatformData> {
    self.platforms.iter().find(|p| &p.id() == id)
  }
}

/// Shared-tag block of an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestData {
  #[serde(default)]
  pub shared_tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformData {
  /// Dockerfile path relative to the manifest.
  pub dockerfile: String,
  #[serde(default)]
  pub simple_tags: Vec<String>,
  #[serde(default)]
  pub digest: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub base_image_digest: Option<String>,
  pub os_type: String,
  pub os_version: String,
  pub architecture: String,
  #[serde(default, alias = "createdDate", skip_serializing_if = "Option::is_none")]
  pub created: Option<DateTime<Utc>>,
  #[serde(default)]
  pub commit_url: String,
  #[serde(default)]
  pub layers: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub components: Vec<Component>,
  /// Set when a build reused an already published image. Never published.
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub is_unchanged: bool,
}

impl PlatformData {
  /// Empty record for a manifest platform.
  pub fn from_platform_info(platform: &PlatformInfo) -> Self {
    Self {
      dockerfile: platform.dockerfile_path_relative_to_manifest.clone(),
      os_type: platform.os.display_name().to_string(),
      os_version: platform.os_version.clone(),
      architecture: platform.architecture.display_name().to_string(),
      ..Default::default()
    }
  }

  pub fn id(&self) -> PlatformId {
    PlatformId::new(&self.dockerfile, &self.architecture, &self.os_type, &self.os_version)
  }
}

/// An installed package reported by the package query script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
  #[serde(rename = "type")]
  pub kind: String,
  pub name: String,
  pub version: String,
}
