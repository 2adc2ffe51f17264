//! Build cache decisions.
//!
//! A platform is not rebuilt when either an equivalent platform was already
//! handled earlier in the run, or the previously published record shows an
//! image built from the same Dockerfile commit on top of the current base
//! image.

use std::collections::HashSet;

use dashmap::DashMap;

use crate::image_info::{Component, PlatformData};
use crate::manifest::PlatformInfo;
use crate::registry::reference::get_digest_sha;

/// Key identifying build-equivalent platforms: the Dockerfile path plus the
/// sorted build args.
pub fn build_cache_key(platform: &PlatformInfo) -> String {
  let args: Vec<String> = platform
    .build_args
    .iter()
    .map(|(key, value)| format!("{}={}", key, value))
    .collect();
  format!("{}-{}", platform.dockerfile_path_relative_to_manifest, args.join("-"))
}

/// An image that later equivalent platforms reuse instead of building.
#[derive(Debug, Clone)]
pub struct CachedPlatform {
  /// Reference the image can be tagged from.
  pub source: String,
  /// `source` is a digest reference (`repo@sha256:...`) rather than a local tag.
  pub source_is_digest: bool,
  pub base_image_digest: Option<String>,
  pub components: Vec<Component>,
  pub layers: Vec<String>,
}

impl CachedPlatform {
  /// Entry for an image reused from the published record.
  pub fn from_published(data: &PlatformData) -> Self {
    Self {
      source: data.digest.clone(),
      source_is_digest: true,
      base_image_digest: data.base_image_digest.clone(),
      components: data.components.clone(),
      layers: data.layers.clone(),
    }
  }

  /// Entry for an image built in this run, known locally by `tag`.
  pub fn from_local_build(tag: &str, data: &PlatformData) -> Self {
    Self {
      source: tag.to_string(),
      source_is_digest: false,
      base_image_digest: data.base_image_digest.clone(),
      components: data.components.clone(),
      layers: data.layers.clone(),
    }
  }

  /// Carry the metadata that would otherwise be recomputed.
  pub fn copy_into(&self, data: &mut PlatformData) {
    data.base_image_digest = self.base_image_digest.clone();
    data.components = self.components.clone();
    data.layers = self.layers.clone();
  }
}

/// Platforms handled so far in a run.
///
/// Entries are keyed by build cache key and target platform: one Dockerfile
/// built for two architectures yields two different images.
#[derive(Debug, Default)]
pub struct BuildCache {
  platforms: DashMap<(String, String), CachedPlatform>,
}

impl BuildCache {
  pub fn get(&self, key: &str, platform: &PlatformInfo) -> Option<CachedPlatform> {
    self
      .platforms
      .get(&(key.to_string(), platform.platform_label()))
      .map(|entry| entry.value().clone())
  }

  pub fn insert(&self, key: String, platform: &PlatformInfo, cached: CachedPlatform) {
    self.platforms.insert((key, platform.platform_label()), cached);
  }

  pub fn len(&self) -> usize {
    self.platforms.len()
  }

  pub fn is_empty(&self) -> bool {
    self.platforms.is_empty()
  }
}

/// Whether every push tag of the platform is already listed in the published record.
pub fn has_all_tags_published(platform: &PlatformInfo, published: &PlatformData) -> bool {
  let push_tags: HashSet<&str> = platform.push_tags().map(|t| t.name.as_str()).collect();
  let published_tags: HashSet<&str> = published.simple_tags.iter().map(String::as_str).collect();
  push_tags == published_tags
}

/// Compare base image digests by sha only; the repo part may name a mirror.
pub fn base_digest_matches(published: Option<&str>, current: Option<&str>) -> bool {
  match (published, current) {
    (Some(published), Some(current)) => get_digest_sha(published).eq_ignore_ascii_case(get_digest_sha(current)),
    _ => false,
  }
}

pub fn commit_url_matches(published: &str, current: &str) -> bool {
  !published.is_empty() && published.eq_ignore_ascii_case(current)
}
