//! Memoizing wrapper around an [`ImageEngine`].

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::{BuildRequest, EngineError, ImageArch, ImageEngine};

/// Caches the read-only queries of an inner engine per tag.
///
/// Mutating operations are passed through untouched.
pub struct CachedImageEngine<'a> {
  inner: &'a dyn ImageEngine,
  created: DashMap<String, DateTime<Utc>>,
  arch: DashMap<String, Option<ImageArch>>,
  layers: DashMap<String, Vec<String>>,
}

impl<'a> CachedImageEngine<'a> {
  pub fn new(inner: &'a dyn ImageEngine) -> Self {
    Self {
      inner,
      created: DashMap::new(),
      arch: DashMap::new(),
      layers: DashMap::new(),
    }
  }
}

impl ImageEngine for CachedImageEngine<'_> {
  fn build(&self, request: &BuildRequest<'_>, dry_run: bool) -> Result<Option<String>, EngineError> {
    self.inner.build(request, dry_run)
  }

  fn pull(&self, image: &str, platform: Option<&str>, dry_run: bool) -> Result<(), EngineError> {
    self.inner.pull(image, platform, dry_run)
  }

  fn push(&self, tag: &str, dry_run: bool) -> Result<(), EngineError> {
    self.inner.push(tag, dry_run)
  }

  fn create_tag(&self, source: &str, tag: &str, dry_run: bool) -> Result<(), EngineError> {
    self.inner.create_tag(source, tag, dry_run)
  }

  fn get_created_date(&self, tag: &str, dry_run: bool) -> Result<DateTime<Utc>, EngineError> {
    if let Some(created) = self.created.get(tag) {
      debug!(tag, "created date cache hit");
      return Ok(*created);
    }
    let created = self.inner.get_created_date(tag, dry_run)?;
    self.created.insert(tag.to_string(), created);
    Ok(created)
  }

  fn get_image_arch(&self, tag: &str, dry_run: bool) -> Result<Option<ImageArch>, EngineError> {
    if let Some(arch) = self.arch.get(tag) {
      return Ok(arch.clone());
    }
    let arch = self.inner.get_image_arch(tag, dry_run)?;
    self.arch.insert(tag.to_string(), arch.clone());
    Ok(arch)
  }

  fn get_image_manifest_layers(&self, tag: &str, dry_run: bool) -> Result<Vec<String>, EngineError> {
    if let Some(layers) = self.layers.get(tag) {
      return Ok(layers.clone());
    }
    let layers = self.inner.get_image_manifest_layers(tag, dry_run)?;
    self.layers.insert(tag.to_string(), layers.clone());
    Ok(layers)
  }
}
