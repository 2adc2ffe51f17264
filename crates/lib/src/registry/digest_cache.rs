//! Memoized registry digest lookups.

use dashmap::DashMap;
use tracing::debug;

use super::RegistryError;
use super::inspector::{ManifestInspector, ManifestMediaType, get_manifest_digest_sha};
use super::reference::{get_digest_string, get_repo};

/// Caches the digest of each fully qualified tag for the duration of a run.
///
/// A lookup that found nothing is cached too, so a missing tag is inspected
/// at most once. Safe to share across the parallel sections of a build.
pub struct DigestCache<'a> {
  inspector: &'a dyn ManifestInspector,
  digests: DashMap<String, Option<String>>,
}

impl<'a> DigestCache<'a> {
  pub fn new(inspector: &'a dyn ManifestInspector) -> Self {
    Self {
      inspector,
      digests: DashMap::new(),
    }
  }

  /// Get the digest (`repo@sha`) of a tag, inspecting the registry on a miss.
  pub fn get_digest(&self, tag: &str, dry_run: bool) -> Result<Option<String>, RegistryError> {
    if let Some(cached) = self.digests.get(tag) {
      debug!(tag, "digest cache hit");
      return Ok(cached.value().clone());
    }

    debug!(tag, "digest cache miss");
    let digest = get_manifest_digest_sha(self.inspector, ManifestMediaType::Any, tag, dry_run)?
      .map(|sha| get_digest_string(get_repo(tag), &sha));

    self.digests.insert(tag.to_string(), digest.clone());
    Ok(digest)
  }

  /// Overwrite the digest recorded for a tag.
  pub fn add_digest(&self, tag: &str, digest: &str) {
    self.digests.insert(tag.to_string(), Some(digest.to_string()));
  }

  pub fn len(&self) -> usize {
    self.digests.len()
  }

  pub fn is_empty(&self) -> bool {
    self.digests.is_empty()
  }
}
