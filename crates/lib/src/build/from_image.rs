//! Tag resolution for FROM images.
//!
//! A FROM image can be referenced three ways during a build:
//!
//! - the **pull tag**: where to pull an external image from, which is the
//!   mirror location when a source repo prefix is configured;
//! - the **local tag**: how the image is known to the local engine once it has
//!   been pulled or built;
//! - the **public tag**: the publicly available name, used when recording base
//!   image digests.

use crate::registry::reference::{is_in_registry, normalize_repo, trim_registry};

#[derive(Debug, Clone)]
pub struct FromImageResolver {
  /// Registry as written in the manifest (e.g. `mcr.microsoft.com`).
  pub model_registry: String,
  /// Effective registry (the override when one is given).
  pub registry: String,
  pub repo_prefix: Option<String>,
  pub source_repo_prefix: Option<String>,
}

impl FromImageResolver {
  pub fn pull_tag(&self, from_image: &str) -> String {
    self.tag(from_image, &self.model_registry)
  }

  pub fn local_tag(&self, from_image: &str) -> String {
    self.tag(from_image, &self.registry)
  }

  pub fn public_tag(&self, from_image: &str) -> String {
    let trimmed = self.trim_internally_owned(from_image);
    if trimmed == from_image {
      trimmed
    } else {
      format!("{}/{}", self.model_registry, trimmed)
    }
  }

  fn tag(&self, from_image: &str, registry: &str) -> String {
    let Some(source_repo_prefix) = &self.source_repo_prefix else {
      return from_image.to_string();
    };

    if is_in_registry(from_image, registry) || is_in_registry(from_image, &self.model_registry) {
      return from_image.to_string();
    }

    let source = self.trim_internally_owned(&normalize_repo(from_image));
    format!("{}/{}{}", self.registry, source_repo_prefix, source)
  }

  fn is_internally_owned(&self, image: &str) -> bool {
    is_in_registry(image, &self.registry) || is_in_registry(image, &self.model_registry)
  }

  /// Strip the registry and repo prefix from images in an internal registry.
  fn trim_internally_owned(&self, image: &str) -> String {
    if !self.is_internally_owned(image) {
      return image.to_string();
    }

    let mut trimmed = trim_registry(image);
    if let Some(prefix) = self.repo_prefix.as_deref().filter(|p| !p.is_empty()) {
      while let Some(rest) = trimmed.strip_prefix(prefix) {
        trimmed = rest;
      }
    }
    trimmed.to_string()
  }
}
