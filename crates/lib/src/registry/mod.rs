//! Registry-facing helpers: image references, manifest inspection and the
//! digest cache.

pub mod digest_cache;
pub mod inspector;
pub mod reference;

use thiserror::Error;

use crate::process::ProcessError;

pub use digest_cache::DigestCache;
pub use inspector::{
  ManifestDescriptor, ManifestInspector, ManifestMediaType, ManifestToolCli, get_image_layers, get_manifest_digest_sha,
};

/// Errors that can occur while inspecting a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// No descriptor of the requested media type was found.
  #[error("unable to find digest for tag '{tag}' with media type '{media_type}'")]
  DigestNotFound { tag: String, media_type: String },

  /// A tag expected to reference a single manifest referenced several (or none).
  #[error("'{tag}' is expected to be a concrete tag with 1 manifest. It has '{count}' manifests")]
  NotConcreteTag { tag: String, count: usize },

  /// Inspection output could not be parsed.
  #[error("failed to parse manifest inspection output for '{tag}': {source}")]
  Parse {
    tag: String,
    #[source]
    source: serde_json::Error,
  },

  /// The inspection tool failed.
  #[error(transparent)]
  Process(#[from] ProcessError),
}
