//! Registry manifest inspection and digest selection.

use serde::Deserialize;
use tracing::debug;

use crate::consts::{MANIFEST_LIST_MEDIA_TYPE, MANIFEST_MEDIA_TYPE, OCI_INDEX_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE};
use crate::process::{ProcessCommand, ProcessRunner};

use super::RegistryError;

/// A manifest descriptor returned by registry inspection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestDescriptor {
  pub media_type: String,
  pub digest: String,
  #[serde(default)]
  pub layers: Vec<String>,
}

impl ManifestDescriptor {
  fn is_list(&self) -> bool {
    self.media_type == MANIFEST_LIST_MEDIA_TYPE || self.media_type == OCI_INDEX_MEDIA_TYPE
  }

  fn is_manifest(&self) -> bool {
    self.media_type == MANIFEST_MEDIA_TYPE || self.media_type == OCI_MANIFEST_MEDIA_TYPE
  }
}

/// Which kinds of manifest the caller is willing to accept a digest for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestMediaType {
  Manifest,
  ManifestList,
  Any,
}

impl ManifestMediaType {
  fn accepts_list(self) -> bool {
    matches!(self, ManifestMediaType::ManifestList | ManifestMediaType::Any)
  }

  fn accepts_manifest(self) -> bool {
    matches!(self, ManifestMediaType::Manifest | ManifestMediaType::Any)
  }
}

/// Inspects image manifests in a registry.
pub trait ManifestInspector: Send + Sync {
  /// Return the raw manifest descriptors for a tag.
  ///
  /// In dry-run mode implementations return an empty list.
  fn inspect(&self, tag: &str, dry_run: bool) -> Result<Vec<ManifestDescriptor>, RegistryError>;
}

/// Resolve the digest sha for a tag.
///
/// When lists are acceptable the manifest-list descriptor wins. A missing
/// descriptor is an error unless running dry, or unless a list was merely
/// preferred and a single manifest can still be used.
pub fn get_manifest_digest_sha(
  inspector: &dyn ManifestInspector,
  media_type: ManifestMediaType,
  tag: &str,
  dry_run: bool,
) -> Result<Option<String>, RegistryError> {
  let manifests = inspector.inspect(tag, dry_run)?;

  if media_type.accepts_list() {
    let digest = manifests
      .iter()
      .find(|m| m.is_list())
      .map(|m| m.digest.clone())
      .filter(|d| !d.is_empty());

    if let Some(digest) = digest {
      return Ok(Some(digest));
    }

    if media_type == ManifestMediaType::ManifestList {
      if dry_run {
        return Ok(None);
      }
      return Err(RegistryError::DigestNotFound {
        tag: tag.to_string(),
        media_type: MANIFEST_LIST_MEDIA_TYPE.to_string(),
      });
    }
  }

  debug_assert!(media_type.accepts_manifest());

  let digest = manifests
    .iter()
    .find(|m| m.is_manifest())
    .map(|m| m.digest.clone())
    .filter(|d| !d.is_empty());

  match digest {
    Some(digest) => Ok(Some(digest)),
    None if dry_run => Ok(None),
    None => Err(RegistryError::DigestNotFound {
      tag: tag.to_string(),
      media_type: MANIFEST_MEDIA_TYPE.to_string(),
    }),
  }
}

/// Return the ordered layer digests of a concrete (single-manifest) tag.
pub fn get_image_layers(inspector: &dyn ManifestInspector, tag: &str, dry_run: bool) -> Result<Vec<String>, RegistryError> {
  let manifests = inspector.inspect(tag, dry_run)?;
  if dry_run && manifests.is_empty() {
    return Ok(Vec::new());
  }

  match manifests.as_slice() {
    [single] => Ok(single.layers.clone()),
    _ => Err(RegistryError::NotConcreteTag {
      tag: tag.to_string(),
      count: manifests.len(),
    }),
  }
}

/// [`ManifestInspector`] backed by `manifest-tool inspect --raw`.
pub struct ManifestToolCli<'a> {
  process: &'a dyn ProcessRunner,
}

impl<'a> ManifestToolCli<'a> {
  pub fn new(process: &'a dyn ProcessRunner) -> Self {
    Self { process }
  }
}

impl ManifestInspector for ManifestToolCli<'_> {
  fn inspect(&self, tag: &str, dry_run: bool) -> Result<Vec<ManifestDescriptor>, RegistryError> {
    let command = ProcessCommand::new("manifest-tool").args(["inspect", "--raw", tag]);
    let output = self.process.execute(&command, dry_run)?;

    match output {
      Some(output) => parse_inspect_output(tag, &output),
      None => Ok(Vec::new()),
    }
  }
}

/// Parse `manifest-tool --raw` output, which is either a single descriptor
/// object or an array of them.
pub fn parse_inspect_output(tag: &str, output: &str) -> Result<Vec<ManifestDescriptor>, RegistryError> {
  let trimmed = output.trim();
  debug!(tag, "parsing manifest inspection output");

  let parsed = if trimmed.starts_with('[') {
    serde_json::from_str::<Vec<ManifestDescriptor>>(trimmed)
  } else {
    serde_json::from_str::<ManifestDescriptor>(trimmed).map(|d| vec![d])
  };

  parsed.map_err(|source| RegistryError::Parse {
    tag: tag.to_string(),
    source,
  })
}
