//! Container engine abstraction.
//!
//! The orchestrator never talks to a container engine directly; it goes
//! through [`ImageEngine`]. [`DockerCli`] drives the `docker` CLI and
//! [`CachedImageEngine`] memoizes the read-only queries.

mod cache;
mod docker;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::manifest::Architecture;
use crate::process::ProcessError;
use crate::registry::RegistryError;
use crate::retry::Transient;

pub use cache::CachedImageEngine;
pub use docker::DockerCli;

/// Errors that can occur while driving the container engine.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Process(#[from] ProcessError),

  #[error(transparent)]
  Registry(#[from] RegistryError),

  /// The engine returned output that could not be interpreted.
  #[error("unexpected {what} for '{tag}': '{output}'")]
  InvalidOutput {
    tag: String,
    what: &'static str,
    output: String,
  },
}

impl Transient for EngineError {
  fn is_transient(&self) -> bool {
    match self {
      EngineError::Process(e) => e.is_transient(),
      _ => false,
    }
  }
}

/// Everything needed to build one image.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
  pub dockerfile: &'a Path,
  pub context: &'a Path,
  /// Target platform label (`linux/arm64/v8`).
  pub platform: &'a str,
  pub tags: &'a [String],
  pub build_args: &'a BTreeMap<String, String>,
  /// Retry the build if it fails.
  pub retry: bool,
}

/// Architecture and variant of an image as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArch {
  pub architecture: Architecture,
  pub variant: Option<String>,
}

/// Container engine operations used by the build.
pub trait ImageEngine: Send + Sync {
  /// Build an image and return the engine's output (`None` in dry-run mode).
  fn build(&self, request: &BuildRequest<'_>, dry_run: bool) -> Result<Option<String>, EngineError>;

  /// Pull a tag or digest reference, optionally for a specific platform.
  fn pull(&self, image: &str, platform: Option<&str>, dry_run: bool) -> Result<(), EngineError>;

  fn push(&self, tag: &str, dry_run: bool) -> Result<(), EngineError>;

  /// Tag `source` (a tag or digest reference) as `tag`.
  fn create_tag(&self, source: &str, tag: &str, dry_run: bool) -> Result<(), EngineError>;

  /// Creation time of a local image. Dry runs report the Unix epoch.
  fn get_created_date(&self, tag: &str, dry_run: bool) -> Result<DateTime<Utc>, EngineError>;

  /// Architecture of a local image, or `None` in dry-run mode.
  fn get_image_arch(&self, tag: &str, dry_run: bool) -> Result<Option<ImageArch>, EngineError>;

  /// Ordered layer digests of a pushed image.
  fn get_image_manifest_layers(&self, tag: &str, dry_run: bool) -> Result<Vec<String>, EngineError>;
}
