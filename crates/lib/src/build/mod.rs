//! The build orchestrator.
//!
//! A build run walks the filtered manifest in dependency order and, for every
//! platform, either reuses an existing image or builds a new one:
//!
//! 1. Pull the external base images (skipped with `skip_pulling`)
//! 2. Build or reuse every platform, recording an image info entry for each
//! 3. Push the non-local tags of everything processed (when pushing is enabled)
//! 4. Populate the image info record and write it (when an output path is set)
//!
//! Any error aborts the run before the image info file is written.
//!
//! # Submodules
//!
//! - [`cache`] - Build cache keys and reuse decisions
//! - [`dockerfile`] - FROM rewriting and build hooks
//! - [`from_image`] - Pull, local and public tags of FROM images
//! - [`options`] - Validated build options

pub mod cache;
pub mod dockerfile;
pub mod from_image;
mod image_info;
pub mod options;
mod orchestrator;

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::{EngineError, ImageEngine};
use crate::git::{GitError, GitService};
use crate::image_info::{ImageArtifactDetails, ImageInfoError};
use crate::manifest::Manifest;
use crate::process::{ProcessError, ProcessRunner};
use crate::registry::{ManifestInspector, RegistryError};

pub use from_image::FromImageResolver;
pub use options::{BuildOptions, parse_build_args};

/// Errors that abort a build run.
#[derive(Debug, Error)]
pub enum BuildError {
  /// Invalid or missing options.
  #[error("invalid build options: {0}")]
  Config(String),

  #[error("I/O error on '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("build hook '{name}' failed: {source}")]
  Hook {
    name: String,
    #[source]
    source: ProcessError,
  },

  #[error(transparent)]
  Engine(#[from] EngineError),

  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error(transparent)]
  Git(#[from] GitError),

  #[error(transparent)]
  ImageInfo(#[from] ImageInfoError),

  #[error("failed to query installed packages: {0}")]
  Process(#[from] ProcessError),

  /// The engine pulled an image while building, so the pre-build pull missed it.
  #[error(
    "building '{dockerfile}' pulled a base image; all pulls must happen before the build, so the manifest or its \
     FROM images are misconfigured"
  )]
  ImplicitPull { dockerfile: String },

  #[error("final stage base images were not pulled: {}", .0.join(", "))]
  MissingPulledTags(Vec<String>),

  #[error(
    "platform '{dockerfile}' ({expected}) is not compatible with its base image '{base_image}' ({actual})"
  )]
  ArchitectureMismatch {
    dockerfile: String,
    base_image: String,
    expected: String,
    actual: String,
  },

  #[error("unable to retrieve digest for Dockerfile '{dockerfile}'")]
  DigestNotFound { dockerfile: String },

  /// Two tags of one platform resolved to different digests.
  #[error("tag '{tag}' was pushed with digest '{queried}', but the image was recorded with '{recorded}'")]
  DigestMismatch {
    tag: String,
    recorded: String,
    queried: String,
  },

  #[error("tag '{tag}' was created at {queried}, but the image was recorded as created at {recorded}")]
  CreatedMismatch {
    tag: String,
    recorded: String,
    queried: String,
  },

  #[error("no platform produced base image '{tag}'; platforms are likely not ordered according to dependency")]
  BasePlatformNotFound { tag: String },

  #[error("digest of base platform '{platform}' has not been calculated yet")]
  BaseDigestNotComputed { platform: String },

  #[error("unexpected installed packages output line '{line}'")]
  InvalidComponent { line: String },

  /// A platform without push tags has no tagged duplicate to copy from.
  #[error("platform '{platform}' has no push tags and no matching platform with push tags")]
  NoMatchingPlatform { platform: String },

  #[error("platform '{platform}' matches several tagged platforms with different digests: {}", .digests.join(", "))]
  AmbiguousMatchingPlatform { platform: String, digests: Vec<String> },
}

/// Collaborators a build run talks to.
#[derive(Clone, Copy)]
pub struct BuildServices<'a> {
  pub engine: &'a dyn ImageEngine,
  pub inspector: &'a dyn ManifestInspector,
  pub git: &'a dyn GitService,
  pub process: &'a dyn ProcessRunner,
}

/// Outcome of a build run.
#[derive(Debug)]
pub struct BuildSummary {
  /// Every tag processed, in processing order.
  pub processed_tags: Vec<String>,
  /// Distinct `{repo}@{sha}` references of the images this run produced.
  ///
  /// Platforms reused from a previously published image are left out; ones
  /// tagged from an image built earlier in the same run are included.
  pub built_digests: Vec<String>,
  /// The populated record; `None` unless an image info output path was set.
  pub image_info: Option<ImageArtifactDetails>,
}

impl BuildSummary {
  /// Pipeline command that publishes the built digests, when an output variable is configured.
  pub fn output_variable_command(&self, options: &BuildOptions) -> Option<String> {
    options
      .output_variable
      .as_deref()
      .map(|name| format_output_variable(name, &self.built_digests.join(",")))
  }
}

/// `##vso[task.setvariable variable={name}]{value}`
pub fn format_output_variable(name: &str, value: &str) -> String {
  format!("##vso[task.setvariable variable={}]{}", name, value)
}

/// Run a build over the filtered platforms of `manifest`.
pub fn build(manifest: &Manifest, options: &BuildOptions, services: BuildServices<'_>) -> Result<BuildSummary, BuildError> {
  options.validate()?;
  orchestrator::Orchestrator::new(manifest, options, services).run()
}
