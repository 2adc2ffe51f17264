mod build;
mod merge;
mod publish;

use std::path::PathBuf;

use clap::Args;

use imagebuilder_lib::manifest::{Architecture, ManifestFilter, ManifestOptions, OsType};

pub use build::{BuildArgs, cmd_build};
pub use merge::{MergeArgs, cmd_merge_image_info};
pub use publish::{PublishArgs, cmd_publish_image_info};

/// Options for locating and filtering the manifest, shared by every command.
#[derive(Debug, Args)]
pub struct ManifestArgs {
  /// Path to the manifest file
  #[arg(long, default_value = "manifest.json")]
  pub manifest: PathBuf,

  /// Registry to use instead of the manifest's own
  #[arg(long)]
  pub registry_override: Option<String>,

  /// Prefix prepended to every repo name
  #[arg(long)]
  pub repo_prefix: Option<String>,

  /// Only process platforms of this architecture
  #[arg(long)]
  pub architecture: Option<Architecture>,

  /// Only process platforms of this OS type
  #[arg(long)]
  pub os_type: Option<OsType>,

  /// Only process platforms of these OS versions
  #[arg(long = "os-version")]
  pub os_versions: Vec<String>,

  /// Only process Dockerfiles under these paths (relative to the manifest)
  #[arg(long = "path")]
  pub paths: Vec<String>,
}

impl ManifestArgs {
  pub fn to_options(&self) -> ManifestOptions {
    ManifestOptions {
      path: self.manifest.clone(),
      registry_override: self.registry_override.clone(),
      repo_prefix: self.repo_prefix.clone(),
      filter: ManifestFilter {
        architecture: self.architecture,
        os_type: self.os_type,
        os_versions: self.os_versions.clone(),
        paths: self.paths.clone(),
      },
    }
  }
}
