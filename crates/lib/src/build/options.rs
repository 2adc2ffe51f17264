//! Build command options.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::BuildError;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
  pub dry_run: bool,
  /// Always build, ignoring prior image info and in-run duplicates.
  pub no_cache: bool,
  /// Retry failed builds.
  pub retry: bool,
  pub skip_pulling: bool,
  /// Skip checking that a platform's architecture matches its base image.
  pub skip_platform_check: bool,
  pub push: bool,
  /// Pipeline variable that receives the digests of the images built.
  pub output_variable: Option<String>,
  /// Previously published image info, used for cache decisions.
  pub image_info_source_path: Option<PathBuf>,
  pub image_info_output_path: Option<PathBuf>,
  /// Base URL of the repository holding the Dockerfiles, for commit URLs.
  pub source_repo_url: Option<String>,
  /// Prefix of the repos images are built into.
  pub repo_prefix: Option<String>,
  /// Prefix of the repos external base images are mirrored into.
  pub source_repo_prefix: Option<String>,
  /// Build args applied to every platform; manifest build args win.
  pub build_args: BTreeMap<String, String>,
  /// Script that lists the packages installed in an image.
  pub installed_packages_script: Option<PathBuf>,
}

impl BuildOptions {
  /// Check option combinations before any work starts.
  pub fn validate(&self) -> Result<(), BuildError> {
    if self.image_info_output_path.is_some() && self.source_repo_url.as_deref().is_none_or(str::is_empty) {
      return Err(BuildError::Config(
        "source repo URL must be provided when outputting to an image info file".to_string(),
      ));
    }

    if self
      .output_variable
      .as_deref()
      .is_some_and(|name| name.is_empty() || name.contains(char::is_whitespace))
    {
      return Err(BuildError::Config(
        "output variable name must be non-empty and contain no whitespace".to_string(),
      ));
    }

    Ok(())
  }
}

/// Parse `key=value` build args.
pub fn parse_build_args<I, S>(args: I) -> Result<BTreeMap<String, String>, BuildError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  args
    .into_iter()
    .map(|arg| {
      let arg = arg.as_ref();
      match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(BuildError::Config(format!("build arg '{}' must be in the form key=value", arg))),
      }
    })
    .collect()
}
