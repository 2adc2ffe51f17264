//! Per-build Dockerfile preparation and build hooks.

use std::fs;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use tracing::{debug, info, warn};

use super::BuildError;
use crate::consts::{HOOKS_DIR, SCRATCH_DOCKERFILE_SUFFIX};
use crate::manifest::{Manifest, PlatformInfo};
use crate::process::{ProcessCommand, ProcessRunner};
use crate::registry::reference::{get_repo, replace_repo};

/// The Dockerfile handed to the engine for one build.
///
/// When FROM lines had to be rewritten this is a scratch copy next to the
/// original, removed again on drop.
#[derive(Debug)]
pub struct PreparedDockerfile {
  path: PathBuf,
  scratch: bool,
}

impl PreparedDockerfile {
  /// Rewrite FROM references to internal repos with their qualified names.
  pub fn prepare(platform: &PlatformInfo, manifest: &Manifest) -> Result<Self, BuildError> {
    if platform.overridden_from_images.is_empty() {
      return Ok(Self {
        path: platform.dockerfile_path.clone(),
        scratch: false,
      });
    }

    let mut content = fs::read_to_string(&platform.dockerfile_path).map_err(|source| BuildError::Io {
      path: platform.dockerfile_path.clone(),
      source,
    })?;

    for from_image in &platform.overridden_from_images {
      let Some(repo) = manifest
        .repos
        .iter()
        .chain(manifest.all_repos.iter())
        .find(|r| r.full_model_name == get_repo(from_image))
      else {
        continue;
      };

      let new_from_image = replace_repo(from_image, &repo.qualified_name);
      info!(from = %from_image, to = %new_from_image, "replacing FROM image");

      // The stage clause survives; trailing whitespace does not.
      let pattern = format!(
        r"(?mR)FROM\s+{}(?P<suffix>[^\S\r\n]+\S.*?)?[^\S\r\n]*$",
        regex::escape(from_image)
      );
      let from_regex = Regex::new(&pattern).map_err(|e| BuildError::Config(e.to_string()))?;
      content = from_regex
        .replace_all(&content, |caps: &Captures| {
          let suffix = caps.name("suffix").map_or("", |m| m.as_str());
          format!("FROM {}{}", new_from_image, suffix)
        })
        .into_owned();
    }

    let mut path = platform.dockerfile_path.clone().into_os_string();
    path.push(SCRATCH_DOCKERFILE_SUFFIX);
    let path = PathBuf::from(path);

    debug!(path = %path.display(), content = %content, "writing updated Dockerfile");
    fs::write(&path, &content).map_err(|source| BuildError::Io {
      path: path.clone(),
      source,
    })?;

    Ok(Self { path, scratch: true })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Drop for PreparedDockerfile {
  fn drop(&mut self) {
    if self.scratch
      && let Err(e) = fs::remove_file(&self.path)
    {
      warn!(path = %self.path.display(), error = %e, "failed to remove scratch Dockerfile");
    }
  }
}

/// Run `hooks/{name}` (or `hooks/{name}.ps1`) from the build context, if present.
pub fn invoke_build_hook(
  process: &dyn ProcessRunner,
  name: &str,
  build_context: &Path,
  dry_run: bool,
) -> Result<(), BuildError> {
  let hooks_dir = build_context.join(HOOKS_DIR);
  if !hooks_dir.is_dir() {
    return Ok(());
  }

  let script = hooks_dir.join(name);
  let command = if script.is_file() {
    ProcessCommand::new(script.to_string_lossy())
  } else {
    let script = script.with_extension("ps1");
    if !script.is_file() {
      return Ok(());
    }
    let shell = if cfg!(windows) { "PowerShell" } else { "pwsh" };
    ProcessCommand::new(shell)
      .arg("-NoProfile")
      .arg("-File")
      .arg(script.to_string_lossy())
  };

  info!(hook = name, context = %build_context.display(), "running build hook");
  process
    .execute(&command.current_dir(build_context), dry_run)
    .map_err(|source| BuildError::Hook {
      name: name.to_string(),
      source,
    })?;
  Ok(())
}
