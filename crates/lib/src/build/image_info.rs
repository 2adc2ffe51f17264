//! Filling in the image info record once everything is built and pushed.

use std::collections::HashMap;

use chrono::SecondsFormat;
use tracing::{debug, info};

use super::from_image::FromImageResolver;
use super::{BuildError, BuildOptions};
use crate::engine::ImageEngine;
use crate::git::GitService;
use crate::image_info::{Component, ImageArtifactDetails, PlatformData};
use crate::manifest::{Manifest, OsType, PlatformInfo};
use crate::process::{ProcessCommand, ProcessRunner};
use crate::registry::DigestCache;
use crate::registry::reference::{get_digest_sha, get_digest_string, get_repo};

/// Position of a platform entry in the record: repo, image, platform.
type Location = (usize, usize, usize);

struct Entry<'m> {
  location: Location,
  platform: &'m PlatformInfo,
}

pub(super) struct ImageInfoPopulator<'a> {
  pub manifest: &'a Manifest,
  pub options: &'a BuildOptions,
  pub engine: &'a dyn ImageEngine,
  pub digest_cache: &'a DigestCache<'a>,
  pub resolver: &'a FromImageResolver,
  pub git: &'a dyn GitService,
  pub process: &'a dyn ProcessRunner,
}

impl ImageInfoPopulator<'_> {
  /// Populate `details`, which mirrors the filtered manifest entry for entry.
  ///
  /// Platforms are handled in manifest order so a base platform's digest is
  /// known before its dependents need it.
  pub fn populate(&self, details: &mut ImageArtifactDetails) -> Result<(), BuildError> {
    let entries = self.entries();

    let mut by_tag: HashMap<&str, Location> = HashMap::new();
    for entry in &entries {
      for tag in &entry.platform.tags {
        by_tag.entry(tag.fully_qualified_name.as_str()).or_insert(entry.location);
      }
    }

    let source_repo_url = self.options.source_repo_url.as_deref().unwrap_or_default();
    let mut without_push_tags = Vec::new();

    for entry in &entries {
      let push_tags: Vec<&str> = entry
        .platform
        .push_tags()
        .map(|t| t.fully_qualified_name.as_str())
        .collect();

      if self.options.push
        && let Some(first_tag) = push_tags.first()
      {
        for tag in &push_tags {
          self.set_digest(platform_mut(details, entry.location), entry.platform, tag)?;
        }

        let base_image_digest = self.resolve_base_digest(details, entry, &by_tag)?;
        let data = platform_mut(details, entry.location);
        data.base_image_digest = base_image_digest;
        if data.layers.is_empty() {
          data.layers = self.engine.get_image_manifest_layers(first_tag, self.options.dry_run)?;
        }
      }

      for tag in &push_tags {
        self.set_created(platform_mut(details, entry.location), tag)?;
      }

      if push_tags.is_empty() {
        without_push_tags.push(entry);
      } else {
        self.set_components(platform_mut(details, entry.location), entry.platform)?;
      }

      platform_mut(details, entry.location).commit_url =
        self.git.get_dockerfile_commit_url(entry.platform, source_repo_url)?;
    }

    for entry in without_push_tags {
      self.copy_from_matching_platform(details, entry, &entries)?;
    }

    info!(platforms = entries.len(), "image info populated");
    Ok(())
  }

  fn entries(&self) -> Vec<Entry<'_>> {
    let mut entries = Vec::new();
    for (r, repo) in self.manifest.repos.iter().enumerate() {
      for (i, image) in repo.images.iter().enumerate() {
        for (p, platform) in image.platforms.iter().enumerate() {
          entries.push(Entry {
            location: (r, i, p),
            platform,
          });
        }
      }
    }
    entries
  }

  fn set_digest(&self, data: &mut PlatformData, platform: &PlatformInfo, tag: &str) -> Result<(), BuildError> {
    // Pushing to staging and syndicating to the public registry keeps the
    // digest, so it is recorded under the public repo.
    let digest = self
      .digest_cache
      .get_digest(tag, self.options.dry_run)?
      .map(|d| get_digest_string(&platform.full_repo_model_name, get_digest_sha(&d)));

    let Some(digest) = digest else {
      if self.options.dry_run {
        return Ok(());
      }
      return Err(BuildError::DigestNotFound {
        dockerfile: data.dockerfile.clone(),
      });
    };

    if !data.digest.is_empty() && data.digest != digest {
      return Err(BuildError::DigestMismatch {
        tag: tag.to_string(),
        recorded: data.digest.clone(),
        queried: digest,
      });
    }

    data.digest = digest;
    Ok(())
  }

  /// The base image digest under the base's public repo.
  ///
  /// A base built in this run has no digest of its own yet, so it is taken
  /// from the base platform's entry.
  fn resolve_base_digest(
    &self,
    details: &ImageArtifactDetails,
    entry: &Entry<'_>,
    by_tag: &HashMap<&str, Location>,
  ) -> Result<Option<String>, BuildError> {
    let data = platform_ref(details, entry.location);
    let Some(from_image) = entry.platform.final_stage_from_image.as_deref() else {
      return Ok(data.base_image_digest.clone());
    };

    let mut base_image_digest = data.base_image_digest.clone();
    if base_image_digest.is_none() && entry.platform.is_internal_from_image(from_image) {
      let Some(base_location) = by_tag.get(from_image) else {
        return Err(BuildError::BasePlatformNotFound {
          tag: from_image.to_string(),
        });
      };

      let base = platform_ref(details, *base_location);
      if base.digest.is_empty() {
        if self.options.dry_run {
          return Ok(None);
        }
        return Err(BuildError::BaseDigestNotComputed {
          platform: base.id().to_string(),
        });
      }
      base_image_digest = Some(base.digest.clone());
    }

    Ok(base_image_digest.map(|digest| {
      get_digest_string(
        get_repo(&self.resolver.public_tag(from_image)),
        get_digest_sha(&digest),
      )
    }))
  }

  fn set_created(&self, data: &mut PlatformData, tag: &str) -> Result<(), BuildError> {
    let created = self.engine.get_created_date(tag, self.options.dry_run)?;
    if let Some(recorded) = data.created
      && recorded != created
    {
      return Err(BuildError::CreatedMismatch {
        tag: tag.to_string(),
        recorded: recorded.to_rfc3339_opts(SecondsFormat::Secs, true),
        queried: created.to_rfc3339_opts(SecondsFormat::Secs, true),
      });
    }

    data.created = Some(created);
    Ok(())
  }

  /// Run the installed-packages script against the image.
  fn set_components(&self, data: &mut PlatformData, platform: &PlatformInfo) -> Result<(), BuildError> {
    let Some(default_script) = &self.options.installed_packages_script else {
      return Ok(());
    };
    if !data.components.is_empty() || platform.os == OsType::Windows {
      return Ok(());
    }
    let Some(tag) = platform.tags.first() else {
      return Ok(());
    };

    let script = platform.package_query_script.as_ref().unwrap_or(default_script);
    let command = ProcessCommand::new("/bin/sh")
      .arg(script.to_string_lossy())
      .arg(&tag.fully_qualified_name)
      .arg(platform.dockerfile_path.to_string_lossy());

    debug!(tag = %tag.fully_qualified_name, script = %script.display(), "querying installed packages");
    if let Some(output) = self.process.execute(&command, self.options.dry_run)? {
      data.components = parse_components(&output)?;
    }
    Ok(())
  }

  /// A platform without push tags duplicates a tagged platform elsewhere in
  /// the manifest; copy what could only be looked up by tag.
  fn copy_from_matching_platform(
    &self,
    details: &mut ImageArtifactDetails,
    entry: &Entry<'_>,
    entries: &[Entry<'_>],
  ) -> Result<(), BuildError> {
    let id = entry.platform.id();
    let candidates: Vec<&PlatformData> = entries
      .iter()
      .filter(|other| {
        other.platform.push_tags().next().is_some()
          && other.platform.id() == id
          && other.platform.build_args == entry.platform.build_args
      })
      .map(|other| platform_ref(details, other.location))
      .collect();

    let Some(first) = candidates.first() else {
      return Err(BuildError::NoMatchingPlatform { platform: id.to_string() });
    };

    let mut digests: Vec<String> = candidates.iter().map(|c| c.digest.clone()).collect();
    digests.sort();
    digests.dedup();
    if digests.len() > 1 {
      return Err(BuildError::AmbiguousMatchingPlatform {
        platform: id.to_string(),
        digests,
      });
    }

    let digest = first.digest.clone();
    let created = first.created;
    let components = first.components.clone();

    debug!(platform = %id, "copying image info from matching tagged platform");
    let data = platform_mut(details, entry.location);
    data.digest = digest;
    data.created = created;
    data.components = components;
    Ok(())
  }
}

fn platform_ref(details: &ImageArtifactDetails, (r, i, p): Location) -> &PlatformData {
  &details.repos[r].images[i].platforms[p]
}

fn platform_mut(details: &mut ImageArtifactDetails, (r, i, p): Location) -> &mut PlatformData {
  &mut details.repos[r].images[i].platforms[p]
}

/// Parse `type,name=version` lines.
fn parse_components(output: &str) -> Result<Vec<Component>, BuildError> {
  output
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .map(|line| {
      let parts: Vec<&str> = line.split([',', '=']).collect();
      match parts.as_slice() {
        [kind, name, version, ..] => Ok(Component {
          kind: kind.to_string(),
          name: name.to_string(),
          version: version.to_string(),
        }),
        _ => Err(BuildError::InvalidComponent { line: line.to_string() }),
      }
    })
    .collect()
}
