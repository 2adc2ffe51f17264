use std::collections::{BTreeSet, HashSet};

use dashmap::DashSet;
use rayon::prelude::*;
use tracing::{debug, info};

use super::cache::{
  BuildCache, CachedPlatform, base_digest_matches, build_cache_key, commit_url_matches, has_all_tags_published,
};
use super::dockerfile::{PreparedDockerfile, invoke_build_hook};
use super::from_image::FromImageResolver;
use super::image_info::ImageInfoPopulator;
use super::{BuildError, BuildOptions, BuildServices, BuildSummary};
use crate::consts::IMPLICIT_PULL_MARKER;
use crate::engine::{BuildRequest, CachedImageEngine, ImageEngine};
use crate::image_info::{
  ImageArtifactDetails, ImageData, ManifestData, PlatformData, RepoData, find_manifest_image, storage,
};
use crate::manifest::{ImageInfo, Manifest, PlatformId, PlatformInfo, RepoInfo, TagInfo};
use crate::registry::DigestCache;
use crate::registry::reference::{get_digest_sha, get_image_name};

pub(super) struct Orchestrator<'a> {
  manifest: &'a Manifest,
  options: &'a BuildOptions,
  services: BuildServices<'a>,
  engine: CachedImageEngine<'a>,
  digest_cache: DigestCache<'a>,
  resolver: FromImageResolver,
  cache: BuildCache,
  /// `(repo, platform)` pairs whose image was produced by this run.
  built: DashSet<(String, PlatformId)>,
  /// Fully qualified tags of the images built in this run.
  built_tags: DashSet<String>,
  processed_tags: Vec<TagInfo>,
  details: ImageArtifactDetails,
}

impl<'a> Orchestrator<'a> {
  pub(super) fn new(manifest: &'a Manifest, options: &'a BuildOptions, services: BuildServices<'a>) -> Self {
    Self {
      manifest,
      options,
      services,
      engine: CachedImageEngine::new(services.engine),
      digest_cache: DigestCache::new(services.inspector),
      resolver: FromImageResolver {
        model_registry: manifest.model_registry.clone(),
        registry: manifest.registry.clone(),
        repo_prefix: options.repo_prefix.clone(),
        source_repo_prefix: options.source_repo_prefix.clone(),
      },
      cache: BuildCache::default(),
      built: DashSet::new(),
      built_tags: DashSet::new(),
      processed_tags: Vec::new(),
      details: ImageArtifactDetails::default(),
    }
  }

  pub(super) fn run(mut self) -> Result<BuildSummary, BuildError> {
    if !self.options.skip_pulling {
      self.pull_base_images()?;
    }

    self.build_images()?;

    if !self.processed_tags.is_empty() {
      self.push_images()?;
    }

    let image_info = match &self.options.image_info_output_path {
      Some(path) => {
        ImageInfoPopulator {
          manifest: self.manifest,
          options: self.options,
          engine: &self.engine,
          digest_cache: &self.digest_cache,
          resolver: &self.resolver,
          git: self.services.git,
          process: self.services.process,
        }
        .populate(&mut self.details)?;

        storage::save(path, &self.details)?;
        info!(path = %path.display(), "image info written");
        Some(self.details.clone())
      }
      None => None,
    };

    Ok(BuildSummary {
      processed_tags: self.processed_tags.iter().map(|t| t.fully_qualified_name.clone()).collect(),
      built_digests: self.built_digests(),
      image_info,
    })
  }

  /// Pull every external base image once, then pin the digests of final stage bases.
  fn pull_base_images(&self) -> Result<(), BuildError> {
    info!("pulling latest base images");
    let dry_run = self.options.dry_run;

    let mut pulled_tags: HashSet<String> = HashSet::new();
    let mut external_from_images: BTreeSet<&str> = BTreeSet::new();

    for platform in self.manifest.filtered_platforms() {
      for from_image in &platform.external_from_images {
        external_from_images.insert(from_image.as_str());

        let pull_tag = self.resolver.pull_tag(from_image);
        if pulled_tags.insert(pull_tag.clone()) {
          info!(image = %pull_tag, platform = %platform.platform_label(), "pulling base image");
          self.engine.pull(&pull_tag, Some(&platform.platform_label()), dry_run)?;
        }
      }
    }

    if pulled_tags.is_empty() {
      info!("no external base images to pull");
      return Ok(());
    }

    let final_stage_tags: BTreeSet<String> = self
      .manifest
      .filtered_platforms()
      .filter_map(|p| {
        p.final_stage_from_image
          .as_deref()
          .filter(|from| !p.is_internal_from_image(from))
      })
      .map(|from| self.resolver.pull_tag(from))
      .collect();

    let missing: Vec<String> = final_stage_tags
      .iter()
      .filter(|t| !pulled_tags.contains(*t))
      .cloned()
      .collect();
    if !missing.is_empty() {
      return Err(BuildError::MissingPulledTags(missing));
    }

    // Resolved right after pulling so the digest matches what was pulled.
    final_stage_tags
      .par_iter()
      .try_for_each(|tag| self.digest_cache.get_digest(tag, dry_run).map(|_| ()))?;

    external_from_images.par_iter().try_for_each(|from_image| {
      let pull_tag = self.resolver.pull_tag(from_image);
      if pull_tag != *from_image {
        self.engine.create_tag(&pull_tag, from_image, dry_run)?;
      }
      Ok::<_, BuildError>(())
    })
  }

  fn build_images(&mut self) -> Result<(), BuildError> {
    info!("building images");
    let manifest = self.manifest;

    let published = match &self.options.image_info_source_path {
      Some(path) => Some(storage::load(path)?),
      None => None,
    };

    for repo in &manifest.repos {
      let published_repo = published.as_ref().and_then(|p| p.find_repo(&repo.name));
      let manifest_repo = manifest.find_repo(&repo.name).unwrap_or(repo);
      let mut repo_data = RepoData {
        repo: repo.name.clone(),
        images: Vec::new(),
      };

      for image in &repo.images {
        let published_image = published_repo.and_then(|r| {
          r.images
            .iter()
            .find(|i| find_manifest_image(manifest_repo, i).is_some_and(|m| m.index == image.index))
        });
        let mut image_data = new_image_data(image);

        for platform in &image.platforms {
          let all_tags: Vec<TagInfo> = platform.tags.iter().chain(&image.shared_tags).cloned().collect();
          let tag_names: Vec<String> = all_tags.iter().map(|t| t.fully_qualified_name.clone()).collect();
          self.processed_tags.extend(all_tags);

          let mut data = PlatformData::from_platform_info(platform);
          data.simple_tags = platform.push_tags().map(|t| t.name.clone()).collect();
          data.simple_tags.sort();

          let published_platform = published_image.and_then(|i| i.find_platform(&platform.id()));

          let reused =
            !self.options.no_cache && self.check_for_cached_image(repo, platform, published_platform, &tag_names, &mut data)?;

          if !reused {
            self.build_image(platform, &tag_names)?;
            self.built.insert((repo.name.clone(), platform.id()));
            for tag in &tag_names {
              self.built_tags.insert(tag.clone());
            }

            // A base built in this run is not in the registry yet; its digest is
            // taken from its own record once pushed.
            if let Some(from_image) = &platform.final_stage_from_image
              && !self.built_tags.contains(from_image)
            {
              data.base_image_digest = self
                .digest_cache
                .get_digest(&self.resolver.local_tag(from_image), self.options.dry_run)?;
            }

            if !self.options.no_cache
              && let Some(first_tag) = tag_names.first()
            {
              self.cache.insert(
                build_cache_key(platform),
                platform,
                CachedPlatform::from_local_build(first_tag, &data),
              );
            }
          }

          image_data.platforms.push(data);
        }

        repo_data.images.push(image_data);
      }

      self.details.repos.push(repo_data);
    }

    info!(
      built = self.built.len(),
      cache_entries = self.cache.len(),
      tags = self.processed_tags.len(),
      "images processed"
    );
    Ok(())
  }

  /// Decide whether the platform can reuse an existing image, tagging it if so.
  fn check_for_cached_image(
    &self,
    repo: &RepoInfo,
    platform: &PlatformInfo,
    published: Option<&PlatformData>,
    tags: &[String],
    data: &mut PlatformData,
  ) -> Result<bool, BuildError> {
    let key = build_cache_key(platform);

    if let Some(cached) = self.cache.get(&key, platform) {
      info!(
        dockerfile = %platform.dockerfile_path_relative_to_manifest,
        source = %cached.source,
        "cache hit on a platform processed earlier in this run"
      );
      self.on_cache_hit(repo, tags, false, &cached)?;
      // Tagged from an image built in this run, so it counts as built too.
      if !cached.source_is_digest {
        self.built.insert((repo.name.clone(), platform.id()));
      }
      cached.copy_into(data);
      data.is_unchanged = cached.source_is_digest && published.is_some_and(|p| has_all_tags_published(platform, p));
      return Ok(true);
    }

    let Some(published) = published else {
      return Ok(false);
    };

    let hit = self.is_published_image_current(platform, published)?;
    if !hit {
      info!(dockerfile = %platform.dockerfile_path_relative_to_manifest, "cache miss");
      return Ok(false);
    }

    info!(
      dockerfile = %platform.dockerfile_path_relative_to_manifest,
      digest = %published.digest,
      "cache hit on published image"
    );
    let cached = CachedPlatform::from_published(published);
    self.on_cache_hit(repo, tags, true, &cached)?;
    cached.copy_into(data);
    data.is_unchanged = has_all_tags_published(platform, published);
    self.cache.insert(key, platform, cached);
    Ok(true)
  }

  fn is_published_image_current(&self, platform: &PlatformInfo, published: &PlatformData) -> Result<bool, BuildError> {
    debug!(dockerfile = %platform.dockerfile_path_relative_to_manifest, "checking for cached image");

    if published.digest.is_empty() {
      debug!("published record has no digest");
      return Ok(false);
    }

    if let Some(from_image) = &platform.final_stage_from_image {
      if self.built_tags.contains(from_image) {
        info!(base_image = %from_image, "base image was rebuilt in this run");
        return Ok(false);
      }

      let current = self
        .digest_cache
        .get_digest(&self.resolver.local_tag(from_image), self.options.dry_run)?;
      let matches = base_digest_matches(published.base_image_digest.as_deref(), current.as_deref());
      info!(
        published = ?published.base_image_digest,
        current = ?current,
        matches,
        "comparing base image digests"
      );
      if !matches {
        return Ok(false);
      }
    } else {
      debug!("image has no base image, so its base is considered current");
    }

    let source_repo_url = self.options.source_repo_url.as_deref().unwrap_or_default();
    let current_url = self.services.git.get_dockerfile_commit_url(platform, source_repo_url)?;
    let matches = commit_url_matches(&published.commit_url, &current_url);
    info!(
      published = %published.commit_url,
      current = %current_url,
      matches,
      "comparing Dockerfile commits"
    );
    Ok(matches)
  }

  /// Make a reused image available locally under all of the platform's tags.
  fn on_cache_hit(&self, repo: &RepoInfo, tags: &[String], pull: bool, cached: &CachedPlatform) -> Result<(), BuildError> {
    let dry_run = self.options.dry_run;

    if pull {
      // By digest, so no platform is needed.
      self.engine.pull(&cached.source, None, dry_run)?;
    }

    tags.par_iter().try_for_each(|tag| {
      self.engine.create_tag(&cached.source, tag, dry_run)?;

      // The tags are not pushed yet, and a Dockerfile shared across repos
      // resolves to the repo it was first published in.
      if cached.source_is_digest {
        let digest = get_image_name(
          Some(&self.manifest.model_registry),
          &repo.name,
          None,
          Some(get_digest_sha(&cached.source)),
        );
        self.digest_cache.add_digest(tag, &digest);
      } else {
        self.built_tags.insert(tag.clone());
      }
      Ok::<_, BuildError>(())
    })
  }

  fn build_image(&self, platform: &PlatformInfo, tags: &[String]) -> Result<(), BuildError> {
    self.validate_platform_is_compatible_with_base_image(platform)?;

    let dockerfile = PreparedDockerfile::prepare(platform, self.manifest)?;
    let dry_run = self.options.dry_run;
    let process = self.services.process;

    invoke_build_hook(process, "pre-build", &platform.build_context_path, dry_run)?;

    let mut build_args = self.options.build_args.clone();
    build_args.extend(platform.build_args.iter().map(|(k, v)| (k.clone(), v.clone())));

    let label = platform.platform_label();
    let request = BuildRequest {
      dockerfile: dockerfile.path(),
      context: &platform.build_context_path,
      platform: &label,
      tags,
      build_args: &build_args,
      retry: self.options.retry,
    };

    info!(
      dockerfile = %platform.dockerfile_path_relative_to_manifest,
      platform = %label,
      tags = tags.len(),
      "building image"
    );
    let output = self.engine.build(&request, dry_run)?;

    if !self.options.skip_pulling && !dry_run && output.as_deref().is_some_and(|o| o.contains(IMPLICIT_PULL_MARKER)) {
      return Err(BuildError::ImplicitPull {
        dockerfile: platform.dockerfile_path_relative_to_manifest.clone(),
      });
    }

    invoke_build_hook(process, "post-build", &platform.build_context_path, dry_run)
  }

  fn validate_platform_is_compatible_with_base_image(&self, platform: &PlatformInfo) -> Result<(), BuildError> {
    let Some(from_image) = &platform.final_stage_from_image else {
      return Ok(());
    };
    if self.options.skip_platform_check {
      return Ok(());
    }

    // Already pulled or built, so inspecting it locally is fine.
    let base_tag = self.resolver.local_tag(from_image);
    let Some(base) = self.engine.get_image_arch(&base_tag, self.options.dry_run)? else {
      return Ok(());
    };

    if base.architecture != platform.architecture || base.variant != platform.variant {
      return Err(BuildError::ArchitectureMismatch {
        dockerfile: platform.dockerfile_path_relative_to_manifest.clone(),
        base_image: base_tag,
        expected: arch_label(platform.architecture.docker_name(), platform.variant.as_deref()),
        actual: arch_label(base.architecture.docker_name(), base.variant.as_deref()),
      });
    }

    Ok(())
  }

  fn push_images(&self) -> Result<(), BuildError> {
    if !self.options.push {
      return Ok(());
    }

    info!("pushing images");
    let mut seen = HashSet::new();
    let tags: Vec<&str> = self
      .processed_tags
      .iter()
      .filter(|t| !t.is_local)
      .map(|t| t.fully_qualified_name.as_str())
      .filter(|t| seen.insert(*t))
      .collect();

    tags.par_iter().try_for_each(|tag| {
      info!(tag = %tag, "pushing image");
      self.engine.push(tag, self.options.dry_run)
    })?;
    Ok(())
  }

  /// `{qualified repo}@{sha}` of each platform built in this run, including
  /// platforms tagged from an image built earlier in the run.
  fn built_digests(&self) -> Vec<String> {
    let mut digests: Vec<String> = Vec::new();
    for repo in &self.details.repos {
      let Some(manifest_repo) = self.manifest.find_repo(&repo.repo) else {
        continue;
      };
      for platform in repo.images.iter().flat_map(|i| &i.platforms) {
        if platform.digest.is_empty() || !self.built.contains(&(repo.repo.clone(), platform.id())) {
          continue;
        }
        let digest = format!("{}@{}", manifest_repo.qualified_name, get_digest_sha(&platform.digest));
        if !digests.contains(&digest) {
          digests.push(digest);
        }
      }
    }
    digests
  }
}

fn new_image_data(image: &ImageInfo) -> ImageData {
  ImageData {
    product_version: image.product_version.clone(),
    manifest: (!image.shared_tags.is_empty()).then(|| ManifestData {
      shared_tags: image.shared_tags.iter().map(|t| t.name.clone()).collect(),
    }),
    platforms: Vec::new(),
  }
}

fn arch_label(architecture: &str, variant: Option<&str>) -> String {
  match variant {
    Some(variant) => format!("{}/{}", architecture, variant),
    None => architecture.to_string(),
  }
}
