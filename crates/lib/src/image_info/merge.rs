//! Merging image info records and pruning stale content.
//!
//! Entries are matched structurally: repos by name, images by the manifest
//! image they describe (falling back to product version plus shared tags),
//! and platforms by [`PlatformId`](crate::manifest::PlatformId). Merging only
//! overwrites or appends; removing entries is the job of
//! [`remove_out_of_date_content`].

use tracing::{debug, info};

use super::ImageInfoError;
use super::types::{ImageArtifactDetails, ImageData, ManifestData, PlatformData, RepoData};
use crate::manifest::{ImageInfo, Manifest, RepoInfo};

/// Options for [`merge`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageInfoMergeOptions<'a> {
  /// Replace tag lists of matching entries instead of unioning them.
  pub replace_tags: bool,
  /// When set, images are matched through the manifest image they belong to.
  pub manifest: Option<&'a Manifest>,
}

/// Merge `source` into `target`.
pub fn merge(source: &ImageArtifactDetails, target: &mut ImageArtifactDetails, options: &ImageInfoMergeOptions<'_>) {
  for src_repo in &source.repos {
    match target.repos.iter_mut().find(|r| r.repo == src_repo.repo) {
      Some(target_repo) => merge_repo(src_repo, target_repo, options),
      None => {
        debug!(repo = %src_repo.repo, "adding repo");
        target.repos.push(src_repo.clone());
      }
    }
  }
}

fn merge_repo(source: &RepoData, target: &mut RepoData, options: &ImageInfoMergeOptions<'_>) {
  let manifest_repo = options.manifest.and_then(|m| m.find_repo(&source.repo));

  // A target image takes in at most one source image per merge, so images
  // that only differ by platform stay apart.
  let mut claimed = vec![false; target.images.len()];

  for src_image in &source.images {
    let candidates: Vec<usize> = (0..target.images.len())
      .filter(|&i| !claimed[i] && images_match(src_image, &target.images[i], manifest_repo))
      .collect();
    let position = candidates
      .iter()
      .copied()
      .find(|&i| shares_platform(src_image, &target.images[i]))
      .or_else(|| candidates.first().copied());

    match position {
      Some(index) => {
        claimed[index] = true;
        merge_image(src_image, &mut target.images[index], options.replace_tags);
      }
      None => {
        debug!(
          repo = %source.repo,
          product_version = ?src_image.product_version,
          "adding image"
        );
        target.images.push(src_image.clone());
        claimed.push(true);
      }
    }
  }
}

fn shares_platform(a: &ImageData, b: &ImageData) -> bool {
  a.platforms.iter().any(|p| b.find_platform(&p.id()).is_some())
}

fn images_match(a: &ImageData, b: &ImageData, manifest_repo: Option<&RepoInfo>) -> bool {
  if let Some(repo) = manifest_repo
    && let (Some(a_image), Some(b_image)) = (find_manifest_image(repo, a), find_manifest_image(repo, b))
  {
    return a_image.index == b_image.index;
  }

  a.product_version == b.product_version && a.shared_tags() == b.shared_tags()
}

fn merge_image(source: &ImageData, target: &mut ImageData, replace_tags: bool) {
  if let Some(src_manifest) = &source.manifest {
    match &mut target.manifest {
      Some(target_manifest) => merge_tags(&src_manifest.shared_tags, &mut target_manifest.shared_tags, replace_tags),
      None => {
        target.manifest = Some(ManifestData {
          shared_tags: src_manifest.shared_tags.clone(),
        })
      }
    }
  }

  for src_platform in &source.platforms {
    let id = src_platform.id();
    match target.platforms.iter_mut().find(|p| p.id() == id) {
      Some(target_platform) => merge_platform(src_platform, target_platform, replace_tags),
      None => target.platforms.push(src_platform.clone()),
    }
  }
}

fn merge_platform(source: &PlatformData, target: &mut PlatformData, replace_tags: bool) {
  target.digest = source.digest.clone();
  target.base_image_digest = source.base_image_digest.clone();
  target.created = source.created;
  target.commit_url = source.commit_url.clone();
  target.layers = source.layers.clone();
  target.components = source.components.clone();
  target.is_unchanged = source.is_unchanged;

  merge_tags(&source.simple_tags, &mut target.simple_tags, replace_tags);
}

fn merge_tags(source: &[String], target: &mut Vec<String>, replace: bool) {
  if replace {
    *target = source.to_vec();
    return;
  }

  target.extend(source.iter().cloned());
  target.sort();
  target.dedup();
}

/// Find the manifest image an image record describes.
///
/// Candidates share the product version and at least one platform identity;
/// among several, the one whose shared tags are equal wins.
pub fn find_manifest_image<'a>(repo: &'a RepoInfo, image: &ImageData) -> Option<&'a ImageInfo> {
  let shared_tags = image.shared_tags();

  let candidates: Vec<&ImageInfo> = repo
    .images
    .iter()
    .filter(|manifest_image| {
      manifest_image.product_version == image.product_version
        && image
          .platforms
          .iter()
          .any(|p| manifest_image.find_platform(&p.id()).is_some())
    })
    .collect();

  candidates
    .iter()
    .copied()
    .find(|m| m.shared_tag_names() == shared_tags)
    .or_else(|| candidates.first().copied())
    .or_else(|| {
      repo
        .images
        .iter()
        .find(|m| m.product_version == image.product_version && m.shared_tag_names() == shared_tags)
    })
}

/// Remove repos, images and platforms that no longer exist in the manifest.
///
/// Images left without platforms are dropped. Fails if no repo remains.
pub fn remove_out_of_date_content(target: &mut ImageArtifactDetails, manifest: &Manifest) -> Result<(), ImageInfoError> {
  for repo_index in (0..target.repos.len()).rev() {
    let Some(manifest_repo) = manifest.find_repo(&target.repos[repo_index].repo) else {
      info!(repo = %target.repos[repo_index].repo, "removing repo no longer in manifest");
      target.repos.remove(repo_index);
      continue;
    };

    let repo = &mut target.repos[repo_index];
    for image_index in (0..repo.images.len()).rev() {
      let Some(manifest_image) = find_manifest_image(manifest_repo, &repo.images[image_index]) else {
        info!(repo = %repo.repo, "removing image no longer in manifest");
        repo.images.remove(image_index);
        continue;
      };

      let image = &mut repo.images[image_index];
      for platform_index in (0..image.platforms.len()).rev() {
        let id = image.platforms[platform_index].id();
        if manifest_image.find_platform(&id).is_none() {
          info!(repo = %repo.repo, platform = %id, "removing platform no longer in manifest");
          image.platforms.remove(platform_index);
        }
      }

      if image.platforms.is_empty() {
        repo.images.remove(image_index);
      }
    }
  }

  if target.repos.is_empty() {
    return Err(ImageInfoError::EmptyResult);
  }

  Ok(())
}
