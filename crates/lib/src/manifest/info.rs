//! Loaded, resolved view of a manifest.
//!
//! Loading reads the manifest file, parses every referenced Dockerfile for its
//! FROM images, qualifies tags against the effective registry and applies the
//! platform filter. The result is read-only for the rest of the run.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::dockerfile::DockerfileStages;
use super::types::{Architecture, ImageModel, ManifestModel, OsType, PlatformModel, RepoModel};
use super::ManifestError;
use crate::consts::DOCKERFILE_NAME;
use crate::registry::reference::{get_repo, replace_repo};

/// Options controlling how a manifest is loaded.
#[derive(Debug, Clone, Default)]
pub struct ManifestOptions {
  pub path: PathBuf,
  /// Registry used instead of the manifest's own when qualifying tags.
  pub registry_override: Option<String>,
  /// Prefix prepended to every repo name when qualifying tags.
  pub repo_prefix: Option<String>,
  pub filter: ManifestFilter,
}

/// Platform selection applied at load time.
#[derive(Debug, Clone, Default)]
pub struct ManifestFilter {
  pub architecture: Option<Architecture>,
  pub os_type: Option<OsType>,
  pub os_versions: Vec<String>,
  /// Dockerfile path prefixes, relative to the manifest directory.
  pub paths: Vec<String>,
}

impl ManifestFilter {
  fn matches(&self, platform: &PlatformInfo) -> bool {
    if self.architecture.is_some_and(|arch| arch != platform.architecture) {
      return false;
    }
    if self.os_type.is_some_and(|os| os != platform.os) {
      return false;
    }
    if !self.os_versions.is_empty()
      && !self
        .os_versions
        .iter()
        .any(|v| v.eq_ignore_ascii_case(&platform.os_version))
    {
      return false;
    }
    if !self.paths.is_empty() {
      let dockerfile = &platform.dockerfile_path_relative_to_manifest;
      return self.paths.iter().any(|p| {
        let prefix = normalize_relative(p);
        dockerfile == &prefix || dockerfile.starts_with(&format!("{}/", prefix.trim_end_matches('/')))
      });
    }
    true
  }
}

/// Identity of a platform: Dockerfile, architecture, OS type and OS version.
///
/// Two platform entries with the same identity describe the same artifact,
/// even when they are listed under different images.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlatformId(String);

impl PlatformId {
  pub fn new(dockerfile: &str, architecture: &str, os_type: &str, os_version: &str) -> Self {
    Self(format!("{}-{}-{}-{}", dockerfile, architecture, os_type, os_version))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for PlatformId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A tag of a platform or image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
  /// Simple tag name (`6.0-focal`).
  pub name: String,
  /// Tag qualified with the repo's qualified name (`registry/prefix/repo:6.0-focal`).
  pub fully_qualified_name: String,
  pub is_local: bool,
}

#[derive(Debug, Clone)]
pub struct PlatformInfo {
  pub dockerfile_path: PathBuf,
  /// Dockerfile path relative to the manifest, `/`-separated.
  pub dockerfile_path_relative_to_manifest: String,
  pub build_context_path: PathBuf,
  pub os: OsType,
  pub os_version: String,
  pub architecture: Architecture,
  pub variant: Option<String>,
  pub build_args: BTreeMap<String, String>,
  pub tags: Vec<TagInfo>,
  /// Registry-unqualified name of the owning repo.
  pub repo_name: String,
  pub repo_qualified_name: String,
  pub full_repo_model_name: String,
  /// External images plus internal images rewritten to their qualified names.
  pub from_images: Vec<String>,
  pub internal_from_images: Vec<String>,
  pub external_from_images: Vec<String>,
  /// FROM references (as written) to internal repos whose qualified name differs.
  pub overridden_from_images: Vec<String>,
  pub final_stage_from_image: Option<String>,
  /// Installed-packages script override, resolved against the manifest directory.
  pub package_query_script: Option<PathBuf>,
}

impl PlatformInfo {
  pub fn id(&self) -> PlatformId {
    PlatformId::new(
      &self.dockerfile_path_relative_to_manifest,
      self.architecture.display_name(),
      self.os.display_name(),
      &self.os_version,
    )
  }

  /// Platform label passed to the engine (`linux/arm64/v8`).
  pub fn platform_label(&self) -> String {
    let mut label = format!("{}/{}", self.os.docker_name(), self.architecture.docker_name());
    if let Some(variant) = &self.variant {
      label.push('/');
      label.push_str(variant);
    }
    label
  }

  pub fn is_internal_from_image(&self, image: &str) -> bool {
    self.internal_from_images.iter().any(|i| i == image)
  }

  /// Tags that get pushed to the registry.
  pub fn push_tags(&self) -> impl Iterator<Item = &TagInfo> {
    self.tags.iter().filter(|t| !t.is_local)
  }
}

#[derive(Debug, Clone)]
pub struct ImageInfo {
  /// Position of the image within its repo, before filtering.
  pub index: usize,
  pub product_version: Option<String>,
  pub shared_tags: Vec<TagInfo>,
  pub platforms: Vec<PlatformInfo>,
}

impl ImageInfo {
  /// Sorted simple names of the shared tags.
  pub fn shared_tag_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.shared_tags.iter().map(|t| t.name.clone()).collect();
    names.sort();
    names
  }

  pub fn find_platform(&self, id: &PlatformId) -> Option<&PlatformInfo> {
    self.platforms.iter().find(|p| &p.id() == id)
  }
}

#[derive(Debug, Clone)]
pub struct RepoInfo {
  /// Registry-unqualified name from the manifest.
  pub name: String,
  /// `{manifest registry}/{name}`.
  pub full_model_name: String,
  /// `{effective registry}/{repo prefix}{name}`.
  pub qualified_name: String,
  pub images: Vec<ImageInfo>,
}

/// A loaded manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
  /// Registry as written in the manifest.
  pub model_registry: String,
  /// Registry used for qualifying tags (the override when one is given).
  pub registry: String,
  pub directory: PathBuf,
  /// Repos with the filter applied; repos and images left without platforms are dropped.
  pub repos: Vec<RepoInfo>,
  /// Every repo regardless of the filter.
  pub all_repos: Vec<RepoInfo>,
}

impl Manifest {
  /// Load and resolve a manifest file.
  pub fn load(options: &ManifestOptions) -> Result<Self, ManifestError> {
    let read_error = |source| ManifestError::Read {
      path: options.path.clone(),
      source,
    };
    let path = dunce::canonicalize(&options.path).map_err(read_error)?;
    let content = std::fs::read_to_string(&path).map_err(read_error)?;

    let model: ManifestModel = serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
      path: options.path.clone(),
      source,
    })?;

    let directory = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."));

    Self::from_model(model, &directory, options)
  }

  /// Resolve an already-parsed manifest whose paths are relative to `directory`.
  pub fn from_model(model: ManifestModel, directory: &Path, options: &ManifestOptions) -> Result<Self, ManifestError> {
    if model.registry.is_empty() {
      return Err(ManifestError::MissingRegistry);
    }

    let registry = options
      .registry_override
      .clone()
      .filter(|r| !r.is_empty())
      .unwrap_or_else(|| model.registry.clone());
    let repo_prefix = options.repo_prefix.clone().unwrap_or_default();

    let repo_names: Vec<RepoNames> = model
      .repos
      .iter()
      .map(|repo| RepoNames {
        full_model_name: format!("{}/{}", model.registry, repo.name),
        qualified_name: format!("{}/{}{}", registry, repo_prefix, repo.name),
      })
      .collect();

    let ctx = ResolveContext {
      directory,
      repo_names: &repo_names,
    };

    let mut all_repos = Vec::with_capacity(model.repos.len());
    for (repo, names) in model.repos.iter().zip(&repo_names) {
      all_repos.push(resolve_repo(&ctx, repo, names)?);
    }

    validate_dependency_order(&all_repos)?;

    let repos = filter_repos(&all_repos, &options.filter);
    info!(
      registry = %registry,
      repos = all_repos.len(),
      filtered_repos = repos.len(),
      "manifest loaded"
    );

    Ok(Self {
      model_registry: model.registry,
      registry,
      directory: directory.to_path_buf(),
      repos,
      all_repos,
    })
  }

  /// Filtered platforms in processing order.
  pub fn filtered_platforms(&self) -> impl Iterator<Item = &PlatformInfo> {
    self
      .repos
      .iter()
      .flat_map(|r| r.images.iter())
      .flat_map(|i| i.platforms.iter())
  }

  /// Look up a repo (from all repos) by its unqualified name.
  pub fn find_repo(&self, name: &str) -> Option<&RepoInfo> {
    self.all_repos.iter().find(|r| r.name == name)
  }
}

struct RepoNames {
  full_model_name: String,
  qualified_name: String,
}

struct ResolveContext<'a> {
  directory: &'a Path,
  repo_names: &'a [RepoNames],
}

fn resolve_repo(ctx: &ResolveContext<'_>, repo: &RepoModel, names: &RepoNames) -> Result<RepoInfo, ManifestError> {
  let images = repo
    .images
    .iter()
    .enumerate()
    .map(|(index, image)| resolve_image(ctx, repo, names, index, image))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(RepoInfo {
    name: repo.name.clone(),
    full_model_name: names.full_model_name.clone(),
    qualified_name: names.qualified_name.clone(),
    images,
  })
}

fn resolve_image(
  ctx: &ResolveContext<'_>,
  repo: &RepoModel,
  names: &RepoNames,
  index: usize,
  image: &ImageModel,
) -> Result<ImageInfo, ManifestError> {
  let shared_tags = image
    .shared_tags
    .iter()
    .map(|(name, tag)| qualify_tag(&names.qualified_name, name, tag.is_local))
    .collect();

  let platforms = image
    .platforms
    .iter()
    .map(|platform| resolve_platform(ctx, repo, names, platform))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(ImageInfo {
    index,
    product_version: image.product_version.clone(),
    shared_tags,
    platforms,
  })
}

fn qualify_tag(qualified_repo: &str, name: &str, is_local: bool) -> TagInfo {
  TagInfo {
    name: name.to_string(),
    fully_qualified_name: format!("{}:{}", qualified_repo, name),
    is_local,
  }
}

fn resolve_platform(
  ctx: &ResolveContext<'_>,
  repo: &RepoModel,
  names: &RepoNames,
  model: &PlatformModel,
) -> Result<PlatformInfo, ManifestError> {
  let mut dockerfile_rel = normalize_relative(&model.dockerfile);
  let mut dockerfile_path = ctx.directory.join(&dockerfile_rel);
  if dockerfile_path.is_dir() {
    dockerfile_path = dockerfile_path.join(DOCKERFILE_NAME);
    dockerfile_rel = format!("{}/{}", dockerfile_rel.trim_end_matches('/'), DOCKERFILE_NAME);
  }

  let content = std::fs::read_to_string(&dockerfile_path).map_err(|source| ManifestError::DockerfileRead {
    path: dockerfile_path.clone(),
    source,
  })?;
  let stages = DockerfileStages::parse(&content, &model.build_args);

  let build_context_path = match &model.build_context {
    Some(context) => ctx.directory.join(normalize_relative(context)),
    None => dockerfile_path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| ctx.directory.to_path_buf()),
  };

  let mut from_images = Vec::new();
  let mut internal_from_images = Vec::new();
  let mut external_from_images = Vec::new();
  let mut overridden_from_images = Vec::new();
  let mut overrides: HashMap<String, String> = HashMap::new();

  for image in stages.from_images() {
    let image_repo = get_repo(&image);
    let owner = ctx
      .repo_names
      .iter()
      .find(|n| n.full_model_name == image_repo || n.qualified_name == image_repo);

    match owner {
      Some(owner) => {
        let resolved = if image_repo == owner.full_model_name && owner.qualified_name != owner.full_model_name {
          let rewritten = replace_repo(&image, &owner.qualified_name);
          overridden_from_images.push(image.clone());
          overrides.insert(image.clone(), rewritten.clone());
          rewritten
        } else {
          image.clone()
        };
        internal_from_images.push(resolved.clone());
        from_images.push(resolved);
      }
      None => {
        external_from_images.push(image.clone());
        from_images.push(image);
      }
    }
  }

  let final_stage_from_image = stages
    .final_stage_from_image()
    .map(|image| overrides.get(&image).cloned().unwrap_or(image));

  let tags = model
    .tags
    .iter()
    .map(|(name, tag)| qualify_tag(&names.qualified_name, name, tag.is_local))
    .collect();

  let package_query_script = model
    .package_query_overrides
    .as_ref()
    .and_then(|o| o.get_installed_packages_path.as_ref())
    .map(|p| ctx.directory.join(normalize_relative(p)));

  debug!(
    repo = %repo.name,
    dockerfile = %dockerfile_rel,
    from_images = ?from_images,
    "resolved platform"
  );

  Ok(PlatformInfo {
    dockerfile_path,
    dockerfile_path_relative_to_manifest: dockerfile_rel,
    build_context_path,
    os: model.os,
    os_version: model.os_version.clone(),
    architecture: model.architecture,
    variant: model.variant.clone(),
    build_args: model.build_args.clone(),
    tags,
    repo_name: repo.name.clone(),
    repo_qualified_name: names.qualified_name.clone(),
    full_repo_model_name: names.full_model_name.clone(),
    from_images,
    internal_from_images,
    external_from_images,
    overridden_from_images,
    final_stage_from_image,
    package_query_script,
  })
}

/// A platform whose final stage is based on another platform's tag must come later.
fn validate_dependency_order(repos: &[RepoInfo]) -> Result<(), ManifestError> {
  let platforms: Vec<&PlatformInfo> = repos
    .iter()
    .flat_map(|r| r.images.iter())
    .flat_map(|i| i.platforms.iter())
    .collect();

  let mut seen_tags: HashSet<&str> = HashSet::new();
  let all_tags: HashMap<&str, &PlatformInfo> = platforms
    .iter()
    .flat_map(|p| p.tags.iter().map(move |t| (t.fully_qualified_name.as_str(), *p)))
    .collect();

  for platform in &platforms {
    if let Some(base) = platform.final_stage_from_image.as_deref()
      && let Some(producer) = all_tags.get(base)
      && !seen_tags.contains(base)
    {
      return Err(ManifestError::OutOfOrder {
        platform: platform.dockerfile_path_relative_to_manifest.clone(),
        dependency: producer.dockerfile_path_relative_to_manifest.clone(),
        tag: base.to_string(),
      });
    }
    seen_tags.extend(platform.tags.iter().map(|t| t.fully_qualified_name.as_str()));
  }

  Ok(())
}

fn filter_repos(repos: &[RepoInfo], filter: &ManifestFilter) -> Vec<RepoInfo> {
  repos
    .iter()
    .filter_map(|repo| {
      let images: Vec<ImageInfo> = repo
        .images
        .iter()
        .filter_map(|image| {
          let platforms: Vec<PlatformInfo> = image.platforms.iter().filter(|p| filter.matches(p)).cloned().collect();
          (!platforms.is_empty()).then(|| ImageInfo {
            platforms,
            ..image.clone()
          })
        })
        .collect();

      (!images.is_empty()).then(|| RepoInfo {
        images,
        ..repo.clone()
      })
    })
    .collect()
}

fn normalize_relative(path: &str) -> String {
  path.replace('\\', "/").trim_start_matches("./").to_string()
}
