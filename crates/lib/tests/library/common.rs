//! Shared fixtures: in-memory stand-ins for the engine, registry, git and
//! process collaborators, plus helpers for laying out a manifest on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use imagebuilder_lib::build::BuildServices;
use imagebuilder_lib::consts::MANIFEST_MEDIA_TYPE;
use imagebuilder_lib::engine::{BuildRequest, EngineError, ImageArch, ImageEngine};
use imagebuilder_lib::git::{GitError, GitOptions, GitService, RepoCheckout, SourceCommitService};
use imagebuilder_lib::manifest::{Manifest, ManifestOptions, PlatformInfo};
use imagebuilder_lib::process::{ProcessCommand, ProcessError, ProcessRunner};
use imagebuilder_lib::registry::{ManifestDescriptor, ManifestInspector, RegistryError};

pub const REGISTRY: &str = "mcr.microsoft.com";
pub const SOURCE_REPO_URL: &str = "https://github.com/dotnet/dotnet-docker";

/// Fixed creation time reported for every image.
pub fn created_date() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2022, 3, 1, 10, 0, 0).unwrap()
}

// =============================================================================
// Manifest fixtures
// =============================================================================

/// A manifest directory with Dockerfiles written next to it.
pub struct ManifestDir {
  pub dir: TempDir,
}

impl ManifestDir {
  pub fn new(manifest: &str) -> Self {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("manifest.json"), manifest).unwrap();
    Self { dir }
  }

  pub fn with_dockerfile(self, relative_dir: &str, content: &str) -> Self {
    let path = self.dir.path().join(relative_dir);
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join("Dockerfile"), content).unwrap();
    self
  }

  pub fn path(&self) -> &Path {
    self.dir.path()
  }

  pub fn file(&self, name: &str) -> PathBuf {
    self.dir.path().join(name)
  }

  pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
    let path = self.file(name);
    std::fs::write(&path, content).unwrap();
    path
  }

  pub fn load(&self) -> Manifest {
    Manifest::load(&ManifestOptions {
      path: self.file("manifest.json"),
      ..Default::default()
    })
    .unwrap()
  }
}

// =============================================================================
// Engine + registry
// =============================================================================

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
  Build { dockerfile: PathBuf, tags: Vec<String> },
  Pull { image: String, platform: Option<String> },
  Push(String),
  Tag { source: String, tag: String },
}

/// Container engine and registry in one: the registry answers with the
/// digests registered through [`FakeDocker::set_digest`].
#[derive(Default)]
pub struct FakeDocker {
  calls: Mutex<Vec<EngineCall>>,
  digests: Mutex<HashMap<String, String>>,
  arches: Mutex<HashMap<String, ImageArch>>,
  created: Mutex<HashMap<String, DateTime<Utc>>>,
  build_output: Mutex<Option<String>>,
  layers: Vec<String>,
}

impl FakeDocker {
  pub fn new() -> Self {
    Self {
      layers: vec!["sha256:layer1".to_string(), "sha256:layer2".to_string()],
      ..Default::default()
    }
  }

  /// Register the sha the registry reports for a tag.
  pub fn set_digest(&self, tag: &str, sha: &str) {
    self.digests.lock().unwrap().insert(tag.to_string(), sha.to_string());
  }

  pub fn set_arch(&self, tag: &str, arch: ImageArch) {
    self.arches.lock().unwrap().insert(tag.to_string(), arch);
  }

  /// Report a creation time other than [`created_date`] for a tag.
  pub fn set_created(&self, tag: &str, created: DateTime<Utc>) {
    self.created.lock().unwrap().insert(tag.to_string(), created);
  }

  pub fn set_build_output(&self, output: &str) {
    *self.build_output.lock().unwrap() = Some(output.to_string());
  }

  pub fn calls(&self) -> Vec<EngineCall> {
    self.calls.lock().unwrap().clone()
  }

  pub fn builds(&self) -> Vec<EngineCall> {
    self
      .calls()
      .into_iter()
      .filter(|c| matches!(c, EngineCall::Build { .. }))
      .collect()
  }

  pub fn pulls(&self) -> Vec<(String, Option<String>)> {
    self
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        EngineCall::Pull { image, platform } => Some((image, platform)),
        _ => None,
      })
      .collect()
  }

  pub fn pushes(&self) -> Vec<String> {
    let mut pushes: Vec<String> = self
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        EngineCall::Push(tag) => Some(tag),
        _ => None,
      })
      .collect();
    pushes.sort();
    pushes
  }

  pub fn tags(&self) -> Vec<(String, String)> {
    let mut tags: Vec<(String, String)> = self
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        EngineCall::Tag { source, tag } => Some((source, tag)),
        _ => None,
      })
      .collect();
    tags.sort();
    tags
  }

  fn record(&self, call: EngineCall) {
    self.calls.lock().unwrap().push(call);
  }
}

impl ImageEngine for FakeDocker {
  fn build(&self, request: &BuildRequest<'_>, dry_run: bool) -> Result<Option<String>, EngineError> {
    self.record(EngineCall::Build {
      dockerfile: request.dockerfile.to_path_buf(),
      tags: request.tags.to_vec(),
    });
    if dry_run {
      return Ok(None);
    }
    Ok(Some(self.build_output.lock().unwrap().clone().unwrap_or_default()))
  }

  fn pull(&self, image: &str, platform: Option<&str>, _dry_run: bool) -> Result<(), EngineError> {
    self.record(EngineCall::Pull {
      image: image.to_string(),
      platform: platform.map(str::to_string),
    });
    Ok(())
  }

  fn push(&self, tag: &str, _dry_run: bool) -> Result<(), EngineError> {
    self.record(EngineCall::Push(tag.to_string()));
    Ok(())
  }

  fn create_tag(&self, source: &str, tag: &str, _dry_run: bool) -> Result<(), EngineError> {
    self.record(EngineCall::Tag {
      source: source.to_string(),
      tag: tag.to_string(),
    });
    // The new tag names the same image once pushed.
    let mut digests = self.digests.lock().unwrap();
    if let Some(sha) = digests.get(source).cloned() {
      digests.entry(tag.to_string()).or_insert(sha);
    }
    Ok(())
  }

  fn get_created_date(&self, tag: &str, _dry_run: bool) -> Result<DateTime<Utc>, EngineError> {
    Ok(self.created.lock().unwrap().get(tag).copied().unwrap_or_else(created_date))
  }

  fn get_image_arch(&self, tag: &str, dry_run: bool) -> Result<Option<ImageArch>, EngineError> {
    if dry_run {
      return Ok(None);
    }
    Ok(self.arches.lock().unwrap().get(tag).cloned())
  }

  fn get_image_manifest_layers(&self, _tag: &str, dry_run: bool) -> Result<Vec<String>, EngineError> {
    if dry_run {
      return Ok(Vec::new());
    }
    Ok(self.layers.clone())
  }
}

impl ManifestInspector for FakeDocker {
  fn inspect(&self, tag: &str, dry_run: bool) -> Result<Vec<ManifestDescriptor>, RegistryError> {
    if dry_run {
      return Ok(Vec::new());
    }
    Ok(
      self
        .digests
        .lock()
        .unwrap()
        .get(tag)
        .map(|sha| ManifestDescriptor {
          media_type: MANIFEST_MEDIA_TYPE.to_string(),
          digest: sha.clone(),
          layers: self.layers.clone(),
        })
        .into_iter()
        .collect(),
    )
  }
}

// =============================================================================
// Git + process
// =============================================================================

/// Reports every Dockerfile as last changed by the configured commit.
pub struct FakeGit {
  commit: Mutex<String>,
}

impl FakeGit {
  pub fn new(commit: &str) -> Self {
    Self {
      commit: Mutex::new(commit.to_string()),
    }
  }

  /// Commit URL this fake reports for a Dockerfile.
  pub fn url_for(&self, dockerfile: &str) -> String {
    format!("{}/blob/{}/{}", SOURCE_REPO_URL, self.commit.lock().unwrap(), dockerfile)
  }
}

impl GitService for FakeGit {
  fn get_dockerfile_commit_url(&self, platform: &PlatformInfo, source_repo_url: &str) -> Result<String, GitError> {
    Ok(format!(
      "{}/blob/{}/{}",
      source_repo_url,
      self.commit.lock().unwrap(),
      platform.dockerfile_path_relative_to_manifest
    ))
  }
}

/// Records commands and answers them with a canned output.
#[derive(Default)]
pub struct FakeProcess {
  pub commands: Mutex<Vec<ProcessCommand>>,
  pub output: Option<String>,
}

impl ProcessRunner for FakeProcess {
  fn execute(&self, command: &ProcessCommand, dry_run: bool) -> Result<Option<String>, ProcessError> {
    self.commands.lock().unwrap().push(command.clone());
    if dry_run {
      return Ok(None);
    }
    Ok(self.output.clone())
  }
}

/// Everything a build needs, owned in one place.
pub struct Harness {
  pub docker: FakeDocker,
  pub git: FakeGit,
  pub process: FakeProcess,
}

impl Harness {
  pub fn new() -> Self {
    Self {
      docker: FakeDocker::new(),
      git: FakeGit::new("abc123"),
      process: FakeProcess::default(),
    }
  }

  pub fn services(&self) -> BuildServices<'_> {
    BuildServices {
      engine: &self.docker,
      inspector: &self.docker,
      git: &self.git,
      process: &self.process,
    }
  }
}

// =============================================================================
// Source control
// =============================================================================

/// A remote repository holding at most one file, with scripted commit failures.
pub struct FakeRepo {
  /// Published content at the configured path, if any.
  pub published: Option<String>,
  /// Number of leading commit attempts that fail with a transient error.
  pub transient_failures: usize,
  pub commit_attempts: AtomicUsize,
  pub commits: Mutex<Vec<(String, String)>>,
}

impl FakeRepo {
  pub fn new(published: Option<&str>) -> Self {
    Self {
      published: published.map(str::to_string),
      transient_failures: 0,
      commit_attempts: AtomicUsize::new(0),
      commits: Mutex::new(Vec::new()),
    }
  }
}

#[async_trait]
impl SourceCommitService for FakeRepo {
  async fn download_repo_archive(&self, options: &GitOptions) -> Result<RepoCheckout, GitError> {
    let dir = TempDir::new().map_err(GitError::Extract)?;
    let root = dir.path().join("repo");
    if let Some(content) = &self.published {
      let path = root.join(&options.path);
      std::fs::create_dir_all(path.parent().unwrap()).map_err(GitError::Extract)?;
      std::fs::write(&path, content).map_err(GitError::Extract)?;
    }
    Ok(RepoCheckout::new(dir, root))
  }

  async fn push_file_change(&self, message: &str, options: &GitOptions, content: &str) -> Result<String, GitError> {
    let attempt = self.commit_attempts.fetch_add(1, Ordering::SeqCst);
    if attempt < self.transient_failures {
      return Err(GitError::Status {
        url: options.blob_url(),
        status: 409,
        body: "conflict".to_string(),
      });
    }

    self
      .commits
      .lock()
      .unwrap()
      .push((message.to_string(), content.to_string()));
    Ok(options.commit_url(&format!("commit{}", attempt)))
  }
}
