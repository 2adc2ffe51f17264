//! Implementation of the `imagebuilder build` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use imagebuilder_lib::build::{BuildOptions, BuildServices, build, parse_build_args};
use imagebuilder_lib::engine::DockerCli;
use imagebuilder_lib::git::GitCli;
use imagebuilder_lib::manifest::Manifest;
use imagebuilder_lib::process::SystemProcessRunner;
use imagebuilder_lib::registry::ManifestToolCli;

use super::ManifestArgs;
use crate::output::{print_heading, print_info, print_item, print_stat, print_success};

#[derive(Debug, Args)]
pub struct BuildArgs {
  #[command(flatten)]
  pub manifest: ManifestArgs,

  /// Log the commands that would run without running them
  #[arg(long)]
  pub dry_run: bool,

  /// Build every platform, ignoring previously published images
  #[arg(long)]
  pub no_cache: bool,

  /// Retry failed builds
  #[arg(long)]
  pub retry: bool,

  /// Skip pulling base images before building
  #[arg(long)]
  pub skip_pulling: bool,

  /// Skip checking that platforms match the architecture of their base image
  #[arg(long)]
  pub skip_platform_check: bool,

  /// Push the built images
  #[arg(long)]
  pub push: bool,

  /// Pipeline variable that receives the digests of the built images
  #[arg(long)]
  pub output_variable: Option<String>,

  /// Previously published image info, used to reuse unchanged images
  #[arg(long)]
  pub image_info_source_path: Option<PathBuf>,

  /// Where to write the image info of this build
  #[arg(long)]
  pub image_info_output_path: Option<PathBuf>,

  /// Repository URL the Dockerfiles are committed to
  #[arg(long)]
  pub source_repo_url: Option<String>,

  /// Prefix of the repos external base images are mirrored into
  #[arg(long)]
  pub source_repo_prefix: Option<String>,

  /// Build arg applied to every platform (key=value)
  #[arg(long = "build-arg")]
  pub build_args: Vec<String>,

  /// Script that lists the packages installed in an image
  #[arg(long)]
  pub installed_packages_script: Option<PathBuf>,
}

/// Execute the build command.
///
/// Loads the manifest, runs the build, then prints every processed tag and,
/// when requested, the pipeline command carrying the built digests.
pub fn cmd_build(args: BuildArgs) -> Result<()> {
  let options = BuildOptions {
    dry_run: args.dry_run,
    no_cache: args.no_cache,
    retry: args.retry,
    skip_pulling: args.skip_pulling,
    skip_platform_check: args.skip_platform_check,
    push: args.push,
    output_variable: args.output_variable,
    image_info_source_path: args.image_info_source_path,
    image_info_output_path: args.image_info_output_path,
    source_repo_url: args.source_repo_url,
    repo_prefix: args.manifest.repo_prefix.clone(),
    source_repo_prefix: args.source_repo_prefix,
    build_args: parse_build_args(&args.build_args)?,
    installed_packages_script: args.installed_packages_script,
  };
  options.validate()?;

  let manifest = Manifest::load(&args.manifest.to_options())
    .with_context(|| format!("Failed to load manifest {}", args.manifest.manifest.display()))?;

  debug!(repos = manifest.repos.len(), dry_run = options.dry_run, "manifest loaded");

  let process = SystemProcessRunner;
  let inspector = ManifestToolCli::new(&process);
  let engine = DockerCli::new(&process, &inspector);
  let git = GitCli::new(&process);
  let services = BuildServices {
    engine: &engine,
    inspector: &inspector,
    git: &git,
    process: &process,
  };

  let summary = build(&manifest, &options, services).context("Build failed")?;

  println!();
  print_heading("IMAGES BUILT");
  if summary.processed_tags.is_empty() {
    print_info("No images built");
  } else {
    for tag in &summary.processed_tags {
      print_item(tag);
    }
  }

  if let Some(path) = &options.image_info_output_path {
    print_stat("Image info", &path.display().to_string());
  }
  if let Some(command) = summary.output_variable_command(&options) {
    println!("{}", command);
  }

  println!();
  if options.dry_run {
    print_info("Dry run - no images were built or pushed");
  } else {
    print_success("Build complete!");
  }

  Ok(())
}
