//! Implementation of the `imagebuilder merge-image-info` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use imagebuilder_lib::image_info::storage;
use imagebuilder_lib::manifest::Manifest;

use super::ManifestArgs;
use crate::output::{print_stat, print_success};

#[derive(Debug, Args)]
pub struct MergeArgs {
  /// Directory of image info files to merge
  pub source_dir: PathBuf,

  /// Where to write the merged image info
  pub output_path: PathBuf,

  #[command(flatten)]
  pub manifest: ManifestArgs,
}

pub fn cmd_merge_image_info(args: MergeArgs) -> Result<()> {
  let manifest = Manifest::load(&args.manifest.to_options())
    .with_context(|| format!("Failed to load manifest {}", args.manifest.manifest.display()))?;

  let merged = storage::merge_directory(&args.source_dir, &manifest)
    .with_context(|| format!("Failed to merge image info in {}", args.source_dir.display()))?;
  storage::save(&args.output_path, &merged)
    .with_context(|| format!("Failed to write {}", args.output_path.display()))?;

  print_success("Image info merged!");
  print_stat("Repos", &merged.repos.len().to_string());
  print_stat("Platforms", &merged.platforms().count().to_string());
  print_stat("Output", &args.output_path.display().to_string());
  Ok(())
}
