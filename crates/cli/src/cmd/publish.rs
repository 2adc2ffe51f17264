//! Implementation of the `imagebuilder publish-image-info` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use imagebuilder_lib::git::{GitHubCommitService, GitOptions};
use imagebuilder_lib::manifest::Manifest;
use imagebuilder_lib::publish::{PublishOptions, PublishOutcome, publish_image_info};
use imagebuilder_lib::retry::RetryPolicy;

use super::ManifestArgs;
use crate::output::{print_info, print_stat, print_success, print_warning};

#[derive(Debug, Args)]
pub struct PublishArgs {
  /// Image info file produced by a build
  pub image_info_path: PathBuf,

  #[command(flatten)]
  pub manifest: ManifestArgs,

  /// Owner of the repository holding the published image info
  #[arg(long)]
  pub git_owner: String,

  /// Repository holding the published image info
  #[arg(long)]
  pub git_repo: String,

  #[arg(long, default_value = "main")]
  pub git_branch: String,

  /// Path of the image info file within the repository
  #[arg(long)]
  pub git_path: String,

  #[arg(long, env = "IMAGEBUILDER_GIT_TOKEN", hide_env_values = true)]
  pub git_token: Option<String>,

  /// Committer name
  #[arg(long)]
  pub git_username: Option<String>,

  /// Committer email
  #[arg(long)]
  pub git_email: Option<String>,

  /// Compute the merged content without committing it
  #[arg(long)]
  pub dry_run: bool,
}

pub fn cmd_publish_image_info(args: PublishArgs) -> Result<()> {
  let manifest = Manifest::load(&args.manifest.to_options())
    .with_context(|| format!("Failed to load manifest {}", args.manifest.manifest.display()))?;

  let options = PublishOptions {
    image_info_path: args.image_info_path,
    git: GitOptions {
      owner: args.git_owner,
      repo: args.git_repo,
      branch: args.git_branch,
      path: args.git_path,
      token: args.git_token,
      username: args.git_username,
      email: args.git_email,
    },
    dry_run: args.dry_run,
    retry: RetryPolicy::default(),
  };

  if !options.dry_run && options.git.resolve_token().is_none() {
    print_warning("No git token configured; the commit will likely be rejected");
  }

  let service = GitHubCommitService::default();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt
    .block_on(publish_image_info(&manifest, &options, &service))
    .context("Publishing image info failed")?;

  println!();
  match outcome {
    PublishOutcome::NoChanges => print_info("No changes to the published image info"),
    PublishOutcome::DryRun { content } => {
      print_info("Dry run - the published image info would become:");
      println!("{}", content);
    }
    PublishOutcome::Updated { commit_url } => {
      print_success("Image info published!");
      print_stat("Commit", &commit_url);
    }
  }

  Ok(())
}
