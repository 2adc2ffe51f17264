mod cmd;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{BuildArgs, MergeArgs, PublishArgs};

/// imagebuilder - Build, publish and catalogue container images from a manifest
#[derive(Parser)]
#[command(name = "imagebuilder")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the images of a manifest, reusing published images where possible
  Build(BuildArgs),

  /// Merge an image info file into the copy published in a GitHub repository
  PublishImageInfo(PublishArgs),

  /// Merge a directory of image info files into one
  MergeImageInfo(MergeArgs),
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Build(args) => cmd::cmd_build(args),
    Commands::PublishImageInfo(args) => cmd::cmd_publish_image_info(args),
    Commands::MergeImageInfo(args) => cmd::cmd_merge_image_info(args),
  };

  if let Err(ref e) = result {
    output::print_error(&format!("{:#}", e));
    std::process::exit(1);
  }

  Ok(())
}
