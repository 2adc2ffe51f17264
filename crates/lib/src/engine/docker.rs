//! [`ImageEngine`] backed by the `docker` CLI.

use chrono::{DateTime, Utc};
use tracing::info;

use super::{BuildRequest, EngineError, ImageArch, ImageEngine};
use crate::manifest::Architecture;
use crate::process::{ProcessCommand, ProcessRunner};
use crate::registry::{ManifestInspector, get_image_layers};
use crate::retry::{RetryPolicy, retry_blocking};

pub struct DockerCli<'a> {
  process: &'a dyn ProcessRunner,
  inspector: &'a dyn ManifestInspector,
  retry_policy: RetryPolicy,
}

impl<'a> DockerCli<'a> {
  pub fn new(process: &'a dyn ProcessRunner, inspector: &'a dyn ManifestInspector) -> Self {
    Self {
      process,
      inspector,
      retry_policy: RetryPolicy::default(),
    }
  }

  fn docker(&self, args: &[&str], dry_run: bool) -> Result<Option<String>, EngineError> {
    let command = ProcessCommand::new("docker").args(args.iter().copied());
    Ok(self.process.execute(&command, dry_run)?)
  }

  fn docker_with_retry(&self, what: &str, args: &[&str], dry_run: bool) -> Result<Option<String>, EngineError> {
    retry_blocking(self.retry_policy, what, || self.docker(args, dry_run))
  }

  fn inspect_format(&self, tag: &str, format: &str, dry_run: bool) -> Result<Option<String>, EngineError> {
    self.docker(&["inspect", "-f", format, tag], dry_run)
  }
}

impl ImageEngine for DockerCli<'_> {
  fn build(&self, request: &BuildRequest<'_>, dry_run: bool) -> Result<Option<String>, EngineError> {
    let dockerfile = request.dockerfile.to_string_lossy().into_owned();
    let context = request.context.to_string_lossy().into_owned();

    let mut args: Vec<String> = vec!["build".into(), "--platform".into(), request.platform.into()];
    for tag in request.tags {
      args.push("-t".into());
      args.push(tag.clone());
    }
    for (key, value) in request.build_args {
      args.push("--build-arg".into());
      args.push(format!("{}={}", key, value));
    }
    args.extend(["-f".into(), dockerfile, context]);

    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    if request.retry {
      self.docker_with_retry("docker build", &args, dry_run)
    } else {
      self.docker(&args, dry_run)
    }
  }

  fn pull(&self, image: &str, platform: Option<&str>, dry_run: bool) -> Result<(), EngineError> {
    let mut args = vec!["pull"];
    if let Some(platform) = platform {
      args.extend(["--platform", platform]);
    }
    args.push(image);
    self.docker_with_retry("docker pull", &args, dry_run)?;
    Ok(())
  }

  fn push(&self, tag: &str, dry_run: bool) -> Result<(), EngineError> {
    info!(tag, "pushing image");
    self.docker_with_retry("docker push", &["push", tag], dry_run)?;
    Ok(())
  }

  fn create_tag(&self, source: &str, tag: &str, dry_run: bool) -> Result<(), EngineError> {
    info!(source, tag, "tagging image");
    self.docker(&["tag", source, tag], dry_run)?;
    Ok(())
  }

  fn get_created_date(&self, tag: &str, dry_run: bool) -> Result<DateTime<Utc>, EngineError> {
    let Some(output) = self.inspect_format(tag, "{{ .Created }}", dry_run)? else {
      return Ok(DateTime::<Utc>::default());
    };

    DateTime::parse_from_rfc3339(output.trim())
      .map(|date| date.with_timezone(&Utc))
      .map_err(|_| EngineError::InvalidOutput {
        tag: tag.to_string(),
        what: "created date",
        output,
      })
  }

  fn get_image_arch(&self, tag: &str, dry_run: bool) -> Result<Option<ImageArch>, EngineError> {
    let Some(output) = self.inspect_format(tag, "{{ .Architecture }}/{{ .Variant }}", dry_run)? else {
      return Ok(None);
    };

    parse_arch(&output)
      .map(Some)
      .ok_or_else(|| EngineError::InvalidOutput {
        tag: tag.to_string(),
        what: "architecture",
        output,
      })
  }

  fn get_image_manifest_layers(&self, tag: &str, dry_run: bool) -> Result<Vec<String>, EngineError> {
    Ok(get_image_layers(self.inspector, tag, dry_run)?)
  }
}

/// Parse `arch/variant` as printed by `docker inspect`.
fn parse_arch(output: &str) -> Option<ImageArch> {
  let (arch, variant) = output.trim().split_once('/').unwrap_or((output.trim(), ""));
  let architecture = arch.parse::<Architecture>().ok()?;
  let variant = Some(variant.trim()).filter(|v| !v.is_empty() && *v != "<no value>").map(str::to_string);
  Some(ImageArch { architecture, variant })
}
