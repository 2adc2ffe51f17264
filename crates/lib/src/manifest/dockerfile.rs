//! Dockerfile FROM analysis.
//!
//! Only what the orchestrator needs is extracted: the image each stage is
//! based on (with `ARG` substitution applied), stage aliases, and the base
//! image of the final stage.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};

static FROM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)^\s*FROM\s+(?:--platform=\S+\s+)?(?P<image>\S+)(?:\s+AS\s+(?P<stage>\S+))?\s*$").expect("valid regex")
});

static ARG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)^\s*ARG\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?:=(?P<value>\S*))?\s*$").expect("valid regex")
});

static VARIABLE_REGEX: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\$\{(?P<braced>[A-Za-z_][A-Za-z0-9_]*)\}|\$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));

/// A single `FROM` instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromInstruction {
  pub image: String,
  pub stage_name: Option<String>,
}

/// Result of analyzing a Dockerfile's stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DockerfileStages {
  pub instructions: Vec<FromInstruction>,
}

impl DockerfileStages {
  /// Parse the FROM instructions of a Dockerfile.
  ///
  /// Global `ARG` defaults declared before the first `FROM` are substituted,
  /// with `build_args` taking precedence over those defaults.
  pub fn parse(content: &str, build_args: &BTreeMap<String, String>) -> Self {
    let mut defaults: HashMap<String, String> = HashMap::new();
    let mut instructions = Vec::new();

    for line in content.lines() {
      if instructions.is_empty() {
        if let Some(caps) = ARG_REGEX.captures(line) {
          let value = caps.name("value").map(|v| v.as_str().to_string()).unwrap_or_default();
          defaults.insert(caps["name"].to_string(), value);
          continue;
        }
      }

      if let Some(caps) = FROM_REGEX.captures(line) {
        let image = substitute_args(&caps["image"], build_args, &defaults);
        instructions.push(FromInstruction {
          image,
          stage_name: caps.name("stage").map(|s| s.as_str().to_string()),
        });
      }
    }

    Self { instructions }
  }

  fn stage_names(&self) -> HashSet<String> {
    self
      .instructions
      .iter()
      .filter_map(|i| i.stage_name.as_ref().map(|s| s.to_ascii_lowercase()))
      .collect()
  }

  fn is_stage_reference(&self, image: &str, stage_names: &HashSet<String>) -> bool {
    stage_names.contains(&image.to_ascii_lowercase())
  }

  /// Distinct external images referenced by FROM, in order of appearance.
  ///
  /// References to earlier stages and `scratch` are excluded.
  pub fn from_images(&self) -> Vec<String> {
    let stage_names = self.stage_names();
    let mut seen = HashSet::new();
    self
      .instructions
      .iter()
      .map(|i| i.image.as_str())
      .filter(|image| !image.eq_ignore_ascii_case("scratch") && !self.is_stage_reference(image, &stage_names))
      .filter(|image| seen.insert(image.to_string()))
      .map(str::to_string)
      .collect()
  }

  /// Image the final stage is ultimately based on.
  ///
  /// Stage aliases are followed back to a real image; `None` for `scratch`
  /// or a Dockerfile with no FROM.
  pub fn final_stage_from_image(&self) -> Option<String> {
    let mut image = self.instructions.last()?.image.clone();
    let mut hops = 0;

    while let Some(stage) = self
      .instructions
      .iter()
      .find(|i| i.stage_name.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(&image)))
    {
      image = stage.image.clone();
      hops += 1;
      if hops > self.instructions.len() {
        return None;
      }
    }

    if image.eq_ignore_ascii_case("scratch") { None } else { Some(image) }
  }
}

fn substitute_args(value: &str, build_args: &BTreeMap<String, String>, defaults: &HashMap<String, String>) -> String {
  VARIABLE_REGEX
    .replace_all(value, |caps: &Captures| {
      let name = caps
        .name("braced")
        .or_else(|| caps.name("bare"))
        .map(|m| m.as_str())
        .unwrap_or_default();
      build_args
        .get(name)
        .or_else(|| defaults.get(name))
        .cloned()
        .unwrap_or_default()
    })
    .into_owned()
}
