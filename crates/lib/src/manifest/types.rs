//! Serialized manifest types.
//!
//! These mirror the JSON manifest file one-to-one. The loaded, resolved view
//! used by the rest of the crate lives in [`super::info`].
//!
//! # Example
//!
//! ```json
//! {
//!   "registry": "mcr.microsoft.com",
//!   "repos": [{
//!     "name": "dotnet/sdk",
//!     "images": [{
//!       "productVersion": "6.0",
//!       "sharedTags": { "6.0": {} },
//!       "platforms": [{
//!         "dockerfile": "src/sdk/6.0/focal/amd64",
//!         "os": "linux",
//!         "osVersion": "focal",
//!         "architecture": "amd64",
//!         "tags": { "6.0-focal-amd64": {} }
//!       }]
//!     }]
//!   }]
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestModel {
  /// Registry the images are published to (e.g. `mcr.microsoft.com`).
  pub registry: String,
  #[serde(default)]
  pub repos: Vec<RepoModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoModel {
  /// Registry-unqualified repo name (e.g. `dotnet/sdk`).
  pub name: String,
  #[serde(default)]
  pub images: Vec<ImageModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageModel {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub product_version: Option<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub shared_tags: BTreeMap<String, TagModel>,
  #[serde(default)]
  pub platforms: Vec<PlatformModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformModel {
  /// Dockerfile path, or a directory containing a `Dockerfile`, relative to the manifest.
  pub dockerfile: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub build_context: Option<String>,
  pub os: OsType,
  #[serde(default)]
  pub os_version: String,
  #[serde(default)]
  pub architecture: Architecture,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub variant: Option<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub build_args: BTreeMap<String, String>,
  #[serde(default)]
  pub tags: BTreeMap<String, TagModel>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub package_query_overrides: Option<PackageQueryOverrides>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagModel {
  /// Local tags exist only for the duration of a build and are never pushed.
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub is_local: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageQueryOverrides {
  /// Script (relative to the manifest) used instead of the default installed-packages script.
  pub get_installed_packages_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
  Linux,
  Windows,
}

impl OsType {
  /// Name used in image info and platform identity (`Linux`, `Windows`).
  pub fn display_name(self) -> &'static str {
    match self {
      OsType::Linux => "Linux",
      OsType::Windows => "Windows",
    }
  }

  /// Name used by the container engine (`linux`, `windows`).
  pub fn docker_name(self) -> &'static str {
    match self {
      OsType::Linux => "linux",
      OsType::Windows => "windows",
    }
  }
}

impl fmt::Display for OsType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.display_name())
  }
}

impl FromStr for OsType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "linux" => Ok(OsType::Linux),
      "windows" => Ok(OsType::Windows),
      other => Err(format!("unknown OS type: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
  #[default]
  Amd64,
  Arm,
  Arm64,
}

impl Architecture {
  /// Name used in image info and platform identity.
  pub fn display_name(self) -> &'static str {
    match self {
      Architecture::Amd64 => "amd64",
      Architecture::Arm => "arm32",
      Architecture::Arm64 => "arm64",
    }
  }

  /// Name used by the container engine.
  pub fn docker_name(self) -> &'static str {
    match self {
      Architecture::Amd64 => "amd64",
      Architecture::Arm => "arm",
      Architecture::Arm64 => "arm64",
    }
  }
}

impl fmt::Display for Architecture {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.docker_name())
  }
}

impl FromStr for Architecture {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "amd64" | "x86_64" | "x64" => Ok(Architecture::Amd64),
      "arm" | "arm32" => Ok(Architecture::Arm),
      "arm64" | "aarch64" => Ok(Architecture::Arm64),
      other => Err(format!("unknown architecture: {}", other)),
    }
  }
}
