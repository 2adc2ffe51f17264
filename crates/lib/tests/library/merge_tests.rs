//! Merging and pruning image info against a real manifest.

use imagebuilder_lib::image_info::{
  ImageArtifactDetails, ImageInfoError, ImageInfoMergeOptions, merge, remove_out_of_date_content, storage,
};

use super::common::ManifestDir;

const MANIFEST: &str = r#"{
  "registry": "mcr.microsoft.com",
  "repos": [{
    "name": "dotnet/runtime",
    "images": [
      {
        "productVersion": "6.0",
        "sharedTags": { "6.0": {} },
        "platforms": [
          { "dockerfile": "runtime/6.0/focal/amd64", "os": "linux", "osVersion": "focal", "architecture": "amd64",
            "tags": { "6.0-focal-amd64": {} } }
        ]
      },
      {
        "productVersion": "7.0",
        "sharedTags": { "7.0": {}, "latest": {} },
        "platforms": [
          { "dockerfile": "runtime/7.0/jammy/amd64", "os": "linux", "osVersion": "jammy", "architecture": "amd64",
            "tags": { "7.0-jammy-amd64": {} } }
        ]
      }
    ]
  }]
}"#;

fn manifest_dir() -> ManifestDir {
  ManifestDir::new(MANIFEST)
    .with_dockerfile("runtime/6.0/focal/amd64", "FROM ubuntu:focal\n")
    .with_dockerfile("runtime/7.0/jammy/amd64", "FROM ubuntu:jammy\n")
}

fn record(json: &str) -> ImageArtifactDetails {
  storage::from_json(json).unwrap()
}

const PUBLISHED: &str = r#"{
  "repos": [
    {
      "repo": "dotnet/runtime",
      "images": [
        {
          "productVersion": "6.0",
          "manifest": { "sharedTags": ["6.0"] },
          "platforms": [
            { "dockerfile": "runtime/6.0/focal/amd64/Dockerfile", "simpleTags": ["6.0-focal-amd64"],
              "digest": "mcr.microsoft.com/dotnet/runtime@sha256:six", "osType": "Linux", "osVersion": "focal",
              "architecture": "amd64", "commitUrl": "u6", "layers": [] },
            { "dockerfile": "runtime/6.0/bionic/amd64/Dockerfile", "simpleTags": ["6.0-bionic-amd64"],
              "digest": "mcr.microsoft.com/dotnet/runtime@sha256:gone", "osType": "Linux", "osVersion": "bionic",
              "architecture": "amd64", "commitUrl": "ub", "layers": [] }
          ]
        },
        {
          "productVersion": "5.0",
          "manifest": { "sharedTags": ["5.0"] },
          "platforms": [
            { "dockerfile": "runtime/5.0/focal/amd64/Dockerfile", "simpleTags": ["5.0-focal-amd64"],
              "digest": "mcr.microsoft.com/dotnet/runtime@sha256:five", "osType": "Linux", "osVersion": "focal",
              "architecture": "amd64", "commitUrl": "u5", "layers": [] }
          ]
        }
      ]
    },
    { "repo": "dotnet/retired", "images": [] }
  ]
}"#;

mod prune {
  use super::*;

  #[test]
  fn removes_repos_images_and_platforms_not_in_manifest() {
    let dir = manifest_dir();
    let manifest = dir.load();
    let mut published = record(PUBLISHED);

    remove_out_of_date_content(&mut published, &manifest).unwrap();

    assert_eq!(published.repos.len(), 1);
    let repo = &published.repos[0];
    assert_eq!(repo.repo, "dotnet/runtime");
    assert_eq!(repo.images.len(), 1);
    assert_eq!(repo.images[0].product_version.as_deref(), Some("6.0"));
    assert_eq!(repo.images[0].platforms.len(), 1);
    assert_eq!(repo.images[0].platforms[0].os_version, "focal");
  }

  #[test]
  fn nothing_left_is_an_error() {
    let dir = manifest_dir();
    let manifest = dir.load();
    let mut published = record(r#"{ "repos": [{ "repo": "dotnet/retired", "images": [] }] }"#);

    assert!(matches!(
      remove_out_of_date_content(&mut published, &manifest),
      Err(ImageInfoError::EmptyResult)
    ));
  }
}

mod merge_records {
  use super::*;

  const FRESH_SIX: &str = r#"{
    "repos": [{
      "repo": "dotnet/runtime",
      "images": [{
        "productVersion": "6.0",
        "manifest": { "sharedTags": ["6.0", "6.0.1"] },
        "platforms": [
          { "dockerfile": "runtime/6.0/focal/amd64/Dockerfile", "simpleTags": ["6.0.1-focal-amd64"],
            "digest": "mcr.microsoft.com/dotnet/runtime@sha256:new", "osType": "Linux", "osVersion": "focal",
            "architecture": "amd64", "commitUrl": "u6-new", "layers": ["sha256:l"] }
        ]
      }]
    }]
  }"#;

  #[test]
  fn replace_tags_overwrites_tag_lists() {
    let dir = manifest_dir();
    let manifest = dir.load();
    let mut published = record(PUBLISHED);
    remove_out_of_date_content(&mut published, &manifest).unwrap();

    merge(
      &record(FRESH_SIX),
      &mut published,
      &ImageInfoMergeOptions {
        replace_tags: true,
        manifest: Some(&manifest),
      },
    );

    let image = &published.repos[0].images[0];
    assert_eq!(image.shared_tags(), vec!["6.0", "6.0.1"]);
    let platform = &image.platforms[0];
    assert_eq!(platform.simple_tags, vec!["6.0.1-focal-amd64"]);
    assert_eq!(platform.digest, "mcr.microsoft.com/dotnet/runtime@sha256:new");
    assert_eq!(platform.commit_url, "u6-new");
    assert_eq!(platform.layers, vec!["sha256:l"]);
  }

  #[test]
  fn union_keeps_existing_tags() {
    let dir = manifest_dir();
    let manifest = dir.load();
    let mut published = record(PUBLISHED);

    merge(
      &record(FRESH_SIX),
      &mut published,
      &ImageInfoMergeOptions {
        replace_tags: false,
        manifest: Some(&manifest),
      },
    );

    let platform = &published.repos[0].images[0].platforms[0];
    assert_eq!(platform.simple_tags, vec!["6.0-focal-amd64", "6.0.1-focal-amd64"]);
  }

  #[test]
  fn new_image_is_appended() {
    let dir = manifest_dir();
    let manifest = dir.load();
    let mut published = record(PUBLISHED);
    let fresh = record(
      r#"{ "repos": [{ "repo": "dotnet/runtime", "images": [{
        "productVersion": "7.0",
        "manifest": { "sharedTags": ["7.0", "latest"] },
        "platforms": [
          { "dockerfile": "runtime/7.0/jammy/amd64/Dockerfile", "simpleTags": ["7.0-jammy-amd64"],
            "digest": "d7", "osType": "Linux", "osVersion": "jammy", "architecture": "amd64",
            "commitUrl": "u7", "layers": [] }
        ] }] }] }"#,
    );

    merge(
      &fresh,
      &mut published,
      &ImageInfoMergeOptions {
        replace_tags: true,
        manifest: Some(&manifest),
      },
    );

    let versions: Vec<Option<&str>> = published.repos[0]
      .images
      .iter()
      .map(|i| i.product_version.as_deref())
      .collect();
    assert_eq!(versions, vec![Some("6.0"), Some("5.0"), Some("7.0")]);
  }
}

mod directory {
  use super::*;

  #[test]
  fn merges_every_json_file() {
    let dir = manifest_dir();
    let manifest = dir.load();
    let infos = dir.path().join("infos");
    std::fs::create_dir_all(&infos).unwrap();
    std::fs::write(infos.join("a.json"), PUBLISHED).unwrap();
    std::fs::write(
      infos.join("b.json"),
      r#"{ "repos": [{ "repo": "dotnet/runtime", "images": [{
        "productVersion": "6.0",
        "manifest": { "sharedTags": ["6.0"] },
        "platforms": [
          { "dockerfile": "runtime/6.0/focal/amd64/Dockerfile", "simpleTags": ["6.0-focal"],
            "digest": "d", "osType": "Linux", "osVersion": "focal", "architecture": "amd64",
            "commitUrl": "u", "layers": [] }
        ] }] }] }"#,
    )
    .unwrap();
    std::fs::write(infos.join("notes.txt"), "ignored").unwrap();

    let merged = storage::merge_directory(&infos, &manifest).unwrap();

    let repo = merged.find_repo("dotnet/runtime").unwrap();
    let focal = &repo.images[0].platforms[0];
    assert_eq!(focal.simple_tags, vec!["6.0-focal", "6.0-focal-amd64"]);
    assert_eq!(focal.digest, "d");
  }

  #[test]
  fn empty_directory_is_an_error() {
    let dir = manifest_dir();
    let manifest = dir.load();
    let infos = dir.path().join("infos");
    std::fs::create_dir_all(&infos).unwrap();

    assert!(matches!(
      storage::merge_directory(&infos, &manifest),
      Err(ImageInfoError::NoSourceFiles(_))
    ));
  }
}
