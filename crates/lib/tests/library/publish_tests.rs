//! Publishing a fresh record into a (fake) remote repository.

use std::sync::atomic::Ordering;

use imagebuilder_lib::consts::PUBLISH_COMMIT_MESSAGE;
use imagebuilder_lib::git::GitOptions;
use imagebuilder_lib::image_info::storage;
use imagebuilder_lib::publish::{PublishError, PublishOptions, PublishOutcome, publish_image_info};
use imagebuilder_lib::retry::RetryPolicy;

use super::common::{FakeRepo, ManifestDir};

const MANIFEST: &str = r#"{
  "registry": "mcr.microsoft.com",
  "repos": [{
    "name": "dotnet/runtime",
    "images": [{
      "productVersion": "6.0",
      "sharedTags": { "6.0": {} },
      "platforms": [
        { "dockerfile": "runtime/6.0/focal/amd64", "os": "linux", "osVersion": "focal", "architecture": "amd64",
          "tags": { "6.0-focal-amd64": {} } }
      ]
    }]
  }]
}"#;

fn fresh_record(digest: &str) -> String {
  format!(
    r#"{{
  "repos": [{{
    "repo": "dotnet/runtime",
    "images": [{{
      "productVersion": "6.0",
      "manifest": {{ "sharedTags": ["6.0"] }},
      "platforms": [{{
        "dockerfile": "runtime/6.0/focal/amd64/Dockerfile",
        "simpleTags": ["6.0-focal-amd64"],
        "digest": "mcr.microsoft.com/dotnet/runtime@{digest}",
        "osType": "Linux",
        "osVersion": "focal",
        "architecture": "amd64",
        "commitUrl": "https://github.com/dotnet/dotnet-docker/blob/abc/runtime/6.0/focal/amd64/Dockerfile",
        "layers": [],
        "isUnchanged": true
      }}]
    }}]
  }}]
}}"#
  )
}

struct Fixture {
  dir: ManifestDir,
  options: PublishOptions,
}

fn fixture(fresh: &str) -> Fixture {
  let dir = ManifestDir::new(MANIFEST).with_dockerfile("runtime/6.0/focal/amd64", "FROM ubuntu:focal\n");
  let image_info_path = dir.write_file("image-info.json", fresh);
  Fixture {
    dir,
    options: PublishOptions {
      image_info_path,
      git: GitOptions {
        owner: "dotnet".to_string(),
        repo: "versions".to_string(),
        branch: "main".to_string(),
        path: "build-info/docker/image-info.json".to_string(),
        token: Some("token".to_string()),
        ..Default::default()
      },
      dry_run: false,
      retry: RetryPolicy::immediate(3),
    },
  }
}

/// What the publish step writes for a record: indented JSON plus a newline.
fn serialized(json: &str) -> String {
  let mut details = storage::from_json(json).unwrap();
  details.strip_internal_state();
  let mut content = storage::to_json(&details).unwrap();
  content.push('\n');
  content
}

#[tokio::test]
async fn first_publish_commits_fresh_record() {
  let fixture = fixture(&fresh_record("sha256:one"));
  let manifest = fixture.dir.load();
  let repo = FakeRepo::new(None);

  let outcome = publish_image_info(&manifest, &fixture.options, &repo).await.unwrap();

  assert_eq!(
    outcome,
    PublishOutcome::Updated {
      commit_url: "https://github.com/dotnet/versions/commit/commit0".to_string()
    }
  );
  let commits = repo.commits.lock().unwrap();
  assert_eq!(commits.len(), 1);
  assert_eq!(commits[0].0, PUBLISH_COMMIT_MESSAGE);
  assert_eq!(commits[0].1, serialized(&fresh_record("sha256:one")));
  assert!(!commits[0].1.contains("isUnchanged"));
}

#[tokio::test]
async fn identical_content_is_not_committed() {
  let fixture = fixture(&fresh_record("sha256:one"));
  let manifest = fixture.dir.load();
  let published = serialized(&fresh_record("sha256:one"));
  let repo = FakeRepo::new(Some(&published));

  let outcome = publish_image_info(&manifest, &fixture.options, &repo).await.unwrap();

  assert_eq!(outcome, PublishOutcome::NoChanges);
  assert_eq!(repo.commit_attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dry_run_returns_merged_content() {
  let mut fixture = fixture(&fresh_record("sha256:two"));
  fixture.options.dry_run = true;
  let manifest = fixture.dir.load();
  let published = serialized(&fresh_record("sha256:one"));
  let repo = FakeRepo::new(Some(&published));

  let outcome = publish_image_info(&manifest, &fixture.options, &repo).await.unwrap();

  match outcome {
    PublishOutcome::DryRun { content } => {
      assert!(content.contains("mcr.microsoft.com/dotnet/runtime@sha256:two"));
      assert!(!content.contains("sha256:one"));
    }
    other => panic!("unexpected outcome: {other:?}"),
  }
  assert_eq!(repo.commit_attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stale_published_content_is_pruned() {
  let fixture = fixture(&fresh_record("sha256:two"));
  let manifest = fixture.dir.load();
  let published = fresh_record("sha256:one").replacen(
    r#""repos": ["#,
    r#""repos": [{ "repo": "dotnet/retired", "images": [] },"#,
    1,
  );
  let repo = FakeRepo::new(Some(&published));

  publish_image_info(&manifest, &fixture.options, &repo).await.unwrap();

  let commits = repo.commits.lock().unwrap();
  assert!(!commits[0].1.contains("dotnet/retired"));
  assert_eq!(commits[0].1, serialized(&fresh_record("sha256:two")));
}

#[tokio::test]
async fn transient_commit_failures_are_retried() {
  let fixture = fixture(&fresh_record("sha256:one"));
  let manifest = fixture.dir.load();
  let repo = FakeRepo {
    transient_failures: 2,
    ..FakeRepo::new(None)
  };

  let outcome = publish_image_info(&manifest, &fixture.options, &repo).await.unwrap();

  assert_eq!(repo.commit_attempts.load(Ordering::SeqCst), 3);
  assert!(matches!(outcome, PublishOutcome::Updated { commit_url } if commit_url.ends_with("/commit2")));
}

#[tokio::test]
async fn retries_are_bounded() {
  let fixture = fixture(&fresh_record("sha256:one"));
  let manifest = fixture.dir.load();
  let repo = FakeRepo {
    transient_failures: 10,
    ..FakeRepo::new(None)
  };

  let result = publish_image_info(&manifest, &fixture.options, &repo).await;

  assert!(matches!(result, Err(PublishError::Git(_))), "unexpected result: {result:?}");
  assert_eq!(repo.commit_attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn missing_fresh_record_fails() {
  let mut fixture = fixture(&fresh_record("sha256:one"));
  fixture.options.image_info_path = fixture.dir.file("missing.json");
  let manifest = fixture.dir.load();
  let repo = FakeRepo::new(None);

  let result = publish_image_info(&manifest, &fixture.options, &repo).await;

  assert!(matches!(result, Err(PublishError::ImageInfo(_))));
}
