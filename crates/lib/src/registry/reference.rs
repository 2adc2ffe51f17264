//! Helpers for manipulating image references.
//!
//! References take the forms `registry/repo:tag`, `repo:tag` and
//! `registry/repo@sha256:...`. Nothing here talks to a registry; these are
//! pure string transformations used to qualify and re-qualify tags and digests.

/// Returns the registry component of an image reference, if it has one.
///
/// The first path segment is treated as a registry when it contains a `.` or
/// `:` or is `localhost`, matching the engine's own parsing rules.
pub fn get_registry(image: &str) -> Option<&str> {
  let (first, _) = image.split_once('/')?;
  if first.contains('.') || first.contains(':') || first == "localhost" {
    Some(first)
  } else {
    None
  }
}

/// Returns true if the image reference lives in the given registry.
pub fn is_in_registry(image: &str, registry: &str) -> bool {
  !registry.is_empty() && image.len() > registry.len() && image.starts_with(registry) && image[registry.len()..].starts_with('/')
}

/// Removes the registry component of an image reference, if present.
pub fn trim_registry(image: &str) -> &str {
  match get_registry(image) {
    Some(registry) => &image[registry.len() + 1..],
    None => image,
  }
}

/// Returns the repository part of a reference (drops any tag or digest).
pub fn get_repo(image: &str) -> &str {
  if let Some((repo, _)) = image.split_once('@') {
    return repo;
  }

  let last_slash = image.rfind('/').map(|i| i + 1).unwrap_or(0);
  match image[last_slash..].rfind(':') {
    Some(colon) => &image[..last_slash + colon],
    None => image,
  }
}

/// Returns the tag/digest suffix of a reference including its separator
/// (e.g. `:6.0` or `@sha256:abc`), or an empty string.
fn reference_suffix(image: &str) -> &str {
  &image[get_repo(image).len()..]
}

/// Replaces the repository of a reference while keeping its tag or digest.
pub fn replace_repo(image: &str, new_repo: &str) -> String {
  format!("{}{}", new_repo, reference_suffix(image))
}

/// Returns the sha portion of a digest reference (`repo@sha256:abc` -> `sha256:abc`).
///
/// A bare sha is returned unchanged.
pub fn get_digest_sha(digest: &str) -> &str {
  match digest.split_once('@') {
    Some((_, sha)) => sha,
    None => digest,
  }
}

/// Formats a digest reference from a repository and sha.
pub fn get_digest_string(repo: &str, sha: &str) -> String {
  format!("{}@{}", repo, sha)
}

/// Builds an image name from its parts.
pub fn get_image_name(registry: Option<&str>, repo: &str, tag: Option<&str>, digest: Option<&str>) -> String {
  let mut name = match registry {
    Some(registry) if !registry.is_empty() => format!("{}/{}", registry, repo),
    _ => repo.to_string(),
  };

  if let Some(tag) = tag {
    name.push(':');
    name.push_str(tag);
  } else if let Some(digest) = digest {
    name.push('@');
    name.push_str(digest);
  }

  name
}

/// Normalizes a Docker Hub reference to its explicit `library/` form.
///
/// `ubuntu:20.04` becomes `library/ubuntu:20.04`; references with a registry or
/// an organization are returned unchanged.
pub fn normalize_repo(image: &str) -> String {
  if get_registry(image).is_none() && !get_repo(image).contains('/') {
    format!("library/{}", image)
  } else {
    image.to_string()
  }
}
