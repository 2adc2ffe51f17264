//! Constants shared across the crate.

/// Docker manifest list media type.
pub const MANIFEST_LIST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// Docker single-manifest media type.
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// OCI image index media type (treated like a manifest list).
pub const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// OCI image manifest media type (treated like a single manifest).
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Default Dockerfile name used when a manifest points at a directory.
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Suffix for the scratch copy of a Dockerfile whose FROM lines were rewritten.
pub const SCRATCH_DOCKERFILE_SUFFIX: &str = ".temp";

/// Directory (inside a build context) holding pre/post build hooks.
pub const HOOKS_DIR: &str = "hooks";

/// Build output marker indicating the engine pulled an image during a build.
pub const IMPLICIT_PULL_MARKER: &str = "Pulling from";

/// Commit message used when publishing image info.
pub const PUBLISH_COMMIT_MESSAGE: &str = "Merging Docker image info updates from build";

/// Environment variable holding the source control token.
pub const GIT_TOKEN_ENV: &str = "IMAGEBUILDER_GIT_TOKEN";
