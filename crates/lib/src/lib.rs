//! imagebuilder-lib: Core types and logic for imagebuilder
//!
//! This crate provides the pieces used by the `imagebuilder` CLI:
//! - `manifest`: the read-only model of repos, images and platforms to build
//! - `image_info`: the persisted record of build results, plus the merge engine
//! - `registry`: image reference helpers, manifest inspection and the digest cache
//! - `engine`: the container engine abstraction
//! - `build`: the build orchestrator (cache reuse, builds, pushes, image info)
//! - `publish`: merging a fresh record into the published copy in source control

pub mod build;
pub mod consts;
pub mod engine;
pub mod git;
pub mod image_info;
pub mod manifest;
pub mod process;
pub mod publish;
pub mod registry;
pub mod retry;
