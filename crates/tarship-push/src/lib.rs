//! # tarship-push
//!
//! Pushes previously exported container image archives (docker-save style
//! tarballs) to a Docker/OCI distribution API v2 registry, without a local
//! container runtime or daemon.
//!
//! The pipeline: extract the archive into a scratch directory (resolving
//! symlinks by copy), read its `manifest.json`, then for every declared
//! repo:tag probe each blob and upload the missing ones in 2 MiB chunks
//! before publishing the distribution manifest.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod push;
pub mod registry;
pub mod upload;

pub use archive::{ScratchDir, extract_archive};
pub use error::{PushError, Result};
pub use manifest::{ArchiveManifestEntry, Descriptor, DistributionManifest, ImageRef};
pub use push::{ImagePusher, PushConfig};
pub use registry::{Registry, RegistryAuth, RegistryClient};
