//! Push orchestration.
//!
//! Drives the full pipeline for one archive: extract into a scratch
//! directory, read the archive manifest, then for every entry and every
//! declared repo:tag push layers in order, push the config blob, and publish
//! the distribution manifest. The run is fail-fast: the first layer, config,
//! or publish error aborts the whole push, including remaining tags of the
//! same entry. The scratch directory is removed whether the push succeeds or
//! not.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::archive::{ScratchDir, extract_archive};
use crate::error::Result;
use crate::manifest::{DistributionManifest, ImageRef, read_archive_manifest};
use crate::registry::{Registry, RegistryAuth, RegistryClient};
use crate::upload::push_blob;

/// Everything the push pipeline needs from the caller.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Path of the exported image archive.
    pub archive_path: PathBuf,
    /// Registry base endpoint, e.g. `https://registry.example:5000`.
    pub registry_endpoint: String,
    /// Basic auth username.
    pub username: String,
    /// Basic auth password.
    pub password: String,
    /// Accept self-signed registry certificates.
    pub skip_tls_verify: bool,
}

/// Pushes exported image archives to a registry.
pub struct ImagePusher<R: Registry> {
    registry: R,
}

impl ImagePusher<RegistryClient> {
    /// Creates a pusher talking to the configured registry endpoint.
    #[must_use]
    pub fn from_config(config: &PushConfig) -> Self {
        let auth = RegistryAuth {
            username: config.username.clone(),
            password: config.password.clone(),
        };
        Self::new(RegistryClient::new(
            &config.registry_endpoint,
            auth,
            config.skip_tls_verify,
        ))
    }
}

impl<R: Registry> ImagePusher<R> {
    /// Creates a pusher over an arbitrary registry implementation.
    #[must_use]
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    /// Pushes every image in the archive to its declared repo:tags.
    ///
    /// # Errors
    ///
    /// Returns the first extraction, manifest, probe, upload, or publish
    /// error; nothing is retried.
    pub async fn push(&self, archive_path: &Path) -> Result<()> {
        let scratch = ScratchDir::new()?;
        info!(
            archive = %archive_path.display(),
            scratch = %scratch.path().display(),
            "extracting archive"
        );
        extract_archive(archive_path, scratch.path())?;

        let entries = read_archive_manifest(scratch.path())?;
        info!(archive = %archive_path.display(), images = entries.len(), "pushing archive");

        for entry in &entries {
            for repo_tag in &entry.repo_tags {
                let reference = ImageRef::parse(repo_tag);
                self.push_image(scratch.path(), &reference, &entry.config, &entry.layers)
                    .await?;
            }
        }

        info!(archive = %archive_path.display(), "push complete");
        Ok(())
    }

    /// Pushes one image's layers, config, and manifest for a single tag.
    async fn push_image(
        &self,
        root: &Path,
        reference: &ImageRef,
        config: &str,
        layers: &[String],
    ) -> Result<()> {
        info!(image = %reference, "pushing image");

        let mut layer_paths = Vec::with_capacity(layers.len());
        for layer in layers {
            let layer_path = root.join(layer);
            push_blob(&self.registry, &reference.repository, &layer_path).await?;
            layer_paths.push(layer_path);
        }

        let config_path = root.join(config);
        push_blob(&self.registry, &reference.repository, &config_path).await?;

        info!(image = %reference, "publishing manifest");
        let manifest = DistributionManifest::from_files(&config_path, &layer_paths)?;
        let body = serde_json::to_vec(&manifest)?;
        self.registry
            .publish_manifest(
                &reference.repository,
                &reference.tag,
                &manifest.media_type,
                &body,
            )
            .await?;

        info!(image = %reference, "image pushed");
        Ok(())
    }
}
