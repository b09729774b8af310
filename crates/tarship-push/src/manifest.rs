//! Archive and distribution manifest types.
//!
//! Two manifests are involved in a push: the archive's own `manifest.json`
//! (docker-save format, PascalCase keys) describing what the tarball holds,
//! and the distribution manifest (schema 2, camelCase keys) published to the
//! registry to tie config and layers to a tag.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::digest::file_sha256;
use crate::error::{PushError, Result};

// Well-known media types (Docker schema 2).
pub const MEDIA_TYPE_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_IMAGE_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
pub const MEDIA_TYPE_UNCOMPRESSED_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar";

/// Distribution manifest schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// One image description inside an archive's `manifest.json`.
///
/// An archive may contain several entries (multiple images exported at once).
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveManifestEntry {
    /// Path of the image config blob, relative to the archive root.
    #[serde(rename = "Config")]
    pub config: String,
    /// `name:tag` strings this image should be published under.
    #[serde(rename = "RepoTags")]
    pub repo_tags: Vec<String>,
    /// Layer blob paths in application order, relative to the archive root.
    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
}

/// Reads and parses `manifest.json` from the extracted archive root.
///
/// # Errors
///
/// Returns [`PushError::ManifestUnreadable`] if the file is missing and
/// [`PushError::ManifestMalformed`] if it does not parse.
pub fn read_archive_manifest(extracted_root: &Path) -> Result<Vec<ArchiveManifestEntry>> {
    let path = extracted_root.join("manifest.json");
    let data = fs::read(&path).map_err(|source| PushError::ManifestUnreadable {
        path: path.clone(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| PushError::ManifestMalformed { path, source })
}

/// Repository and tag parsed from a `name:tag` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Repository name, possibly including a registry host prefix.
    pub repository: String,
    /// Tag, defaulting to `latest`.
    pub tag: String,
}

impl ImageRef {
    /// Parses a `name:tag` string; the tag defaults to `latest`.
    ///
    /// A colon inside the name part (a registry port such as
    /// `localhost:5000/app`) is only treated as a tag separator when it
    /// follows the last `/`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let slash = s.rfind('/').map_or(0, |i| i + 1);
        match s[slash..].rfind(':') {
            Some(idx) => Self {
                repository: s[..slash + idx].to_string(),
                tag: s[slash + idx + 1..].to_string(),
            },
            None => Self {
                repository: s.to_string(),
                tag: "latest".to_string(),
            },
        }
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Content descriptor referencing a blob by digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type.
    pub media_type: String,
    /// Content size in bytes.
    pub size: u64,
    /// Content digest, `sha256:<hex>`.
    pub digest: String,
}

impl Descriptor {
    /// Builds a descriptor by hashing a file's full contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_file(path: &Path, media_type: &str) -> Result<Self> {
        let size = fs::metadata(path)?.len();
        let digest = format!("sha256:{}", file_sha256(path)?);
        Ok(Self {
            media_type: media_type.to_string(),
            size,
            digest,
        })
    }
}

/// Distribution manifest published to the registry for a tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionManifest {
    /// Schema version (always 2).
    pub schema_version: u32,
    /// Manifest media type.
    pub media_type: String,
    /// Config blob descriptor.
    pub config: Descriptor,
    /// Layer descriptors in archive-declared order.
    pub layers: Vec<Descriptor>,
}

impl DistributionManifest {
    /// Builds a manifest from the config file and ordered layer files.
    ///
    /// Layer order must match the archive's declared order; registries and
    /// downstream pulls depend on it.
    ///
    /// # Errors
    ///
    /// Returns an error if any referenced file cannot be read.
    pub fn from_files(config_path: &Path, layer_paths: &[impl AsRef<Path>]) -> Result<Self> {
        let config = Descriptor::from_file(config_path, MEDIA_TYPE_IMAGE_CONFIG)?;
        let layers = layer_paths
            .iter()
            .map(|p| Descriptor::from_file(p.as_ref(), MEDIA_TYPE_UNCOMPRESSED_LAYER))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            schema_version: SCHEMA_VERSION,
            media_type: MEDIA_TYPE_MANIFEST.to_string(),
            config,
            layers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_archive_manifest() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("manifest.json"),
            r#"[{"Config":"config.json","RepoTags":["demo:v1","demo:latest"],"Layers":["l1/layer.tar","l2/layer.tar"]}]"#,
        )
        .unwrap();

        let entries = read_archive_manifest(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].config, "config.json");
        assert_eq!(entries[0].repo_tags, vec!["demo:v1", "demo:latest"]);
        assert_eq!(entries[0].layers, vec!["l1/layer.tar", "l2/layer.tar"]);
    }

    #[test]
    fn test_missing_manifest_is_unreadable() {
        let dir = tempdir().unwrap();
        let result = read_archive_manifest(dir.path());
        assert!(matches!(result, Err(PushError::ManifestUnreadable { .. })));
    }

    #[test]
    fn test_bad_manifest_is_malformed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("manifest.json"), b"{not json").unwrap();
        let result = read_archive_manifest(dir.path());
        assert!(matches!(result, Err(PushError::ManifestMalformed { .. })));
    }

    #[test]
    fn test_image_ref_parse() {
        let r = ImageRef::parse("demo:v1");
        assert_eq!(r.repository, "demo");
        assert_eq!(r.tag, "v1");

        let r = ImageRef::parse("demo");
        assert_eq!(r.repository, "demo");
        assert_eq!(r.tag, "latest");

        let r = ImageRef::parse("localhost:5000/app");
        assert_eq!(r.repository, "localhost:5000/app");
        assert_eq!(r.tag, "latest");

        let r = ImageRef::parse("localhost:5000/app:v2");
        assert_eq!(r.repository, "localhost:5000/app");
        assert_eq!(r.tag, "v2");
    }

    #[test]
    fn test_manifest_serialization_shape() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config.json");
        let layer = dir.path().join("layer.tar");
        fs::write(&config, b"{}").unwrap();
        fs::write(&layer, b"layer bytes").unwrap();

        let manifest = DistributionManifest::from_files(&config, &[&layer]).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&serde_json::to_vec(&manifest).unwrap()).unwrap();

        assert_eq!(json["schemaVersion"], 2);
        assert_eq!(json["mediaType"], MEDIA_TYPE_MANIFEST);
        assert_eq!(json["config"]["mediaType"], MEDIA_TYPE_IMAGE_CONFIG);
        assert_eq!(json["config"]["size"], 2);
        assert_eq!(json["layers"][0]["mediaType"], MEDIA_TYPE_UNCOMPRESSED_LAYER);
        assert_eq!(json["layers"][0]["size"], 11);
        assert!(json["layers"][0]["digest"]
            .as_str()
            .unwrap()
            .starts_with("sha256:"));
    }
}
