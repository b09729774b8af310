//! Docker Registry v2 API client for blob uploads and manifest publication.
//!
//! The wire surface is expressed as the [`Registry`] trait so the upload and
//! push drivers can be exercised against a recording mock in tests; the real
//! implementation is [`RegistryClient`] over reqwest with basic auth on every
//! request.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use tracing::debug;

use crate::error::{PushError, Result};

/// Registry authentication credentials.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    /// Username.
    pub username: String,
    /// Password or token.
    pub password: String,
}

/// Wire operations the push pipeline needs from a registry.
///
/// Upload session locations are opaque strings handed back by the registry;
/// each chunk request returns the location the *next* request must target,
/// since registries may redirect in-progress uploads.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Checks whether a blob is already stored, by digest.
    ///
    /// A 404 is the expected absent-case signal, not an error.
    async fn blob_exists(&self, repository: &str, digest: &str) -> Result<bool>;

    /// Opens a new upload session and returns its location.
    async fn start_upload(&self, repository: &str) -> Result<String>;

    /// Appends a non-final chunk at `offset`, returning the updated location.
    async fn upload_chunk(&self, location: &str, offset: u64, chunk: &[u8]) -> Result<String>;

    /// Sends the final chunk together with the completed content digest.
    async fn finish_upload(
        &self,
        location: &str,
        digest: &str,
        offset: u64,
        chunk: &[u8],
    ) -> Result<()>;

    /// Publishes a serialized distribution manifest for a tag.
    async fn publish_manifest(
        &self,
        repository: &str,
        tag: &str,
        media_type: &str,
        body: &[u8],
    ) -> Result<()>;
}

/// Registry client speaking the distribution HTTP API v2.
pub struct RegistryClient {
    /// HTTP client.
    client: Client,
    /// Registry base endpoint, no trailing slash.
    endpoint: String,
    /// Basic auth credentials sent on every request.
    auth: RegistryAuth,
}

impl RegistryClient {
    /// Creates a client for the given base endpoint.
    ///
    /// A trailing `/` on the endpoint is stripped. With `skip_tls_verify`
    /// the client accepts self-signed certificates.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(endpoint: &str, auth: RegistryAuth, skip_tls_verify: bool) -> Self {
        let client = Client::builder()
            .user_agent(concat!("tarship/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(skip_tls_verify)
            .build()
            .expect("failed to create HTTP client");

        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            auth,
        }
    }

    /// Returns the configured base endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Resolves a possibly server-relative `Location` header value against
    /// the base endpoint.
    fn resolve_location(&self, location: &str) -> String {
        if location.starts_with('/') {
            format!("{}{}", self.endpoint, location)
        } else {
            location.to_string()
        }
    }

    /// Extracts and resolves the `Location` header of an upload response.
    fn location_of(&self, response: &reqwest::Response) -> Option<String> {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|l| self.resolve_location(l))
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(&self.auth.username, Some(&self.auth.password))
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn blob_exists(&self, repository: &str, digest: &str) -> Result<bool> {
        let url = format!("{}/v2/{}/blobs/{}", self.endpoint, repository, digest);
        debug!(url = %url, "HEAD blob");

        let response = self
            .authed(self.client.head(&url))
            .send()
            .await
            .map_err(|e| PushError::ProbeFailed {
                digest: digest.to_string(),
                reason: e.to_string(),
            })?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(PushError::ProbeFailed {
                digest: digest.to_string(),
                reason: format!("unexpected status {status}"),
            }),
        }
    }

    async fn start_upload(&self, repository: &str) -> Result<String> {
        let url = format!("{}/v2/{}/blobs/uploads/", self.endpoint, repository);
        debug!(url = %url, "POST upload session");

        let response = self
            .authed(self.client.post(&url))
            .send()
            .await
            .map_err(|e| PushError::UploadSessionFailed {
                repository: repository.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            return Err(PushError::UploadSessionFailed {
                repository: repository.to_string(),
                reason: format!("unexpected status {status}"),
            });
        }

        self.location_of(&response)
            .ok_or_else(|| PushError::UploadSessionFailed {
                repository: repository.to_string(),
                reason: "missing Location header".to_string(),
            })
    }

    async fn upload_chunk(&self, location: &str, offset: u64, chunk: &[u8]) -> Result<String> {
        let end = offset + chunk.len() as u64;
        debug!(url = %location, offset, end, "PATCH chunk");

        let response = self
            .authed(self.client.patch(location))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_RANGE, format!("{offset}-{end}"))
            .body(chunk.to_vec())
            .send()
            .await
            .map_err(|e| PushError::ChunkRejected {
                offset,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            return Err(PushError::ChunkRejected {
                offset,
                reason: format!("unexpected status {status}"),
            });
        }

        self.location_of(&response)
            .ok_or_else(|| PushError::ChunkRejected {
                offset,
                reason: "missing Location header".to_string(),
            })
    }

    async fn finish_upload(
        &self,
        location: &str,
        digest: &str,
        offset: u64,
        chunk: &[u8],
    ) -> Result<()> {
        let separator = if location.contains('?') { '&' } else { '?' };
        let url = format!("{location}{separator}digest={digest}");
        debug!(url = %url, offset, "PUT final chunk");

        let response = self
            .authed(self.client.put(&url))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(chunk.to_vec())
            .send()
            .await
            .map_err(|e| PushError::ChunkRejected {
                offset,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::CREATED {
            return Err(PushError::ChunkRejected {
                offset,
                reason: format!("unexpected status {status}"),
            });
        }
        Ok(())
    }

    async fn publish_manifest(
        &self,
        repository: &str,
        tag: &str,
        media_type: &str,
        body: &[u8],
    ) -> Result<()> {
        let url = format!("{}/v2/{}/manifests/{}", self.endpoint, repository, tag);
        debug!(url = %url, media_type = %media_type, "PUT manifest");

        let response = self
            .authed(self.client.put(&url))
            .header(header::CONTENT_TYPE, media_type)
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| PushError::ManifestPublishFailed {
                repository: repository.to_string(),
                tag: tag.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::CREATED {
            return Err(PushError::ManifestPublishFailed {
                repository: repository.to_string(),
                tag: tag.to_string(),
                reason: format!("unexpected status {status}"),
            });
        }
        Ok(())
    }
}
