//! Error types for archive push operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for push operations.
pub type Result<T> = std::result::Result<T, PushError>;

/// Errors that can occur while pushing an image archive.
#[derive(Debug, Error)]
pub enum PushError {
    /// The archive stream could not be read or an entry could not be written.
    #[error("archive unreadable: {}: {source}", path.display())]
    ArchiveUnreadable {
        /// Archive or entry path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The archive's manifest file is missing or unreadable.
    #[error("manifest unreadable: {}: {source}", path.display())]
    ManifestUnreadable {
        /// Expected manifest location.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The archive's manifest file is not the expected structured shape.
    #[error("manifest malformed: {}: {source}", path.display())]
    ManifestMalformed {
        /// Manifest location.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// A blob existence probe failed (network or unexpected status).
    #[error("blob probe failed for {digest}: {reason}")]
    ProbeFailed {
        /// Digest being probed, `sha256:<hex>`.
        digest: String,
        /// Transport error or unexpected HTTP status.
        reason: String,
    },

    /// The registry refused to open an upload session.
    #[error("upload session for {repository} failed: {reason}")]
    UploadSessionFailed {
        /// Target repository name.
        repository: String,
        /// Transport error or unexpected HTTP status.
        reason: String,
    },

    /// The registry rejected a chunk (PATCH) or the finishing PUT.
    #[error("chunk rejected at offset {offset}: {reason}")]
    ChunkRejected {
        /// Byte offset of the rejected chunk.
        offset: u64,
        /// Transport error or unexpected HTTP status.
        reason: String,
    },

    /// The registry did not accept the published manifest.
    #[error("manifest publish to {repository}:{tag} failed: {reason}")]
    ManifestPublishFailed {
        /// Target repository name.
        repository: String,
        /// Target tag.
        tag: String,
        /// Transport error or unexpected HTTP status.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
