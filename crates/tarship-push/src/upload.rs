//! Chunked blob upload with running content hashing.
//!
//! A blob is streamed to the registry in fixed 2 MiB chunks through a
//! single-use upload session. Every chunk feeds a running SHA-256 in file
//! order, so the finishing request can declare the whole-file digest without
//! re-reading anything from disk.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::digest::file_sha256;
use crate::error::Result;
use crate::registry::Registry;

/// Fixed upload chunk size: 2 MiB.
pub const CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// State of one in-progress blob upload.
///
/// Single-use: once the final chunk is accepted or any request fails, the
/// session must not be touched again.
#[derive(Debug)]
struct UploadSession {
    /// Current target location; updated from each chunk response.
    location: String,
    /// Bytes accepted by the registry so far.
    bytes_sent: u64,
}

/// Probes for a blob and uploads it if the registry does not have it.
///
/// Returns the blob's `sha256:<hex>` digest either way.
///
/// # Errors
///
/// Returns an error if the probe fails, the session cannot be opened, or any
/// chunk is rejected.
pub async fn push_blob(registry: &dyn Registry, repository: &str, path: &Path) -> Result<String> {
    let digest = format!("sha256:{}", file_sha256(path)?);

    if registry.blob_exists(repository, &digest).await? {
        info!(blob = %path.display(), digest = %digest, "blob already present, skipping upload");
        return Ok(digest);
    }

    info!(blob = %path.display(), "uploading blob");
    let uploaded = upload_blob(registry, repository, path).await?;
    info!(blob = %path.display(), digest = %uploaded, "blob uploaded");
    Ok(uploaded)
}

/// Uploads one blob through a fresh session, returning its digest.
///
/// # Errors
///
/// Returns an error if the session cannot be opened or a chunk is rejected.
pub async fn upload_blob(registry: &dyn Registry, repository: &str, path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let total = file.metadata()?.len();

    let mut session = UploadSession {
        location: registry.start_upload(repository).await?,
        bytes_sent: 0,
    };

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = read_full(&mut file, &mut buf)?;
        let chunk = &buf[..n];
        hasher.update(chunk);
        let end = session.bytes_sent + n as u64;

        if end == total {
            // Final chunk: declare the completed whole-file digest.
            let digest = format!("sha256:{}", hex::encode(hasher.finalize()));
            registry
                .finish_upload(&session.location, &digest, session.bytes_sent, chunk)
                .await?;
            return Ok(digest);
        }

        if n == 0 {
            // The file shrank underneath us; the session is abandoned.
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("blob truncated at {} of {} bytes", session.bytes_sent, total),
            )
            .into());
        }

        session.location = registry
            .upload_chunk(&session.location, session.bytes_sent, chunk)
            .await?;
        session.bytes_sent = end;
        debug!(
            blob = %path.display(),
            progress = %format!("{:.2}%", percent(end, total)),
            "chunk accepted"
        );
    }
}

/// Reads until the buffer is full or the reader is exhausted.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

#[allow(clippy::cast_precision_loss)]
fn percent(sent: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        sent as f64 / total as f64 * 100.0
    }
}
