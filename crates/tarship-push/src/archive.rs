//! Archive extraction with symlink-by-copy resolution.
//!
//! Exported image archives (docker-save tarballs) may contain symbolic links
//! whose targets appear later in the stream, so extraction runs in two
//! passes:
//!
//! 1. Stream all entries once. Directories are created, regular files are
//!    written and recorded in a normalized-path map, symlinks are deferred.
//! 2. Resolve every deferred symlink against the map and materialize it as a
//!    *copy* of its target's bytes. Copying instead of linking avoids
//!    platform symlink-privilege issues and guarantees later hashing sees
//!    real content.
//!
//! A link whose target is not in the archive is reported as a warning and
//! skipped; it may legitimately point outside the archive.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tar::{Archive, EntryType};
use tracing::{debug, warn};

use crate::error::{PushError, Result};

/// A symlink entry seen during the first pass, resolved in the second.
#[derive(Debug)]
struct PendingSymlink {
    /// Archive-relative path of the link itself.
    link_path: String,
    /// Link destination as recorded in the archive.
    target: String,
    /// On-disk location where the resolved content is written.
    dest: PathBuf,
}

/// Extracts an image archive into `dest`, materializing symlinks as copies.
///
/// # Errors
///
/// Returns [`PushError::ArchiveUnreadable`] if the archive stream cannot be
/// read or an entry cannot be written. Unresolved symlinks are not errors.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|source| unreadable(archive_path, source))?;

    let mut archive = Archive::new(file);
    let mut extracted: HashMap<String, PathBuf> = HashMap::new();
    let mut pending: Vec<PendingSymlink> = Vec::new();

    let entries = archive
        .entries()
        .map_err(|source| unreadable(archive_path, source))?;

    for entry_result in entries {
        let mut entry = entry_result.map_err(|source| unreadable(archive_path, source))?;
        let name = entry
            .path()
            .map_err(|source| unreadable(archive_path, source))?
            .to_string_lossy()
            .replace('\\', "/");
        let target = dest.join(&name);

        match entry.header().entry_type() {
            EntryType::Symlink => {
                let Some(link_target) = entry
                    .link_name()
                    .map_err(|source| unreadable(archive_path, source))?
                else {
                    warn!(link = %name, "symlink entry without target, skipping");
                    continue;
                };
                let link_target = link_target.to_string_lossy().replace('\\', "/");
                debug!(link = %name, target = %link_target, "deferring symlink");
                pending.push(PendingSymlink {
                    link_path: name,
                    target: link_target,
                    dest: target,
                });
            }
            EntryType::Directory => {
                fs::create_dir_all(&target).map_err(|source| unreadable(&target, source))?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|source| unreadable(parent, source))?;
                }
                let mut out =
                    File::create(&target).map_err(|source| unreadable(&target, source))?;
                io::copy(&mut entry, &mut out).map_err(|source| unreadable(&target, source))?;
                extracted.insert(name, target);
            }
            other => {
                debug!(path = %name, entry_type = ?other, "skipping entry type");
            }
        }
    }

    resolve_symlinks(&extracted, pending)
}

/// Second pass: copy each pending symlink's resolved target into place.
fn resolve_symlinks(
    extracted: &HashMap<String, PathBuf>,
    pending: Vec<PendingSymlink>,
) -> Result<()> {
    for link in pending {
        match lookup_target(extracted, &link) {
            Some(source) => {
                if let Some(parent) = link.dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| unreadable(parent, e))?;
                }
                fs::copy(source, &link.dest).map_err(|e| unreadable(&link.dest, e))?;
                debug!(link = %link.link_path, target = %link.target, "symlink resolved by copy");
            }
            None => {
                warn!(
                    link = %link.link_path,
                    target = %link.target,
                    "symlink target not present in archive, leaving unresolved"
                );
            }
        }
    }
    Ok(())
}

/// Finds the extracted file a symlink points at.
///
/// Tries, in order: the raw target as an archive key, the target joined
/// against the link's directory, and the target stripped of a leading `/`
/// (absolute-style targets refer to the extraction root).
fn lookup_target<'a>(
    extracted: &'a HashMap<String, PathBuf>,
    link: &PendingSymlink,
) -> Option<&'a PathBuf> {
    if let Some(found) = extracted.get(&link.target) {
        return Some(found);
    }

    let link_dir = match link.link_path.rfind('/') {
        Some(idx) => &link.link_path[..idx],
        None => "",
    };
    let relative = normalize_path(&format!("{}/{}", link_dir, link.target));
    if let Some(found) = extracted.get(&relative) {
        return Some(found);
    }

    let rooted = normalize_path(link.target.trim_start_matches('/'));
    extracted.get(&rooted)
}

/// Lexically resolves `.` and `..` components of a forward-slash path.
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn unreadable(path: &Path, source: io::Error) -> PushError {
    PushError::ArchiveUnreadable {
        path: path.to_path_buf(),
        source,
    }
}

/// Scratch directory owned by a single push run.
///
/// Created under the OS temp dir, namespaced by a process-local timestamp,
/// and removed unconditionally on drop whether the push succeeded or not.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Creates a fresh scratch directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new() -> Result<Self> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        let path = std::env::temp_dir().join(format!("tarship-{nanos}"));
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Returns the scratch directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove scratch dir");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn regular_entry(builder: &mut tar::Builder<Vec<u8>>, path: &str, content: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, content).unwrap();
    }

    fn symlink_entry(builder: &mut tar::Builder<Vec<u8>>, path: &str, target: &str) {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_path(path).unwrap();
        header.set_link_name(target).unwrap();
        header.set_size(0);
        header.set_mode(0o777);
        header.set_cksum();
        builder.append(&header, std::io::empty()).unwrap();
    }

    fn write_archive(dir: &Path, build: impl FnOnce(&mut tar::Builder<Vec<u8>>)) -> PathBuf {
        let mut builder = tar::Builder::new(Vec::new());
        build(&mut builder);
        let data = builder.into_inner().unwrap();
        let path = dir.join("archive.tar");
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_extract_regular_files() {
        let dir = tempdir().unwrap();
        let archive = write_archive(dir.path(), |b| {
            regular_entry(b, "manifest.json", b"[]");
            regular_entry(b, "abc/layer.tar", b"layer bytes");
        });

        let dest = dir.path().join("out");
        extract_archive(&archive, &dest).unwrap();

        assert_eq!(fs::read(dest.join("manifest.json")).unwrap(), b"[]");
        assert_eq!(fs::read(dest.join("abc/layer.tar")).unwrap(), b"layer bytes");
    }

    #[test]
    fn test_symlink_bare_target() {
        let dir = tempdir().unwrap();
        let archive = write_archive(dir.path(), |b| {
            regular_entry(b, "abc/layer.tar", b"shared content");
            // Bare archive-relative target, declared after the file.
            symlink_entry(b, "def/layer.tar", "abc/layer.tar");
        });

        let dest = dir.path().join("out");
        extract_archive(&archive, &dest).unwrap();

        assert_eq!(
            fs::read(dest.join("def/layer.tar")).unwrap(),
            fs::read(dest.join("abc/layer.tar")).unwrap()
        );
    }

    #[test]
    fn test_symlink_link_declared_before_target() {
        let dir = tempdir().unwrap();
        let archive = write_archive(dir.path(), |b| {
            symlink_entry(b, "def/layer.tar", "abc/layer.tar");
            regular_entry(b, "abc/layer.tar", b"later bytes");
        });

        let dest = dir.path().join("out");
        extract_archive(&archive, &dest).unwrap();

        assert_eq!(fs::read(dest.join("def/layer.tar")).unwrap(), b"later bytes");
    }

    #[test]
    fn test_symlink_relative_target() {
        let dir = tempdir().unwrap();
        let archive = write_archive(dir.path(), |b| {
            regular_entry(b, "abc/layer.tar", b"relative bytes");
            symlink_entry(b, "def/layer.tar", "../abc/layer.tar");
        });

        let dest = dir.path().join("out");
        extract_archive(&archive, &dest).unwrap();

        assert_eq!(
            fs::read(dest.join("def/layer.tar")).unwrap(),
            b"relative bytes"
        );
    }

    #[test]
    fn test_symlink_absolute_target() {
        let dir = tempdir().unwrap();
        let archive = write_archive(dir.path(), |b| {
            regular_entry(b, "abc/layer.tar", b"absolute bytes");
            symlink_entry(b, "def/layer.tar", "/abc/layer.tar");
        });

        let dest = dir.path().join("out");
        extract_archive(&archive, &dest).unwrap();

        assert_eq!(
            fs::read(dest.join("def/layer.tar")).unwrap(),
            b"absolute bytes"
        );
    }

    #[test]
    fn test_unresolvable_symlink_is_not_fatal() {
        let dir = tempdir().unwrap();
        let archive = write_archive(dir.path(), |b| {
            regular_entry(b, "manifest.json", b"[]");
            symlink_entry(b, "dangling", "no/such/file");
        });

        let dest = dir.path().join("out");
        extract_archive(&archive, &dest).unwrap();

        // Extraction completed, the dangling link simply has no content.
        assert!(dest.join("manifest.json").exists());
        assert!(!dest.join("dangling").exists());
    }

    #[test]
    fn test_missing_archive_is_fatal() {
        let dir = tempdir().unwrap();
        let result = extract_archive(&dir.path().join("nope.tar"), &dir.path().join("out"));
        assert!(matches!(
            result,
            Err(PushError::ArchiveUnreadable { .. })
        ));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("def/../abc/layer.tar"), "abc/layer.tar");
        assert_eq!(normalize_path("./abc//layer.tar"), "abc/layer.tar");
        assert_eq!(normalize_path("abc/./layer.tar"), "abc/layer.tar");
        assert_eq!(normalize_path("../x"), "x");
    }

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let path = {
            let scratch = ScratchDir::new().unwrap();
            assert!(scratch.path().is_dir());
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
