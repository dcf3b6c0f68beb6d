//! Content-addressed, append-only evidence store.
//!
//! Blobs live at `<root>/<first two hex chars>/<sha256>`. Writes land in
//! `<root>/.tmp/` first and are renamed into place, so a blob visible under its
//! digest is always complete.

use crate::error::EvidenceError;
use sha2::{Digest as _, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const TMP_DIR: &str = ".tmp";
const DIGEST_HEX_LEN: usize = 64;
const WRITE_BACKOFF_BASE_MS: u64 = 50;

/// Lowercase hex SHA-256 of a blob.
pub type Digest = String;

pub fn digest_of(content: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

pub fn is_valid_digest(digest: &str) -> bool {
    digest.len() == DIGEST_HEX_LEN
        && digest
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[derive(Debug, Clone)]
pub struct EvidenceStore {
    root: PathBuf,
}

impl EvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, digest: &str) -> PathBuf {
        self.root.join(&digest[..2]).join(digest)
    }

    /// Store `content` and return its digest. Existing content is not rewritten.
    pub fn put(&self, content: &[u8]) -> Result<Digest, EvidenceError> {
        let digest = digest_of(content);
        let target = self.blob_path(&digest);
        if target.exists() {
            tracing::debug!(digest = %digest, "evidence.dedup");
            return Ok(digest);
        }

        let shard = target
            .parent()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        create_dir(&shard)?;
        let tmp_dir = self.root.join(TMP_DIR);
        create_dir(&tmp_dir)?;

        let temp_path = tmp_dir.join(uuid::Uuid::new_v4().to_string());
        write_synced(&temp_path, content)?;

        // A concurrent writer may have renamed identical bytes into place
        // meanwhile; rename over it is harmless because content is equal.
        if let Err(source) = fs::rename(&temp_path, &target) {
            let _ = fs::remove_file(&temp_path);
            if target.exists() {
                return Ok(digest);
            }
            return Err(EvidenceError::Io {
                path: target.display().to_string(),
                source,
            });
        }

        tracing::debug!(digest = %digest, bytes = content.len(), "evidence.put");
        Ok(digest)
    }

    /// `put` with bounded exponential backoff on I/O failure.
    pub async fn put_with_retry(
        &self,
        content: &[u8],
        max_attempts: u32,
    ) -> Result<Digest, EvidenceError> {
        let attempts = max_attempts.max(1);
        let mut backoff_ms = WRITE_BACKOFF_BASE_MS;
        let mut attempt = 1;
        loop {
            match self.put(content) {
                Ok(digest) => return Ok(digest),
                Err(err) if attempt < attempts && matches!(err, EvidenceError::Io { .. }) => {
                    tracing::warn!(attempt, error = %err, "evidence write failed, retrying");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = backoff_ms.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn get(&self, digest: &str) -> Result<Vec<u8>, EvidenceError> {
        if !is_valid_digest(digest) {
            return Err(EvidenceError::InvalidDigest(digest.to_string()));
        }
        let path = self.blob_path(digest);
        fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                EvidenceError::NotFound(digest.to_string())
            } else {
                EvidenceError::Io {
                    path: path.display().to_string(),
                    source,
                }
            }
        })
    }

    pub fn contains(&self, digest: &str) -> bool {
        is_valid_digest(digest) && self.blob_path(digest).is_file()
    }

    /// Leading bytes of a blob rendered as lossy UTF-8.
    pub fn excerpt(&self, digest: &str, max_bytes: usize) -> Result<String, EvidenceError> {
        let bytes = self.get(digest)?;
        let slice = &bytes[..bytes.len().min(max_bytes)];
        let mut text = String::from_utf8_lossy(slice).into_owned();
        if bytes.len() > max_bytes {
            text.push_str("...");
        }
        Ok(text)
    }

    /// Number of stored blobs across all shards.
    pub fn blob_count(&self) -> Result<usize, EvidenceError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(EvidenceError::Io {
                    path: self.root.display().to_string(),
                    source,
                });
            }
        };
        let mut count = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.len() != 2 || !entry.path().is_dir() {
                continue;
            }
            let shard = fs::read_dir(entry.path()).map_err(|source| EvidenceError::Io {
                path: entry.path().display().to_string(),
                source,
            })?;
            count += shard
                .flatten()
                .filter(|blob| is_valid_digest(&blob.file_name().to_string_lossy()))
                .count();
        }
        Ok(count)
    }
}

fn create_dir(path: &Path) -> Result<(), EvidenceError> {
    fs::create_dir_all(path).map_err(|source| EvidenceError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn write_synced(path: &Path, content: &[u8]) -> Result<(), EvidenceError> {
    let io_err = |source| EvidenceError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut file = fs::File::create(path).map_err(io_err)?;
    file.write_all(content).map_err(io_err)?;
    file.sync_all().map_err(io_err)
}
