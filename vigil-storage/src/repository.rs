//! Per-endpoint topology files.
//!
//! Each sender's latest inventory is kept in `<dir>/<sha256(endpoint)>.repo`,
//! written with the same atomic replace discipline as snapshots.

use crate::atomic::atomic_write;
use crate::error::{StorageError, StorageResult};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File suffix for repository entries.
pub const REPOSITORY_SUFFIX: &str = ".repo";

/// Directory of repository files keyed by sender identity.
#[derive(Debug, Clone)]
pub struct RepositoryStore {
    dir: PathBuf,
}

impl RepositoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `endpoint`'s inventory.
    pub fn path_for(&self, endpoint: &str) -> PathBuf {
        let digest = Sha256::digest(endpoint.as_bytes());
        self.dir
            .join(format!("{}{}", hex::encode(digest), REPOSITORY_SUFFIX))
    }

    /// Replaces `endpoint`'s stored inventory.
    pub async fn write(&self, endpoint: &str, payload: &Value) -> StorageResult<PathBuf> {
        let path = self.path_for(endpoint);
        let bytes = serde_json::to_vec(payload)?;
        atomic_write(&path, &bytes).await?;
        debug!("Updated repository for endpoint '{}'", endpoint);
        Ok(path)
    }

    /// `endpoint`'s stored inventory, if any.
    pub async fn read(&self, endpoint: &str) -> StorageResult<Option<Value>> {
        let path = self.path_for(endpoint);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io {
                op: "read",
                path,
                source: e,
            }),
        }
    }
}
