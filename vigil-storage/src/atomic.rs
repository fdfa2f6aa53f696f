//! Write-temp-then-rename file replacement.
//!
//! Content goes to `<path>.tmp` first and is renamed over `<path>` only once
//! fully written, so readers see either the old file or the new one. A
//! failed write removes the temporary file.

use crate::error::{StorageError, StorageResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

/// `<path>.tmp`, keeping any existing extension.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// A file being written under its temporary name.
pub struct AtomicFile {
    target: PathBuf,
    temp: PathBuf,
    writer: BufWriter<File>,
}

impl AtomicFile {
    /// Opens `<path>.tmp` for writing, creating parent directories.
    pub async fn create(path: impl AsRef<Path>) -> StorageResult<Self> {
        let target = path.as_ref().to_path_buf();
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(StorageError::io("create directory", parent))?;
        }

        let temp = temp_path(&target);
        let file = File::create(&temp)
            .await
            .map_err(StorageError::io("open", &temp))?;

        Ok(Self {
            target,
            temp,
            writer: BufWriter::new(file),
        })
    }

    pub fn writer(&mut self) -> &mut BufWriter<File> {
        &mut self.writer
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Flushes, syncs and renames the temporary file over the target.
    pub async fn commit(mut self) -> StorageResult<()> {
        let synced = sync(&mut self.writer, &self.temp).await;
        let Self { target, temp, writer } = self;
        drop(writer);

        let result = match synced {
            Ok(()) => fs::rename(&temp, &target)
                .await
                .map_err(StorageError::io("rename", &temp)),
            Err(e) => Err(e),
        };
        if result.is_err() {
            remove_temp(&temp).await;
        }
        result
    }

    /// Abandons the write, leaving the target untouched.
    pub async fn discard(self) {
        let Self { temp, writer, .. } = self;
        drop(writer);
        remove_temp(&temp).await;
    }
}

async fn sync(writer: &mut BufWriter<File>, temp: &Path) -> StorageResult<()> {
    writer.flush().await.map_err(StorageError::io("write", temp))?;
    writer
        .get_ref()
        .sync_all()
        .await
        .map_err(StorageError::io("sync", temp))
}

async fn remove_temp(temp: &Path) {
    if let Err(e) = fs::remove_file(temp).await {
        debug!("Could not remove '{}': {}", temp.display(), e);
    }
}

/// Replaces `path` with `bytes` atomically.
pub async fn atomic_write(path: impl AsRef<Path>, bytes: &[u8]) -> StorageResult<()> {
    let mut file = AtomicFile::create(path).await?;
    if let Err(e) = file.writer().write_all(bytes).await {
        let err = StorageError::io("write", file.temp_path())(e);
        file.discard().await;
        return Err(err);
    }
    file.commit().await
}
