//! Staging files for incoming transfers.
//!
//! Data is written to `<name>.part` next to the destination and only renamed
//! into place after verification. A [`PartialFile`] that is dropped without
//! [`PartialFile::persist`] deletes its staging file.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::naming::unique_destination;

/// Staging file owned by one incoming transfer
#[derive(Debug)]
pub struct PartialFile {
    file: Option<File>,
    path: PathBuf,
    written: u64,
    persisted: bool,
}

impl PartialFile {
    /// Create a fresh staging file for `name` inside `dir`.
    pub async fn create(dir: &Path, name: &str) -> std::io::Result<Self> {
        let path = unique_destination(dir, &format!("{name}.part")).await?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        debug!("Staging incoming file at {}", path.display());

        Ok(Self {
            file: Some(file),
            path,
            written: 0,
            persisted: false,
        })
    }

    /// Staging path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Append a chunk. A failed write is retried once from the chunk's
    /// starting offset.
    pub async fn write_chunk(&mut self, data: &[u8]) -> std::io::Result<()> {
        let offset = self.written;
        let file = self.file_mut()?;

        if let Err(first) = file.write_all(data).await {
            warn!("Chunk write at offset {offset} failed, retrying: {first}");
            file.seek(SeekFrom::Start(offset)).await?;
            file.write_all(data).await?;
        }

        self.written += data.len() as u64;
        Ok(())
    }

    /// Flush to disk and move into place.
    ///
    /// If `dest` was taken while the transfer ran, the next free
    /// `name (n).ext` variant is used instead. Returns the final path.
    pub async fn persist(mut self, dest: &Path) -> std::io::Result<PathBuf> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| std::io::Error::other("staging file already closed"))?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let final_path = if tokio::fs::try_exists(dest).await? {
            let dir = dest.parent().unwrap_or_else(|| Path::new("."));
            let name = dest
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            unique_destination(dir, &name).await?
        } else {
            dest.to_path_buf()
        };

        tokio::fs::rename(&self.path, &final_path).await?;
        self.persisted = true;
        Ok(final_path)
    }

    fn file_mut(&mut self) -> std::io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| std::io::Error::other("staging file already closed"))
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        drop(self.file.take());
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed staging file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {e}", self.path.display()),
        }
    }
}
