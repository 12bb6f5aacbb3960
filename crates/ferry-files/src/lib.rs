//! # Ferry Files
//!
//! File handling for the Ferry transfer engine.
//!
//! This crate provides:
//! - Chunk geometry and a bounded chunk reader
//! - BLAKE3 whole-file digests
//! - Safe destination naming with collision avoidance
//! - `.part` staging files that vanish unless persisted

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunker;
pub mod error;
pub mod hasher;
pub mod naming;
pub mod staging;

use std::path::Path;

pub use error::FileError;

/// Default chunk size (60 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 60 * 1024;

/// Largest chunk that still fits one encrypted frame together with its
/// message envelope.
pub const MAX_CHUNK_SIZE: usize = 65_472;

/// File metadata for transfers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// File name (final path component only)
    pub name: String,
    /// File size in bytes
    pub size: u64,
    /// BLAKE3 hash of entire file
    pub digest: [u8; 32],
}

impl FileMetadata {
    /// Inspect and hash a local file.
    ///
    /// The name is taken from the last path component and must pass
    /// [`naming::sanitize_file_name`].
    pub async fn from_path(path: &Path) -> Result<Self, FileError> {
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(FileError::NotAFile(path.display().to_string()));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| FileError::InvalidName(path.display().to_string()))?;
        let name = naming::sanitize_file_name(&name)?;

        let (digest, hashed) = hasher::hash_file(path).await?;
        if hashed != meta.len() {
            return Err(FileError::SourceChanged {
                expected: meta.len(),
                actual: hashed,
            });
        }

        Ok(Self {
            name,
            size: meta.len(),
            digest,
        })
    }

    /// Lowercase hex form of the digest
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

/// Format a byte count with binary units, e.g. `1.5 MiB`.
#[must_use]
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(1024), "1.0 KiB");
        assert_eq!(human_bytes(1536), "1.5 KiB");
        assert_eq!(human_bytes(10 * 1024 * 1024), "10.0 MiB");
        assert_eq!(human_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn test_chunk_limits() {
        assert!(DEFAULT_CHUNK_SIZE <= MAX_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_metadata_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"0123456789").unwrap();
        drop(f);

        let meta = FileMetadata::from_path(&path).await.unwrap();
        assert_eq!(meta.name, "report.pdf");
        assert_eq!(meta.size, 10);
        assert_eq!(meta.digest, *blake3::hash(b"0123456789").as_bytes());
        assert_eq!(meta.digest_hex().len(), 64);
    }

    #[tokio::test]
    async fn test_metadata_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileMetadata::from_path(dir.path()).await;
        assert!(matches!(result, Err(FileError::NotAFile(_))));
    }

    #[tokio::test]
    async fn test_metadata_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileMetadata::from_path(&dir.path().join("nope")).await;
        assert!(matches!(result, Err(FileError::Io(_))));
    }
}
