//! BLAKE3 hashing for file integrity.

use std::io::Read;
use std::path::Path;

/// Read buffer used when hashing files from disk
const HASH_BUFFER_SIZE: usize = 256 * 1024;

/// Incremental whole-file hasher
#[derive(Default)]
pub struct FileHasher {
    hasher: blake3::Hasher,
    bytes: u64,
}

impl FileHasher {
    /// Create a new hasher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next piece of the file
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    /// Bytes hashed so far
    #[must_use]
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// Final digest
    #[must_use]
    pub fn finalize(&self) -> [u8; 32] {
        *self.hasher.finalize().as_bytes()
    }
}

/// Hash a file on the blocking pool.
///
/// Returns the digest together with the number of bytes hashed.
pub async fn hash_file(path: &Path) -> std::io::Result<([u8; 32], u64)> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_file_blocking(&path))
        .await
        .map_err(std::io::Error::other)?
}

fn hash_file_blocking(path: &Path) -> std::io::Result<([u8; 32], u64)> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = FileHasher::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok((hasher.finalize(), hasher.bytes_hashed()))
}

/// Hash an in-memory buffer
#[must_use]
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Parse a 64-character hex digest
pub fn digest_from_hex(s: &str) -> Option<[u8; 32]> {
    if s.len() != 64 {
        return None;
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(s, &mut out).ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_matches_oneshot() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let mut hasher = FileHasher::new();
        for piece in data.chunks(7000) {
            hasher.update(piece);
        }
        assert_eq!(hasher.finalize(), hash_bytes(&data));
        assert_eq!(hasher.bytes_hashed(), data.len() as u64);
    }

    #[tokio::test]
    async fn test_hash_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let data = vec![42u8; HASH_BUFFER_SIZE + 17];
        std::fs::write(&path, &data).unwrap();

        let (digest, len) = hash_file(&path).await.unwrap();
        assert_eq!(digest, hash_bytes(&data));
        assert_eq!(len, data.len() as u64);
    }

    #[test]
    fn test_digest_hex_parsing() {
        let digest = hash_bytes(b"abc");
        let hex = hex::encode(digest);
        assert_eq!(digest_from_hex(&hex), Some(digest));
        assert_eq!(digest_from_hex(&hex.to_uppercase()), Some(digest));
        assert_eq!(digest_from_hex(&hex[..62]), None);
        assert_eq!(digest_from_hex(&"zz".repeat(32)), None);
    }
}
