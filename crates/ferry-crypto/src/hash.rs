//! BLAKE3 hashing helpers.

/// BLAKE3 hash output (32 bytes).
pub type HashOutput = [u8; 32];

/// Size of the truncated integrity checksum.
pub const CHECKSUM_SIZE: usize = 4;

/// Compute BLAKE3 hash of input data.
#[must_use]
pub fn hash(data: &[u8]) -> HashOutput {
    *blake3::hash(data).as_bytes()
}

/// Truncated BLAKE3 checksum used to catch typos and truncation in
/// copy-pasted text. Not a security boundary.
#[must_use]
pub fn checksum(data: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let full = hash(data);
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&full[..CHECKSUM_SIZE]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash(b"ferry"), hash(b"ferry"));
        assert_ne!(hash(b"ferry"), hash(b"Ferry"));
    }

    #[test]
    fn test_checksum_is_hash_prefix() {
        let data = b"some ticket body";
        assert_eq!(&checksum(data)[..], &hash(data)[..CHECKSUM_SIZE]);
    }
}
