//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Noise handshake error
    #[error("handshake error: {0}")]
    Handshake(String),

    /// Handshake message arrived out of order
    #[error("invalid state for operation")]
    InvalidState,

    /// AEAD encryption failed
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// AEAD decryption failed (authentication failure)
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,

    /// Plaintext larger than a single Noise message can carry
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Attempted size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },
}

impl From<snow::Error> for CryptoError {
    fn from(err: snow::Error) -> Self {
        match err {
            snow::Error::Decrypt => CryptoError::DecryptionFailed,
            other => CryptoError::Handshake(other.to_string()),
        }
    }
}
