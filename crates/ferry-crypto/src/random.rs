//! Secure random number generation.
//!
//! All randomness comes from the operating system CSPRNG.

use rand::RngCore;
use rand::rngs::OsRng;

use crate::CryptoError;

/// Fill a buffer with random bytes from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|_| CryptoError::RandomFailed)
}

/// Generate a random 32-byte array (node identifiers).
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn random_32() -> Result<[u8; 32], CryptoError> {
    let mut buf = [0u8; 32];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Generate a random 16-byte array (session identifiers).
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn random_16() -> Result<[u8; 16], CryptoError> {
    let mut buf = [0u8; 16];
    fill_random(&mut buf)?;
    Ok(buf)
}
