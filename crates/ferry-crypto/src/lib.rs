//! # Ferry Crypto
//!
//! Cryptographic primitives for the Ferry transfer protocol.
//!
//! This crate provides:
//! - `Noise_NN` handshake with a human-comparable verification code
//! - `ChaCha20-Poly1305` transport encryption (via the Noise transport state)
//! - BLAKE3 hashing and truncated checksums
//! - Secure random identifiers
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | Key Exchange | X25519 (ephemeral) | 128-bit |
//! | AEAD | ChaCha20-Poly1305 | 256-bit key |
//! | Handshake Hash | BLAKE2s | 128-bit collision |
//! | File Digest | BLAKE3 | 128-bit collision |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod hash;
pub mod noise;
pub mod random;

pub use error::CryptoError;
pub use noise::{NoiseHandshake, NoiseTransport};

/// BLAKE3 output size
pub const BLAKE3_OUTPUT_SIZE: usize = 32;

/// Node identifier size
pub const NODE_ID_SIZE: usize = 32;

/// Session identifier size
pub const SESSION_ID_SIZE: usize = 16;
