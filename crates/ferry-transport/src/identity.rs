//! Peer and session identifiers.

use std::fmt;

use ferry_crypto::random::{random_16, random_32};
use ferry_crypto::{CryptoError, NODE_ID_SIZE, SESSION_ID_SIZE};
use serde::{Deserialize, Serialize};

/// Per-session peer identity
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub [u8; NODE_ID_SIZE]);

impl NodeId {
    /// Fresh random identity
    pub fn random() -> Result<Self, CryptoError> {
        random_32().map(Self)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; NODE_ID_SIZE] {
        &self.0
    }

    /// Lowercase hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse 64 hex characters
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut out = [0u8; NODE_ID_SIZE];
        if s.len() != NODE_ID_SIZE * 2 {
            return None;
        }
        hex::decode_to_slice(s, &mut out).ok()?;
        Some(Self(out))
    }

    /// First eight hex characters, for logs and UIs
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short())
    }
}

/// Single-transfer rendezvous identifier minted by a listener
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub [u8; SESSION_ID_SIZE]);

impl SessionId {
    /// Fresh random session
    pub fn random() -> Result<Self, CryptoError> {
        random_16().map(Self)
    }

    /// Lowercase hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse 32 hex characters
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut out = [0u8; SESSION_ID_SIZE];
        if s.len() != SESSION_ID_SIZE * 2 {
            return None;
        }
        hex::decode_to_slice(s, &mut out).ok()?;
        Some(Self(out))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", hex::encode(&self.0[..4]))
    }
}
