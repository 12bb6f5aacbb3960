//! Relay protocol message definitions.
//!
//! Every relay connection starts with one framed control exchange:
//! `[u32 big-endian length][bincode RelayMessage]`. After `Paired` the
//! connection carries the peers' own bytes untouched.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::MAX_CONTROL_MESSAGE_SIZE;

/// Session identifier the two peers rendezvous on
pub type SessionId = [u8; 16];

/// Relay protocol messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelayMessage {
    /// Listener parks this connection until a connector arrives
    Listen {
        /// Session to wait on
        session: SessionId,
    },

    /// Connector asks to be paired with the listener of a session
    Connect {
        /// Session to join
        session: SessionId,
    },

    /// Relay accepted a `Listen`; the connection is parked
    Waiting,

    /// Both sides are joined; raw bytes follow
    Paired,

    /// Relay error response
    Error {
        /// Error code
        code: RelayErrorCode,
        /// Human-readable error message
        message: String,
    },
}

/// Relay error codes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelayErrorCode {
    /// No listener is waiting on the session
    SessionNotFound = 1,
    /// Another listener already holds the session
    SessionInUse = 2,
    /// Invalid message format
    InvalidMessage = 4,
    /// Server at capacity
    ServerFull = 5,
    /// Internal server error
    InternalError = 7,
}

impl RelayMessage {
    /// Serialize message to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, RelayError> {
        bincode::serialize(self).map_err(|e| RelayError::Serialization(e.to_string()))
    }

    /// Deserialize message from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RelayError> {
        bincode::deserialize(bytes).map_err(|e| RelayError::Deserialization(e.to_string()))
    }

    /// Get the message type name
    pub fn message_type(&self) -> &'static str {
        match self {
            RelayMessage::Listen { .. } => "Listen",
            RelayMessage::Connect { .. } => "Connect",
            RelayMessage::Waiting => "Waiting",
            RelayMessage::Paired => "Paired",
            RelayMessage::Error { .. } => "Error",
        }
    }

    /// Build an error response
    pub fn error(code: RelayErrorCode, message: impl Into<String>) -> Self {
        RelayMessage::Error {
            code,
            message: message.into(),
        }
    }
}

/// Relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),
    /// Network I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Relay did not answer in time
    #[error("relay timeout")]
    Timeout,
    /// No listener on the session
    #[error("session not found on relay")]
    SessionNotFound,
    /// Session already claimed by another listener
    #[error("session already in use on relay")]
    SessionInUse,
    /// Malformed or unexpected message
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    /// Server full
    #[error("relay at capacity")]
    ServerFull,
    /// Internal error
    #[error("relay internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Map an error response from the relay
    pub fn from_code(code: RelayErrorCode, message: String) -> Self {
        match code {
            RelayErrorCode::SessionNotFound => RelayError::SessionNotFound,
            RelayErrorCode::SessionInUse => RelayError::SessionInUse,
            RelayErrorCode::InvalidMessage => RelayError::InvalidMessage(message),
            RelayErrorCode::ServerFull => RelayError::ServerFull,
            RelayErrorCode::InternalError => RelayError::Internal(message),
        }
    }
}

/// Write one framed control message
pub async fn write_message<W>(writer: &mut W, msg: &RelayMessage) -> Result<(), RelayError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = msg.to_bytes()?;
    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed control message
pub async fn read_message<R>(reader: &mut R) -> Result<RelayMessage, RelayError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_CONTROL_MESSAGE_SIZE {
        return Err(RelayError::InvalidMessage(format!(
            "control message too large: {len} bytes"
        )));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    RelayMessage::from_bytes(&buf)
}
