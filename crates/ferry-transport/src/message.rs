//! Wire message definitions.
//!
//! [`ControlMessage`]s travel in plaintext before the Noise handshake and
//! only carry identities. Everything about the file travels as
//! [`WireMessage`]s inside the encrypted channel.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TransportError;
use crate::identity::{NodeId, SessionId};

/// Which end of a transfer a peer is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Has the file
    Sender,
    /// Wants the file
    Receiver,
}

impl Role {
    /// The role a counterpart must have
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => write!(f, "sender"),
            Role::Receiver => write!(f, "receiver"),
        }
    }
}

/// Why a listener refused a hello
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Protocol version not supported
    VersionMismatch,
    /// Session does not belong to this listener
    UnknownSession,
    /// Both peers want the same role
    RoleMismatch,
    /// Listener already serves another peer
    Busy,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::VersionMismatch => write!(f, "version mismatch"),
            RejectReason::UnknownSession => write!(f, "unknown session"),
            RejectReason::RoleMismatch => write!(f, "role mismatch"),
            RejectReason::Busy => write!(f, "busy"),
        }
    }
}

/// Why a peer abandoned a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// User cancelled
    Cancelled,
    /// Digest or descriptor mismatch
    Integrity,
    /// Local I/O failure
    Io,
    /// Unexpected message
    Protocol,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Cancelled => write!(f, "cancelled"),
            AbortReason::Integrity => write!(f, "integrity"),
            AbortReason::Io => write!(f, "io"),
            AbortReason::Protocol => write!(f, "protocol"),
        }
    }
}

/// Plaintext messages exchanged before securing the channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    /// Connector introduces itself
    Hello {
        /// Protocol version
        version: u16,
        /// Connector's node id
        node_id: NodeId,
        /// Session from the ticket, if connecting through one
        session: Option<SessionId>,
        /// Connector's role
        role: Role,
    },
    /// Listener accepts the connector
    HelloAck {
        /// Listener's node id
        node_id: NodeId,
    },
    /// Listener refuses the connector
    Reject {
        /// Refusal reason
        reason: RejectReason,
    },
}

/// Messages inside the encrypted channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// File announcement, sent once by the sender
    Header {
        /// File name
        name: String,
        /// File size in bytes
        size: u64,
        /// BLAKE3 digest of the whole file
        digest: [u8; 32],
    },
    /// Receiver is ready for data
    Accept,
    /// File data
    Chunk(Vec<u8>),
    /// Receiver verified and stored the file
    Done,
    /// Either side gives up
    Abort {
        /// Reason code
        reason: AbortReason,
        /// Human-readable detail
        message: String,
    },
}

impl WireMessage {
    /// Get the message type name
    pub fn message_type(&self) -> &'static str {
        match self {
            WireMessage::Header { .. } => "Header",
            WireMessage::Accept => "Accept",
            WireMessage::Chunk(_) => "Chunk",
            WireMessage::Done => "Done",
            WireMessage::Abort { .. } => "Abort",
        }
    }

    /// Build an abort message
    pub fn abort(reason: AbortReason, message: impl Into<String>) -> Self {
        WireMessage::Abort {
            reason,
            message: message.into(),
        }
    }
}

impl ControlMessage {
    /// Get the message type name
    pub fn message_type(&self) -> &'static str {
        match self {
            ControlMessage::Hello { .. } => "Hello",
            ControlMessage::HelloAck { .. } => "HelloAck",
            ControlMessage::Reject { .. } => "Reject",
        }
    }
}

/// Serialize a message to bytes
pub fn to_bytes<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    bincode::serialize(msg).map_err(|e| TransportError::Codec(e.to_string()))
}

/// Deserialize a message from bytes
pub fn from_bytes<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, TransportError> {
    bincode::deserialize(bytes).map_err(|e| TransportError::Codec(e.to_string()))
}
