//! Events reported to the polling caller.
//!
//! Serialized as one flat JSON object:
//! `{"timestamp_ms": 1700000000000, "kind": "progress", "bytes_transferred": 0, "total_bytes": 10}`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, TransferError};

/// One timestamped event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// What happened
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Event kinds and their payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Listener is ready; hand this ticket to the peer
    TicketReady {
        /// Encoded ticket
        ticket: String,
    },
    /// Outbound connect started
    PeerConnecting {
        /// Human-readable target description
        target: String,
    },
    /// Secure channel established
    PeerConnected {
        /// Peer node id (hex)
        peer: String,
        /// `direct` or `relay`
        path: String,
        /// Short code both sides display
        verification_code: String,
        /// Round trip measured while connecting, in milliseconds
        latency_ms: u64,
    },
    /// Bytes moved so far
    Progress {
        /// Bytes sent or received
        bytes_transferred: u64,
        /// Announced file size
        total_bytes: u64,
    },
    /// Transfer finished and verified
    Completed {
        /// Saved file (receiver) or source file (sender)
        path: String,
        /// File name as announced
        file_name: String,
        /// File size in bytes
        size: u64,
        /// BLAKE3 digest (hex)
        digest: String,
    },
    /// Session ended by cancellation
    Cancelled,
    /// Session ended by an error
    Failed {
        /// Error taxonomy entry
        error_kind: ErrorKind,
        /// Human-readable detail
        message: String,
    },
}

impl EventPayload {
    /// Terminal payload for a session result
    pub fn from_error(err: &TransferError) -> Self {
        match err.kind() {
            None => EventPayload::Cancelled,
            Some(error_kind) => EventPayload::Failed {
                error_kind,
                message: err.to_string(),
            },
        }
    }

    /// Whether this ends a session
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventPayload::Completed { .. } | EventPayload::Cancelled | EventPayload::Failed { .. }
        )
    }

    /// Whether this is a coalescable progress report
    #[must_use]
    pub fn is_progress(&self) -> bool {
        matches!(self, EventPayload::Progress { .. })
    }

    /// snake_case kind name, as serialized
    pub fn kind_name(&self) -> &'static str {
        match self {
            EventPayload::TicketReady { .. } => "ticket_ready",
            EventPayload::PeerConnecting { .. } => "peer_connecting",
            EventPayload::PeerConnected { .. } => "peer_connected",
            EventPayload::Progress { .. } => "progress",
            EventPayload::Completed { .. } => "completed",
            EventPayload::Cancelled => "cancelled",
            EventPayload::Failed { .. } => "failed",
        }
    }
}

impl Event {
    /// Stamp a payload with the current time
    pub fn now(payload: EventPayload) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            timestamp_ms,
            payload,
        }
    }

    /// Whether this ends a session
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.payload.is_terminal()
    }

    /// Whether this is a progress report
    #[must_use]
    pub fn is_progress(&self) -> bool {
        self.payload.is_progress()
    }

    /// JSON record for the foreign boundary
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
