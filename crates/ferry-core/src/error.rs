//! Error types for the controller core
//!
//! Failures fall into a small fixed taxonomy ([`ErrorKind`]) that crosses the
//! foreign boundary inside `Failed` events. Cancellation is not an error kind;
//! it ends a session with its own `Cancelled` event.

use std::borrow::Cow;
use std::fmt;

use ferry_files::FileError;
use ferry_transport::{ConnectError, TransportError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Ticket or target could not be decoded
    InvalidTicket,
    /// No path to the peer within the connect deadline
    ConnectTimeout,
    /// Peer refused, closed or aborted
    ConnectRefused,
    /// Digest or descriptor mismatch
    Integrity,
    /// Local file system failure
    Io,
    /// A bounded wait expired
    Timeout,
    /// Peer violated the wire protocol
    Protocol,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidTicket => "invalid_ticket",
            ErrorKind::ConnectTimeout => "connect_timeout",
            ErrorKind::ConnectRefused => "connect_refused",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Io => "io",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Protocol => "protocol",
        };
        f.write_str(s)
    }
}

/// Ticket and target decoding failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TicketError {
    /// Missing `ferry:` prefix
    #[error("not a ferry ticket")]
    MissingPrefix,

    /// Body is not valid URL-safe base64
    #[error("ticket encoding invalid: {0}")]
    Encoding(String),

    /// Body too short to hold a checksum
    #[error("ticket truncated")]
    Truncated,

    /// Checksum does not match body
    #[error("ticket checksum mismatch")]
    Checksum,

    /// Body fields malformed
    #[error("ticket malformed: {0}")]
    Malformed(Cow<'static, str>),

    /// Unknown ticket format version
    #[error("unsupported ticket version {0}")]
    UnsupportedVersion(u32),

    /// Neither direct addresses nor relay hint
    #[error("ticket carries no reachable address")]
    NoAddress,

    /// Ticket offers a file but was used to send one
    #[error("ticket offers a file; use it to receive")]
    OffersFile,

    /// Plain target is not `host:port`
    #[error("invalid target {0:?}: expected a ticket or host:port")]
    InvalidTarget(String),
}

/// Terminal failure of a session
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    /// Cancelled by the caller
    #[error("transfer cancelled")]
    Cancelled,

    /// Ticket or target unusable
    #[error("invalid ticket: {0}")]
    InvalidTicket(Cow<'static, str>),

    /// Connect race ran out of time
    #[error("connect timed out")]
    ConnectTimeout,

    /// Peer refused, closed or aborted
    #[error("connection refused: {0}")]
    ConnectRefused(Cow<'static, str>),

    /// Integrity verification failed
    #[error("integrity check failed: {0}")]
    Integrity(Cow<'static, str>),

    /// Local I/O failure
    #[error("I/O error: {0}")]
    Io(Cow<'static, str>),

    /// A bounded wait expired
    #[error("timed out {0}")]
    Timeout(Cow<'static, str>),

    /// Peer violated the protocol
    #[error("protocol error: {0}")]
    Protocol(Cow<'static, str>),
}

impl TransferError {
    /// Taxonomy entry, `None` for cancellation
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        Some(match self {
            TransferError::Cancelled => return None,
            TransferError::InvalidTicket(_) => ErrorKind::InvalidTicket,
            TransferError::ConnectTimeout => ErrorKind::ConnectTimeout,
            TransferError::ConnectRefused(_) => ErrorKind::ConnectRefused,
            TransferError::Integrity(_) => ErrorKind::Integrity,
            TransferError::Io(_) => ErrorKind::Io,
            TransferError::Timeout(_) => ErrorKind::Timeout,
            TransferError::Protocol(_) => ErrorKind::Protocol,
        })
    }

    /// Whether the failure originated at the peer (nothing left to tell it)
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, TransferError::ConnectRefused(_))
    }

    /// Create a timeout error with static context (zero allocation)
    #[must_use]
    pub const fn timeout(context: &'static str) -> Self {
        TransferError::Timeout(Cow::Borrowed(context))
    }

    /// Create a protocol error with static context (zero allocation)
    #[must_use]
    pub const fn protocol(context: &'static str) -> Self {
        TransferError::Protocol(Cow::Borrowed(context))
    }

    /// Create an integrity error with static context (zero allocation)
    #[must_use]
    pub const fn integrity(context: &'static str) -> Self {
        TransferError::Integrity(Cow::Borrowed(context))
    }
}

impl From<ConnectError> for TransferError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Timeout => TransferError::ConnectTimeout,
            ConnectError::Refused(msg) => TransferError::ConnectRefused(msg.into()),
        }
    }
}

impl From<TransportError> for TransferError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => {
                TransferError::ConnectRefused(Cow::Borrowed("peer closed the connection"))
            }
            TransportError::Relay(e) => TransferError::ConnectRefused(e.to_string().into()),
            TransportError::Timeout => TransferError::timeout("during handshake"),
            TransportError::Io(e) => TransferError::Io(e.to_string().into()),
            TransportError::BindFailed(e) => TransferError::Io(e.into()),
            e @ (TransportError::FrameTooLarge(_)
            | TransportError::Codec(_)
            | TransportError::Crypto(_)
            | TransportError::Protocol(_)) => TransferError::Protocol(e.to_string().into()),
        }
    }
}

impl From<FileError> for TransferError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::InvalidName(_) => TransferError::Protocol(err.to_string().into()),
            other => TransferError::Io(other.to_string().into()),
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::Io(err.to_string().into())
    }
}

impl From<ferry_crypto::CryptoError> for TransferError {
    fn from(err: ferry_crypto::CryptoError) -> Self {
        TransferError::Io(err.to_string().into())
    }
}

impl From<TicketError> for TransferError {
    fn from(err: TicketError) -> Self {
        TransferError::InvalidTicket(err.to_string().into())
    }
}

/// Errors returned synchronously by controller operations
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A session is already starting or running
    #[error("controller busy: a transfer is already active")]
    Busy,

    /// Ticket or target rejected before any session was created
    #[error(transparent)]
    InvalidTicket(#[from] TicketError),

    /// Handle does not name a live controller
    #[error("unknown controller handle {0}")]
    UnknownHandle(u64),

    /// Caller passed an unusable argument
    #[error("invalid argument: {0}")]
    InvalidArgument(Cow<'static, str>),

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// Runtime could not be started
    #[error("runtime unavailable: {0}")]
    Runtime(String),
}

/// Result type for controller operations
pub type Result<T> = std::result::Result<T, ControllerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::ConnectRefused).unwrap(),
            "\"connect_refused\""
        );
        assert_eq!(ErrorKind::InvalidTicket.to_string(), "invalid_ticket");
    }

    #[test]
    fn test_transfer_error_kinds() {
        assert_eq!(TransferError::Cancelled.kind(), None);
        assert_eq!(
            TransferError::integrity("digest").kind(),
            Some(ErrorKind::Integrity)
        );
        assert_eq!(
            TransferError::from(ConnectError::Timeout).kind(),
            Some(ErrorKind::ConnectTimeout)
        );
    }

    #[test]
    fn test_transport_error_mapping() {
        assert_eq!(
            TransferError::from(TransportError::Closed).kind(),
            Some(ErrorKind::ConnectRefused)
        );
        assert_eq!(
            TransferError::from(TransportError::Codec("bad".into())).kind(),
            Some(ErrorKind::Protocol)
        );
        assert_eq!(
            TransferError::from(TransportError::Timeout).kind(),
            Some(ErrorKind::Timeout)
        );
    }

    #[test]
    fn test_file_error_mapping() {
        assert_eq!(
            TransferError::from(FileError::InvalidName("../x".into())).kind(),
            Some(ErrorKind::Protocol)
        );
        assert_eq!(
            TransferError::from(FileError::SourceChanged {
                expected: 10,
                actual: 5
            })
            .kind(),
            Some(ErrorKind::Io)
        );
    }
}
