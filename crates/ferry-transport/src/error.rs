//! Transport error types.

use std::io;

use ferry_crypto::CryptoError;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from underlying stream
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// Peer closed or reset the connection
    #[error("connection closed by peer")]
    Closed,

    /// Frame length exceeds the protocol maximum
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Message could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// Encryption layer failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Peer sent something the protocol does not allow here
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Operation did not complete in time
    #[error("transport timeout")]
    Timeout,

    /// Relay refused or failed
    #[error("relay error: {0}")]
    Relay(#[from] ferry_discovery::RelayError),

    /// Address binding failed
    #[error("failed to bind to address: {0}")]
    BindFailed(String),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => TransportError::Closed,
            _ => TransportError::Io(err),
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Outcome of a failed connect race
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// No path succeeded before the connect deadline
    #[error("connect timed out")]
    Timeout,

    /// Every path failed or was rejected
    #[error("connection refused: {0}")]
    Refused(String),
}
