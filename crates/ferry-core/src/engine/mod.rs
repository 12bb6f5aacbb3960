//! Transfer engine.
//!
//! Drives one file over a secured [`Connection`]:
//!
//! ```text
//! sender                               receiver
//!   ── Header{name, size, digest} ─────▶  validate name, match ticket
//!   ◀────────────────────────── Accept    stage <name>.part
//!   ── Chunk ── Chunk ── ... ──────────▶  write, hash
//!   ◀──────────────────────────── Done    verify digest, rename
//! ```
//!
//! Either side may send `Abort{reason}` at any point. Every wait is a
//! cancellation checkpoint with its own deadline.

mod progress;
mod receiver;
mod sender;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use ferry_transport::{AbortReason, Connection, WireMessage};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::TransferConfig;
use crate::error::TransferError;

pub use progress::ProgressTracker;
pub use receiver::receive_file;
pub use sender::send_file;

/// Receives byte counts as a transfer advances
pub trait ProgressSink: Send + Sync {
    /// Report `bytes_transferred` of `total_bytes`
    fn progress(&self, bytes_transferred: u64, total_bytes: u64);
}

/// What a transfer needs besides the connection
pub struct TransferContext<'a> {
    /// Fired when the caller cancels
    pub cancel: &'a CancellationToken,
    /// Chunking and deadlines
    pub config: &'a TransferConfig,
    /// Progress receiver
    pub progress: &'a dyn ProgressSink,
}

/// A completed, verified transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Saved file (receiver) or source file (sender)
    pub path: PathBuf,
    /// File name as announced
    pub file_name: String,
    /// File size in bytes
    pub size: u64,
    /// BLAKE3 digest
    pub digest: [u8; 32],
}

/// Await `fut` unless cancelled first or `limit` expires.
///
/// With a tracker, a heartbeat Progress is emitted whenever the tracker's
/// next report falls due while waiting.
pub(crate) async fn checkpoint<T, F>(
    cancel: &CancellationToken,
    limit: Option<Duration>,
    what: &'static str,
    mut progress: Option<&mut ProgressTracker<'_>>,
    fut: F,
) -> Result<T, TransferError>
where
    F: Future<Output = Result<T, TransferError>>,
{
    tokio::pin!(fut);
    let deadline = async {
        match limit {
            Some(limit) => time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        // Due time lives in the tracker so waits across checkpoints share it
        let due = progress.as_deref().map(ProgressTracker::next_due);
        let heartbeat = async {
            match due {
                Some(due) => time::sleep_until(due).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            result = &mut fut => return result,
            _ = &mut deadline => return Err(TransferError::timeout(what)),
            _ = heartbeat => {
                if let Some(tracker) = progress.as_deref_mut() {
                    tracker.heartbeat();
                }
            }
        }
    }
}

pub(crate) async fn recv(conn: &mut Connection) -> Result<WireMessage, TransferError> {
    Ok(conn.recv().await?)
}

pub(crate) async fn send(conn: &mut Connection, msg: &WireMessage) -> Result<(), TransferError> {
    Ok(conn.send(msg).await?)
}

/// Error for an `Abort` received from the peer
pub(crate) fn peer_abort(reason: AbortReason, message: &str) -> TransferError {
    match reason {
        AbortReason::Integrity => TransferError::Integrity(format!("peer: {message}").into()),
        other => TransferError::ConnectRefused(format!("peer aborted ({other}): {message}").into()),
    }
}

/// Error for a message that does not fit the current step
pub(crate) fn unexpected(msg: &WireMessage, step: &str) -> TransferError {
    TransferError::Protocol(format!("unexpected {} {step}", msg.message_type()).into())
}

/// Reason to tell the peer when the local side gives up with `err`
pub(crate) fn abort_reason(err: &TransferError) -> Option<AbortReason> {
    match err {
        TransferError::Cancelled => Some(AbortReason::Cancelled),
        TransferError::Integrity(_) => Some(AbortReason::Integrity),
        TransferError::Io(_) => Some(AbortReason::Io),
        TransferError::Protocol(_) | TransferError::Timeout(_) => Some(AbortReason::Protocol),
        TransferError::ConnectRefused(_)
        | TransferError::ConnectTimeout
        | TransferError::InvalidTicket(_) => None,
    }
}

/// Best-effort `Abort` to the peer, bounded by `grace`
pub async fn notify_abort(conn: &mut Connection, err: &TransferError, grace: Duration) {
    let Some(reason) = abort_reason(err) else {
        return;
    };
    let abort = WireMessage::abort(reason, err.to_string());
    match time::timeout(grace, conn.send(&abort)).await {
        Ok(Ok(())) => debug!("Told peer: abort ({reason})"),
        Ok(Err(e)) => debug!("Could not send abort: {e}"),
        Err(_) => debug!("Abort not sent within {grace:?}"),
    }
}
