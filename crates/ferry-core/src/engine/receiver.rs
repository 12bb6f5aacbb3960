//! Receiving side of a transfer.

use std::path::Path;

use ferry_files::hasher::FileHasher;
use ferry_files::human_bytes;
use ferry_files::naming::{sanitize_file_name, unique_destination};
use ferry_files::staging::PartialFile;
use ferry_transport::{Connection, WireMessage};
use tokio::time;
use tracing::{info, trace, warn};

use super::{
    ProgressTracker, TransferContext, TransferOutcome, checkpoint, peer_abort, recv, send,
    unexpected,
};
use crate::error::TransferError;
use crate::ticket::TransferDescriptor;

/// Accept the peer's file into `output_dir`.
///
/// Data lands in a `.part` staging file that is deleted on every exit except
/// a verified completion. `expected` is the descriptor the ticket promised.
pub async fn receive_file(
    conn: &mut Connection,
    output_dir: &Path,
    expected: Option<&TransferDescriptor>,
    ctx: &TransferContext<'_>,
) -> Result<TransferOutcome, TransferError> {
    let config = ctx.config;

    let (name, size, digest) = match checkpoint(
        ctx.cancel,
        Some(config.ack_timeout),
        "waiting for header",
        None,
        recv(conn),
    )
    .await?
    {
        WireMessage::Header { name, size, digest } => (name, size, digest),
        WireMessage::Abort { reason, message } => return Err(peer_abort(reason, &message)),
        other => return Err(unexpected(&other, "instead of Header")),
    };

    let name = sanitize_file_name(&name)?;
    if let Some(expected) = expected {
        if expected.name != name || expected.size != size || expected.digest != digest {
            return Err(TransferError::integrity(
                "offered file does not match the ticket",
            ));
        }
    }

    tokio::fs::create_dir_all(output_dir).await?;
    let destination = unique_destination(output_dir, &name).await?;
    let mut part = PartialFile::create(output_dir, &name).await?;
    info!(
        "Receiving {name} ({}) into {}",
        human_bytes(size),
        destination.display()
    );

    checkpoint(
        ctx.cancel,
        Some(config.io_timeout),
        "sending accept",
        None,
        send(conn, &WireMessage::Accept),
    )
    .await?;

    let mut hasher = FileHasher::new();
    let mut tracker =
        ProgressTracker::new(ctx.progress, size, config.chunk_size, config.progress_interval);
    tracker.start();

    while part.written() < size {
        let data = match checkpoint(
            ctx.cancel,
            Some(config.io_timeout),
            "waiting for data",
            Some(&mut tracker),
            recv(conn),
        )
        .await?
        {
            WireMessage::Chunk(data) => data,
            WireMessage::Abort { reason, message } => return Err(peer_abort(reason, &message)),
            other => return Err(unexpected(&other, "during data")),
        };

        if data.is_empty() {
            return Err(TransferError::protocol("empty chunk"));
        }
        if data.len() as u64 > size - part.written() {
            return Err(TransferError::protocol("more data than announced"));
        }

        checkpoint(
            ctx.cancel,
            Some(config.io_timeout),
            "writing chunk",
            Some(&mut tracker),
            async { part.write_chunk(&data).await.map_err(TransferError::from) },
        )
        .await?;
        hasher.update(&data);
        tracker.advance(data.len() as u64);
        trace!("Received {}/{size} bytes", part.written());
    }

    if hasher.finalize() != digest {
        warn!("Digest mismatch for {name}, discarding");
        return Err(TransferError::integrity("digest mismatch"));
    }

    let saved = part.persist(&destination).await?;
    info!("Saved {}", saved.display());

    // The file is already in place; a peer that misses Done only affects its
    // own outcome.
    match time::timeout(config.io_timeout, send(conn, &WireMessage::Done)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Could not confirm to sender: {e}"),
        Err(_) => warn!("Timed out confirming to sender"),
    }

    Ok(TransferOutcome {
        path: saved,
        file_name: name,
        size,
        digest,
    })
}
