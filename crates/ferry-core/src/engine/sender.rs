//! Sending side of a transfer.

use std::path::Path;

use ferry_files::FileMetadata;
use ferry_files::chunker::FileChunker;
use ferry_transport::{Connection, WireMessage};
use tokio::fs::File;
use tracing::{debug, info, trace};

use super::{
    ProgressTracker, TransferContext, TransferOutcome, checkpoint, peer_abort, recv, send,
    unexpected,
};
use crate::error::TransferError;

/// Offer `source` to the peer and stream it once accepted.
///
/// Completes only after the receiver confirms with `Done`. The caller is
/// responsible for telling the peer about local failures (see
/// [`super::notify_abort`]).
pub async fn send_file(
    conn: &mut Connection,
    source: &Path,
    meta: &FileMetadata,
    ctx: &TransferContext<'_>,
) -> Result<TransferOutcome, TransferError> {
    let config = ctx.config;
    let file = File::open(source).await?;

    let header = WireMessage::Header {
        name: meta.name.clone(),
        size: meta.size,
        digest: meta.digest,
    };
    checkpoint(
        ctx.cancel,
        Some(config.io_timeout),
        "sending header",
        None,
        send(conn, &header),
    )
    .await?;
    debug!("Offered {} ({} bytes)", meta.name, meta.size);

    match checkpoint(
        ctx.cancel,
        Some(config.ack_timeout),
        "waiting for accept",
        None,
        recv(conn),
    )
    .await?
    {
        WireMessage::Accept => {}
        WireMessage::Abort { reason, message } => return Err(peer_abort(reason, &message)),
        other => return Err(unexpected(&other, "instead of Accept")),
    }

    let chunker = FileChunker::with_chunk_size(config.chunk_size);
    let mut reader = chunker.reader(file, meta.size);
    let mut tracker = ProgressTracker::new(
        ctx.progress,
        meta.size,
        chunker.chunk_size(),
        config.progress_interval,
    );
    tracker.start();

    loop {
        let next = checkpoint(
            ctx.cancel,
            Some(config.io_timeout),
            "reading source",
            Some(&mut tracker),
            async { reader.next_chunk().await.map_err(TransferError::from) },
        )
        .await?;
        let Some(data) = next else { break };

        let len = data.len() as u64;
        let chunk = WireMessage::Chunk(data);
        checkpoint(
            ctx.cancel,
            Some(config.io_timeout),
            "sending chunk",
            Some(&mut tracker),
            send(conn, &chunk),
        )
        .await?;
        tracker.advance(len);
        trace!("Sent {}/{} bytes", tracker.done(), meta.size);
    }

    match checkpoint(
        ctx.cancel,
        Some(config.ack_timeout),
        "waiting for confirmation",
        Some(&mut tracker),
        recv(conn),
    )
    .await?
    {
        WireMessage::Done => {}
        WireMessage::Abort { reason, message } => return Err(peer_abort(reason, &message)),
        other => return Err(unexpected(&other, "instead of Done")),
    }

    info!("Sent {} ({} bytes), receiver confirmed", meta.name, meta.size);
    Ok(TransferOutcome {
        path: source.to_path_buf(),
        file_name: meta.name.clone(),
        size: meta.size,
        digest: meta.digest,
    })
}
