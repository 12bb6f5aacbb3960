//! Session orchestration.
//!
//! Takes one start request from its first step (hashing the source or
//! binding a listener) through connection setup and the transfer engine to a
//! single outcome. All reporting goes through a [`Reporter`].

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use ferry_files::FileMetadata;
use ferry_transport::{
    ConnectTarget, Connection, Handshake, Listener, NodeId, Role, SessionId, connect,
};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ControllerConfig;
use crate::controller::Phase;
use crate::engine::{
    ProgressSink, TransferContext, TransferOutcome, checkpoint, notify_abort, receive_file,
    send_file,
};
use crate::error::TransferError;
use crate::event::EventPayload;
use crate::ticket::{Target, Ticket, TransferDescriptor};

/// What a controller was asked to do
#[derive(Debug, Clone)]
pub enum StartRequest {
    /// Listen, publish a ticket, send to whoever redeems it
    SendWait {
        /// File to send
        source: PathBuf,
    },
    /// Connect to a waiting receiver and send
    SendToTicket {
        /// File to send
        source: PathBuf,
        /// Receiver's ticket
        ticket: Ticket,
    },
    /// Connect to a waiting sender and receive
    ReceiveTarget {
        /// Sender's ticket or address
        target: Target,
        /// Directory for the received file
        output_dir: PathBuf,
    },
    /// Listen, publish a ticket, receive from whoever redeems it
    ReceiveListen {
        /// Directory for the received file
        output_dir: PathBuf,
    },
}

impl StartRequest {
    /// Local role in the transfer
    pub fn role(&self) -> Role {
        match self {
            StartRequest::SendWait { .. } | StartRequest::SendToTicket { .. } => Role::Sender,
            StartRequest::ReceiveTarget { .. } | StartRequest::ReceiveListen { .. } => {
                Role::Receiver
            }
        }
    }
}

/// Where a running session reports to
pub(crate) trait Reporter: ProgressSink {
    /// Entered a new phase
    fn phase(&self, phase: Phase);
    /// Peer identity is known
    fn peer(&self, peer: NodeId);
    /// Publish a non-terminal event
    fn emit(&self, payload: EventPayload);
}

/// Run one session to its outcome
pub(crate) async fn run<R: Reporter>(
    request: StartRequest,
    config: &ControllerConfig,
    cancel: &CancellationToken,
    reporter: &R,
) -> Result<TransferOutcome, TransferError> {
    match request {
        StartRequest::SendWait { source } => {
            reporter.phase(Phase::AwaitingTicketOrPeer);
            let meta = describe_source(&source, cancel).await?;
            let mut listener = listen(
                Role::Sender,
                Some(TransferDescriptor::from(&meta)),
                config,
                cancel,
                reporter,
            )
            .await?;
            let handshake = await_peer(&mut listener, config, cancel).await?;
            let mut conn = secure(handshake, config, cancel, reporter).await?;
            let result = send_file(&mut conn, &source, &meta, &context(config, cancel, reporter)).await;
            conclude(conn, result, config).await
        }
        StartRequest::SendToTicket { source, ticket } => {
            reporter.phase(Phase::Connecting);
            let meta = describe_source(&source, cancel).await?;
            let handshake =
                dial(&ticket.connect_target(), Role::Sender, config, cancel, reporter).await?;
            let mut conn = secure(handshake, config, cancel, reporter).await?;
            let result = send_file(&mut conn, &source, &meta, &context(config, cancel, reporter)).await;
            conclude(conn, result, config).await
        }
        StartRequest::ReceiveTarget { target, output_dir } => {
            reporter.phase(Phase::Connecting);
            let handshake =
                dial(&target.connect_target(), Role::Receiver, config, cancel, reporter).await?;
            let mut conn = secure(handshake, config, cancel, reporter).await?;
            let result = receive_file(
                &mut conn,
                &output_dir,
                target.descriptor(),
                &context(config, cancel, reporter),
            )
            .await;
            conclude(conn, result, config).await
        }
        StartRequest::ReceiveListen { output_dir } => {
            reporter.phase(Phase::AwaitingTicketOrPeer);
            let mut listener = listen(Role::Receiver, None, config, cancel, reporter).await?;
            let handshake = await_peer(&mut listener, config, cancel).await?;
            let mut conn = secure(handshake, config, cancel, reporter).await?;
            let result = receive_file(
                &mut conn,
                &output_dir,
                None,
                &context(config, cancel, reporter),
            )
            .await;
            conclude(conn, result, config).await
        }
    }
}

fn context<'a, R: Reporter>(
    config: &'a ControllerConfig,
    cancel: &'a CancellationToken,
    reporter: &'a R,
) -> TransferContext<'a> {
    TransferContext {
        cancel,
        config: &config.transfer,
        progress: reporter,
    }
}

async fn describe_source(
    source: &Path,
    cancel: &CancellationToken,
) -> Result<FileMetadata, TransferError> {
    let meta = checkpoint(cancel, None, "hashing source", None, async {
        Ok(FileMetadata::from_path(source).await?)
    })
    .await?;
    debug!("Source {} is {} bytes, digest {}", meta.name, meta.size, meta.digest_hex());
    Ok(meta)
}

/// Bind a listener and publish its ticket
async fn listen<R: Reporter>(
    role: Role,
    descriptor: Option<TransferDescriptor>,
    config: &ControllerConfig,
    cancel: &CancellationToken,
    reporter: &R,
) -> Result<Listener, TransferError> {
    let identity = NodeId::random()?;
    let session = SessionId::random()?;
    let listener = checkpoint(cancel, None, "binding listener", None, async {
        Ok(Listener::bind(identity, session, role, &config.transport).await?)
    })
    .await?;

    let mut addrs: Vec<String> = listener
        .advertised_addrs()
        .iter()
        .map(ToString::to_string)
        .collect();
    if addrs.is_empty() && listener.relay_hint().is_none() {
        let loopback = SocketAddr::from((Ipv4Addr::LOCALHOST, listener.local_addr().port()));
        debug!("No routable address found, advertising {loopback}");
        addrs.push(loopback.to_string());
    }

    let ticket = Ticket {
        node: identity,
        session,
        addrs,
        relay: listener.relay_hint().map(str::to_string),
        descriptor,
    };
    info!(
        "Waiting for a peer as {role} ({} direct address(es){})",
        ticket.addrs.len(),
        if ticket.relay.is_some() { ", relay" } else { "" }
    );
    reporter.emit(EventPayload::TicketReady {
        ticket: ticket.encode(),
    });
    Ok(listener)
}

async fn await_peer(
    listener: &mut Listener,
    config: &ControllerConfig,
    cancel: &CancellationToken,
) -> Result<Handshake, TransferError> {
    checkpoint(
        cancel,
        config.transfer.wait_timeout,
        "waiting for peer",
        None,
        async { Ok(listener.accept().await?) },
    )
    .await
}

async fn dial<R: Reporter>(
    target: &ConnectTarget,
    role: Role,
    config: &ControllerConfig,
    cancel: &CancellationToken,
    reporter: &R,
) -> Result<Handshake, TransferError> {
    reporter.emit(EventPayload::PeerConnecting {
        target: target.describe(),
    });
    let identity = NodeId::random()?;
    checkpoint(cancel, None, "connecting", None, async {
        Ok(connect(target, identity, role, &config.transport).await?)
    })
    .await
}

/// Noise handshake, then announce the peer
async fn secure<R: Reporter>(
    handshake: Handshake,
    config: &ControllerConfig,
    cancel: &CancellationToken,
    reporter: &R,
) -> Result<Connection, TransferError> {
    reporter.phase(Phase::Connecting);
    let conn = checkpoint(cancel, None, "securing connection", None, async {
        Ok(handshake.secure(config.transport.handshake_timeout).await?)
    })
    .await?;

    info!(
        "Connected to {} via {} (verification code {})",
        conn.peer().short(),
        conn.path(),
        conn.verification_code()
    );
    reporter.peer(conn.peer());
    reporter.emit(EventPayload::PeerConnected {
        peer: conn.peer().to_hex(),
        path: conn.path().to_string(),
        verification_code: conn.verification_code().to_string(),
        latency_ms: u64::try_from(conn.rtt().as_millis()).unwrap_or(u64::MAX),
    });
    reporter.phase(Phase::Transferring);
    Ok(conn)
}

/// Tell the peer about local failures, then release the connection
async fn conclude(
    mut conn: Connection,
    result: Result<TransferOutcome, TransferError>,
    config: &ControllerConfig,
) -> Result<TransferOutcome, TransferError> {
    let grace = config.transfer.cancel_grace;
    match &result {
        Ok(_) => {
            let _ = time::timeout(grace, conn.close()).await;
        }
        Err(e) => notify_abort(&mut conn, e, grace).await,
    }
    result
}
