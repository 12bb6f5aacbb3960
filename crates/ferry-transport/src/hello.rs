//! Plaintext hello exchange for both sides of a connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::debug;

use crate::PROTOCOL_VERSION;
use crate::connection::{BoxStream, ConnectionPath, Handshake, RoundTrip};
use crate::error::{TransportError, TransportResult};
use crate::frame::{read_frame, write_frame};
use crate::identity::{NodeId, SessionId};
use crate::message::{ControlMessage, RejectReason, Role, from_bytes, to_bytes};

/// What a listener accepts
#[derive(Debug, Clone)]
pub(crate) struct HelloPolicy {
    pub identity: NodeId,
    pub session: SessionId,
    pub role: Role,
    pub allow_untargeted: bool,
}

impl HelloPolicy {
    fn check(&self, version: u16, session: Option<SessionId>, role: Role) -> Option<RejectReason> {
        if version != PROTOCOL_VERSION {
            return Some(RejectReason::VersionMismatch);
        }
        if role != self.role.opposite() {
            return Some(RejectReason::RoleMismatch);
        }
        match session {
            Some(s) if s == self.session => None,
            None if self.allow_untargeted => None,
            _ => Some(RejectReason::UnknownSession),
        }
    }
}

/// Connector side: send our hello, wait for the listener's verdict.
pub(crate) async fn client_hello(
    mut stream: BoxStream,
    hello: &ControlMessage,
    expected_peer: Option<NodeId>,
    path: ConnectionPath,
    remote: String,
) -> TransportResult<Handshake> {
    let started = Instant::now();
    write_frame(&mut stream, &to_bytes(hello)?).await?;
    let reply: ControlMessage = from_bytes(&read_frame(&mut stream).await?)?;
    let rtt = started.elapsed();

    let ControlMessage::Hello { role, .. } = hello else {
        return Err(TransportError::Protocol("client hello expected".into()));
    };

    match reply {
        ControlMessage::HelloAck { node_id } => {
            if let Some(expected) = expected_peer {
                if expected != node_id {
                    return Err(TransportError::Protocol(format!(
                        "peer identity mismatch at {remote}: expected {}, got {}",
                        expected.short(),
                        node_id.short()
                    )));
                }
            }
            Ok(Handshake::new(
                stream,
                node_id,
                role.opposite(),
                path,
                remote,
                true,
                RoundTrip::Measured(rtt),
            ))
        }
        ControlMessage::Reject { reason } => Err(TransportError::Protocol(format!(
            "rejected by {remote}: {reason}"
        ))),
        other => Err(TransportError::Protocol(format!(
            "unexpected {} during hello",
            other.message_type()
        ))),
    }
}

/// Listener side: read one hello, validate it and try to claim the listener.
///
/// Returns `Ok(None)` when the hello was answered with a rejection.
pub(crate) async fn serve_hello(
    mut stream: BoxStream,
    path: ConnectionPath,
    remote: String,
    policy: &HelloPolicy,
    claimed: &AtomicBool,
    timeout: Duration,
) -> TransportResult<Option<Handshake>> {
    let frame = time::timeout(timeout, read_frame(&mut stream))
        .await
        .map_err(|_| TransportError::Timeout)??;
    let hello: ControlMessage = from_bytes(&frame)?;

    let (version, node_id, session, role) = match hello {
        ControlMessage::Hello {
            version,
            node_id,
            session,
            role,
        } => (version, node_id, session, role),
        other => {
            return Err(TransportError::Protocol(format!(
                "expected Hello, got {}",
                other.message_type()
            )));
        }
    };

    let verdict = policy.check(version, session, role).or_else(|| {
        claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .err()
            .map(|_| RejectReason::Busy)
    });

    if let Some(reason) = verdict {
        debug!("Rejecting hello from {remote}: {reason}");
        let reject = ControlMessage::Reject { reason };
        let _ = write_frame(&mut stream, &to_bytes(&reject)?).await;
        return Ok(None);
    }

    let ack = ControlMessage::HelloAck {
        node_id: policy.identity,
    };
    if let Err(e) = write_frame(&mut stream, &to_bytes(&ack)?).await {
        claimed.store(false, Ordering::Release);
        return Err(e);
    }

    let acked = Instant::now();
    debug!("Accepted {} via {path} from {remote}", node_id.short());
    Ok(Some(Handshake::new(
        stream,
        node_id,
        role,
        path,
        remote,
        false,
        RoundTrip::Since(acked),
    )))
}
