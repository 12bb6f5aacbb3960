//! Established peer connections.

use std::fmt;
use std::time::Duration;

use ferry_crypto::noise::{NoiseHandshake, NoiseTransport};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Instant};
use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::frame::{read_frame, write_frame};
use crate::identity::NodeId;
use crate::message::{Role, WireMessage, from_bytes, to_bytes};

/// Byte stream a connection runs over (TCP directly or spliced by a relay)
pub trait PeerStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> PeerStream for T {}

/// Boxed peer stream
pub type BoxStream = Box<dyn PeerStream>;

/// How the two peers reached each other
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPath {
    /// Straight TCP connection
    Direct,
    /// Spliced through a rendezvous relay
    Relay,
}

impl fmt::Display for ConnectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionPath::Direct => write!(f, "direct"),
            ConnectionPath::Relay => write!(f, "relay"),
        }
    }
}

/// Round-trip timing carried from the hello into the Noise handshake
#[derive(Debug, Clone, Copy)]
pub(crate) enum RoundTrip {
    /// Connector timed its hello against the answer
    Measured(Duration),
    /// Listener answered at this instant; the peer's first Noise message
    /// closes the loop
    Since(Instant),
}

impl RoundTrip {
    fn settle(self) -> Duration {
        match self {
            RoundTrip::Measured(rtt) => rtt,
            RoundTrip::Since(at) => at.elapsed(),
        }
    }
}

/// A peer that completed the hello exchange but is not yet encrypted
pub struct Handshake {
    stream: BoxStream,
    peer: NodeId,
    peer_role: Role,
    path: ConnectionPath,
    remote: String,
    initiator: bool,
    round_trip: RoundTrip,
}

impl Handshake {
    pub(crate) fn new(
        stream: BoxStream,
        peer: NodeId,
        peer_role: Role,
        path: ConnectionPath,
        remote: String,
        initiator: bool,
        round_trip: RoundTrip,
    ) -> Self {
        Self {
            stream,
            peer,
            peer_role,
            path,
            remote,
            initiator,
            round_trip,
        }
    }

    /// Remote peer identity
    pub fn peer(&self) -> NodeId {
        self.peer
    }

    /// Remote peer's role
    pub fn peer_role(&self) -> Role {
        self.peer_role
    }

    /// Path the connection took
    pub fn path(&self) -> ConnectionPath {
        self.path
    }

    /// Remote address as dialed or accepted
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Run the Noise handshake. The side that connected is the initiator.
    pub async fn secure(self, timeout: Duration) -> TransportResult<Connection> {
        let Handshake {
            mut stream,
            peer,
            peer_role,
            path,
            remote,
            initiator,
            round_trip,
        } = self;

        let (noise, rtt) = time::timeout(timeout, run_noise(&mut stream, initiator, round_trip))
            .await
            .map_err(|_| TransportError::Timeout)??;
        debug!(
            "Secured {} connection to {} (code {}, rtt {:?})",
            path,
            peer.short(),
            noise.verification_code(),
            rtt
        );

        Ok(Connection {
            stream,
            noise,
            peer,
            peer_role,
            path,
            remote,
            rtt,
        })
    }
}

impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("peer", &self.peer)
            .field("path", &self.path)
            .field("remote", &self.remote)
            .field("initiator", &self.initiator)
            .finish_non_exhaustive()
    }
}

async fn run_noise(
    stream: &mut BoxStream,
    initiator: bool,
    round_trip: RoundTrip,
) -> TransportResult<(NoiseTransport, Duration)> {
    if initiator {
        let mut hs = NoiseHandshake::new_initiator()?;
        write_frame(stream, &hs.write_message()?).await?;
        let reply = read_frame(stream).await?;
        hs.read_message(&reply)?;
        Ok((hs.into_transport()?, round_trip.settle()))
    } else {
        let mut hs = NoiseHandshake::new_responder()?;
        let first = read_frame(stream).await?;
        let rtt = round_trip.settle();
        hs.read_message(&first)?;
        write_frame(stream, &hs.write_message()?).await?;
        Ok((hs.into_transport()?, rtt))
    }
}

/// Encrypted, message-oriented connection to one peer
pub struct Connection {
    stream: BoxStream,
    noise: NoiseTransport,
    peer: NodeId,
    peer_role: Role,
    path: ConnectionPath,
    remote: String,
    rtt: Duration,
}

impl Connection {
    /// Send one message
    pub async fn send(&mut self, msg: &WireMessage) -> TransportResult<()> {
        let plaintext = to_bytes(msg)?;
        let ciphertext = self.noise.encrypt(&plaintext)?;
        write_frame(&mut self.stream, &ciphertext).await
    }

    /// Receive one message.
    ///
    /// Not cancel safe: a dropped call may leave a partial frame unread.
    /// Sending remains possible afterwards.
    pub async fn recv(&mut self) -> TransportResult<WireMessage> {
        let ciphertext = read_frame(&mut self.stream).await?;
        let plaintext = self.noise.decrypt(&ciphertext)?;
        from_bytes(&plaintext)
    }

    /// Shut down the write side
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }

    /// Remote peer identity
    pub fn peer(&self) -> NodeId {
        self.peer
    }

    /// Remote peer's role
    pub fn peer_role(&self) -> Role {
        self.peer_role
    }

    /// Path the connection took
    pub fn path(&self) -> ConnectionPath {
        self.path
    }

    /// Remote address as dialed or accepted
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Short code both peers see when nobody is in between
    pub fn verification_code(&self) -> &str {
        self.noise.verification_code()
    }

    /// Round trip measured while connecting
    pub fn rtt(&self) -> Duration {
        self.rtt
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("path", &self.path)
            .field("remote", &self.remote)
            .field("rtt", &self.rtt)
            .finish_non_exhaustive()
    }
}

/// Build a secured pair over an in-memory pipe.
#[cfg(any(test, feature = "test-util"))]
pub async fn memory_pair() -> (Connection, Connection) {
    let (a, b) = tokio::io::duplex(256 * 1024);
    let left = Handshake::new(
        Box::new(a),
        NodeId([1u8; 32]),
        Role::Receiver,
        ConnectionPath::Direct,
        "memory".into(),
        true,
        RoundTrip::Measured(Duration::ZERO),
    );
    let right = Handshake::new(
        Box::new(b),
        NodeId([2u8; 32]),
        Role::Sender,
        ConnectionPath::Direct,
        "memory".into(),
        false,
        RoundTrip::Since(Instant::now()),
    );
    let timeout = Duration::from_secs(5);
    let (left, right) = tokio::join!(left.secure(timeout), right.secure(timeout));
    (
        left.expect("initiator handshake"),
        right.expect("responder handshake"),
    )
}
