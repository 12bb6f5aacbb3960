//! # Ferry Transport
//!
//! Peer-to-peer transport sessions for the Ferry protocol.
//!
//! This crate provides:
//! - Length-prefixed framing with a 64 KiB ceiling
//! - The plaintext hello exchange that binds a connection to a ticket
//! - Noise-secured, message-oriented [`Connection`]s
//! - A [`Listener`] that accepts exactly one matching peer, directly or
//!   through a rendezvous relay
//! - [`connect`], which races every direct address against the relay path
//!
//! ## Connection setup
//!
//! ```text
//! connector                         listener
//!   ── Hello{version, node, session, role} ──▶
//!   ◀── HelloAck{node} | Reject{reason} ──────
//!   ── Noise NN  -> e ───────────────────────▶
//!   ◀── Noise NN  <- e, ee ──────────────────
//!   ◀═══════ encrypted WireMessages ════════▶
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connect;
pub mod connection;
pub mod error;
pub mod frame;
pub(crate) mod hello;
pub mod identity;
pub mod listener;
pub mod message;

use std::net::SocketAddr;
use std::time::Duration;

pub use connect::{ConnectTarget, connect};
pub use connection::{Connection, ConnectionPath, Handshake};
pub use error::{ConnectError, TransportError, TransportResult};
pub use identity::{NodeId, SessionId};
pub use listener::Listener;
pub use message::{AbortReason, Role, WireMessage};

/// Wire protocol version carried in every hello
pub const PROTOCOL_VERSION: u16 = 1;

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Listener bind address (port 0 picks a free port)
    pub bind_addr: SocketAddr,
    /// Rendezvous relay (`host:port`), if any
    pub relay: Option<String>,
    /// Deadline for the whole connect race
    pub connect_timeout: Duration,
    /// Deadline for an inbound hello and for the Noise handshake
    pub handshake_timeout: Duration,
    /// Deadline for registering with the relay
    pub relay_register_timeout: Duration,
    /// Whether a listener accepts hellos without a session (plain
    /// `host:port` targets).
    ///
    /// On by default so a receiver on the same LAN can dial a waiting sender
    /// by address alone. Any peer that reaches the port then gets the file
    /// without knowing the ticket; turn this off to make the ticket the only
    /// way in.
    pub allow_untargeted: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            relay: None,
            connect_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            relay_register_timeout: Duration::from_secs(10),
            allow_untargeted: true,
        }
    }
}
