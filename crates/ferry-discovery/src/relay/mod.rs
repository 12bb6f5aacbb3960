//! # Rendezvous Relay
//!
//! Fallback path for peers that cannot reach each other directly. The
//! listener parks a TCP connection on the relay under its session id; a
//! connector presenting the same session id is paired with it and the relay
//! splices the two streams. Everything after pairing is end-to-end encrypted
//! by the peers, so the relay only ever sees ciphertext.
//!
//! ```text
//!   listener ──Listen{s}──▶ ┌───────┐ ◀──Connect{s}── connector
//!            ◀──Waiting──── │ relay │
//!            ◀──Paired───── │       │ ───Paired────▶
//!            ◀═══════ spliced byte stream ═══════▶
//! ```

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{RelayClient, RelayRegistration};
pub use protocol::{RelayError, RelayErrorCode, RelayMessage, SessionId};
pub use server::{RelayServer, RelayServerConfig};

/// Default relay port
pub const DEFAULT_RELAY_PORT: u16 = 7878;

/// Maximum size of a framed control message
pub const MAX_CONTROL_MESSAGE_SIZE: usize = 1024;

/// Relay connection timeout (10 seconds)
pub const RELAY_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
