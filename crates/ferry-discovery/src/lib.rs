//! # Ferry Discovery
//!
//! Reachability helpers for Ferry peers.
//!
//! - [`addr`]: choosing which local addresses are worth advertising
//! - [`relay`]: a TCP rendezvous relay that pairs a listener and a connector
//!   by session identifier and splices their streams

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod addr;
pub mod relay;

pub use relay::{RelayClient, RelayError, RelayServer, RelayServerConfig};
