//! # Ferry Core
//!
//! Peer-to-peer file transfer controller.
//!
//! This crate provides:
//! - The ticket codec ([`Ticket`], [`Target`])
//! - The transfer engine that moves and verifies one file over a secured
//!   connection
//! - A bounded event queue with progress coalescing
//! - The [`Controller`] state machine and the process-wide handle
//!   [`Registry`] the foreign boundary calls into
//!
//! ## Usage
//!
//! ```no_run
//! use ferry_core::{ControllerConfig, Registry, PollResult};
//!
//! let registry = Registry::global();
//! let handle = registry.create(ControllerConfig::default()).unwrap();
//! registry.start_receive_listen(handle, "/tmp/incoming").unwrap();
//! loop {
//!     match registry.poll(handle) {
//!         PollResult::Event(event) if event.is_terminal() => break,
//!         PollResult::Event(event) => println!("{}", event.to_json().unwrap()),
//!         PollResult::Empty => std::thread::sleep(std::time::Duration::from_millis(100)),
//!         PollResult::UnknownHandle => break,
//!     }
//! }
//! registry.destroy(handle).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod event;
pub mod queue;
pub mod registry;
pub mod session;
pub mod ticket;

pub use config::{ControllerConfig, EventConfig, Settings, SettingsError, TransferConfig};
pub use controller::{Controller, ControllerState, Phase, SessionSnapshot};
pub use error::{ControllerError, ErrorKind, TicketError, TransferError};
pub use event::{Event, EventPayload};
pub use queue::EventQueue;
pub use registry::{ControllerHandle, PollResult, Registry};
pub use ticket::{Target, Ticket, TransferDescriptor};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
