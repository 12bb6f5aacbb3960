//! Process-wide handle table.
//!
//! Foreign callers never hold references to a [`Controller`]; they hold a
//! `u64` handle. Handles come from a counter starting at 1 and are never
//! reused, so a stale handle simply finds nothing.

use std::path::Path;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

use crate::config::ControllerConfig;
use crate::controller::Controller;
use crate::error::{ControllerError, Result};
use crate::event::Event;

/// Opaque controller handle (0 is never valid)
pub type ControllerHandle = u64;

/// Outcome of polling a handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// Next event
    Event(Event),
    /// Controller exists, nothing pending
    Empty,
    /// No such controller
    UnknownHandle,
}

impl PollResult {
    /// The event, if one was returned
    pub fn into_event(self) -> Option<Event> {
        match self {
            PollResult::Event(event) => Some(event),
            PollResult::Empty | PollResult::UnknownHandle => None,
        }
    }
}

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Handle table of live controllers
pub struct Registry {
    controllers: DashMap<ControllerHandle, Arc<Controller>>,
    next_handle: AtomicU64,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            controllers: DashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    /// The process-wide registry
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Create a controller and return its handle
    pub fn create(&self, config: ControllerConfig) -> Result<ControllerHandle> {
        let controller = Controller::new(config)?;
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.controllers.insert(handle, Arc::new(controller));
        debug!("Created controller {handle}");
        Ok(handle)
    }

    /// Look up a controller
    pub fn get(&self, handle: ControllerHandle) -> Option<Arc<Controller>> {
        self.controllers.get(&handle).map(|c| Arc::clone(c.value()))
    }

    // Clone out of the map so no shard lock is held while the controller runs
    fn controller(&self, handle: ControllerHandle) -> Result<Arc<Controller>> {
        self.get(handle)
            .ok_or(ControllerError::UnknownHandle(handle))
    }

    /// See [`Controller::start_send_wait`]
    pub fn start_send_wait(&self, handle: ControllerHandle, source: impl AsRef<Path>) -> Result<()> {
        self.controller(handle)?.start_send_wait(source)
    }

    /// See [`Controller::start_send_to_ticket`]
    pub fn start_send_to_ticket(
        &self,
        handle: ControllerHandle,
        source: impl AsRef<Path>,
        ticket: &str,
    ) -> Result<()> {
        self.controller(handle)?.start_send_to_ticket(source, ticket)
    }

    /// See [`Controller::start_receive_by_target`]
    pub fn start_receive_by_target(
        &self,
        handle: ControllerHandle,
        target: &str,
        output_dir: impl AsRef<Path>,
    ) -> Result<()> {
        self.controller(handle)?
            .start_receive_by_target(target, output_dir)
    }

    /// See [`Controller::start_receive_listen`]
    pub fn start_receive_listen(
        &self,
        handle: ControllerHandle,
        output_dir: impl AsRef<Path>,
    ) -> Result<()> {
        self.controller(handle)?.start_receive_listen(output_dir)
    }

    /// Take the next event of a controller
    pub fn poll(&self, handle: ControllerHandle) -> PollResult {
        match self.get(handle) {
            None => PollResult::UnknownHandle,
            Some(controller) => controller
                .poll_event()
                .map_or(PollResult::Empty, PollResult::Event),
        }
    }

    /// Cancel a controller's session
    pub fn cancel(&self, handle: ControllerHandle) -> Result<()> {
        self.controller(handle)?.cancel();
        Ok(())
    }

    /// Cancel and forget a controller. The handle is invalid afterwards.
    pub fn destroy(&self, handle: ControllerHandle) -> Result<()> {
        let (_, controller) = self
            .controllers
            .remove(&handle)
            .ok_or(ControllerError::UnknownHandle(handle))?;
        controller.cancel();
        debug!("Destroyed controller {handle}");
        Ok(())
    }

    /// Whether `handle` names a live controller
    pub fn contains(&self, handle: ControllerHandle) -> bool {
        self.controllers.contains_key(&handle)
    }

    /// Number of live controllers
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    /// Whether no controller is live
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPayload;
    use std::time::Duration;

    fn loopback_config() -> ControllerConfig {
        let mut config = ControllerConfig::default();
        config.transport.bind_addr = "127.0.0.1:0".parse().unwrap();
        config
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handles_start_at_one_and_increase() {
        let registry = Registry::new();
        let a = registry.create(loopback_config()).unwrap();
        let b = registry.create(loopback_config()).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(registry.len(), 2);

        registry.destroy(a).unwrap();
        assert!(!registry.contains(a));
        let c = registry.create(loopback_config()).unwrap();
        assert_eq!(c, 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_handles() {
        let registry = Registry::new();
        assert_eq!(registry.poll(0), PollResult::UnknownHandle);
        assert_eq!(registry.poll(42), PollResult::UnknownHandle);
        assert!(matches!(
            registry.cancel(42),
            Err(ControllerError::UnknownHandle(42))
        ));
        assert!(matches!(
            registry.destroy(42),
            Err(ControllerError::UnknownHandle(42))
        ));
        assert!(matches!(
            registry.start_receive_listen(42, "/tmp"),
            Err(ControllerError::UnknownHandle(42))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_poll_empty_vs_unknown() {
        let registry = Registry::new();
        let handle = registry.create(loopback_config()).unwrap();
        assert_eq!(registry.poll(handle), PollResult::Empty);
        registry.destroy(handle).unwrap();
        assert_eq!(registry.poll(handle), PollResult::UnknownHandle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_destroy_cancels_session() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        let handle = registry.create(loopback_config()).unwrap();
        registry.start_receive_listen(handle, dir.path()).unwrap();

        let controller = registry.get(handle).unwrap();
        let mut ticket_seen = false;
        for _ in 0..200 {
            if let PollResult::Event(event) = registry.poll(handle) {
                ticket_seen = matches!(event.payload, EventPayload::TicketReady { .. });
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(ticket_seen);

        registry.destroy(handle).unwrap();
        for _ in 0..200 {
            if !controller.is_active() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!controller.is_active());
        assert_eq!(
            controller.poll_event().map(|e| e.payload),
            Some(EventPayload::Cancelled)
        );
    }
}
