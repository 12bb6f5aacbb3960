//! Controller: one transfer at a time, reported through an event queue.
//!
//! ```text
//! Idle ──start──▶ Starting ──▶ Active{AwaitingTicketOrPeer | Connecting | Transferring}
//!                                  │
//!                                  ▼
//!                     Completed | Cancelled | Failed ──start──▶ Starting ...
//! ```
//!
//! Start, poll and cancel are synchronous and never block on network or disk.
//! Each start bumps a generation counter; reports from a task whose
//! generation is no longer current are ignored, so a late event from an
//! aborted session can never leak into the next one.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use ferry_transport::{NodeId, Role};
use serde::Serialize;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::AbortHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ControllerConfig;
use crate::engine::{ProgressSink, TransferOutcome};
use crate::error::{ControllerError, ErrorKind, Result, TicketError, TransferError};
use crate::event::{Event, EventPayload};
use crate::queue::EventQueue;
use crate::session::{self, Reporter, StartRequest};
use crate::ticket::{Target, Ticket};

/// Sub-state of an active session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Preparing or publishing a ticket, or waiting for the peer to use it
    AwaitingTicketOrPeer,
    /// Reaching and securing the peer
    Connecting,
    /// Moving file data
    Transferring,
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    /// No session yet
    #[default]
    Idle,
    /// Start accepted, task not yet running
    Starting,
    /// Session running
    Active(Phase),
    /// Last session completed
    Completed,
    /// Last session was cancelled
    Cancelled,
    /// Last session failed
    Failed,
}

impl ControllerState {
    /// Whether a session is starting or running
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, ControllerState::Starting | ControllerState::Active(_))
    }

    /// Whether the last session has ended
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ControllerState::Completed | ControllerState::Cancelled | ControllerState::Failed
        )
    }
}

/// Point-in-time view of the current or last session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Controller state
    pub state: ControllerState,
    /// Local role
    pub role: Option<Role>,
    /// Bytes moved so far
    pub bytes_transferred: u64,
    /// Announced size, once known
    pub total_bytes: u64,
    /// Peer identity, once connected
    pub peer: Option<NodeId>,
    /// Failure, if the session failed
    pub error: Option<(ErrorKind, String)>,
}

#[derive(Default)]
struct Inner {
    generation: u64,
    snapshot: SessionSnapshot,
    cancel: Option<CancellationToken>,
    task: Option<AbortHandle>,
}

struct Shared {
    inner: Mutex<Inner>,
    queue: EventQueue,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock only if `generation` is the running session
    fn current(&self, generation: u64) -> Option<MutexGuard<'_, Inner>> {
        let inner = self.lock();
        (inner.generation == generation && inner.snapshot.state.is_busy()).then_some(inner)
    }

    fn emit(&self, generation: u64, payload: EventPayload) {
        let Some(mut inner) = self.current(generation) else {
            return;
        };
        if let EventPayload::Progress {
            bytes_transferred,
            total_bytes,
        } = payload
        {
            inner.snapshot.bytes_transferred = bytes_transferred;
            inner.snapshot.total_bytes = total_bytes;
        }
        // Pushed under the state lock so a terminal event is always last
        self.queue.push(Event::now(payload));
    }

    /// Record the outcome and push the terminal event. Returns false if the
    /// session had already ended.
    fn finish(
        &self,
        generation: u64,
        result: std::result::Result<TransferOutcome, TransferError>,
        abort_task: bool,
    ) -> bool {
        let Some(mut inner) = self.current(generation) else {
            return false;
        };
        inner.cancel = None;
        if let Some(task) = inner.task.take() {
            if abort_task {
                task.abort();
            }
        }

        let payload = match result {
            Ok(outcome) => {
                inner.snapshot.state = ControllerState::Completed;
                inner.snapshot.bytes_transferred = outcome.size;
                inner.snapshot.total_bytes = outcome.size;
                EventPayload::Completed {
                    path: outcome.path.display().to_string(),
                    file_name: outcome.file_name,
                    size: outcome.size,
                    digest: hex::encode(outcome.digest),
                }
            }
            Err(err) => {
                let payload = EventPayload::from_error(&err);
                match err.kind() {
                    None => inner.snapshot.state = ControllerState::Cancelled,
                    Some(kind) => {
                        inner.snapshot.state = ControllerState::Failed;
                        inner.snapshot.error = Some((kind, err.to_string()));
                    }
                }
                payload
            }
        };
        self.queue.push(Event::now(payload));
        true
    }
}

/// Reporter handed to one session task
struct SessionHandle {
    shared: Arc<Shared>,
    generation: u64,
}

impl ProgressSink for SessionHandle {
    fn progress(&self, bytes_transferred: u64, total_bytes: u64) {
        self.shared.emit(
            self.generation,
            EventPayload::Progress {
                bytes_transferred,
                total_bytes,
            },
        );
    }
}

impl Reporter for SessionHandle {
    fn phase(&self, phase: Phase) {
        if let Some(mut inner) = self.shared.current(self.generation) {
            inner.snapshot.state = ControllerState::Active(phase);
        }
    }

    fn peer(&self, peer: NodeId) {
        if let Some(mut inner) = self.shared.current(self.generation) {
            inner.snapshot.peer = Some(peer);
        }
    }

    fn emit(&self, payload: EventPayload) {
        self.shared.emit(self.generation, payload);
    }
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Current runtime, or the shared one for callers outside any runtime
fn runtime_handle() -> Result<Handle> {
    if let Ok(handle) = Handle::try_current() {
        return Ok(handle);
    }
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime.handle().clone());
    }
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .thread_name("ferry-runtime")
        .build()
        .map_err(|e| ControllerError::Runtime(e.to_string()))?;
    Ok(RUNTIME.get_or_init(|| runtime).handle().clone())
}

fn required_path(path: &Path, what: &'static str) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(ControllerError::InvalidArgument(what.into()));
    }
    Ok(path.to_path_buf())
}

/// Transfer controller
pub struct Controller {
    shared: Arc<Shared>,
    config: Arc<ControllerConfig>,
    runtime: Handle,
}

impl Controller {
    /// Create an idle controller
    pub fn new(config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        let runtime = runtime_handle()?;
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner::default()),
            queue: EventQueue::new(config.events.queue_capacity),
        });
        Ok(Self {
            shared,
            config: Arc::new(config),
            runtime,
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Publish a ticket for `source` and send it to whoever redeems it
    pub fn start_send_wait(&self, source: impl AsRef<Path>) -> Result<()> {
        let source = required_path(source.as_ref(), "file path is empty")?;
        self.start(StartRequest::SendWait { source })
    }

    /// Send `source` to the receiver that published `ticket`
    pub fn start_send_to_ticket(&self, source: impl AsRef<Path>, ticket: &str) -> Result<()> {
        let source = required_path(source.as_ref(), "file path is empty")?;
        let ticket = Ticket::decode(ticket)?;
        if ticket.descriptor.is_some() {
            return Err(TicketError::OffersFile.into());
        }
        self.start(StartRequest::SendToTicket { source, ticket })
    }

    /// Receive from a sender's ticket or plain `host:port` into `output_dir`
    pub fn start_receive_by_target(&self, target: &str, output_dir: impl AsRef<Path>) -> Result<()> {
        let output_dir = required_path(output_dir.as_ref(), "output directory is empty")?;
        let target = Target::parse(target)?;
        self.start(StartRequest::ReceiveTarget { target, output_dir })
    }

    /// Publish a ticket and receive from whoever redeems it
    pub fn start_receive_listen(&self, output_dir: impl AsRef<Path>) -> Result<()> {
        let output_dir = required_path(output_dir.as_ref(), "output directory is empty")?;
        self.start(StartRequest::ReceiveListen { output_dir })
    }

    fn start(&self, request: StartRequest) -> Result<()> {
        let role = request.role();
        let (generation, cancel) = {
            let mut inner = self.shared.lock();
            if inner.snapshot.state.is_busy() {
                return Err(ControllerError::Busy);
            }
            inner.generation += 1;
            inner.snapshot = SessionSnapshot {
                state: ControllerState::Starting,
                role: Some(role),
                ..SessionSnapshot::default()
            };
            let cancel = CancellationToken::new();
            inner.cancel = Some(cancel.clone());
            (inner.generation, cancel)
        };
        info!("Starting session {generation} as {role}");

        let reporter = SessionHandle {
            shared: self.shared.clone(),
            generation,
        };
        let config = self.config.clone();
        let task = self.runtime.spawn(async move {
            let result = session::run(request, &config, &cancel, &reporter).await;
            match &result {
                Ok(outcome) => info!("Session {generation} completed: {}", outcome.file_name),
                Err(TransferError::Cancelled) => info!("Session {generation} cancelled"),
                Err(e) => warn!("Session {generation} failed: {e}"),
            }
            reporter.shared.finish(generation, result, false);
        });

        if let Some(mut inner) = self.shared.current(generation) {
            inner.task = Some(task.abort_handle());
        }
        Ok(())
    }

    /// Take the next event, if any
    pub fn poll_event(&self) -> Option<Event> {
        self.shared.queue.poll()
    }

    /// Cancel the running session. No-op when idle or finished.
    ///
    /// The session gets `cancel_grace` to tell its peer and clean up; after
    /// that it is aborted and `Cancelled` is reported on its behalf.
    pub fn cancel(&self) {
        let generation = {
            let inner = self.shared.lock();
            if !inner.snapshot.state.is_busy() {
                return;
            }
            if let Some(token) = &inner.cancel {
                token.cancel();
            }
            inner.generation
        };
        info!("Cancelling session {generation}");

        let shared = self.shared.clone();
        let grace = self.config.transfer.cancel_grace;
        self.runtime.spawn(async move {
            time::sleep(grace).await;
            if shared.finish(generation, Err(TransferError::Cancelled), true) {
                warn!("Session {generation} did not stop within {grace:?}, aborted");
            }
        });
    }

    /// Current or last session
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().snapshot.clone()
    }

    /// Controller state
    pub fn state(&self) -> ControllerState {
        self.shared.lock().snapshot.state
    }

    /// Whether a session is starting or running
    pub fn is_active(&self) -> bool {
        self.state().is_busy()
    }

    /// Events waiting to be polled
    pub fn pending_events(&self) -> usize {
        self.shared.queue.len()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}
