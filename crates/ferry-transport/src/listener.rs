//! Single-peer listener.
//!
//! A [`Listener`] owns a TCP socket and, optionally, a parked registration on
//! a rendezvous relay. Inbound streams from both sources go through the hello
//! exchange concurrently; the first valid hello claims the listener and every
//! later one is rejected as busy.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ferry_discovery::addr::advertised_addresses;
use ferry_discovery::relay::{RelayClient, RelayRegistration};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;
use tracing::{debug, info, warn};

use crate::TransportConfig;
use crate::connection::{BoxStream, ConnectionPath, Handshake};
use crate::error::{TransportError, TransportResult};
use crate::hello::{HelloPolicy, serve_hello};
use crate::identity::{NodeId, SessionId};
use crate::message::Role;

/// Delay between relay re-registration attempts
const RELAY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Pause after a failed TCP accept
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

type Inbound = (BoxStream, ConnectionPath, String);

/// Listener waiting for the one peer of a session
pub struct Listener {
    identity: NodeId,
    session: SessionId,
    role: Role,
    local_addr: SocketAddr,
    advertised: Vec<SocketAddr>,
    relay_hint: Option<String>,
    accepted: mpsc::Receiver<Handshake>,
    tasks: Vec<JoinHandle<()>>,
}

impl Listener {
    /// Bind the TCP socket and register with the relay, if configured.
    ///
    /// A failed relay registration is logged and leaves the listener
    /// reachable on direct addresses only.
    pub async fn bind(
        identity: NodeId,
        session: SessionId,
        role: Role,
        config: &TransportConfig,
    ) -> TransportResult<Self> {
        let tcp = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {e}", config.bind_addr)))?;
        let local_addr = tcp.local_addr()?;
        let advertised = advertised_addresses(local_addr);
        info!("Listening on {local_addr} as {role}");

        let claimed = Arc::new(AtomicBool::new(false));
        let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(16);
        let (accepted_tx, accepted_rx) = mpsc::channel(1);
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(accept_loop(tcp, inbound_tx.clone())));

        let mut relay_hint = None;
        if let Some(relay) = &config.relay {
            let client = RelayClient::new(relay.clone()).with_timeout(config.relay_register_timeout);
            match client.listen(session.0).await {
                Ok(registration) => {
                    info!("Registered with relay {relay}");
                    relay_hint = Some(relay.clone());
                    tasks.push(tokio::spawn(relay_loop(
                        client,
                        session,
                        registration,
                        inbound_tx.clone(),
                        claimed.clone(),
                    )));
                }
                Err(e) => warn!("Relay registration at {relay} failed: {e}"),
            }
        }
        drop(inbound_tx);

        let policy = HelloPolicy {
            identity,
            session,
            role,
            allow_untargeted: config.allow_untargeted,
        };
        tasks.push(tokio::spawn(dispatch(
            inbound_rx,
            accepted_tx,
            policy,
            claimed,
            config.handshake_timeout,
        )));

        Ok(Self {
            identity,
            session,
            role,
            local_addr,
            advertised,
            relay_hint,
            accepted: accepted_rx,
            tasks,
        })
    }

    /// Wait for the peer that claims this listener. Cancel safe.
    pub async fn accept(&mut self) -> TransportResult<Handshake> {
        self.accepted.recv().await.ok_or(TransportError::Closed)
    }

    /// Bound socket address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Addresses worth putting into a ticket
    pub fn advertised_addrs(&self) -> &[SocketAddr] {
        &self.advertised
    }

    /// Relay the listener is registered with
    pub fn relay_hint(&self) -> Option<&str> {
        self.relay_hint.as_deref()
    }

    /// Listener identity
    pub fn node_id(&self) -> NodeId {
        self.identity
    }

    /// Session this listener serves
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Role of the local side
    pub fn role(&self) -> Role {
        self.role
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn accept_loop(tcp: TcpListener, inbound: mpsc::Sender<Inbound>) {
    loop {
        match tcp.accept().await {
            Ok((stream, addr)) => {
                let _ = stream.set_nodelay(true);
                debug!("Inbound connection from {addr}");
                let item: Inbound = (Box::new(stream), ConnectionPath::Direct, addr.to_string());
                if inbound.send(item).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("Accept failed: {e}");
                time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}

async fn relay_loop(
    client: RelayClient,
    session: SessionId,
    mut registration: RelayRegistration,
    inbound: mpsc::Sender<Inbound>,
    claimed: Arc<AtomicBool>,
) {
    loop {
        match registration.paired().await {
            Ok(stream) => {
                debug!("Relay paired an inbound peer");
                let item: Inbound = (
                    Box::new(stream),
                    ConnectionPath::Relay,
                    client.relay_addr().to_string(),
                );
                if inbound.send(item).await.is_err() {
                    return;
                }
            }
            Err(e) => warn!("Relay registration lost: {e}"),
        }

        registration = loop {
            if claimed.load(Ordering::Acquire) {
                return;
            }
            match client.listen(session.0).await {
                Ok(r) => break r,
                Err(e) => {
                    debug!("Relay re-registration failed: {e}");
                    time::sleep(RELAY_RETRY_DELAY).await;
                }
            }
        };
    }
}

async fn dispatch(
    mut inbound: mpsc::Receiver<Inbound>,
    accepted: mpsc::Sender<Handshake>,
    policy: HelloPolicy,
    claimed: Arc<AtomicBool>,
    hello_timeout: Duration,
) {
    let policy = Arc::new(policy);
    let mut hellos = JoinSet::new();
    let mut accepted = Some(accepted);

    loop {
        tokio::select! {
            item = inbound.recv() => {
                let Some((stream, path, remote)) = item else { break };
                let policy = policy.clone();
                let claimed = claimed.clone();
                hellos.spawn(async move {
                    serve_hello(stream, path, remote, &policy, &claimed, hello_timeout).await
                });
            }
            Some(joined) = hellos.join_next(), if !hellos.is_empty() => {
                match joined {
                    Ok(Ok(Some(handshake))) => {
                        if let Some(tx) = accepted.take() {
                            let _ = tx.send(handshake).await;
                        }
                    }
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => debug!("Inbound hello failed: {e}"),
                    Err(e) => debug!("Hello task ended abnormally: {e}"),
                }
            }
        }
    }
}
