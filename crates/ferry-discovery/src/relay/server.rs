//! Relay server pairing listeners with connectors.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time;
use tracing::{debug, info, warn};

use super::protocol::{
    RelayError, RelayErrorCode, RelayMessage, SessionId, read_message, write_message,
};

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Maximum number of parked listeners
    pub max_waiting: usize,
    /// Time a new connection has to send its first control message
    pub hello_timeout: Duration,
    /// Time a listener may stay parked before the relay drops it
    pub session_ttl: Duration,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            max_waiting: 10_000,
            hello_timeout: Duration::from_secs(10),
            session_ttl: Duration::from_secs(600),
        }
    }
}

/// Parked listener: registration token plus the channel that delivers the
/// connector's stream.
struct Waiting {
    token: u64,
    tx: oneshot::Sender<TcpStream>,
}

type WaitingMap = Arc<Mutex<HashMap<SessionId, Waiting>>>;

/// Rendezvous relay server
pub struct RelayServer {
    /// TCP listener
    listener: TcpListener,
    /// Parked listeners (SessionId -> Waiting)
    waiting: WaitingMap,
    /// Registration token counter
    next_token: Arc<AtomicU64>,
    /// Server configuration
    config: RelayServerConfig,
}

enum Wake {
    Paired(TcpStream),
    Gone,
    Expired,
}

impl RelayServer {
    /// Create a new relay server
    ///
    /// # Errors
    ///
    /// Returns error if socket binding fails.
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self, RelayError> {
        Self::bind_with_config(bind_addr, RelayServerConfig::default()).await
    }

    /// Create a new relay server with custom configuration
    ///
    /// # Errors
    ///
    /// Returns error if socket binding fails.
    pub async fn bind_with_config(
        bind_addr: SocketAddr,
        config: RelayServerConfig,
    ) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(bind_addr).await?;
        info!("Relay listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            waiting: Arc::new(Mutex::new(HashMap::new())),
            next_token: Arc::new(AtomicU64::new(1)),
            config,
        })
    }

    /// Get server's local address
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of currently parked listeners
    pub fn waiting_sessions(&self) -> usize {
        self.waiting.lock().map(|w| w.len()).unwrap_or(0)
    }

    /// Accept connections until the listener fails
    pub async fn run(&self) -> Result<(), RelayError> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let _ = stream.set_nodelay(true);

            let waiting = self.waiting.clone();
            let next_token = self.next_token.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, waiting, next_token, config).await {
                    debug!("Relay connection from {peer} ended: {e}");
                }
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    waiting: WaitingMap,
    next_token: Arc<AtomicU64>,
    config: RelayServerConfig,
) -> Result<(), RelayError> {
    let first = time::timeout(config.hello_timeout, read_message(&mut stream))
        .await
        .map_err(|_| RelayError::Timeout)?;

    match first {
        Ok(RelayMessage::Listen { session }) => {
            let token = next_token.fetch_add(1, Ordering::Relaxed);
            handle_listen(stream, session, token, &waiting, &config).await
        }
        Ok(RelayMessage::Connect { session }) => handle_connect(stream, session, &waiting).await,
        Ok(other) => {
            let msg = format!("unexpected {}", other.message_type());
            write_message(
                &mut stream,
                &RelayMessage::error(RelayErrorCode::InvalidMessage, &msg),
            )
            .await?;
            Err(RelayError::InvalidMessage(msg))
        }
        Err(e) => {
            let _ = write_message(
                &mut stream,
                &RelayMessage::error(RelayErrorCode::InvalidMessage, e.to_string()),
            )
            .await;
            Err(e)
        }
    }
}

async fn handle_listen(
    mut stream: TcpStream,
    session: SessionId,
    token: u64,
    waiting: &WaitingMap,
    config: &RelayServerConfig,
) -> Result<(), RelayError> {
    let (tx, rx) = oneshot::channel();
    let rejection = {
        let mut map = waiting
            .lock()
            .map_err(|_| RelayError::Internal("waiting table poisoned".into()))?;
        let occupied = map.get(&session).is_some_and(|w| !w.tx.is_closed());
        if occupied {
            Some(RelayErrorCode::SessionInUse)
        } else if map.len() >= config.max_waiting {
            Some(RelayErrorCode::ServerFull)
        } else {
            map.insert(session, Waiting { token, tx });
            None
        }
    };

    if let Some(code) = rejection {
        write_message(&mut stream, &RelayMessage::error(code, "listen rejected")).await?;
        return Err(RelayError::from_code(code, String::new()));
    }

    if let Err(e) = write_message(&mut stream, &RelayMessage::Waiting).await {
        remove_if_ours(waiting, &session, token);
        return Err(e);
    }

    let mut probe = [0u8; 1];
    let wake = tokio::select! {
        peer = rx => match peer {
            Ok(peer) => Wake::Paired(peer),
            Err(_) => Wake::Gone,
        },
        _ = stream.peek(&mut probe) => Wake::Gone,
        _ = time::sleep(config.session_ttl) => Wake::Expired,
    };

    let mut peer = match wake {
        Wake::Paired(peer) => peer,
        Wake::Gone => {
            remove_if_ours(waiting, &session, token);
            debug!("Listener left before pairing");
            return Ok(());
        }
        Wake::Expired => {
            remove_if_ours(waiting, &session, token);
            debug!("Parked listener expired");
            return Ok(());
        }
    };

    write_message(&mut stream, &RelayMessage::Paired).await?;
    write_message(&mut peer, &RelayMessage::Paired).await?;
    debug!("Session paired, splicing");

    match tokio::io::copy_bidirectional(&mut stream, &mut peer).await {
        Ok((up, down)) => debug!("Relay splice closed: {up} bytes up, {down} bytes down"),
        Err(e) => debug!("Relay splice ended: {e}"),
    }
    Ok(())
}

async fn handle_connect(
    mut stream: TcpStream,
    session: SessionId,
    waiting: &WaitingMap,
) -> Result<(), RelayError> {
    let parked = waiting
        .lock()
        .map_err(|_| RelayError::Internal("waiting table poisoned".into()))?
        .remove(&session);

    let Some(parked) = parked else {
        write_message(
            &mut stream,
            &RelayMessage::error(RelayErrorCode::SessionNotFound, "no listener"),
        )
        .await?;
        return Err(RelayError::SessionNotFound);
    };

    if let Err(mut stream) = parked.tx.send(stream) {
        warn!("Listener vanished while pairing");
        write_message(
            &mut stream,
            &RelayMessage::error(RelayErrorCode::SessionNotFound, "listener gone"),
        )
        .await?;
        return Err(RelayError::SessionNotFound);
    }
    Ok(())
}

fn remove_if_ours(waiting: &WaitingMap, session: &SessionId, token: u64) {
    if let Ok(mut map) = waiting.lock() {
        if map.get(session).is_some_and(|w| w.token == token) {
            map.remove(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::client::RelayClient;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn start_relay() -> (Arc<RelayServer>, String) {
        let server = RelayServer::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let server = Arc::new(server);
        let runner = server.clone();
        tokio::spawn(async move { runner.run().await });
        (server, addr)
    }

    async fn wait_for_waiting(server: &RelayServer, expected: usize) {
        for _ in 0..100 {
            if server.waiting_sessions() == expected {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        panic!("waiting sessions never reached {expected}");
    }

    #[tokio::test]
    async fn test_listen_connect_splices_streams() {
        let (_server, addr) = start_relay().await;
        let client = RelayClient::new(addr);
        let session = [3u8; 16];

        let registration = client.listen(session).await.unwrap();
        let listener = tokio::spawn(registration.paired());
        let mut connector = client.connect(session).await.unwrap();
        let mut listener = listener.await.unwrap().unwrap();

        connector.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        listener.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        listener.write_all(b"pong").await.unwrap();
        connector.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn test_connect_without_listener() {
        let (_server, addr) = start_relay().await;
        let result = RelayClient::new(addr).connect([1u8; 16]).await;
        assert!(matches!(result, Err(RelayError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_duplicate_listen_rejected() {
        let (server, addr) = start_relay().await;
        let client = RelayClient::new(addr);

        let _first = client.listen([5u8; 16]).await.unwrap();
        wait_for_waiting(&server, 1).await;
        let second = client.listen([5u8; 16]).await;
        assert!(matches!(second, Err(RelayError::SessionInUse)));
    }

    #[tokio::test]
    async fn test_listener_drop_frees_session() {
        let (server, addr) = start_relay().await;
        let client = RelayClient::new(addr);

        let registration = client.listen([7u8; 16]).await.unwrap();
        wait_for_waiting(&server, 1).await;
        drop(registration);
        wait_for_waiting(&server, 0).await;

        // Session is free again
        let _again = client.listen([7u8; 16]).await.unwrap();
    }

    #[tokio::test]
    async fn test_garbage_first_message() {
        let (_server, addr) = start_relay().await;
        let mut stream = TcpStream::connect(&addr).await.unwrap();
        stream.write_u32(3).await.unwrap();
        stream.write_all(&[0xff, 0xff, 0xff]).await.unwrap();

        match read_message(&mut stream).await.unwrap() {
            RelayMessage::Error { code, .. } => assert_eq!(code, RelayErrorCode::InvalidMessage),
            other => panic!("unexpected {other:?}"),
        }
    }
}
