//! Outbound connection racing.
//!
//! Every direct address and the relay path are tried concurrently. The first
//! attempt that completes the hello exchange wins; the rest are aborted.

use ferry_discovery::relay::RelayClient;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, info};

use crate::connection::{ConnectionPath, Handshake};
use crate::error::{ConnectError, TransportError, TransportResult};
use crate::hello::client_hello;
use crate::identity::{NodeId, SessionId};
use crate::message::{ControlMessage, Role};
use crate::{PROTOCOL_VERSION, TransportConfig};

/// Where and whom to connect to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Expected listener identity; `None` for plain `host:port` targets
    pub peer: Option<NodeId>,
    /// Session commitment from the ticket
    pub session: Option<SessionId>,
    /// Direct `host:port` candidates
    pub addrs: Vec<String>,
    /// Relay the listener registered with
    pub relay: Option<String>,
}

impl ConnectTarget {
    /// Plain direct target without a ticket
    pub fn direct(addr: impl Into<String>) -> Self {
        Self {
            addrs: vec![addr.into()],
            ..Self::default()
        }
    }

    /// Short human-readable description for progress reporting
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self.addrs.clone();
        if let Some(relay) = &self.relay {
            parts.push(format!("relay {relay}"));
        }
        match &self.peer {
            Some(peer) => format!("{} ({})", peer.short(), parts.join(", ")),
            None => parts.join(", "),
        }
    }

    fn relay_path(&self) -> Option<(&str, SessionId)> {
        match (&self.relay, self.session) {
            (Some(relay), Some(session)) => Some((relay.as_str(), session)),
            _ => None,
        }
    }
}

/// Race all paths to `target` and return the first completed hello.
pub async fn connect(
    target: &ConnectTarget,
    identity: NodeId,
    role: Role,
    config: &TransportConfig,
) -> Result<Handshake, ConnectError> {
    if target.addrs.is_empty() && target.relay_path().is_none() {
        return Err(ConnectError::Refused("no reachable address".into()));
    }

    let hello = ControlMessage::Hello {
        version: PROTOCOL_VERSION,
        node_id: identity,
        session: target.session,
        role,
    };

    let mut attempts = JoinSet::new();
    for addr in &target.addrs {
        attempts.spawn(attempt_direct(addr.clone(), hello.clone(), target.peer));
    }
    if let Some((relay, session)) = target.relay_path() {
        attempts.spawn(attempt_relay(
            RelayClient::new(relay).with_timeout(config.connect_timeout),
            session,
            hello.clone(),
            target.peer,
        ));
    }

    let race = async {
        let mut last_error = String::from("no attempt completed");
        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok(Ok(handshake)) => return Ok(handshake),
                Ok(Err(e)) => {
                    debug!("Connect attempt failed: {e}");
                    last_error = e.to_string();
                }
                Err(e) => last_error = format!("attempt aborted: {e}"),
            }
        }
        Err(ConnectError::Refused(last_error))
    };

    let result = match time::timeout(config.connect_timeout, race).await {
        Ok(result) => result,
        Err(_) => Err(ConnectError::Timeout),
    };
    attempts.abort_all();

    if let Ok(handshake) = &result {
        info!(
            "Connected to {} via {} ({})",
            handshake.peer().short(),
            handshake.path(),
            handshake.remote()
        );
    }
    result
}

async fn attempt_direct(
    addr: String,
    hello: ControlMessage,
    expected_peer: Option<NodeId>,
) -> TransportResult<Handshake> {
    let stream = TcpStream::connect(addr.as_str()).await?;
    stream.set_nodelay(true)?;
    client_hello(
        Box::new(stream),
        &hello,
        expected_peer,
        ConnectionPath::Direct,
        addr,
    )
    .await
}

async fn attempt_relay(
    client: RelayClient,
    session: SessionId,
    hello: ControlMessage,
    expected_peer: Option<NodeId>,
) -> TransportResult<Handshake> {
    let stream = client.connect(session.0).await?;
    client_hello(
        Box::new(stream),
        &hello,
        expected_peer,
        ConnectionPath::Relay,
        client.relay_addr().to_string(),
    )
    .await
    .map_err(|e| match e {
        TransportError::Closed => TransportError::Protocol("relay peer closed".into()),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[test]
    fn test_describe() {
        let target = ConnectTarget::direct("10.0.0.2:9000");
        assert_eq!(target.describe(), "10.0.0.2:9000");

        let target = ConnectTarget {
            peer: Some(NodeId([0xab; 32])),
            session: Some(SessionId([0; 16])),
            addrs: vec!["10.0.0.2:9000".into()],
            relay: Some("relay.example:7878".into()),
        };
        assert_eq!(
            target.describe(),
            "abababab (10.0.0.2:9000, relay relay.example:7878)"
        );
    }

    #[tokio::test]
    async fn test_empty_target_refused() {
        let result = connect(
            &ConnectTarget::default(),
            NodeId([1; 32]),
            Role::Sender,
            &TransportConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(ConnectError::Refused(_))));
    }

    #[tokio::test]
    async fn test_closed_port_refused() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let result = connect(
            &ConnectTarget::direct(format!("127.0.0.1:{port}")),
            NodeId([1; 32]),
            Role::Receiver,
            &TransportConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(ConnectError::Refused(_))));
    }

    #[tokio::test]
    async fn test_silent_listener_times_out() {
        let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap().to_string();
        let _keep = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((s, _)) = silent.accept().await {
                held.push(s);
            }
        });

        let config = TransportConfig {
            connect_timeout: Duration::from_millis(200),
            ..TransportConfig::default()
        };
        let result = connect(
            &ConnectTarget::direct(addr),
            NodeId([1; 32]),
            Role::Receiver,
            &config,
        )
        .await;
        assert!(matches!(result, Err(ConnectError::Timeout)));
    }

    #[tokio::test]
    async fn test_listener_closing_before_data_refused() {
        let closer = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = closer.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            while let Ok((s, _)) = closer.accept().await {
                drop(s);
            }
        });

        let result = connect(
            &ConnectTarget::direct(addr),
            NodeId([1; 32]),
            Role::Receiver,
            &TransportConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(ConnectError::Refused(_))));
    }
}
