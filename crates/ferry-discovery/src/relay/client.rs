//! Relay client for the listener and connector sides.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

use super::RELAY_CONNECT_TIMEOUT;
use super::protocol::{RelayError, RelayMessage, SessionId, read_message, write_message};

/// Client for one relay server
#[derive(Debug, Clone)]
pub struct RelayClient {
    /// Relay server address (`host:port`)
    relay_addr: String,
    /// Bound on connect plus the control exchange
    timeout: Duration,
}

impl RelayClient {
    /// Create a client for `relay_addr`
    pub fn new(relay_addr: impl Into<String>) -> Self {
        Self {
            relay_addr: relay_addr.into(),
            timeout: RELAY_CONNECT_TIMEOUT,
        }
    }

    /// Override the control exchange timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Relay server address
    pub fn relay_addr(&self) -> &str {
        &self.relay_addr
    }

    /// Join the listener waiting on `session`.
    ///
    /// On success the returned stream is spliced to the listener.
    pub async fn connect(&self, session: SessionId) -> Result<TcpStream, RelayError> {
        let exchange = async {
            let mut stream = self.open().await?;
            write_message(&mut stream, &RelayMessage::Connect { session }).await?;
            match read_message(&mut stream).await? {
                RelayMessage::Paired => Ok(stream),
                RelayMessage::Error { code, message } => Err(RelayError::from_code(code, message)),
                other => Err(RelayError::InvalidMessage(format!(
                    "expected Paired, got {}",
                    other.message_type()
                ))),
            }
        };

        let stream = time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| RelayError::Timeout)??;
        debug!("Paired through relay {}", self.relay_addr);
        Ok(stream)
    }

    /// Park a connection on the relay under `session`.
    ///
    /// Resolves once the relay confirms the registration; use
    /// [`RelayRegistration::paired`] to wait for a connector.
    pub async fn listen(&self, session: SessionId) -> Result<RelayRegistration, RelayError> {
        let exchange = async {
            let mut stream = self.open().await?;
            write_message(&mut stream, &RelayMessage::Listen { session }).await?;
            match read_message(&mut stream).await? {
                RelayMessage::Waiting => Ok(RelayRegistration { stream }),
                RelayMessage::Error { code, message } => Err(RelayError::from_code(code, message)),
                other => Err(RelayError::InvalidMessage(format!(
                    "expected Waiting, got {}",
                    other.message_type()
                ))),
            }
        };

        let registration = time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| RelayError::Timeout)??;
        debug!("Registered session on relay {}", self.relay_addr);
        Ok(registration)
    }

    async fn open(&self) -> Result<TcpStream, RelayError> {
        let stream = TcpStream::connect(&self.relay_addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// A parked listener connection
#[derive(Debug)]
pub struct RelayRegistration {
    stream: TcpStream,
}

impl RelayRegistration {
    /// Wait until a connector is paired with this registration.
    ///
    /// Not cancel safe: dropping the future mid-read abandons the
    /// registration.
    pub async fn paired(mut self) -> Result<TcpStream, RelayError> {
        match read_message(&mut self.stream).await? {
            RelayMessage::Paired => Ok(self.stream),
            RelayMessage::Error { code, message } => Err(RelayError::from_code(code, message)),
            other => Err(RelayError::InvalidMessage(format!(
                "expected Paired, got {}",
                other.message_type()
            ))),
        }
    }
}
