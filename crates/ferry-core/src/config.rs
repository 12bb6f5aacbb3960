//! Controller configuration.
//!
//! [`ControllerConfig`] is the typed configuration the controller runs with.
//! [`Settings`] is its serializable mirror with primitive fields, read from
//! JSON at the foreign boundary and from TOML by the command line front end.

use std::borrow::Cow;
use std::net::SocketAddr;
use std::time::Duration;

use ferry_files::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use ferry_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ControllerError;

/// Controller configuration
#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    /// Connection setup
    pub transport: TransportConfig,

    /// Transfer engine
    pub transfer: TransferConfig,

    /// Event delivery
    pub events: EventConfig,
}

/// Transfer engine configuration
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Bytes per chunk
    pub chunk_size: usize,

    /// Deadline for each chunk read or write
    pub io_timeout: Duration,

    /// Deadline for `Accept`, the header and `Done`
    pub ack_timeout: Duration,

    /// Heartbeat progress interval while blocked
    pub progress_interval: Duration,

    /// Time a cancelled session gets to tell its peer before it is aborted
    pub cancel_grace: Duration,

    /// How long a listening session waits for its peer (`None` = until cancelled)
    pub wait_timeout: Option<Duration>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            io_timeout: Duration::from_secs(60),
            ack_timeout: Duration::from_secs(60),
            progress_interval: Duration::from_millis(500),
            cancel_grace: Duration::from_secs(3),
            wait_timeout: None,
        }
    }
}

/// Event queue configuration
#[derive(Debug, Clone)]
pub struct EventConfig {
    /// Queue size at which Progress events start coalescing
    pub queue_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

impl ControllerConfig {
    /// Check ranges the controller relies on
    pub fn validate(&self) -> Result<(), ControllerError> {
        let invalid = |msg: &'static str| Err(ControllerError::InvalidConfig(Cow::Borrowed(msg)));

        if self.transfer.chunk_size == 0 || self.transfer.chunk_size > MAX_CHUNK_SIZE {
            return invalid("chunk_size must be between 1 and 65472 bytes");
        }
        if self.transfer.io_timeout.is_zero() || self.transfer.ack_timeout.is_zero() {
            return invalid("io and ack timeouts must be non-zero");
        }
        if self.transfer.progress_interval.is_zero() {
            return invalid("progress_interval must be non-zero");
        }
        if self.transport.connect_timeout.is_zero() || self.transport.handshake_timeout.is_zero()
        {
            return invalid("connect and handshake timeouts must be non-zero");
        }
        if self.events.queue_capacity == 0 {
            return invalid("queue_capacity must be non-zero");
        }
        if matches!(&self.transport.relay, Some(r) if r.trim().is_empty()) {
            return invalid("relay must not be empty");
        }
        Ok(())
    }
}

/// Settings parsing failures
#[derive(Debug, Error)]
pub enum SettingsError {
    /// JSON could not be parsed
    #[error("settings JSON invalid: {0}")]
    Json(#[from] serde_json::Error),

    /// Bind address could not be parsed
    #[error("invalid bind address {0:?}")]
    BindAddr(String),

    /// Converted configuration failed validation
    #[error(transparent)]
    Invalid(#[from] ControllerError),
}

/// Serializable controller settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Listener bind address
    pub bind_addr: String,
    /// Rendezvous relay (`host:port`)
    pub relay: Option<String>,
    /// Accept direct hellos without a session; `false` limits a listener to
    /// ticket holders
    pub allow_untargeted: bool,
    /// Connect race deadline
    pub connect_timeout_ms: u64,
    /// Hello and Noise handshake deadline
    pub handshake_timeout_ms: u64,
    /// Relay registration deadline
    pub relay_register_timeout_ms: u64,
    /// Bytes per chunk
    pub chunk_size: usize,
    /// Per-chunk I/O deadline
    pub io_timeout_ms: u64,
    /// Acknowledgement deadline
    pub ack_timeout_ms: u64,
    /// Heartbeat progress interval
    pub progress_interval_ms: u64,
    /// Cancellation grace period
    pub cancel_grace_ms: u64,
    /// Peer wait deadline for listening sessions
    pub wait_timeout_ms: Option<u64>,
    /// Event queue capacity
    pub queue_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

impl From<&ControllerConfig> for Settings {
    fn from(config: &ControllerConfig) -> Self {
        let ms = |d: Duration| d.as_millis() as u64;
        Self {
            bind_addr: config.transport.bind_addr.to_string(),
            relay: config.transport.relay.clone(),
            allow_untargeted: config.transport.allow_untargeted,
            connect_timeout_ms: ms(config.transport.connect_timeout),
            handshake_timeout_ms: ms(config.transport.handshake_timeout),
            relay_register_timeout_ms: ms(config.transport.relay_register_timeout),
            chunk_size: config.transfer.chunk_size,
            io_timeout_ms: ms(config.transfer.io_timeout),
            ack_timeout_ms: ms(config.transfer.ack_timeout),
            progress_interval_ms: ms(config.transfer.progress_interval),
            cancel_grace_ms: ms(config.transfer.cancel_grace),
            wait_timeout_ms: config.transfer.wait_timeout.map(ms),
            queue_capacity: config.events.queue_capacity,
        }
    }
}

impl Settings {
    /// Parse settings from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Convert into a validated [`ControllerConfig`]
    pub fn into_config(self) -> Result<ControllerConfig, SettingsError> {
        let bind_addr: SocketAddr = self
            .bind_addr
            .parse()
            .map_err(|_| SettingsError::BindAddr(self.bind_addr.clone()))?;
        let ms = Duration::from_millis;

        let config = ControllerConfig {
            transport: TransportConfig {
                bind_addr,
                relay: self.relay.filter(|r| !r.trim().is_empty()),
                connect_timeout: ms(self.connect_timeout_ms),
                handshake_timeout: ms(self.handshake_timeout_ms),
                relay_register_timeout: ms(self.relay_register_timeout_ms),
                allow_untargeted: self.allow_untargeted,
            },
            transfer: TransferConfig {
                chunk_size: self.chunk_size,
                io_timeout: ms(self.io_timeout_ms),
                ack_timeout: ms(self.ack_timeout_ms),
                progress_interval: ms(self.progress_interval_ms),
                cancel_grace: ms(self.cancel_grace_ms),
                wait_timeout: self.wait_timeout_ms.map(ms),
            },
            events: EventConfig {
                queue_capacity: self.queue_capacity,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transfer.chunk_size, 60 * 1024);
        assert_eq!(config.transfer.progress_interval, Duration::from_millis(500));
        assert_eq!(config.transfer.cancel_grace, Duration::from_secs(3));
        assert!(config.transfer.wait_timeout.is_none());
        assert_eq!(config.events.queue_capacity, 1024);
    }

    #[test]
    fn test_validate_rejects_bad_chunk_size() {
        let mut config = ControllerConfig::default();
        config.transfer.chunk_size = MAX_CHUNK_SIZE + 1;
        assert!(matches!(
            config.validate(),
            Err(ControllerError::InvalidConfig(_))
        ));
        config.transfer.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings =
            Settings::from_json(r#"{"relay": "relay.example:7878", "wait_timeout_ms": 5000}"#)
                .unwrap();
        let config = settings.into_config().unwrap();
        assert_eq!(config.transport.relay.as_deref(), Some("relay.example:7878"));
        assert_eq!(config.transfer.wait_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.transfer.io_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_empty_relay_is_none() {
        let settings = Settings {
            relay: Some("  ".into()),
            ..Settings::default()
        };
        assert!(settings.into_config().unwrap().transport.relay.is_none());
    }

    #[test]
    fn test_bad_bind_addr() {
        let settings = Settings {
            bind_addr: "not an address".into(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.into_config(),
            Err(SettingsError::BindAddr(_))
        ));
    }

    #[test]
    fn test_settings_mirror_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.bind_addr, "0.0.0.0:0");
        assert_eq!(settings.connect_timeout_ms, 30_000);
        assert!(settings.allow_untargeted);
        assert!(Settings::from_json("{}").unwrap() == settings);
    }
}
