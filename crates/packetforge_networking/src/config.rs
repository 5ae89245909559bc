//! # Transport Configuration
//!
//! Timings and limits of the transports, loadable from TOML:
//!
//! ```toml
//! poll_interval_ms = 10
//! connect_timeout_ms = 5000
//! peer_timeout_ms = 10000
//! heartbeat_interval_ms = 1000
//! resend_interval_ms = 100
//! max_peers = 64
//! shutdown_poll_ms = 50
//! ```
//!
//! Missing keys keep their defaults.

use std::time::Duration;

use serde::Deserialize;

use crate::error::TransportResult;

/// Transport configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Longest a worker blocks in one host service call.
    pub poll_interval_ms: u64,
    /// Longest a client waits for the handshake.
    pub connect_timeout_ms: u64,
    /// Silence after which a peer is timed out.
    pub peer_timeout_ms: u64,
    /// Send silence after which a heartbeat is sent.
    pub heartbeat_interval_ms: u64,
    /// Age after which an unacknowledged datagram is resent.
    pub resend_interval_ms: u64,
    /// Server capacity.
    pub max_peers: usize,
    /// Poll step of stop waits.
    pub shutdown_poll_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            connect_timeout_ms: 5000,
            peer_timeout_ms: 10_000,
            heartbeat_interval_ms: 1000,
            resend_interval_ms: 100,
            max_peers: 64,
            shutdown_poll_ms: 50,
        }
    }
}

impl TransportConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TransportError::Config`] for malformed text or
    /// unknown keys.
    pub fn from_toml_str(text: &str) -> TransportResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Host service timeout, at least one millisecond.
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Handshake deadline.
    #[inline]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Peer silence limit.
    #[inline]
    #[must_use]
    pub const fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    /// Heartbeat interval.
    #[inline]
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Resend interval.
    #[inline]
    #[must_use]
    pub const fn resend_interval(&self) -> Duration {
        Duration::from_millis(self.resend_interval_ms)
    }

    /// Poll step of stop waits, at least one millisecond.
    #[inline]
    #[must_use]
    pub fn shutdown_poll(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_ms.max(1))
    }
}
