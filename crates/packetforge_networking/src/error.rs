//! # Transport Error Types

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use packetforge_core::ProtocolError;
use thiserror::Error;

use crate::reason::DisconnectReason;

/// Transport errors.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The network library could not be loaded; the instance runs disabled.
    #[error("network library is unavailable; transport is disabled")]
    Disabled,

    /// Initializing the network library failed.
    #[error("network library failed to initialize: {0}")]
    LibraryUnavailable(String),

    /// The library cannot be released while hosts still use it.
    #[error("network library still has {0} active host(s)")]
    LibraryBusy(usize),

    /// Start requested while the instance runs.
    #[error("transport is already running")]
    AlreadyRunning,

    /// Operation needs a running instance.
    #[error("transport is not running")]
    NotRunning,

    /// Binding the socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// Socket I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),

    /// No answer within the connect timeout.
    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Stop was requested while starting.
    #[error("start was cancelled")]
    Cancelled,

    /// The remote refused the connection.
    #[error("connection rejected: {0}")]
    Rejected(DisconnectReason),

    /// The worker ended without reporting a start result.
    #[error("worker thread exited unexpectedly")]
    WorkerExited,

    /// Shutdown did not complete in time.
    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    /// A frame too large for one datagram.
    #[error("frame of {len} bytes exceeds the {max} byte datagram limit")]
    FrameTooLarge {
        /// Frame length.
        len: usize,
        /// Largest sendable frame.
        max: usize,
    },

    /// Encoding a packet failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration text is invalid.
    #[error("invalid transport config: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
