//! # Transport Statistics

use std::sync::Arc;

use parking_lot::Mutex;

/// Counters of one transport instance.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransportStats {
    /// Frames handed to the host.
    pub packets_sent: u64,
    /// Frames accepted from the host.
    pub packets_received: u64,
    /// Frame bytes sent.
    pub bytes_sent: u64,
    /// Frame bytes received.
    pub bytes_received: u64,
    /// Frames dropped for exceeding the size ceiling.
    pub dropped_oversized: u64,
    /// Frames dropped because they did not decode.
    pub dropped_malformed: u64,
    /// Reliable datagrams sent again.
    pub resends: u64,
}

/// Stats cell shared by an instance and its worker.
pub(crate) type SharedStats = Arc<Mutex<TransportStats>>;
