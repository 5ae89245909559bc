//! # Worker Queues
//!
//! Messages between a transport instance and its worker thread:
//!
//! ```text
//! consumer ──WorkerCommand──▶ worker      (sends, kicks, disconnect)
//! consumer ◀──── packets ──── worker      (decoded, receive order)
//! consumer ◀──── events ───── worker      (connect / disconnect / timeout)
//! ```
//!
//! All three are unbounded crossbeam channels owned by the instance, so
//! they outlive any single worker.

use std::ops::{Add, AddAssign};

use crossbeam_channel::{unbounded, Receiver, Sender};
use packetforge_core::{check_frame_size, PacketSet};

use crate::host::PeerId;
use crate::reason::DisconnectReason;
use crate::stats::SharedStats;

/// Request from the consumer to the worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerCommand {
    /// Send an encoded frame to one peer.
    Send {
        /// Destination.
        peer: PeerId,
        /// Opcode-prefixed frame.
        frame: Vec<u8>,
    },
    /// Send an encoded frame to every peer.
    Broadcast(Vec<u8>),
    /// Disconnect one peer.
    Kick(PeerId, DisconnectReason),
    /// Disconnect everything and end the worker.
    Disconnect(DisconnectReason),
}

/// Lifecycle event of a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// The handshake completed.
    Connected,
    /// The connection ended.
    Disconnected(DisconnectReason),
    /// The server went silent.
    TimedOut,
}

/// Lifecycle event of a server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    /// A peer connected.
    PeerConnected(PeerId),
    /// A peer left or was kicked.
    PeerDisconnected(PeerId, DisconnectReason),
    /// A peer went silent.
    PeerTimedOut(PeerId),
}

/// What one `drain` call processed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Packets handed to a handler.
    pub packets: usize,
    /// Lifecycle events processed.
    pub events: usize,
    /// Packets discarded for lack of a handler.
    pub unhandled: usize,
}

impl DrainSummary {
    /// Whether nothing was processed.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.packets == 0 && self.events == 0 && self.unhandled == 0
    }
}

impl Add for DrainSummary {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            packets: self.packets + other.packets,
            events: self.events + other.events,
            unhandled: self.unhandled + other.unhandled,
        }
    }
}

impl AddAssign for DrainSummary {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Both ends of one unbounded queue.
#[derive(Debug)]
pub(crate) struct Queue<T> {
    pub sender: Sender<T>,
    pub receiver: Receiver<T>,
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Discards everything queued.
    pub fn clear(&self) -> usize {
        self.receiver.try_iter().count()
    }
}

/// Decodes a received frame, dropping it when oversized or malformed.
pub(crate) fn decode_inbound<S: PacketSet>(frame: &[u8], stats: &SharedStats) -> Option<S> {
    if let Err(err) = check_frame_size(frame.len()) {
        stats.lock().dropped_oversized += 1;
        tracing::warn!(size = frame.len(), error = %err, "dropped oversized frame");
        return None;
    }
    match S::from_frame(frame) {
        Ok(packet) => {
            let mut stats = stats.lock();
            stats.packets_received += 1;
            stats.bytes_received += frame.len() as u64;
            Some(packet)
        }
        Err(err) => {
            stats.lock().dropped_malformed += 1;
            tracing::warn!(size = frame.len(), error = %err, "dropped malformed frame");
            None
        }
    }
}

/// Counts a frame handed to the host `copies` times.
pub(crate) fn record_sent(stats: &SharedStats, frame_len: usize, copies: usize) {
    let mut stats = stats.lock();
    stats.packets_sent += copies as u64;
    stats.bytes_sent += (frame_len * copies) as u64;
}
