//! # Peer Channel
//!
//! Reliable ordered delivery to one remote peer:
//! - Outgoing frames get increasing sequence numbers and stay pending until
//!   acknowledged, being resent after the resend interval
//! - Incoming frames are acknowledged one by one, buffered while a gap
//!   exists, and delivered strictly in sequence order
//! - Frames already delivered are acknowledged again but never redelivered
//!
//! Sequence numbers wrap; a sequence is ahead of the expected one when it is
//! less than half the number space past it.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::wire::Datagram;

/// Frames buffered ahead of a gap before new ones are refused.
pub const REORDER_CAPACITY: usize = 1024;

const HALF_SEQ_SPACE: u32 = 1 << 31;

#[derive(Debug)]
struct PendingFrame {
    datagram: Vec<u8>,
    last_sent: Instant,
}

/// Outcome of one received data datagram.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Received {
    /// Whether the datagram must be acknowledged.
    pub ack: bool,
    /// Frames now deliverable, in order.
    pub delivered: Vec<Vec<u8>>,
}

/// Reliability state of one peer.
#[derive(Debug)]
pub struct PeerChannel {
    next_send_seq: u32,
    pending: BTreeMap<u32, PendingFrame>,
    next_recv_seq: u32,
    reorder: BTreeMap<u32, Vec<u8>>,
    last_received: Instant,
    last_sent: Instant,
}

impl PeerChannel {
    /// Creates a channel whose clocks start at `now`.
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            next_send_seq: 0,
            pending: BTreeMap::new(),
            next_recv_seq: 0,
            reorder: BTreeMap::new(),
            last_received: now,
            last_sent: now,
        }
    }

    /// Wraps `frame` into a sequenced data datagram and keeps it pending.
    /// Returns the sequence number with the datagram.
    pub fn prepare_send(&mut self, frame: Vec<u8>, now: Instant) -> (u32, Vec<u8>) {
        let seq = self.next_send_seq;
        self.next_send_seq = self.next_send_seq.wrapping_add(1);
        let datagram = Datagram::Data { seq, frame }.encode();
        self.pending.insert(
            seq,
            PendingFrame {
                datagram: datagram.clone(),
                last_sent: now,
            },
        );
        self.last_sent = now;
        (seq, datagram)
    }

    /// Drops the pending frame `seq`.
    #[inline]
    pub fn acknowledge(&mut self, seq: u32) {
        self.pending.remove(&seq);
    }

    /// Takes back the most recently prepared frame after it failed to leave.
    /// Older sequences are left pending.
    pub fn discard(&mut self, seq: u32) {
        if seq.wrapping_add(1) == self.next_send_seq && self.pending.remove(&seq).is_some() {
            self.next_send_seq = seq;
        }
    }

    /// Number of frames waiting for an ack.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Accepts a data datagram.
    pub fn receive(&mut self, seq: u32, frame: Vec<u8>) -> Received {
        let ahead = seq.wrapping_sub(self.next_recv_seq);
        if ahead >= HALF_SEQ_SPACE {
            // duplicate of a delivered frame; its ack was probably lost
            return Received {
                ack: true,
                delivered: Vec::new(),
            };
        }

        if ahead > 0 {
            if !self.reorder.contains_key(&seq) && self.reorder.len() >= REORDER_CAPACITY {
                return Received::default();
            }
            self.reorder.entry(seq).or_insert(frame);
            return Received {
                ack: true,
                delivered: Vec::new(),
            };
        }

        let mut delivered = vec![frame];
        self.next_recv_seq = self.next_recv_seq.wrapping_add(1);
        while let Some(next) = self.reorder.remove(&self.next_recv_seq) {
            delivered.push(next);
            self.next_recv_seq = self.next_recv_seq.wrapping_add(1);
        }
        Received {
            ack: true,
            delivered,
        }
    }

    /// Pending datagrams older than `interval`, restamped as sent at `now`.
    pub fn due_resends(&mut self, now: Instant, interval: Duration) -> Vec<Vec<u8>> {
        let mut due = Vec::new();
        for pending in self.pending.values_mut() {
            if now.duration_since(pending.last_sent) >= interval {
                pending.last_sent = now;
                due.push(pending.datagram.clone());
            }
        }
        if !due.is_empty() {
            self.last_sent = now;
        }
        due
    }

    /// Records that something arrived from the peer.
    #[inline]
    pub fn touch_received(&mut self, now: Instant) {
        self.last_received = now;
    }

    /// Records that something was sent to the peer.
    #[inline]
    pub fn touch_sent(&mut self, now: Instant) {
        self.last_sent = now;
    }

    /// Whether nothing was sent for `interval`.
    #[inline]
    #[must_use]
    pub fn needs_heartbeat(&self, now: Instant, interval: Duration) -> bool {
        now.duration_since(self.last_sent) >= interval
    }

    /// Whether nothing arrived for `timeout`.
    #[inline]
    #[must_use]
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.duration_since(self.last_received) >= timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> Vec<u8> {
        vec![tag]
    }

    #[test]
    fn test_in_order_delivery() {
        let mut channel = PeerChannel::new(Instant::now());
        assert_eq!(channel.receive(0, frame(0)).delivered, vec![frame(0)]);
        assert_eq!(channel.receive(1, frame(1)).delivered, vec![frame(1)]);
    }

    #[test]
    fn test_gap_is_buffered_then_flushed() {
        let mut channel = PeerChannel::new(Instant::now());
        let early = channel.receive(2, frame(2));
        assert!(early.ack);
        assert!(early.delivered.is_empty());
        assert!(channel.receive(1, frame(1)).delivered.is_empty());

        let flushed = channel.receive(0, frame(0));
        assert_eq!(flushed.delivered, vec![frame(0), frame(1), frame(2)]);
    }

    #[test]
    fn test_duplicates_are_acked_not_redelivered() {
        let mut channel = PeerChannel::new(Instant::now());
        channel.receive(0, frame(0));
        let duplicate = channel.receive(0, frame(0));
        assert!(duplicate.ack);
        assert!(duplicate.delivered.is_empty());
    }

    #[test]
    fn test_reorder_buffer_is_bounded() {
        let mut channel = PeerChannel::new(Instant::now());
        for seq in 1..=REORDER_CAPACITY as u32 {
            assert!(channel.receive(seq, frame(0)).ack);
        }
        let refused = channel.receive(REORDER_CAPACITY as u32 + 1, frame(0));
        assert!(!refused.ack);
        assert_eq!(channel.receive(0, frame(0)).delivered.len(), REORDER_CAPACITY + 1);
    }

    #[test]
    fn test_resend_until_acknowledged() {
        let start = Instant::now();
        let mut channel = PeerChannel::new(start);
        let (seq, datagram) = channel.prepare_send(frame(7), start);
        assert_eq!(seq, 0);
        assert_eq!(channel.pending_count(), 1);

        let interval = Duration::from_millis(100);
        assert!(channel.due_resends(start, interval).is_empty());
        let later = start + interval;
        assert_eq!(channel.due_resends(later, interval), vec![datagram]);
        assert!(channel.due_resends(later, interval).is_empty());

        channel.acknowledge(0);
        assert_eq!(channel.pending_count(), 0);
        assert!(channel.due_resends(later + interval, interval).is_empty());
    }

    #[test]
    fn test_heartbeat_and_timeout_clocks() {
        let start = Instant::now();
        let mut channel = PeerChannel::new(start);
        let second = Duration::from_secs(1);
        assert!(!channel.needs_heartbeat(start, second));
        assert!(channel.needs_heartbeat(start + second, second));
        assert!(channel.is_timed_out(start + second, second));

        channel.touch_received(start + second);
        channel.touch_sent(start + second);
        assert!(!channel.is_timed_out(start + second, second));
        assert!(!channel.needs_heartbeat(start + second, second));
    }

    #[test]
    fn test_delivery_continues_across_wrap() {
        let mut channel = PeerChannel::new(Instant::now());
        channel.next_recv_seq = u32::MAX - 1;

        assert!(channel.receive(0, frame(2)).delivered.is_empty());
        assert_eq!(channel.receive(u32::MAX - 1, frame(0)).delivered, vec![frame(0)]);
        assert_eq!(
            channel.receive(u32::MAX, frame(1)).delivered,
            vec![frame(1), frame(2)]
        );
        assert_eq!(channel.next_recv_seq, 1);

        let stale = channel.receive(u32::MAX, frame(1));
        assert!(stale.ack);
        assert!(stale.delivered.is_empty());
        assert_eq!(channel.receive(1, frame(3)).delivered, vec![frame(3)]);
    }

    #[test]
    fn test_discard_rewinds_last_sequence() {
        let now = Instant::now();
        let mut channel = PeerChannel::new(now);
        let (first, _) = channel.prepare_send(frame(0), now);
        let (second, _) = channel.prepare_send(frame(1), now);
        channel.discard(second);
        assert_eq!(channel.pending_count(), 1);

        let (reused, _) = channel.prepare_send(frame(2), now);
        assert_eq!(reused, second);

        channel.discard(first);
        assert_eq!(channel.pending_count(), 2);
        let (next, _) = channel.prepare_send(frame(3), now);
        assert_eq!(next, second + 1);
    }
}
