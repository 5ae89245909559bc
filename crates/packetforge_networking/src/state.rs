//! # Connection State
//!
//! Lifecycle of one transport instance, shared between the owning thread
//! and its worker:
//!
//! ```text
//! Stopped ──start──▶ Starting ──host up──▶ Running ──stop──▶ Stopping ──▶ Stopped
//!                        │                                                  ▲
//!                        └────────────── failure / cancel ──────────────────┘
//! ```
//!
//! The worker sets `Stopped` as its final act through [`StoppedGuard`], so
//! the state is reset even when the worker unwinds.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Transport lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ConnectionState {
    /// No worker is alive.
    #[default]
    Stopped = 0,
    /// Worker spawned, host not up yet.
    Starting = 1,
    /// Host up, connected or accepting.
    Running = 2,
    /// Stop requested, worker still alive.
    Stopping = 3,
}

impl ConnectionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// State cell shared by an instance and its worker.
#[derive(Clone, Debug, Default)]
pub struct SharedState(Arc<AtomicU8>);

impl SharedState {
    /// Creates a cell in [`ConnectionState::Stopped`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Overwrites the state.
    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves from `from` to `to`; false when the state was not `from`.
    #[inline]
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Cooperative cancellation of a worker's startup path.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once cancellation was requested.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Sets [`ConnectionState::Stopped`] when dropped.
#[derive(Debug)]
pub struct StoppedGuard(SharedState);

impl StoppedGuard {
    /// Guards `state`.
    #[must_use]
    pub const fn new(state: SharedState) -> Self {
        Self(state)
    }
}

impl Drop for StoppedGuard {
    fn drop(&mut self) {
        self.0.set(ConnectionState::Stopped);
    }
}
