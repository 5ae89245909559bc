//! # Start Tickets
//!
//! `connect` and `start` return immediately; the worker reports the outcome
//! of its startup through a [`StartTicket`].

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{TransportError, TransportResult};

/// Pending outcome of a transport start.
#[derive(Debug)]
pub struct StartTicket<T> {
    receiver: Receiver<TransportResult<T>>,
}

impl<T> StartTicket<T> {
    /// Creates a ticket and the sender the worker reports through.
    pub(crate) fn channel() -> (Sender<TransportResult<T>>, Self) {
        let (sender, receiver) = bounded(1);
        (sender, Self { receiver })
    }

    /// A ticket that already holds `result`.
    pub(crate) fn ready(result: TransportResult<T>) -> Self {
        let (sender, ticket) = Self::channel();
        // capacity 1 and the receiver is alive
        let _ = sender.send(result);
        ticket
    }

    /// Blocks up to `timeout` for the start outcome.
    ///
    /// # Errors
    ///
    /// Returns the worker's start error, [`TransportError::ConnectTimeout`]
    /// when nothing arrives in time, or [`TransportError::WorkerExited`]
    /// when the worker ended without reporting.
    pub fn wait(&self, timeout: Duration) -> TransportResult<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TransportError::ConnectTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::WorkerExited),
        }
    }

    /// Returns the outcome if it is already known.
    #[must_use]
    pub fn try_result(&self) -> Option<TransportResult<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TransportError::WorkerExited)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_ticket() {
        let ticket = StartTicket::ready(Ok(7));
        assert_eq!(ticket.wait(Duration::from_millis(10)).unwrap(), 7);
    }

    #[test]
    fn test_pending_ticket_times_out() {
        let (_sender, ticket) = StartTicket::<()>::channel();
        assert!(ticket.try_result().is_none());
        assert!(matches!(
            ticket.wait(Duration::from_millis(5)),
            Err(TransportError::ConnectTimeout(_))
        ));
    }

    #[test]
    fn test_dropped_sender_reports_exit() {
        let (sender, ticket) = StartTicket::<()>::channel();
        drop(sender);
        assert!(matches!(
            ticket.wait(Duration::from_millis(5)),
            Err(TransportError::WorkerExited)
        ));
    }
}
