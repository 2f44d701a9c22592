//! Request correlation
//!
//! Responses carry no request id, only the command id they answer. Pending
//! requests are therefore queued per command id and matched first in, first
//! out.

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{ClientError, Result};

type Waiter = (u64, oneshot::Sender<Bytes>);

/// Outstanding requests, keyed by command id
#[derive(Debug, Default)]
pub struct RequestLedger {
    pending: DashMap<u16, VecDeque<Waiter>>,
    next_ticket: AtomicU64,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a handle for the next response to `command_id`
    pub fn register(&self, command_id: u16) -> PendingResponse {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .entry(command_id)
            .or_default()
            .push_back((ticket, tx));

        PendingResponse {
            command_id,
            ticket,
            rx,
        }
    }

    /// Fulfil the oldest handle waiting on `command_id`.
    ///
    /// Returns false when nobody was waiting or the waiter already gave up;
    /// the response is dropped in both cases.
    pub fn resolve(&self, command_id: u16, response: Bytes) -> bool {
        let Some((ticket, tx)) = self.pop_front(command_id) else {
            debug!("No pending request for command {}", command_id);
            return false;
        };

        if tx.send(response).is_err() {
            debug!("Request {} for command {} was abandoned", ticket, command_id);
            return false;
        }
        true
    }

    /// Cancel the oldest handle waiting on `command_id`
    pub fn fail(&self, command_id: u16) -> bool {
        match self.pop_front(command_id) {
            Some((ticket, _)) => {
                debug!("Request {} for command {} failed", ticket, command_id);
                true
            }
            None => false,
        }
    }

    /// Cancel one specific handle, wherever it sits in its queue
    pub fn cancel(&self, command_id: u16, ticket: u64) {
        if let Some(mut queue) = self.pending.get_mut(&command_id) {
            queue.retain(|(t, _)| *t != ticket);
        }
        self.pending.remove_if(&command_id, |_, queue| queue.is_empty());
    }

    /// Cancel every outstanding handle
    pub fn cancel_all(&self) {
        let count = self.pending_count();
        if count > 0 {
            debug!("Cancelling {} pending requests", count);
        }
        self.pending.clear();
    }

    /// Number of handles still waiting
    pub fn pending_count(&self) -> usize {
        self.pending.iter().map(|entry| entry.value().len()).sum()
    }

    fn pop_front(&self, command_id: u16) -> Option<Waiter> {
        let waiter = self
            .pending
            .get_mut(&command_id)
            .and_then(|mut queue| queue.pop_front());
        self.pending.remove_if(&command_id, |_, queue| queue.is_empty());
        waiter
    }
}

/// Handle to the eventual response of one request.
///
/// Resolved exactly once: either with the rebuilt response envelope or by
/// cancellation, which drops the sending half.
#[derive(Debug)]
pub struct PendingResponse {
    command_id: u16,
    ticket: u64,
    rx: oneshot::Receiver<Bytes>,
}

impl PendingResponse {
    pub fn command_id(&self) -> u16 {
        self.command_id
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Wait for the response envelope
    pub async fn wait(self) -> Result<Bytes> {
        self.rx.await.map_err(|_| ClientError::Cancelled)
    }

    /// Non-blocking check: `Ok(None)` while still pending
    pub fn try_take(&mut self) -> Result<Option<Bytes>> {
        match self.rx.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(ClientError::Cancelled),
        }
    }

    /// Whether the handle was cancelled without a response
    pub fn is_cancelled(&mut self) -> bool {
        matches!(self.try_take(), Err(ClientError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_fifo_per_command() {
        let ledger = RequestLedger::new();
        let first = ledger.register(80);
        let second = ledger.register(80);
        let other = ledger.register(48);

        assert!(ledger.resolve(80, Bytes::from_static(b"one")));
        assert!(ledger.resolve(80, Bytes::from_static(b"two")));

        assert_eq!(first.wait().await.unwrap(), Bytes::from_static(b"one"));
        assert_eq!(second.wait().await.unwrap(), Bytes::from_static(b"two"));
        assert_eq!(ledger.pending_count(), 1);

        drop(other);
        assert!(!ledger.resolve(48, Bytes::new()));
        assert_eq!(ledger.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_cancels_oldest() {
        let ledger = RequestLedger::new();
        let first = ledger.register(64);
        let mut second = ledger.register(64);

        assert!(ledger.fail(64));
        assert!(matches!(first.wait().await, Err(ClientError::Cancelled)));
        assert_eq!(second.try_take().unwrap(), None);
        assert!(!ledger.fail(32));
    }

    #[test]
    fn test_cancel_specific_ticket() {
        let ledger = RequestLedger::new();
        let mut first = ledger.register(32);
        let mut second = ledger.register(32);

        ledger.cancel(32, first.ticket());
        assert!(first.is_cancelled());

        assert!(ledger.resolve(32, Bytes::from_static(&[0x01])));
        assert_eq!(second.try_take().unwrap(), Some(Bytes::from_static(&[0x01])));
        assert_eq!(ledger.pending_count(), 0);
    }

    #[test]
    fn test_cancel_all() {
        let ledger = RequestLedger::new();
        let mut handles: Vec<_> = [80u16, 48, 48, 272].iter().map(|c| ledger.register(*c)).collect();
        assert_eq!(ledger.pending_count(), 4);

        ledger.cancel_all();
        assert_eq!(ledger.pending_count(), 0);
        assert!(handles.iter_mut().all(|h| h.is_cancelled()));
    }
}
