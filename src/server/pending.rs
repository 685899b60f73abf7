//! One-shot correlation of public requests with data channels
//!
//! A public connection registers a [`PendingRequest`] under a fresh id before
//! asking the tunnel client for a data channel. The bridge side later calls
//! [`PendingRequests::resolve`] with whatever arrives under that id. Each id
//! resolves at most once, and the entry is removed when the request is
//! dropped, whichever way the wait ended.

use crate::protocol::CorrelationId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// Map of outstanding requests, keyed by correlation id
#[derive(Debug)]
pub struct PendingRequests<T> {
    slots: Mutex<HashMap<CorrelationId, oneshot::Sender<T>>>,
}

impl<T> Default for PendingRequests<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> PendingRequests<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<CorrelationId, oneshot::Sender<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for `id`
    pub fn register(self: &Arc<Self>, id: CorrelationId) -> PendingRequest<T> {
        let (tx, rx) = oneshot::channel();
        self.slots().insert(id, tx);
        PendingRequest {
            id,
            rx,
            owner: Arc::clone(self),
        }
    }

    /// Hand `value` to the waiter registered under `id`
    ///
    /// Returns the value back if no live waiter exists: the id was never
    /// issued, was already resolved, or its request has given up.
    pub fn resolve(&self, id: &CorrelationId, value: T) -> Result<(), T> {
        let slot = self.slots().remove(id);
        match slot {
            Some(tx) => tx.send(value),
            None => Err(value),
        }
    }

    /// Number of outstanding requests
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: &CorrelationId) {
        self.slots().remove(id);
    }
}

/// Why a wait ended without a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// Nothing arrived in time
    TimedOut,
    /// The slot was dropped without being resolved
    Abandoned,
}

/// A registered request; dropping it removes its map entry
#[derive(Debug)]
pub struct PendingRequest<T> {
    id: CorrelationId,
    rx: oneshot::Receiver<T>,
    owner: Arc<PendingRequests<T>>,
}

impl<T> PendingRequest<T> {
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Race the resolution against `timeout`
    pub async fn wait(&mut self, timeout: Duration) -> Result<T, WaitError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(WaitError::Abandoned),
            Err(_) => Err(WaitError::TimedOut),
        }
    }
}

impl<T> Drop for PendingRequest<T> {
    fn drop(&mut self) {
        self.owner.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_matches_waiter() {
        let pending = PendingRequests::<u32>::new();
        let id = CorrelationId::generate();
        let mut request = pending.register(id);
        assert_eq!(pending.len(), 1);

        assert_eq!(pending.resolve(&id, 7), Ok(()));
        assert_eq!(request.wait(Duration::from_secs(1)).await, Ok(7));

        drop(request);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_at_most_once() {
        let pending = PendingRequests::<u32>::new();
        let id = CorrelationId::generate();
        let _request = pending.register(id);

        assert_eq!(pending.resolve(&id, 1), Ok(()));
        assert_eq!(pending.resolve(&id, 2), Err(2));
    }

    #[tokio::test]
    async fn test_unknown_id_returns_value() {
        let pending = PendingRequests::<&str>::new();
        let _request = pending.register(CorrelationId::generate());

        let stranger = CorrelationId::generate();
        assert_eq!(pending.resolve(&stranger, "conn"), Err("conn"));
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry() {
        let pending = PendingRequests::<u32>::new();
        let id = CorrelationId::generate();

        let mut request = pending.register(id);
        let started = tokio::time::Instant::now();
        assert_eq!(
            request.wait(crate::protocol::REQUEST_TIMEOUT).await,
            Err(WaitError::TimedOut)
        );
        assert!(started.elapsed() >= Duration::from_secs(10));
        drop(request);

        assert!(pending.is_empty());
        // A late arrival is handed back to be closed
        assert_eq!(pending.resolve(&id, 9), Err(9));
    }

    #[tokio::test]
    async fn test_resolved_after_waiter_gave_up() {
        let pending = PendingRequests::<u32>::new();
        let id = CorrelationId::generate();
        let request = pending.register(id);

        // Waiter gone, entry gone with it
        drop(request);
        assert_eq!(pending.resolve(&id, 3), Err(3));
    }
}
