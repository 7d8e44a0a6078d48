//! The transport seam between orchestrator and server.

use crate::error::{SyncError, SyncResult};
use deltasync_protocol::{BootstrapResponse, PullResponse, PushResponse, Transaction};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Carries the three sync requests to a server.
///
/// The orchestrator never speaks a wire protocol itself; everything flows
/// through this trait. [`crate::HttpTransport`] maps it onto the HTTP
/// endpoints, [`crate::LoopbackClient`] onto an in-process server, and
/// [`MockTransport`] onto canned responses for tests.
pub trait SyncTransport: Send + Sync {
    /// Fetches the full authoritative snapshot.
    fn bootstrap(&self) -> SyncResult<BootstrapResponse>;

    /// Fetches the confirmed actions newer than `since`.
    fn pull(&self, since_sync_id: u64) -> SyncResult<PullResponse>;

    /// Submits a transaction and returns the server's verdict.
    fn push(&self, transaction: &Transaction) -> SyncResult<PushResponse>;

    /// Advisory connectivity check; a cheap local guess, never a network call.
    ///
    /// Used to skip work that is certain to fail (queue flushes while
    /// offline). `true` does not guarantee the next request succeeds.
    fn is_connected(&self) -> bool {
        true
    }
}

/// Scripted transport for orchestrator tests.
///
/// Responses are queued per endpoint and consumed in order; an exhausted
/// queue answers with a retryable transport failure, which doubles as the
/// "server unreachable" fixture.
#[derive(Default)]
pub struct MockTransport {
    bootstraps: Mutex<VecDeque<SyncResult<BootstrapResponse>>>,
    pulls: Mutex<VecDeque<SyncResult<PullResponse>>>,
    pushes: Mutex<VecDeque<SyncResult<PushResponse>>>,
    pushed: Mutex<Vec<Transaction>>,
}

impl MockTransport {
    /// Creates a transport whose every endpoint is unreachable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a bootstrap response.
    pub fn enqueue_bootstrap(&self, response: SyncResult<BootstrapResponse>) {
        self.bootstraps.lock().push_back(response);
    }

    /// Queues a pull response.
    pub fn enqueue_pull(&self, response: SyncResult<PullResponse>) {
        self.pulls.lock().push_back(response);
    }

    /// Queues a push response.
    pub fn enqueue_push(&self, response: SyncResult<PushResponse>) {
        self.pushes.lock().push_back(response);
    }

    /// Returns the transactions pushed so far, in order.
    pub fn pushed_transactions(&self) -> Vec<Transaction> {
        self.pushed.lock().clone()
    }

    fn unreachable<T>() -> SyncResult<T> {
        Err(SyncError::transport_retryable("server unreachable"))
    }
}

impl SyncTransport for MockTransport {
    fn bootstrap(&self) -> SyncResult<BootstrapResponse> {
        self.bootstraps
            .lock()
            .pop_front()
            .unwrap_or_else(Self::unreachable)
    }

    fn pull(&self, _since_sync_id: u64) -> SyncResult<PullResponse> {
        self.pulls
            .lock()
            .pop_front()
            .unwrap_or_else(Self::unreachable)
    }

    fn push(&self, transaction: &Transaction) -> SyncResult<PushResponse> {
        self.pushed.lock().push(transaction.clone());
        self.pushes
            .lock()
            .pop_front()
            .unwrap_or_else(Self::unreachable)
    }
}
