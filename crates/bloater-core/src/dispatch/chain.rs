//! Per-request chain state and in-flight accounting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// State of one logical request, moved from attempt to attempt.
///
/// Owning the chain is what allows an attempt to be sent, so at most one
/// attempt per request ID exists at any time.
#[derive(Debug)]
pub struct RetryChain {
    request_id: String,
    attempt: u32,
    _in_flight: InFlightGuard,
}

impl RetryChain {
    pub(crate) fn new(request_id: String, in_flight: InFlightGuard) -> Self {
        Self {
            request_id,
            attempt: 0,
            _in_flight: in_flight,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Index of the attempt this chain is about to send (0 = first).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The chain for the following attempt.
    pub(crate) fn next(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }
}

#[derive(Debug, Default)]
struct Counter {
    active: AtomicUsize,
    idle: Notify,
}

/// Counts request chains that have not terminated yet.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    inner: Arc<Counter>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new chain; it stays counted until the guard drops.
    pub fn enter(&self) -> InFlightGuard {
        self.inner.active.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn count(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Wait until no chain is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps a chain counted in [`InFlight`].
#[derive(Debug)]
pub struct InFlightGuard {
    inner: Arc<Counter>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
