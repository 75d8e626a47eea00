//! Fail-fast signal shared by everything that sends on behalf of a tenant.
//!
//! A `Halt` is cloned into the scheduler and every dispatch/retry task. The
//! first fatal condition is stored and wakes all waiters; later ones are
//! dropped. Sharing one `Halt` between several clients widens the scope of a
//! fatal condition from one tenant to all of them.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::BloaterError;

#[derive(Debug, Clone)]
pub struct Halt {
    tx: Arc<watch::Sender<Option<BloaterError>>>,
}

impl Default for Halt {
    fn default() -> Self {
        Self::new()
    }
}

impl Halt {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Record a fatal condition. Returns true if this call raised the halt,
    /// false if it was already raised.
    pub fn raise(&self, err: BloaterError) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(err);
            true
        })
    }

    pub fn is_raised(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The condition that raised the halt, if any.
    pub fn reason(&self) -> Option<BloaterError> {
        self.tx.borrow().clone()
    }

    /// Resolves once the halt is raised (immediately if it already is).
    pub async fn raised(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a close.
        let _ = rx.wait_for(Option::is_some).await;
    }
}
