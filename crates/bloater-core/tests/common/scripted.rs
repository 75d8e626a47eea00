//! In-memory transport that replies from a script and records call times.
//!
//! Shared by the integration tests and the crate's unit tests; the parent
//! module provides `transport`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::transport::{Transport, TransportError, TransportFuture};
use tokio::time::Instant;

pub type Reply = Result<u16, TransportError>;

pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    /// Every call gets `reply`.
    pub fn always(reply: Reply) -> Arc<Self> {
        Self::script(Vec::new(), reply)
    }

    /// Calls get `replies` in order, then `fallback` forever.
    pub fn script(replies: Vec<Reply>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Time of every call so far, in call order.
    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn get<'a>(&'a self, _url: &'a str, _timeout: Duration) -> TransportFuture<'a> {
        self.calls.lock().unwrap().push(Instant::now());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Box::pin(async move { reply })
    }
}
