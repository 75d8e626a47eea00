//! Request dispatcher: one attempt in, one terminal classification out.
//!
//! Every sent attempt increments `client.rq.total.count` on entry and records
//! `client.rq.total_hist` on exit. In between, the response (or transport
//! error) is classified, metered, and either finishes the chain or hands it
//! to the retry controller.

mod chain;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::BloaterError;
use crate::halt::Halt;
use crate::retry::{self, FailureKind, ResponseClass, RetryPolicy};
use crate::stats::{names, StatsSink};
use crate::transport::{Transport, TransportError};

pub use chain::{InFlight, InFlightGuard, RetryChain};

/// Terminal classification of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// 200 received.
    Success { latency: Duration },
    /// Failed; the next attempt is scheduled after `wait`.
    Retrying { failure: FailureKind, wait: Duration },
    /// Failed and nothing further is scheduled: either the budget is spent or
    /// the failure kind is not retried.
    GaveUp { failure: FailureKind },
    /// Unmodeled status; the halt has been raised.
    Fatal { status: u16 },
    /// Not sent because the halt was already raised.
    Halted,
}

/// Boxed attempt future; boxing lets retry tasks re-enter the dispatcher.
pub type DispatchFuture = Pin<Box<dyn Future<Output = AttemptOutcome> + Send>>;

/// Everything needed to send attempts for one tenant.
pub struct Dispatcher {
    tenant: u32,
    url: String,
    request_timeout: Duration,
    policy: RetryPolicy,
    stats: Arc<dyn StatsSink>,
    transport: Arc<dyn Transport>,
    halt: Halt,
    in_flight: InFlight,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tenant", &self.tenant)
            .field("url", &self.url)
            .field("request_timeout", &self.request_timeout)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant: u32,
        url: String,
        request_timeout: Duration,
        policy: RetryPolicy,
        stats: Arc<dyn StatsSink>,
        transport: Arc<dyn Transport>,
        halt: Halt,
        in_flight: InFlight,
    ) -> Self {
        Self {
            tenant,
            url,
            request_timeout,
            policy,
            stats,
            transport,
            halt,
            in_flight,
        }
    }

    pub fn tenant(&self) -> u32 {
        self.tenant
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn stats(&self) -> &dyn StatsSink {
        self.stats.as_ref()
    }

    pub fn halt(&self) -> &Halt {
        &self.halt
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Start a new chain for `request_id` on its own task. The chain is
    /// counted in flight from this call on.
    pub fn spawn(self: &Arc<Self>, request_id: String) -> JoinHandle<AttemptOutcome> {
        let chain = RetryChain::new(request_id, self.in_flight.enter());
        tokio::spawn(Arc::clone(self).dispatch(chain))
    }

    /// Send the attempt described by `chain`.
    pub fn dispatch(self: Arc<Self>, chain: RetryChain) -> DispatchFuture {
        Box::pin(async move { self.send_attempt(chain).await })
    }

    async fn send_attempt(self: Arc<Self>, chain: RetryChain) -> AttemptOutcome {
        if self.halt.is_raised() {
            tracing::debug!(
                request_id = chain.request_id(),
                attempt = chain.attempt(),
                "tenant {} halted, attempt not sent",
                self.tenant
            );
            return AttemptOutcome::Halted;
        }

        let tid = self.tenant;
        self.stats.incr(names::RQ_TOTAL_COUNT, tid);
        let sent_at = SystemTime::now();
        let started = Instant::now();

        let result = self.transport.get(&self.url, self.request_timeout).await;
        let completed_at = SystemTime::now();
        let latency = started.elapsed();

        let outcome = match result {
            Err(e) => Arc::clone(&self).on_transport_error(chain, &e, sent_at, completed_at),
            Ok(status) => {
                Arc::clone(&self).on_response(chain, status, latency, sent_at, completed_at)
            }
        };

        self.stats.direct_measurement(names::RQ_TOTAL_HIST, sent_at, 1.0, tid);
        outcome
    }

    fn on_transport_error(
        self: Arc<Self>,
        chain: RetryChain,
        e: &TransportError,
        sent_at: SystemTime,
        completed_at: SystemTime,
    ) -> AttemptOutcome {
        let tid = self.tenant;
        let failure = retry::classify_transport_error(e);
        match failure {
            FailureKind::Timeout => {
                tracing::warn!(request_id = chain.request_id(), "request timed out, client {}", tid);
                self.record_timeout(sent_at, completed_at);
                self.stats.incr(names::RQ_TIMEOUT_COUNT, tid);
            }
            _ => {
                tracing::debug!(request_id = chain.request_id(), "request error: {}", e);
                self.stats.incr(names::RQ_NON_TIMEOUT_ERROR_COUNT, tid);
            }
        }
        self.stats.incr(names::RQ_FAILURE_COUNT, tid);
        self.retry_or_give_up(chain, failure)
    }

    fn on_response(
        self: Arc<Self>,
        chain: RetryChain,
        status: u16,
        latency: Duration,
        sent_at: SystemTime,
        completed_at: SystemTime,
    ) -> AttemptOutcome {
        let tid = self.tenant;
        match retry::classify_http_status(status) {
            ResponseClass::Success => {
                self.stats.direct_measurement(
                    names::RQ_LATENCY,
                    completed_at,
                    latency.as_secs_f64(),
                    tid,
                );
                self.stats.direct_measurement(names::RQ_SUCCESS_HIST, sent_at, 1.0, tid);
                self.stats.incr(names::RQ_SUCCESS_COUNT, tid);
                AttemptOutcome::Success { latency }
            }
            ResponseClass::Overloaded => {
                self.stats.direct_measurement(names::RQ_OVERLOAD, sent_at, 1.0, tid);
                self.stats.incr(names::RQ_FAILURE_COUNT, tid);
                self.retry_or_give_up(chain, FailureKind::Overloaded(status))
            }
            ResponseClass::TimedOut => {
                // Metered like a transport timeout but never retried.
                self.record_timeout(sent_at, completed_at);
                AttemptOutcome::GaveUp {
                    failure: FailureKind::TimeoutResponse(status),
                }
            }
            ResponseClass::Unmodeled => {
                tracing::error!(
                    request_id = chain.request_id(),
                    status,
                    "unmodeled response status, halting client {}",
                    tid
                );
                self.halt.raise(BloaterError::UnmodeledStatus {
                    tenant: tid,
                    request_id: chain.request_id().to_string(),
                    status,
                });
                AttemptOutcome::Fatal { status }
            }
        }
    }

    fn record_timeout(&self, sent_at: SystemTime, completed_at: SystemTime) {
        // The origin point marks when the doomed request was sent.
        self.stats
            .direct_measurement(names::RQ_TIMEOUT_ORIGIN, sent_at, 1.0, self.tenant);
        self.stats
            .direct_measurement(names::RQ_TIMEOUT, completed_at, 1.0, self.tenant);
    }

    fn retry_or_give_up(self: Arc<Self>, chain: RetryChain, failure: FailureKind) -> AttemptOutcome {
        match retry::schedule_retry(self, chain) {
            Some(wait) => AttemptOutcome::Retrying { failure, wait },
            None => AttemptOutcome::GaveUp { failure },
        }
    }
}
