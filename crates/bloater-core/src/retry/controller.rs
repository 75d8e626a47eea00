//! Retry controller: schedules the next attempt of a failed chain on its own
//! task so that stage tickers and other chains never wait on a backoff.

use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::{Dispatcher, RetryChain};
use crate::stats::names;

use super::policy::RetryDecision;

/// Schedule attempt `chain.attempt() + 1` after a jittered backoff.
///
/// Returns the wait, or `None` when the budget is spent and the chain ends
/// here. The failure itself has already been counted by the dispatcher.
pub fn schedule_retry(dispatcher: Arc<Dispatcher>, chain: RetryChain) -> Option<Duration> {
    let wait = match dispatcher.policy().decide(chain.attempt()) {
        RetryDecision::NoRetry => {
            tracing::debug!(
                request_id = chain.request_id(),
                attempt = chain.attempt(),
                "retry budget exhausted"
            );
            return None;
        }
        RetryDecision::RetryAfter(wait) => wait,
    };

    tokio::spawn(async move {
        tokio::time::sleep(wait).await;
        if dispatcher.halt().is_raised() {
            return;
        }
        let next = chain.next();
        tracing::warn!(
            request_id = next.request_id(),
            attempt = next.attempt(),
            wait_ms = wait.as_millis() as u64,
            "backoff done, send retry"
        );
        dispatcher
            .stats()
            .incr(names::RQ_RETRY_COUNT, dispatcher.tenant());
        dispatcher.dispatch(next).await;
    });
    Some(wait)
}
