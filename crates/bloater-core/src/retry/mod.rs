//! Retry and backoff.
//!
//! Classification of statuses and transport errors, the jittered exponential
//! backoff policy, and the controller that schedules the next attempt of a
//! failed chain.

mod classify;
mod controller;
mod policy;

pub use classify::{classify_http_status, classify_transport_error, FailureKind, ResponseClass};
pub use controller::schedule_retry;
pub use policy::{RetryDecision, RetryPolicy};
