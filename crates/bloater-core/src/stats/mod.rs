//! Metrics seam and the in-memory stats manager.
//!
//! The engine emits through [`StatsSink`] only. [`StatsMgr`] is the sink the
//! CLI uses: it keeps every point in memory and dumps one CSV per metric and
//! tenant when the run is over.

mod csv;
mod mgr;

use std::time::SystemTime;

pub use mgr::{FlusherHandle, Point, StatsMgr};

/// Metric names emitted by the engine.
pub mod names {
    pub const RPS: &str = "client.rps";
    pub const RQ_TOTAL_COUNT: &str = "client.rq.total.count";
    pub const RQ_TOTAL_HIST: &str = "client.rq.total_hist";
    pub const RQ_LATENCY: &str = "client.rq.latency";
    pub const RQ_SUCCESS_HIST: &str = "client.rq.success_hist";
    pub const RQ_SUCCESS_COUNT: &str = "client.rq.success.count";
    pub const RQ_FAILURE_COUNT: &str = "client.rq.failure.count";
    pub const RQ_TIMEOUT: &str = "client.rq.timeout";
    pub const RQ_TIMEOUT_ORIGIN: &str = "client.rq.timeout_origin";
    pub const RQ_TIMEOUT_COUNT: &str = "client.rq.timeout.count";
    pub const RQ_NON_TIMEOUT_ERROR_COUNT: &str = "client.rq.non_timeout_error.count";
    pub const RQ_RETRY_COUNT: &str = "client.rq.retry.count";
    pub const RQ_OVERLOAD: &str = "client.rq.503";
}

/// Destination for counters, gauges and timed measurements.
///
/// Called concurrently from many tasks; implementations do their own
/// synchronization.
pub trait StatsSink: Send + Sync + 'static {
    /// Add one to a counter.
    fn incr(&self, name: &str, tenant: u32);

    /// Record the current value of a gauge.
    fn set(&self, name: &str, value: f64, tenant: u32);

    /// Record a point keyed at an explicit timestamp.
    fn direct_measurement(&self, name: &str, at: SystemTime, value: f64, tenant: u32);
}
