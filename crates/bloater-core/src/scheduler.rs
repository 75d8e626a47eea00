//! Stage scheduler: turns a target rate into a cadence of dispatch triggers.
//!
//! One ticker task runs per stage. Each tick mints a request ID and spawns a
//! detached chain; the ticker never waits for it. When the stage's duration
//! is up the ticker stops, and the scheduler returns as soon as the ticker
//! task has finished. Chains spawned during the stage (and their retries)
//! keep running into the next stage; [`StageReport::in_flight_at_end`]
//! reports how many did.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::client::RequestIds;
use crate::dispatch::Dispatcher;
use crate::error::BloaterError;
use crate::stats::names;

/// Highest rate with a non-zero trigger spacing (1ns).
pub const MAX_RPS: u32 = 1_000_000_000;

/// A period of constant target rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadStage {
    /// Target requests per second. Must be in `1..=MAX_RPS` to run.
    pub rps: u32,
    pub duration: Duration,
}

impl WorkloadStage {
    pub fn new(rps: u32, duration: Duration) -> Self {
        Self { rps, duration }
    }

    /// Time between triggers, or `None` for a rate outside `1..=MAX_RPS`.
    pub fn spacing(&self) -> Option<Duration> {
        (1..=MAX_RPS)
            .contains(&self.rps)
            .then(|| Duration::from_secs(1) / self.rps)
    }

    /// Triggers the stage fires: one per spacing that fits in the duration.
    pub fn expected_ticks(&self) -> u64 {
        match self.spacing() {
            Some(spacing) => (self.duration.as_nanos() / spacing.as_nanos()) as u64,
            None => 0,
        }
    }
}

/// What happened during one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageReport {
    /// Dispatch triggers fired.
    pub ticks: u64,
    /// Chains still running when the ticker stopped. These overlap the next
    /// stage.
    pub in_flight_at_end: usize,
}

/// Run one stage to completion of its ticker.
///
/// A rate with no usable spacing is rejected before anything is sent. If the halt is raised
/// during the stage, ticking stops and the halt's condition is returned.
pub async fn run_stage(
    dispatcher: &Arc<Dispatcher>,
    ids: &Arc<RequestIds>,
    index: usize,
    stage: &WorkloadStage,
) -> Result<StageReport, BloaterError> {
    let spacing = stage
        .spacing()
        .ok_or(BloaterError::InvalidRate { stage: index })?;
    let tenant = dispatcher.tenant();
    tracing::info!(
        rps = stage.rps,
        duration_ms = stage.duration.as_millis() as u64,
        spacing_us = spacing.as_micros() as u64,
        "client {} workload stage {} started",
        tenant,
        index
    );

    let start = Instant::now();
    let deadline = start + stage.duration;
    let ticker = tokio::spawn(tick_loop(
        Arc::clone(dispatcher),
        Arc::clone(ids),
        stage.rps,
        spacing,
        start,
        deadline,
    ));
    let ticks = match ticker.await {
        Ok(ticks) => ticks,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            tracing::warn!("stage ticker join: {}", e);
            0
        }
    };

    let report = StageReport {
        ticks,
        in_flight_at_end: dispatcher.in_flight().count(),
    };
    if let Some(reason) = dispatcher.halt().reason() {
        tracing::error!("client {} stage {} halted after {} ticks: {}", tenant, index, ticks, reason);
        return Err(reason);
    }
    tracing::info!(
        ticks = report.ticks,
        in_flight = report.in_flight_at_end,
        "client {} workload stage {} finished",
        tenant,
        index
    );
    Ok(report)
}

async fn tick_loop(
    dispatcher: Arc<Dispatcher>,
    ids: Arc<RequestIds>,
    rps: u32,
    spacing: Duration,
    start: Instant,
    deadline: Instant,
) -> u64 {
    let mut interval = tokio::time::interval_at(start + spacing, spacing);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let expiry = tokio::time::sleep_until(deadline);
    tokio::pin!(expiry);
    let halt = dispatcher.halt().clone();
    let halted = halt.raised();
    tokio::pin!(halted);

    let mut ticks = 0u64;
    loop {
        // A tick due exactly at the deadline still fires.
        tokio::select! {
            biased;
            _ = &mut halted => break,
            at = interval.tick() => {
                if at > deadline {
                    break;
                }
                ticks += 1;
                dispatcher.stats().set(names::RPS, f64::from(rps), dispatcher.tenant());
                dispatcher.spawn(ids.next_id());
            }
            _ = &mut expiry => break,
        }
    }
    ticks
}
