//! Client runner: one tenant's workload, stage after stage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::Dispatcher;
use crate::error::BloaterError;
use crate::halt::Halt;
use crate::retry::RetryPolicy;
use crate::scheduler::{self, StageReport, WorkloadStage};
use crate::stats::StatsSink;
use crate::transport::Transport;

/// Destination server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub address: String,
    pub port: u16,
}

impl Target {
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.address, self.port)
    }
}

/// Everything that defines one tenant's traffic.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub tenant_id: u32,
    pub target: Target,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub workload: Vec<WorkloadStage>,
}

/// Mints request IDs `"<tenant>-<sequence>"`, sequence starting at 1.
#[derive(Debug)]
pub struct RequestIds {
    tenant: u32,
    seq: AtomicU64,
}

impl RequestIds {
    pub fn new(tenant: u32) -> Self {
        Self {
            tenant,
            seq: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> String {
        let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.tenant, n)
    }

    /// Number of IDs handed out so far.
    pub fn issued(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }
}

/// Per-stage results of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
}

impl RunReport {
    pub fn total_ticks(&self) -> u64 {
        self.stages.iter().map(|s| s.ticks).sum()
    }
}

/// One simulated tenant.
#[derive(Debug)]
pub struct Client {
    tenant: u32,
    workload: Vec<WorkloadStage>,
    dispatcher: Arc<Dispatcher>,
    ids: Arc<RequestIds>,
}

impl Client {
    /// Build a client. Pass the same `halt` to several clients to make a
    /// fatal condition in one of them stop all of them.
    pub fn new(
        settings: ClientSettings,
        stats: Arc<dyn StatsSink>,
        transport: Arc<dyn Transport>,
        halt: Halt,
    ) -> Self {
        let tenant = settings.tenant_id;
        let dispatcher = Dispatcher::new(
            tenant,
            settings.target.url(),
            settings.request_timeout,
            settings.retry,
            stats,
            transport,
            halt,
            Default::default(),
        );
        tracing::info!(
            target_url = %settings.target.url(),
            stages = settings.workload.len(),
            "done creating client {}",
            tenant
        );
        Self {
            tenant,
            workload: settings.workload,
            dispatcher: Arc::new(dispatcher),
            ids: Arc::new(RequestIds::new(tenant)),
        }
    }

    pub fn tenant(&self) -> u32 {
        self.tenant
    }

    pub fn halt(&self) -> &Halt {
        self.dispatcher.halt()
    }

    /// Request IDs minted so far.
    pub fn requests_issued(&self) -> u64 {
        self.ids.issued()
    }

    /// Chains (first attempt plus retries) that have not terminated yet.
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight().count()
    }

    /// Run every stage in order. Stage N+1 starts ticking only after stage N's
    /// ticker stopped; in-flight chains are not waited for.
    pub async fn run(&self) -> Result<RunReport, BloaterError> {
        let mut report = RunReport::default();
        for (index, stage) in self.workload.iter().enumerate() {
            tracing::info!(
                rps = stage.rps,
                duration_ms = stage.duration.as_millis() as u64,
                "processing new workload stage {} for client {}",
                index,
                self.tenant
            );
            let stage_report = scheduler::run_stage(&self.dispatcher, &self.ids, index, stage).await?;
            report.stages.push(stage_report);
        }
        tracing::info!("client {} workload finished", self.tenant);
        Ok(report)
    }

    /// Wait for every chain this client started to terminate.
    pub async fn drain(&self) {
        self.dispatcher.in_flight().wait_idle().await;
    }

    /// Like [`drain`](Self::drain) but gives up after `grace`. Returns the
    /// number of chains still in flight.
    pub async fn drain_for(&self, grace: Duration) -> usize {
        if tokio::time::timeout(grace, self.drain()).await.is_err() {
            let left = self.in_flight();
            tracing::warn!("client {}: {} request chain(s) still in flight after drain", self.tenant, left);
            return left;
        }
        0
    }
}
