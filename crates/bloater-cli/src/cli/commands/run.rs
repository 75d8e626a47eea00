//! `bloater run` – drive every tenant's workload, drain, and dump stats.

use anyhow::Result;
use bloater_core::client::Client;
use bloater_core::config::{BloaterConfig, FatalScope};
use bloater_core::halt::Halt;
use bloater_core::stats::StatsMgr;
use bloater_core::transport::{CurlTransport, Transport};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;

pub async fn run_workload(cfg: &BloaterConfig, data_dir: &Path) -> Result<()> {
    let settings = cfg.client_settings()?;
    let drain_timeout = cfg.drain_timeout()?;
    let stats = Arc::new(StatsMgr::new());
    let flusher = stats.spawn_flusher(cfg.stats_interval()?);
    let transport: Arc<dyn Transport> = Arc::new(CurlTransport::new()?);

    let shared_halt = Halt::new();
    let clients: Vec<Arc<Client>> = settings
        .into_iter()
        .map(|s| {
            let halt = match cfg.fatal_scope {
                FatalScope::Process => shared_halt.clone(),
                FatalScope::Tenant => Halt::new(),
            };
            Arc::new(Client::new(s, stats.clone(), Arc::clone(&transport), halt))
        })
        .collect();
    tracing::info!(
        clients = clients.len(),
        scope = ?cfg.fatal_scope,
        "done creating all clients"
    );

    let mut join_set = JoinSet::new();
    for client in &clients {
        let client = Arc::clone(client);
        join_set.spawn(async move {
            let result = client.run().await;
            (client.tenant(), result)
        });
    }

    let mut failures = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        let (tenant, result) =
            joined.map_err(|e| anyhow::anyhow!("client task join: {}", e))?;
        match result {
            Ok(report) => {
                println!(
                    "tenant {}: {} stage(s), {} requests issued",
                    tenant,
                    report.stages.len(),
                    report.total_ticks()
                );
            }
            Err(e) if e.is_runtime() => {
                tracing::error!("client {} halted: {}", tenant, e);
                eprintln!("tenant {}: halted: {}", tenant, e);
                failures.push(e);
            }
            Err(e) => {
                tracing::error!("client {} rejected its workload: {}", tenant, e);
                eprintln!("tenant {}: workload rejected: {}", tenant, e);
                failures.push(e);
            }
        }
    }

    // A raised process-wide halt ends the run without waiting on tail chains.
    if !shared_halt.is_raised() {
        let deadline = Instant::now() + drain_timeout;
        for client in &clients {
            let left = client
                .drain_for(deadline.saturating_duration_since(Instant::now()))
                .await;
            if left > 0 {
                println!("tenant {}: {} request chain(s) abandoned", client.tenant(), left);
            }
        }
    }

    flusher.stop().await;
    let files = stats.dump_csv(data_dir)?;
    println!("wrote {} stats file(s) to {}", files.len(), data_dir.display());

    if let Some(first) = failures.first() {
        let halted = failures.iter().filter(|e| e.is_runtime()).count();
        anyhow::bail!(
            "{} tenant(s) stopped: {} halted, {} rejected (first: {})",
            failures.len(),
            halted,
            failures.len() - halted,
            first
        );
    }
    Ok(())
}
