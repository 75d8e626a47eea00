//! `bloater check` – validate a config and print the stage plan.

use anyhow::Result;
use bloater_core::config::BloaterConfig;

pub fn run_check(cfg: &BloaterConfig) -> Result<()> {
    let settings = cfg.client_settings()?;
    println!("fatal scope: {:?}", cfg.fatal_scope);

    let mut invalid = 0usize;
    for (client, s) in cfg.clients.iter().zip(&settings) {
        println!(
            "tenant {} -> {} (timeout {:?}, {} retries, factor {}, base {:?}, max {:?})",
            s.tenant_id,
            s.target.url(),
            s.request_timeout,
            s.retry.max_attempts,
            s.retry.factor,
            s.retry.base,
            s.retry.max_interval
        );
        for (i, stage) in s.workload.iter().enumerate() {
            match stage.spacing() {
                Some(spacing) => println!(
                    "  stage {}: {} rps for {:?}, spacing {:?}, {} triggers",
                    i,
                    stage.rps,
                    stage.duration,
                    spacing,
                    stage.expected_ticks()
                ),
                None => println!(
                    "  stage {}: {} rps has no usable spacing, this stage will fail at start",
                    i, stage.rps
                ),
            }
        }
        invalid += client.invalid_rate_stages().len();
    }

    if invalid > 0 {
        anyhow::bail!("{} stage(s) have an invalid request rate", invalid);
    }
    println!("config OK");
    Ok(())
}
