//! `bloater init [PATH]` – write a default config.

use anyhow::Result;
use bloater_core::config;
use std::path::Path;

pub fn run_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    config::write_default(path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
