use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{ClientSettings, Target};
use crate::error::BloaterError;
use crate::retry::RetryPolicy;
use crate::scheduler::{WorkloadStage, MAX_RPS};

/// How far a fatal condition reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatalScope {
    /// Every tenant in the process stops.
    #[default]
    Process,
    /// Only the tenant that hit the condition stops.
    Tenant,
}

/// Retry policy parameters (optional section per client).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries allowed after the first failed attempt.
    pub max_attempts: u32,
    /// Backoff multiplier per attempt (>= 1).
    pub factor: u32,
    /// Wait before the first retry in seconds (e.g. 0.01 = 10ms).
    pub base_secs: f64,
    /// Maximum backoff wait in seconds.
    pub max_interval_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            factor: 2,
            base_secs: 0.01,
            max_interval_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub address: String,
    pub port: u16,
}

/// One `[[client.workload]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Requests per second. A rate outside `1..=1_000_000_000` is reported
    /// when the stage starts.
    pub rps: u32,
    pub duration_secs: f64,
}

/// One `[[client]]` entry: a tenant and its workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub tenant_id: u32,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: f64,
    pub target: TargetConfig,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub workload: Vec<StageConfig>,
}

/// Top-level configuration, usually `~/.config/bloater/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloaterConfig {
    #[serde(default)]
    pub fatal_scope: FatalScope,
    /// How long to let tail requests finish after the last stage, in seconds.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: f64,
    /// Counter flush interval for the stats series, in seconds.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: f64,
    #[serde(rename = "client", default)]
    pub clients: Vec<ClientConfig>,
}

fn default_drain_timeout_secs() -> f64 {
    5.0
}

fn default_stats_interval_secs() -> f64 {
    1.0
}

impl Default for BloaterConfig {
    fn default() -> Self {
        Self {
            fatal_scope: FatalScope::Process,
            drain_timeout_secs: default_drain_timeout_secs(),
            stats_interval_secs: default_stats_interval_secs(),
            clients: vec![ClientConfig {
                tenant_id: 0,
                request_timeout_secs: 1.0,
                target: TargetConfig {
                    address: "127.0.0.1".to_string(),
                    port: 8080,
                },
                retry: Some(RetryConfig::default()),
                workload: vec![
                    StageConfig {
                        rps: 50,
                        duration_secs: 10.0,
                    },
                    StageConfig {
                        rps: 200,
                        duration_secs: 10.0,
                    },
                    StageConfig {
                        rps: 50,
                        duration_secs: 10.0,
                    },
                ],
            }],
        }
    }
}

/// Convert a seconds value from config into a `Duration`.
fn secs(field: &str, value: f64) -> Result<Duration, BloaterError> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        BloaterError::InvalidConfig(format!(
            "{} must be a finite, non-negative number of seconds (got {})",
            field, value
        ))
    })
}

impl RetryConfig {
    pub fn to_policy(&self) -> Result<RetryPolicy, BloaterError> {
        if self.factor == 0 {
            return Err(BloaterError::InvalidConfig(
                "retry.factor must be at least 1".to_string(),
            ));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            factor: self.factor,
            base: secs("retry.base_secs", self.base_secs)?,
            max_interval: secs("retry.max_interval_secs", self.max_interval_secs)?,
        })
    }
}

impl ClientConfig {
    /// Engine settings for this tenant.
    pub fn to_settings(&self) -> Result<ClientSettings, BloaterError> {
        let request_timeout = secs("request_timeout_secs", self.request_timeout_secs)?;
        if request_timeout.is_zero() {
            return Err(BloaterError::InvalidConfig(format!(
                "client {}: request_timeout_secs must be positive",
                self.tenant_id
            )));
        }
        let retry = self.retry.clone().unwrap_or_default().to_policy()?;
        let workload = self
            .workload
            .iter()
            .map(|s| -> Result<WorkloadStage, BloaterError> {
                let duration = secs("workload.duration_secs", s.duration_secs)?;
                Ok(WorkloadStage::new(s.rps, duration))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ClientSettings {
            tenant_id: self.tenant_id,
            target: Target {
                address: self.target.address.clone(),
                port: self.target.port,
            },
            request_timeout,
            retry,
            workload,
        })
    }

    /// Indices of stages that would fail at start with `InvalidRate`.
    pub fn invalid_rate_stages(&self) -> Vec<usize> {
        self.workload
            .iter()
            .enumerate()
            .filter(|(_, s)| s.rps == 0 || s.rps > MAX_RPS)
            .map(|(i, _)| i)
            .collect()
    }
}

impl BloaterConfig {
    /// Check shape and convert every client. Stages with an invalid rate pass here; they
    /// are reported when the stage starts.
    pub fn client_settings(&self) -> Result<Vec<ClientSettings>, BloaterError> {
        if self.clients.is_empty() {
            return Err(BloaterError::InvalidConfig(
                "at least one [[client]] is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for c in &self.clients {
            if !seen.insert(c.tenant_id) {
                return Err(BloaterError::InvalidConfig(format!(
                    "duplicate tenant_id {}",
                    c.tenant_id
                )));
            }
        }
        self.clients.iter().map(ClientConfig::to_settings).collect()
    }

    pub fn drain_timeout(&self) -> Result<Duration, BloaterError> {
        secs("drain_timeout_secs", self.drain_timeout_secs)
    }

    pub fn stats_interval(&self) -> Result<Duration, BloaterError> {
        let d = secs("stats_interval_secs", self.stats_interval_secs)?;
        if d.is_zero() {
            return Err(BloaterError::InvalidConfig(
                "stats_interval_secs must be positive".to_string(),
            ));
        }
        Ok(d)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bloater")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Parse and validate a config file.
pub fn load_from_path(path: &Path) -> Result<BloaterConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config: {}", path.display()))?;
    let cfg: BloaterConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    cfg.client_settings()?;
    cfg.drain_timeout()?;
    cfg.stats_interval()?;
    Ok(cfg)
}

/// Write the default configuration to `path`, creating parent directories.
pub fn write_default(path: &Path) -> Result<BloaterConfig> {
    let default_cfg = BloaterConfig::default();
    let toml = toml::to_string_pretty(&default_cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml)?;
    tracing::info!("wrote default config to {}", path.display());
    Ok(default_cfg)
}

/// Load configuration from the XDG path, creating a default file if none exists.
pub fn load_or_init() -> Result<BloaterConfig> {
    let path = config_path()?;
    if !path.exists() {
        return write_default(&path);
    }
    load_from_path(&path)
}
