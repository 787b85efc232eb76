//! Server configuration: TOML file + CLI overrides.

use parley_core::{ParleyError, ParleyResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            workers: default_workers(),
            idle_timeout: default_idle_timeout(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

fn default_port() -> u16 {
    8080
}
fn default_workers() -> usize {
    4
}
fn default_idle_timeout() -> u64 {
    60
}
fn default_sweep_interval() -> u64 {
    5
}

/// Resolved server configuration (CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Worker task count for the dispatch pool.
    pub workers: usize,
    /// Seconds of silence before a user is marked INACTIVE.
    pub idle_timeout: u64,
    /// Seconds between inactivity sweeps.
    pub sweep_interval: u64,
}

impl ServerConfig {
    /// Load config from a TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_port: Option<u16>,
        cli_workers: Option<usize>,
        cli_idle_timeout: Option<u64>,
    ) -> ParleyResult<Self> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| ParleyError::Other(format!("config parse error: {e}")))?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        let config = Self {
            port: cli_port.unwrap_or(file_config.server.port),
            workers: cli_workers.unwrap_or(file_config.server.workers),
            idle_timeout: cli_idle_timeout.unwrap_or(file_config.server.idle_timeout),
            sweep_interval: file_config.server.sweep_interval,
        };

        if config.workers == 0 {
            return Err(ParleyError::Other("worker count must be at least 1".into()));
        }
        Ok(config)
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s.as_ref())
}
