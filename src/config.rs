//! Configuration file and path resolution
//!
//! Settings are read from `config.toml` in the config directory:
//!
//! 1. `VMSWEEP_CONFIG_DIR` environment variable (`~` and `$VARS` expanded)
//! 2. `~/.config/vmsweep`
//!
//! A missing file means built-in defaults. Command-line flags always win
//! over the file. Passwords are never read from it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "VMSWEEP_CONFIG_DIR";

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// User when neither the command line nor the file names one
pub const DEFAULT_USER: &str = "administrator@vsphere.local";

/// Get the vmsweep config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("vmsweep"))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub execution: ExecutionConfig,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Concurrency ceiling default
    pub threads: Option<usize>,
    /// Delay after converting a template, in seconds
    pub settle_secs: Option<u64>,
}

impl Config {
    /// Load config.toml from the config directory
    pub fn load() -> Result<Self> {
        Self::load_from(&config_dir()?.join(CONFIG_FILE))
    }

    /// Load a config file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Host from the command line, else from the file
    pub fn host(&self, flag: Option<&str>) -> Option<String> {
        flag.map(str::to_string)
            .or_else(|| self.connection.host.clone())
            .map(|host| expand_host(&host))
    }

    /// User from the command line, else from the file, else the default
    pub fn user(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.connection.user.clone())
            .unwrap_or_else(|| DEFAULT_USER.to_string())
    }

    /// Thread count from the command line, else from the file, else 1
    pub fn threads(&self, flag: Option<usize>) -> usize {
        flag.or(self.execution.threads).unwrap_or(1)
    }

    pub fn settle(&self) -> Duration {
        self.execution
            .settle_secs
            .map_or(sweep::DEFAULT_SETTLE, Duration::from_secs)
    }
}

/// Expand `~` in inventory-file hosts, leaving endpoint names alone.
fn expand_host(host: &str) -> String {
    match host.strip_prefix("file://") {
        Some(path) => format!("file://{}", expand(path).display()),
        None if host.starts_with('~') || host.starts_with('$') => {
            expand(host).display().to_string()
        }
        None => host.to_string(),
    }
}
