//! Configuration for connections and run behavior.
//!
//! Default config location: ~/.config/ferry/config.toml

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub source: ConnectionConfig,
    #[serde(default)]
    pub target: ConnectionConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// How to reach one service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Bearer token. Takes precedence over basic auth when both are set.
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-call timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Defaults for export/import runs; flags override these.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub overwrite_dashboards: bool,
    #[serde(default)]
    pub include_containers: Vec<String>,
    #[serde(default)]
    pub exclude_containers: Vec<String>,
}

fn default_concurrency() -> usize {
    8
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            overwrite_dashboards: false,
            include_containers: Vec::new(),
            exclude_containers: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load the default config file if present, otherwise defaults.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ferry").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.source.url, "http://localhost:3000");
        assert_eq!(config.source.timeout_secs, 30);
        assert_eq!(config.run.concurrency, 8);
        assert!(!config.run.overwrite_dashboards);
    }

    #[test]
    fn test_partial_config_parses() {
        let config: Config = toml::from_str(
            r#"
            [target]
            url = "https://grafana.example.com"
            token = "glsa_abc"
            timeout_secs = 5

            [run]
            exclude_containers = ["Test"]
            "#,
        )
        .unwrap();
        assert_eq!(config.target.url, "https://grafana.example.com");
        assert_eq!(config.target.timeout(), Duration::from_secs(5));
        assert_eq!(config.run.exclude_containers, vec!["Test"]);
        // untouched sections still default
        assert_eq!(config.source.url, "http://localhost:3000");
    }
}
