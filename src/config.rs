//! Configuration management for CareChain

use crate::consensus::DEFAULT_PEER_TIMEOUT;
use crate::error::ChainError;
use crate::miner::DEFAULT_MINE_INTERVAL;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// File read by [`load_config`] when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "carechain.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Peers registered at start-up, exactly as if posted to `/nodes/register`.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_mining_enabled")]
    pub enabled: bool,
    #[serde(default = "default_mine_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default = "default_peer_timeout")]
    pub peer_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bootstrap_peers: Vec::new(),
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            enabled: default_mining_enabled(),
            interval_secs: default_mine_interval(),
        }
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            peer_timeout_secs: default_peer_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_mining_enabled() -> bool {
    true
}

fn default_mine_interval() -> u64 {
    DEFAULT_MINE_INTERVAL.as_secs()
}

fn default_peer_timeout() -> u64 {
    DEFAULT_PEER_TIMEOUT.as_secs()
}

impl Config {
    pub fn from_toml(contents: &str) -> Result<Self, ChainError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.network.port == 0 {
            return Err(ChainError::ConfigError("network.port must be non-zero".to_string()));
        }
        if self.miner.interval_secs == 0 {
            return Err(ChainError::ConfigError(
                "miner.interval_secs must be at least 1".to_string(),
            ));
        }
        if self.consensus.peer_timeout_secs == 0 {
            return Err(ChainError::ConfigError(
                "consensus.peer_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.network.host, self.network.port)
    }

    pub fn mine_interval(&self) -> Duration {
        Duration::from_secs(self.miner.interval_secs)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.consensus.peer_timeout_secs)
    }
}

/// Load configuration from `path`, or from [`DEFAULT_CONFIG_FILE`].
///
/// A missing file yields the defaults; a file that exists but does not parse
/// or validate is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config, ChainError> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    Config::from_toml(&contents)
}
