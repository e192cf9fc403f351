//! Configuration management for CinderChain

use crate::blockchain::{
    ChainParams, DEFAULT_DIFFICULTY, DEFAULT_MAX_SUPPLY, DEFAULT_MINING_REWARD,
    DIFFICULTY_ADJUSTMENT_INTERVAL, TARGET_BLOCK_TIME_MS,
};
use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// A SHA-256 hex digest has 64 characters, so no hash can meet a higher difficulty.
pub const MAX_DIFFICULTY: u32 = 64;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_p2p_port")]
    pub p2p_port: u16,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// URL other nodes use to reach this one. Derived from `p2p_port` when empty.
    #[serde(default)]
    pub public_url: String,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            p2p_port: default_p2p_port(),
            api_port: default_api_port(),
            public_url: String::new(),
            bootstrap_peers: Vec::new(),
            peer_timeout_ms: default_peer_timeout_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn public_url(&self) -> String {
        if self.public_url.is_empty() {
            format!("ws://127.0.0.1:{}", self.p2p_port)
        } else {
            self.public_url.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    #[serde(default = "default_mining_reward")]
    pub mining_reward: u64,
    #[serde(default = "default_max_supply")]
    pub max_supply: u64,
    #[serde(default = "default_adjustment_interval")]
    pub adjustment_interval: u64,
    #[serde(default = "default_target_block_time_ms")]
    pub target_block_time_ms: u64,
    #[serde(default = "default_miner_address")]
    pub miner_address: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            mining_reward: default_mining_reward(),
            max_supply: default_max_supply(),
            adjustment_interval: default_adjustment_interval(),
            target_block_time_ms: default_target_block_time_ms(),
            miner_address: default_miner_address(),
        }
    }
}

impl ChainConfig {
    pub fn params(&self) -> ChainParams {
        ChainParams {
            difficulty: self.difficulty,
            mining_reward: self.mining_reward,
            max_supply: self.max_supply,
            adjustment_interval: self.adjustment_interval,
            target_block_time_ms: self.target_block_time_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

/// `config.toml` in the working directory, else `<config dir>/cinderchain/config.toml`
/// when that exists.
pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from(DEFAULT_CONFIG_PATH);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("cinderchain").join(DEFAULT_CONFIG_PATH))
        .filter(|path| path.exists())
        .unwrap_or(local)
}

pub fn load_config() -> Result<Config, ChainError> {
    load_config_from(default_config_path())
}

/// Loads and validates the config at `path`. A missing file yields the defaults.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let path = path.as_ref();
    let config = if path.exists() {
        let config_str = fs::read_to_string(path)?;
        parse_config(&config_str)?
    } else {
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

pub fn parse_config(config_str: &str) -> Result<Config, ChainError> {
    Ok(toml::from_str(config_str)?)
}

impl Config {
    pub fn validate(&self) -> Result<(), ChainError> {
        if !(1..=MAX_DIFFICULTY).contains(&self.chain.difficulty) {
            return Err(ChainError::ConfigError(format!(
                "chain.difficulty must be between 1 and {}",
                MAX_DIFFICULTY
            )));
        }
        if self.chain.adjustment_interval < 1 {
            return Err(ChainError::ConfigError(
                "chain.adjustment_interval must be at least 1".to_string(),
            ));
        }
        if self.storage.backend != StorageBackend::Memory && self.storage.path.is_empty() {
            return Err(ChainError::ConfigError("storage.path must be set".to_string()));
        }
        Ok(())
    }
}

fn default_p2p_port() -> u16 {
    6001
}

fn default_api_port() -> u16 {
    3001
}

fn default_peer_timeout_ms() -> u64 {
    5000
}

fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}

fn default_mining_reward() -> u64 {
    DEFAULT_MINING_REWARD
}

fn default_max_supply() -> u64 {
    DEFAULT_MAX_SUPPLY
}

fn default_adjustment_interval() -> u64 {
    DIFFICULTY_ADJUSTMENT_INTERVAL
}

fn default_target_block_time_ms() -> u64 {
    TARGET_BLOCK_TIME_MS
}

fn default_miner_address() -> String {
    "miner".to_string()
}

fn default_storage_path() -> String {
    "./data/chain.json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.network.p2p_port, 6001);
        assert_eq!(config.network.api_port, 3001);
        assert_eq!(config.chain.difficulty, 4);
        assert_eq!(config.storage.backend, StorageBackend::Json);
        assert_eq!(config.network.public_url(), "ws://127.0.0.1:6001");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = parse_config(
            r#"
            [network]
            p2p_port = 7001
            bootstrap_peers = ["ws://10.0.0.2:6001"]

            [storage]
            backend = "sqlite"
            path = "./data/chain.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.network.p2p_port, 7001);
        assert_eq!(config.network.api_port, 3001);
        assert_eq!(config.network.bootstrap_peers, vec!["ws://10.0.0.2:6001"]);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.chain.mining_reward, 100);
    }

    #[test]
    fn test_zero_difficulty_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[chain]\ndifficulty = 0\n").unwrap();
        assert!(matches!(load_config_from(&path), Err(ChainError::ConfigError(_))));
    }

    #[test]
    fn test_difficulty_beyond_hash_length_is_rejected() {
        let mut config = Config::default();
        config.chain.difficulty = MAX_DIFFICULTY;
        assert!(config.validate().is_ok());

        config.chain.difficulty = MAX_DIFFICULTY + 1;
        assert!(matches!(config.validate(), Err(ChainError::ConfigError(_))));
    }

    #[test]
    fn test_unknown_backend_is_a_parse_error() {
        let result = parse_config("[storage]\nbackend = \"redis\"\n");
        assert!(matches!(result, Err(ChainError::ConfigError(_))));
    }
}
