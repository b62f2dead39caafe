//! Configuration management for LedgerChain

use crate::crypto::validate_address;
use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Consensus parameters shared by every node on the same chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainConfig {
    /// Required leading zero bits of a block hash.
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    #[serde(default = "default_genesis_reward")]
    pub genesis_reward: u64,
    #[serde(default = "default_block_reward")]
    pub block_reward: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            genesis_reward: default_genesis_reward(),
            block_reward: default_block_reward(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MinerConfig {
    #[serde(default)]
    pub beneficiary_address: Option<String>,
}

fn default_db_path() -> String {
    "./ledgerchain.db".to_string()
}

fn default_difficulty() -> u32 {
    8
}

fn default_genesis_reward() -> u64 {
    10
}

fn default_block_reward() -> u64 {
    10
}

impl Config {
    pub fn from_toml(config_str: &str) -> Result<Self, ChainError> {
        let config: Config =
            toml::from_str(config_str).map_err(|e| ChainError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.database.path.is_empty() {
            return Err(ChainError::ConfigError("database.path must not be empty".to_string()));
        }
        if self.chain.difficulty > 255 {
            return Err(ChainError::ConfigError(format!(
                "chain.difficulty must be at most 255, got {}",
                self.chain.difficulty
            )));
        }
        if let Some(address) = &self.miner.beneficiary_address {
            if !validate_address(address) {
                return Err(ChainError::ConfigError(format!(
                    "miner.beneficiary_address is not a valid address: {}",
                    address
                )));
            }
        }
        Ok(())
    }
}

/// Loads `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let config_str = fs::read_to_string(path)?;
    Config::from_toml(&config_str)
}
