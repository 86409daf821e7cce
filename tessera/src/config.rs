// Copyright (c) 2024 Tessera Foundation

//! Node configuration, loaded from TOML.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tsr_blockchain_types::Hash256;

use crate::{
    chain::ChainOptions,
    params::{ChainParams, Checkpoint, Network},
};

/// Upper bound on the configured orphan expiry, 30 days.
pub const MAX_ORPHAN_EXPIRY_SECS: u64 = 30 * 24 * 60 * 60;

/// Main configuration for a Tessera node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network profile
    #[serde(default)]
    pub network: Network,

    /// Directory holding the chain store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Checkpoints added to the network's built-in list
    #[serde(default)]
    pub checkpoints: Vec<CheckpointConfig>,

    /// Maximum number of orphan blocks held while waiting for parents
    #[serde(default = "default_max_orphans")]
    pub max_orphans: usize,

    /// Seconds an orphan block is kept before it expires
    #[serde(default = "default_orphan_expiry_secs")]
    pub orphan_expiry_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            checkpoints: Vec::new(),
            max_orphans: default_max_orphans(),
            orphan_expiry_secs: default_orphan_expiry_secs(),
        }
    }
}

/// A checkpoint as written in the config file, with a hex hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub height: u64,
    pub hash: String,
}

impl CheckpointConfig {
    /// Parse the hex hash.
    pub fn to_checkpoint(&self) -> Result<Checkpoint> {
        let bytes = hex::decode(&self.hash)
            .with_context(|| format!("Invalid checkpoint hash at height {}", self.height))?;
        let hash: [u8; 32] = bytes.try_into().map_err(|_| {
            anyhow!(
                "Checkpoint hash at height {} must be 32 bytes",
                self.height
            )
        })?;
        Ok(Checkpoint {
            height: self.height,
            hash: Hash256(hash),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("tessera-data")
}

fn default_max_orphans() -> usize {
    100
}

fn default_orphan_expiry_secs() -> u64 {
    60 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::default(),
            data_dir: default_data_dir(),
            chain: ChainConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load config from a file, falling back to defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Chain parameters for the configured network, with configured
    /// checkpoints merged in
    pub fn chain_params(&self) -> Result<ChainParams> {
        let checkpoints = self
            .chain
            .checkpoints
            .iter()
            .map(CheckpointConfig::to_checkpoint)
            .collect::<Result<Vec<_>>>()?;
        Ok(ChainParams::for_network(self.network).with_checkpoints(checkpoints))
    }

    /// Orphan pool settings
    pub fn chain_options(&self) -> Result<ChainOptions> {
        let secs = self.chain.orphan_expiry_secs;
        if secs > MAX_ORPHAN_EXPIRY_SECS {
            return Err(anyhow!(
                "orphan_expiry_secs = {secs} is out of range (at most {MAX_ORPHAN_EXPIRY_SECS})"
            ));
        }
        Ok(ChainOptions {
            max_orphans: self.chain.max_orphans,
            orphan_expiry: chrono::Duration::seconds(secs as i64),
        })
    }

    /// Path of the chain store
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(self.network.to_string()).join("chain")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.chain.max_orphans, 100);
        assert_eq!(config.chain.orphan_expiry_secs, 3600);
        assert_eq!(config.logging.level, "info");
        assert_eq!(
            config.chain_options().unwrap().orphan_expiry,
            chrono::Duration::hours(1)
        );
    }

    #[test]
    fn test_parse_checkpoints() {
        let config: Config = toml::from_str(&format!(
            r#"
            network = "regtest"

            [[chain.checkpoints]]
            height = 5
            hash = "{}"
            "#,
            "ab".repeat(32)
        ))
        .unwrap();

        let params = config.chain_params().unwrap();
        assert_eq!(params.network, Network::Regtest);
        assert_eq!(params.checkpoints.len(), 1);
        assert_eq!(params.checkpoints[0].height, 5);
        assert_eq!(params.checkpoints[0].hash, Hash256([0xab; 32]));
    }

    #[test]
    fn test_orphan_expiry_out_of_range_is_an_error() {
        let config: Config = toml::from_str("[chain]\norphan_expiry_secs = 100000000000000").unwrap();
        let err = config.chain_options().unwrap_err();
        assert!(err.to_string().contains("orphan_expiry_secs"));

        let config: Config =
            toml::from_str(&format!("[chain]\norphan_expiry_secs = {MAX_ORPHAN_EXPIRY_SECS}")).unwrap();
        assert_eq!(
            config.chain_options().unwrap().orphan_expiry,
            chrono::Duration::days(30)
        );
    }

    #[test]
    fn test_bad_checkpoint_hash_is_an_error() {
        let mut config = Config::default();
        config.chain.checkpoints.push(CheckpointConfig {
            height: 1,
            hash: "abcd".to_string(),
        });
        assert!(config.chain_params().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.network = Network::Regtest;
        config.chain.max_orphans = 7;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.network, Network::Regtest);
        assert_eq!(loaded.chain.max_orphans, 7);

        let missing = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(missing.network, Network::Testnet);
    }
}
