//! Node configuration.
//!
//! A node's data directory carries two files under `config/`: the consensus
//! engine's `config.toml` and the ledger's `accumulate.toml`. The values map
//! one to one onto these structs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Toml(String),

    #[error("config: unknown network {0:?}")]
    UnknownNetwork(String),

    #[error("config: {0}")]
    Invalid(String),
}

/// What kind of subnet the node participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NetworkType {
    #[default]
    #[serde(rename = "block-validator")]
    BlockValidator,
    #[serde(rename = "directory")]
    Directory,
}

/// Whether the node signs blocks or only follows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[default]
    Validator,
    Follower,
}

/// The ledger configuration recognized by the execution core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulateConfig {
    #[serde(rename = "type")]
    pub network_type: NetworkType,

    /// This subnet's name.
    pub network: String,

    /// Sibling subnet RPC endpoints, in routing-ring order.
    pub networks: Vec<String>,

    /// The directory subnet's endpoint.
    pub directory: String,

    #[serde(rename = "website-enabled")]
    pub website_enabled: bool,

    #[serde(rename = "website-listen-address")]
    pub website_listen_address: String,
}

impl Default for AccumulateConfig {
    fn default() -> Self {
        Self {
            network_type: NetworkType::BlockValidator,
            network: String::new(),
            networks: Vec::new(),
            directory: String::new(),
            website_enabled: true,
            website_listen_address: String::new(),
        }
    }
}

/// The consensus engine's file. The core only materializes it; the engine
/// owns its semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub moniker: String,

    #[serde(rename = "listen-address")]
    pub listen_address: String,

    #[serde(rename = "create-empty-blocks")]
    pub create_empty_blocks: bool,

    #[serde(rename = "persistent-peers")]
    pub persistent_peers: String,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            moniker: String::new(),
            listen_address: String::new(),
            create_empty_blocks: true,
            persistent_peers: String::new(),
        }
    }
}

/// The full two-file node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    pub consensus: ConsensusConfig,
    pub accumulate: AccumulateConfig,
}

fn consensus_path(dir: &Path) -> PathBuf {
    dir.join("config").join("config.toml")
}

fn accumulate_path(dir: &Path) -> PathBuf {
    dir.join("config").join("accumulate.toml")
}

impl Config {
    /// Defaults for a node of the given kind.
    pub fn default_for(network_type: NetworkType, _node_type: NodeType) -> Self {
        let mut config = Self::default();
        config.accumulate.network_type = network_type;
        config
    }

    /// Loads both files from the node's data directory.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let consensus = fs::read_to_string(consensus_path(dir))?;
        let consensus =
            toml::from_str(&consensus).map_err(|e| ConfigError::Toml(e.to_string()))?;

        let accumulate = fs::read_to_string(accumulate_path(dir))?;
        let accumulate =
            toml::from_str(&accumulate).map_err(|e| ConfigError::Toml(e.to_string()))?;

        Ok(Self {
            consensus,
            accumulate,
        })
    }

    /// Writes both files under the node's data directory.
    pub fn store(&self, dir: &Path) -> Result<(), ConfigError> {
        fs::create_dir_all(dir.join("config"))?;

        let consensus =
            toml::to_string_pretty(&self.consensus).map_err(|e| ConfigError::Toml(e.to_string()))?;
        fs::write(consensus_path(dir), consensus)?;

        let accumulate = toml::to_string_pretty(&self.accumulate)
            .map_err(|e| ConfigError::Toml(e.to_string()))?;
        fs::write(accumulate_path(dir), accumulate)?;
        Ok(())
    }
}
