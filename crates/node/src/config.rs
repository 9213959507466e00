// node/src/config.rs
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: String,
    pub network: NetworkConfig,
    pub rpc: RpcConfig,
    pub consensus: consensus::ConsensusConfig,
    pub storage: StorageConfig,
    pub mempool: blockchain_core::PoolConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator: Option<ValidatorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub listen_addr: SocketAddr,
    pub max_peers: usize,
    pub bootstrap_peers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub enabled: bool,
    pub listen_addr: SocketAddr,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub cache_size_mb: usize,
    pub max_open_files: i32,
    pub pruning: String, // "archive" or "pruned"
    pub keep_blocks: u64,
}

/// A validator's key material. Economic fields (commission, self-stake) are
/// out of scope here; this only carries what the coordinator needs to
/// propose blocks and sign BFT commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Path to the Ed25519 keypair used to sign produced block headers.
    pub key_path: String,
    /// Path to the BLS12-381 keypair used to sign single commits.
    pub bls_key_path: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
            network: NetworkConfig {
                listen_addr: "0.0.0.0:30303".parse().unwrap(),
                max_peers: 50,
                bootstrap_peers: vec![],
            },
            rpc: RpcConfig {
                enabled: true,
                listen_addr: "127.0.0.1:8545".parse().unwrap(),
                cors_origins: vec!["*".into()],
            },
            consensus: consensus::ConsensusConfig::default(),
            storage: StorageConfig {
                cache_size_mb: 512,
                max_open_files: 1024,
                pruning: "pruned".into(),
                keep_blocks: 10000,
            },
            mempool: blockchain_core::PoolConfig::default(),
            validator: None,
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
