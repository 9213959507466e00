// consensus/src/lib.rs

//! BFT commit pool and consensus-core tunables.
//!
//! Collects per-validator BLS single commits, aggregates them into
//! threshold-signed certificates, and carries the configuration the rest of
//! the consensus core (fork-choice, block processor, synchronizer) reads its
//! tunables from. The economic incentive layer (staking, rewards, slashing)
//! is out of scope for this crate; only BFT weight and certificate
//! thresholds are tracked, in `blockchain_core::bft`.

pub mod commit_pool;
pub mod poas;

pub use commit_pool::{CommitPool, CommitPoolError};
pub use poas::{calculate_security_metrics, ConsensusConfig, SecurityMetrics};

use blockchain_core::BlockchainError;

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Errors that can occur during consensus operations
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Blockchain error: {0}")]
    BlockchainError(#[from] BlockchainError),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] blockchain_crypto::CryptoError),
}
