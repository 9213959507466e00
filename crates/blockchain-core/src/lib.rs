// blockchain-core/src/lib.rs

//! Core blockchain data structures and logic
//!
//! This crate provides:
//! - Block structure
//! - Transaction types
//! - Blockchain state management
//! - Chain validation logic

pub mod bft;
pub mod block;
pub mod chain;
pub mod fork;
pub mod mempool;
pub mod metrics;
pub mod state;
pub mod transaction;
pub mod types;

pub use bft::{
    AggregateCommit, BftHeights, BftParameters, BftParametersHistory, SingleCommit,
    ValidatorBftInfo,
};
pub use block::{Block, BlockHeader, BLOCK_HEADER_VERSION};
pub use chain::{
    BlockEvent, BlockProcessor, Blockchain, ExecuteOptions, ReceiveOutcome, COMMIT_RANGE_STORED,
};
pub use fork::{classify, ForkStatus};
pub use mempool::{PoolConfig, PoolMetrics, TransactionPool};
pub use metrics::ChainMetrics;
pub use state::{Account, WorldState};
pub use transaction::{Transaction, TransactionReceipt, TransactionType};
pub use types::*;

use blockchain_crypto::{Address, Hash};

/// Result type for blockchain operations
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// Errors that can occur in blockchain operations
#[derive(Debug, thiserror::Error)]
pub enum BlockchainError {
    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Nonce mismatch")]
    NonceMismatch,

    #[error("Block not found: {0}")]
    BlockNotFound(Hash),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(Hash),

    #[error("Cryptographic error: {0}")]
    CryptoError(#[from] blockchain_crypto::CryptoError),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(Hash),

    #[error("Transaction pool full")]
    PoolFull,

    #[error("Fork detected: {0}")]
    ForkDetected(String),

    #[error("Reorg too deep: {depth} blocks")]
    ReorgTooDeep { depth: u64 },

    #[error("Gas limit exceeded")]
    GasLimitExceeded,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("cannot delete block at or below finalized height {height}")]
    BelowFinalizedHeight { height: u64 },

    #[error("state store I/O error: {0}")]
    StorageError(String),
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_basic_imports() {
        // Smoke test to ensure all modules compile
    }
}
