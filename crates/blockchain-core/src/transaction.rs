// blockchain-core/src/transaction.rs

use crate::{types::*, BlockchainError, BlockchainResult};
use blockchain_crypto::{hash::Hashable, Address, Hash, PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// Transaction types supported by the protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransactionType {
    /// Standard token transfer
    Transfer {
        to: Address,
        amount: Amount,
    },
    /// Validator staking
    Stake {
        amount: StakeAmount,
    },
    /// Unstake validator tokens
    Unstake {
        amount: StakeAmount,
    },
}

/// Complete transaction structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender's address
    pub from: Address,
    /// Transaction nonce (prevents replay attacks)
    pub nonce: Nonce,
    /// Type of transaction
    pub tx_type: TransactionType,
    /// Gas price willing to pay
    pub gas_price: GasPrice,
    /// Maximum gas to consume
    pub gas_limit: Gas,
    /// Transaction timestamp
    pub timestamp: Timestamp,
    /// Sender's public key, carried alongside the signature so a verifier
    /// never needs a separate key registry to check it against `from`.
    pub public_key: Option<PublicKey>,
    /// Digital signature
    pub signature: Option<Signature>,
}

impl Transaction {
    /// Create a new unsigned transaction
    pub fn new(
        from: Address,
        nonce: Nonce,
        tx_type: TransactionType,
        gas_price: GasPrice,
        gas_limit: Gas,
    ) -> Self {
        Self {
            from,
            nonce,
            tx_type,
            gas_price,
            gas_limit,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_secs(),
            public_key: None,
            signature: None,
        }
    }

    /// Sign the transaction, embedding the signer's public key.
    pub fn sign(&mut self, keypair: &blockchain_crypto::KeyPair) -> BlockchainResult<()> {
        self.public_key = Some(keypair.public_key().clone());
        let hash = self.hash_for_signing();
        let signature = keypair.sign(hash.as_bytes())?;
        self.signature = Some(signature);
        Ok(())
    }

    /// Verify transaction signature against an externally supplied public key.
    pub fn verify_signature(&self, public_key: &PublicKey) -> BlockchainResult<bool> {
        let signature = self.signature.as_ref()
            .ok_or(BlockchainError::InvalidTransaction("Missing signature".into()))?;

        let hash = self.hash_for_signing();
        Ok(public_key.verify(hash.as_bytes(), signature)?)
    }

    /// Verify that the embedded public key belongs to `from` and that it
    /// actually signed this transaction. This is what block processing
    /// calls; `verify_signature` above stays available for callers that
    /// already hold the sender's key from elsewhere (e.g. a wallet).
    pub fn verify(&self) -> BlockchainResult<()> {
        let public_key = self.public_key.as_ref()
            .ok_or(BlockchainError::InvalidTransaction("Missing public key".into()))?;

        if public_key.to_address() != self.from {
            return Err(BlockchainError::InvalidTransaction(
                "Public key does not match sender address".into(),
            ));
        }

        if !self.verify_signature(public_key)? {
            return Err(BlockchainError::InvalidSignature);
        }

        Ok(())
    }

    /// Calculate transaction hash
    pub fn hash(&self) -> Hash {
        let bytes = bincode::serialize(self).unwrap();
        bytes.hash()
    }

    /// Hash used for signing (excludes public key and signature fields so
    /// the signed payload is stable regardless of which key ends up attached)
    fn hash_for_signing(&self) -> Hash {
        let mut tx_copy = self.clone();
        tx_copy.public_key = None;
        tx_copy.signature = None;
        let bytes = bincode::serialize(&tx_copy).unwrap();
        bytes.hash()
    }

    /// Calculate transaction fee
    pub fn calculate_fee(&self, gas_used: Gas) -> Amount {
        Amount::from_u64(gas_used * self.gas_price)
    }

    /// Validate basic transaction properties, including a full cryptographic
    /// check of the signature against the embedded public key.
    pub fn validate_basic(&self) -> BlockchainResult<()> {
        self.verify()?;

        // Check gas limit is reasonable
        if self.gas_limit == 0 {
            return Err(BlockchainError::InvalidTransaction("Gas limit cannot be zero".into()));
        }

        // Check gas price is reasonable
        if self.gas_price == 0 {
            return Err(BlockchainError::InvalidTransaction("Gas price cannot be zero".into()));
        }

        // Validate transaction type specifics
        match &self.tx_type {
            TransactionType::Transfer { amount, .. } => {
                if amount.is_zero() {
                    return Err(BlockchainError::InvalidTransaction("Transfer amount cannot be zero".into()));
                }
            }
            TransactionType::Stake { amount } => {
                if amount.is_zero() {
                    return Err(BlockchainError::InvalidTransaction("Stake amount cannot be zero".into()));
                }
            }
            TransactionType::Unstake { amount } => {
                if amount.is_zero() {
                    return Err(BlockchainError::InvalidTransaction("Unstake amount cannot be zero".into()));
                }
            }
        }

        Ok(())
    }

    /// Get the recipient address (if applicable)
    pub fn recipient(&self) -> Option<Address> {
        match &self.tx_type {
            TransactionType::Transfer { to, .. } => Some(*to),
            _ => None,
        }
    }

    /// Get transaction value (if applicable)
    pub fn value(&self) -> Amount {
        match &self.tx_type {
            TransactionType::Transfer { amount, .. } => amount.clone(),
            TransactionType::Stake { amount } => amount.clone(),
            TransactionType::Unstake { amount } => amount.clone(),
        }
    }
}

/// Transaction receipt after execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// Transaction hash
    pub tx_hash: Hash,
    /// Block number where included
    pub block_number: BlockNumber,
    /// Sender address
    pub from: Address,
    /// Recipient address (if applicable)
    pub to: Option<Address>,
    /// Gas used
    pub gas_used: Gas,
    /// Execution status
    pub status: ExecutionStatus,
    /// Contract address (if deployment)
    pub contract_address: Option<Address>,
    /// Logs generated
    pub logs: Vec<Log>,
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Success,
    Failed,
    Reverted,
}

/// Event log emitted during execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Hash>,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockchain_crypto::{KeyPair, SignatureScheme};

    #[test]
    fn test_transaction_creation() {
        let from = Address::zero();
        let to = Address::zero();
        let tx = Transaction::new(
            from,
            1,
            TransactionType::Transfer {
                to,
                amount: Amount::from_u64(100),
            },
            10,
            21000,
        );
        
        assert_eq!(tx.nonce, 1);
        assert_eq!(tx.gas_limit, 21000);
    }

    #[test]
    fn test_transaction_signing() {
        let keypair = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let from = keypair.public_key().to_address();
        
        let mut tx = Transaction::new(
            from,
            1,
            TransactionType::Transfer {
                to: Address::zero(),
                amount: Amount::from_u64(100),
            },
            10,
            21000,
        );
        
        tx.sign(&keypair).unwrap();
        assert!(tx.signature.is_some());
        assert!(tx.verify_signature(keypair.public_key()).unwrap());
    }

    #[test]
    fn test_transaction_validation() {
        let keypair = KeyPair::generate(SignatureScheme::Ed25519).unwrap();
        let from = keypair.public_key().to_address();
        
        let mut tx = Transaction::new(
            from,
            1,
            TransactionType::Transfer {
                to: Address::zero(),
                amount: Amount::from_u64(100),
            },
            10,
            21000,
        );
        
        // Should fail without signature
        assert!(tx.validate_basic().is_err());
        
        // Should pass with signature
        tx.sign(&keypair).unwrap();
        assert!(tx.validate_basic().is_ok());
    }
}