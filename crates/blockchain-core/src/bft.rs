// blockchain-core/src/bft.rs
//!
//! BFT parameters and commit/certificate data types shared between the
//! block processor, the commit pool and the synchronizer.

use crate::types::BlockNumber;
use blockchain_crypto::{hash::Hashable, Address, Hash, PublicKey};
use serde::{Deserialize, Serialize};

/// Domain-separation prefix mixed into every certificate signing payload.
pub const CERTIFICATE_DOMAIN_PREFIX: &[u8] = b"LSK_CE_";

/// A single validator's BFT-relevant configuration: its ordered voting
/// weight, the key it signs block headers with, and the raw BLS public key
/// used to verify its commits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorBftInfo {
    pub address: Address,
    /// Public key the validator signs proposed block headers with.
    pub block_sign_public_key: PublicKey,
    /// Serialized (compressed) BLS12-381 public key.
    pub bls_public_key: Vec<u8>,
    pub bft_weight: u64,
}

impl ValidatorBftInfo {
    pub fn new(
        address: Address,
        block_sign_public_key: PublicKey,
        bls_public_key: Vec<u8>,
        bft_weight: u64,
    ) -> Self {
        Self {
            address,
            block_sign_public_key,
            bls_public_key,
            bft_weight,
        }
    }
}

/// BFT parameters in effect from a given height onward. The active validator
/// set and certificate threshold change only at specific heights, so callers
/// keep a small ordered list of these and pick the entry whose `from_height`
/// is the largest one not exceeding the block height in question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BftParameters {
    pub from_height: BlockNumber,
    pub validators: Vec<ValidatorBftInfo>,
    pub certificate_threshold: u64,
}

impl BftParameters {
    pub fn total_weight(&self) -> u64 {
        self.validators.iter().map(|v| v.bft_weight).sum()
    }

    pub fn validator(&self, address: &Address) -> Option<&ValidatorBftInfo> {
        self.validators.iter().find(|v| &v.address == address)
    }

    /// Hash of the active validator set, committed to in a block header's
    /// `validators_hash` field so a change of validators is itself
    /// tamper-evident.
    pub fn validators_hash(&self) -> Hash {
        bincode::serialize(&self.validators)
            .expect("validator list is always serializable")
            .hash()
    }
}

/// A piecewise-constant history of [`BftParameters`], ordered by
/// `from_height` ascending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BftParametersHistory {
    entries: Vec<BftParameters>,
}

impl BftParametersHistory {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Insert or replace the parameters effective from `params.from_height`,
    /// keeping entries sorted by height.
    pub fn insert(&mut self, params: BftParameters) {
        match self.entries.binary_search_by_key(&params.from_height, |p| p.from_height) {
            Ok(idx) => self.entries[idx] = params,
            Err(idx) => self.entries.insert(idx, params),
        }
    }

    /// The parameters in effect at `height`, if any have been registered at
    /// or below it.
    pub fn at(&self, height: BlockNumber) -> Option<&BftParameters> {
        self.entries
            .iter()
            .rev()
            .find(|p| p.from_height <= height)
    }

    /// The height at which the BFT parameters active at `height` next
    /// change, i.e. the smallest registered `from_height` strictly greater
    /// than `height`. `None` if the parameters active at `height` are the
    /// last registered entry.
    pub fn next_param_change_after(&self, height: BlockNumber) -> Option<BlockNumber> {
        self.entries
            .iter()
            .map(|p| p.from_height)
            .find(|&from_height| from_height > height)
    }
}

/// Per-validator high-water marks tracked by the BFT module, plus the
/// chain-level finality markers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BftHeights {
    pub max_height_generated: BlockNumber,
    pub max_height_prevoted: BlockNumber,
    pub max_height_precommitted: BlockNumber,
    pub max_height_certified: BlockNumber,
    /// Highest height with a finalized (irreversible) block.
    pub finalized_height: BlockNumber,
    /// Floor below which validators may be evicted from certificate
    /// aggregation bookkeeping; never decreases.
    pub max_removal_height: BlockNumber,
}

impl BftHeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance `finalized_height` monotonically. Returns `false` if `height`
    /// is not forward progress and was ignored.
    pub fn advance_finalized(&mut self, height: BlockNumber) -> bool {
        if height > self.finalized_height {
            self.finalized_height = height;
            true
        } else {
            false
        }
    }

    pub fn advance_removal_floor(&mut self, height: BlockNumber) {
        if height > self.max_removal_height {
            self.max_removal_height = height;
        }
    }

    /// Advance `max_height_precommitted` monotonically. Returns `false` if
    /// `height` is not forward progress and was ignored.
    pub fn advance_precommitted(&mut self, height: BlockNumber) -> bool {
        if height > self.max_height_precommitted {
            self.max_height_precommitted = height;
            true
        } else {
            false
        }
    }

    /// Advance `max_height_generated` monotonically, recording the highest
    /// height this node has itself proposed a block at. Returns `false` if
    /// `height` is not forward progress and was ignored.
    pub fn advance_generated(&mut self, height: BlockNumber) -> bool {
        if height > self.max_height_generated {
            self.max_height_generated = height;
            true
        } else {
            false
        }
    }
}

/// An individual validator's vote on a block, signed with its BLS key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SingleCommit {
    pub block_id: Hash,
    pub height: BlockNumber,
    pub timestamp: u64,
    pub validator_address: Address,
    pub state_root: Hash,
    pub validators_hash: Hash,
    /// Serialized BLS signature over [`certificate_signing_bytes`].
    pub signature: Vec<u8>,
}

impl SingleCommit {
    /// Bytes signed by the validator's BLS key for this commit, with the
    /// certificate domain separation tag and network identifier mixed in.
    pub fn signing_bytes(&self, network_id: &[u8]) -> Vec<u8> {
        certificate_signing_bytes(
            network_id,
            &self.block_id,
            self.height,
            self.timestamp,
            &self.state_root,
            &self.validators_hash,
        )
    }
}

/// A BLS-aggregated certificate over a quorum of [`SingleCommit`]s at the
/// same height, embedded into the following block's header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateCommit {
    pub height: BlockNumber,
    pub timestamp: u64,
    /// Bitmap of which validators (by index in the active `BftParameters`)
    /// contributed to the aggregate signature.
    pub aggregation_bits: Vec<u8>,
    /// Serialized aggregated BLS signature.
    pub certificate_signature: Vec<u8>,
}

impl AggregateCommit {
    pub fn signer_count(&self) -> u32 {
        self.aggregation_bits
            .iter()
            .map(|byte| byte.count_ones())
            .sum()
    }

    pub fn is_signer(&self, index: usize) -> bool {
        let byte_idx = index / 8;
        let bit_idx = index % 8;
        self.aggregation_bits
            .get(byte_idx)
            .map(|b| (b >> bit_idx) & 1 == 1)
            .unwrap_or(false)
    }
}

/// Build the canonical byte string signed/verified for a certificate over
/// `(block_id, height, timestamp, state_root, validators_hash)`, with the
/// certificate domain tag and network id mixed in as a prefix.
pub fn certificate_signing_bytes(
    network_id: &[u8],
    block_id: &Hash,
    height: BlockNumber,
    timestamp: u64,
    state_root: &Hash,
    validators_hash: &Hash,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(
        CERTIFICATE_DOMAIN_PREFIX.len() + network_id.len() + 32 + 8 + 8 + 32 + 32,
    );
    buf.extend_from_slice(CERTIFICATE_DOMAIN_PREFIX);
    buf.extend_from_slice(network_id);
    buf.extend_from_slice(block_id.as_bytes());
    buf.extend_from_slice(&height.to_be_bytes());
    buf.extend_from_slice(&timestamp.to_be_bytes());
    buf.extend_from_slice(state_root.as_bytes());
    buf.extend_from_slice(validators_hash.as_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[0] = byte;
        Address::new(bytes)
    }

    fn dummy_public_key() -> PublicKey {
        PublicKey::new(blockchain_crypto::SignatureScheme::Ed25519, vec![0u8; 32])
    }

    #[test]
    fn bft_parameters_history_picks_latest_applicable() {
        let mut history = BftParametersHistory::new();
        history.insert(BftParameters {
            from_height: 0,
            validators: vec![ValidatorBftInfo::new(addr(1), dummy_public_key(), vec![1, 2, 3], 1)],
            certificate_threshold: 1,
        });
        history.insert(BftParameters {
            from_height: 100,
            validators: vec![ValidatorBftInfo::new(addr(2), dummy_public_key(), vec![4, 5, 6], 2)],
            certificate_threshold: 2,
        });

        assert_eq!(history.at(0).unwrap().certificate_threshold, 1);
        assert_eq!(history.at(99).unwrap().certificate_threshold, 1);
        assert_eq!(history.at(100).unwrap().certificate_threshold, 2);
        assert_eq!(history.at(1000).unwrap().certificate_threshold, 2);
    }

    #[test]
    fn finalized_height_only_advances_forward() {
        let mut heights = BftHeights::new();
        assert!(heights.advance_finalized(10));
        assert!(!heights.advance_finalized(5));
        assert_eq!(heights.finalized_height, 10);
    }

    #[test]
    fn generated_height_only_advances_forward() {
        let mut heights = BftHeights::new();
        assert!(heights.advance_generated(7));
        assert!(!heights.advance_generated(3));
        assert_eq!(heights.max_height_generated, 7);
    }

    #[test]
    fn validators_hash_changes_with_the_validator_set() {
        let a = BftParameters {
            from_height: 0,
            validators: vec![ValidatorBftInfo::new(addr(1), dummy_public_key(), vec![1, 2, 3], 1)],
            certificate_threshold: 1,
        };
        let b = BftParameters {
            validators: vec![ValidatorBftInfo::new(addr(2), dummy_public_key(), vec![4, 5, 6], 1)],
            ..a.clone()
        };
        assert_eq!(a.validators_hash(), a.validators_hash());
        assert_ne!(a.validators_hash(), b.validators_hash());
    }

    #[test]
    fn aggregation_bits_report_signer_count() {
        let commit = AggregateCommit {
            height: 1,
            timestamp: 0,
            aggregation_bits: vec![0b0000_0101],
            certificate_signature: vec![],
        };
        assert_eq!(commit.signer_count(), 2);
        assert!(commit.is_signer(0));
        assert!(!commit.is_signer(1));
        assert!(commit.is_signer(2));
    }
}
