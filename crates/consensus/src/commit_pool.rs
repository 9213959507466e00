// consensus/src/commit_pool.rs
//!
//! BFT commit pool: collects per-validator BLS single commits, gossips them
//! to peers, and assembles the BLS aggregate certificate embedded in the
//! next block header once enough weight has signed off on a height.

use blockchain_core::bft::{
    certificate_signing_bytes, AggregateCommit, BftHeights, BftParameters, BftParametersHistory,
    SingleCommit,
};
use blockchain_core::{BlockNumber, COMMIT_RANGE_STORED};
use blockchain_crypto::{Address, BlsAggregateSignature, BlsKeyPair, BlsPublicKey, BlsSignature, Hash};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, thiserror::Error)]
pub enum CommitPoolError {
    #[error("duplicate commit for validator {0:?} at height {1}")]
    Duplicate(Address, BlockNumber),
    #[error("validator {0:?} is not part of the active BFT parameters at height {1}")]
    UnknownValidator(Address, BlockNumber),
    #[error("invalid BLS signature from validator {0:?}")]
    InvalidSignature(Address),
    #[error("no commits available to build an aggregate certificate")]
    NoCommits,
    #[error("insufficient weight for aggregate commit: {weight} < threshold {threshold}")]
    InsufficientWeight { weight: u64, threshold: u64 },
    #[error("BLS aggregation failed: {0}")]
    AggregationFailed(String),
    #[error("commit at height {height} is at or below the removal floor {floor}")]
    BelowRemovalHeight { height: BlockNumber, floor: BlockNumber },
    #[error("no locally known block matches the commit at height {height}")]
    UnknownBlock { height: BlockNumber },
    #[error("commit at height {height} falls outside the retained validity window")]
    OutOfRange { height: BlockNumber },
}

/// Collects [`SingleCommit`]s per height and produces [`AggregateCommit`]s
/// once a quorum of BFT weight has signed.
///
/// Commits are tracked in two maps mirroring the gossip lifecycle: freshly
/// received commits start in `non_gossiped` and move to `gossiped` once
/// [`CommitPool::job`] runs, at which point the caller is expected to
/// broadcast them to peers.
pub struct CommitPool {
    network_id: Vec<u8>,
    non_gossiped: BTreeMap<BlockNumber, HashMap<Address, SingleCommit>>,
    gossiped: BTreeMap<BlockNumber, HashMap<Address, SingleCommit>>,
}

impl CommitPool {
    pub fn new(network_id: Vec<u8>) -> Self {
        Self {
            network_id,
            non_gossiped: BTreeMap::new(),
            gossiped: BTreeMap::new(),
        }
    }

    /// Build and sign a single commit for `height`/`block_id` on behalf of a
    /// local validator.
    pub fn create_single_commit(
        &self,
        block_id: Hash,
        height: BlockNumber,
        timestamp: u64,
        state_root: Hash,
        validators_hash: Hash,
        validator_address: Address,
        keypair: &BlsKeyPair,
    ) -> SingleCommit {
        let mut commit = SingleCommit {
            block_id,
            height,
            timestamp,
            validator_address,
            state_root,
            validators_hash,
            signature: Vec::new(),
        };
        let signature = keypair.sign(&commit.signing_bytes(&self.network_id));
        commit.signature = signature.to_bytes().to_vec();
        commit
    }

    /// Validate a commit against the pool/chain state and BFT parameters
    /// active at its height, then store it.
    ///
    /// `local_block_id_at_height` is the id of the block this node has
    /// locally at `commit.height`, if any — the caller looks this up from
    /// its own chain so the pool itself stays chain-agnostic.
    pub async fn add_commit(
        &mut self,
        commit: SingleCommit,
        history: &BftParametersHistory,
        heights: &BftHeights,
        local_block_id_at_height: Option<Hash>,
        gossiped: bool,
    ) -> Result<(), CommitPoolError> {
        self.validate_commit(&commit, history, heights, local_block_id_at_height).await?;

        let map = if gossiped { &mut self.gossiped } else { &mut self.non_gossiped };
        map.entry(commit.height).or_default().insert(commit.validator_address, commit);
        Ok(())
    }

    /// Checks, in order: the commit isn't below the removal floor (I5), it
    /// matches a block this node actually has at that height, it isn't
    /// already stored, it falls within the retained validity window, its
    /// validator is active in the BFT parameters for its height, and its
    /// BLS signature verifies. The signature check is CPU-bound, so it runs
    /// on the blocking thread pool rather than the async task.
    pub async fn validate_commit(
        &self,
        commit: &SingleCommit,
        history: &BftParametersHistory,
        heights: &BftHeights,
        local_block_id_at_height: Option<Hash>,
    ) -> Result<(), CommitPoolError> {
        if commit.height <= heights.max_removal_height {
            return Err(CommitPoolError::BelowRemovalHeight {
                height: commit.height,
                floor: heights.max_removal_height,
            });
        }

        if local_block_id_at_height != Some(commit.block_id) {
            return Err(CommitPoolError::UnknownBlock { height: commit.height });
        }

        if self.contains(commit.height, &commit.validator_address) {
            return Err(CommitPoolError::Duplicate(commit.validator_address, commit.height));
        }

        let range = COMMIT_RANGE_STORED as u64;
        let window_floor = heights.max_height_precommitted.saturating_sub(range.saturating_sub(1));
        let within_window = commit.height >= window_floor && commit.height <= heights.max_height_precommitted;
        if !within_window && history.at(commit.height + 1).is_none() {
            return Err(CommitPoolError::OutOfRange { height: commit.height });
        }

        let params = history
            .at(commit.height)
            .ok_or(CommitPoolError::UnknownValidator(commit.validator_address, commit.height))?;
        let validator = params
            .validator(&commit.validator_address)
            .ok_or(CommitPoolError::UnknownValidator(commit.validator_address, commit.height))?;

        let public_key = BlsPublicKey::from_bytes(&validator.bls_public_key)
            .map_err(|_| CommitPoolError::InvalidSignature(commit.validator_address))?;
        let signature = BlsSignature::from_bytes(&commit.signature)
            .map_err(|_| CommitPoolError::InvalidSignature(commit.validator_address))?;

        let message = commit.signing_bytes(&self.network_id);
        let verified = tokio::task::spawn_blocking(move || public_key.verify(&message, &signature))
            .await
            .unwrap_or(false);
        if !verified {
            return Err(CommitPoolError::InvalidSignature(commit.validator_address));
        }
        Ok(())
    }

    /// Whether a commit from `validator` at `height` is already stored in
    /// either pool.
    fn contains(&self, height: BlockNumber, validator: &Address) -> bool {
        self.non_gossiped.get(&height).is_some_and(|m| m.contains_key(validator))
            || self.gossiped.get(&height).is_some_and(|m| m.contains_key(validator))
    }

    /// All commits (gossiped and not) known for `height`.
    pub fn get_commits_by_height(&self, height: BlockNumber) -> Vec<SingleCommit> {
        let mut out = Vec::new();
        if let Some(by_validator) = self.non_gossiped.get(&height) {
            out.extend(by_validator.values().cloned());
        }
        if let Some(by_validator) = self.gossiped.get(&height) {
            out.extend(by_validator.values().cloned());
        }
        out
    }

    /// Scan descending from `min(nextParamChange - 1, maxHeightPrecommitted)`
    /// down to `maxHeightCertified + 1` for the first height whose weighted
    /// commits reach the threshold active there, and assemble its aggregate
    /// certificate. If no height in range reaches threshold, returns the
    /// empty aggregate `{height: maxHeightCertified, bits: [], sig: []}`
    /// rather than `None`, satisfying the invariant that an aggregate commit
    /// is always produced (I6).
    pub fn select_aggregate_commit(
        &self,
        history: &BftParametersHistory,
        heights: &BftHeights,
    ) -> Result<AggregateCommit, CommitPoolError> {
        let upper = match history.next_param_change_after(heights.max_height_certified) {
            Some(next) => next.saturating_sub(1).min(heights.max_height_precommitted),
            None => heights.max_height_precommitted,
        };

        if upper > heights.max_height_certified {
            for height in (heights.max_height_certified + 1..=upper).rev() {
                let params = match history.at(height) {
                    Some(p) => p,
                    None => continue,
                };
                let commits = self.get_commits_by_height(height);
                let weight: u64 = commits
                    .iter()
                    .filter_map(|c| params.validator(&c.validator_address))
                    .map(|v| v.bft_weight)
                    .sum();

                if weight >= params.certificate_threshold {
                    return self.build_aggregate(height, &commits, params);
                }
            }
        }

        Ok(AggregateCommit {
            height: heights.max_height_certified,
            timestamp: 0,
            aggregation_bits: Vec::new(),
            certificate_signature: Vec::new(),
        })
    }

    fn build_aggregate(
        &self,
        height: BlockNumber,
        commits: &[SingleCommit],
        params: &BftParameters,
    ) -> Result<AggregateCommit, CommitPoolError> {
        if commits.is_empty() {
            return Err(CommitPoolError::NoCommits);
        }

        let mut bits = vec![0u8; params.validators.len().div_ceil(8)];
        let mut signatures = Vec::with_capacity(commits.len());
        let mut timestamp = 0;

        for commit in commits {
            if let Some(index) = params
                .validators
                .iter()
                .position(|v| v.address == commit.validator_address)
            {
                bits[index / 8] |= 1 << (index % 8);
                let signature = BlsSignature::from_bytes(&commit.signature)
                    .map_err(|_| CommitPoolError::InvalidSignature(commit.validator_address))?;
                signatures.push(signature);
                timestamp = commit.timestamp;
            }
        }

        let refs: Vec<&BlsSignature> = signatures.iter().collect();
        let aggregate_signature = BlsAggregateSignature::aggregate(&refs)
            .map_err(|e| CommitPoolError::AggregationFailed(e.to_string()))?;

        Ok(AggregateCommit {
            height,
            timestamp,
            aggregation_bits: bits,
            certificate_signature: aggregate_signature.to_bytes().to_vec(),
        })
    }

    /// Verify an [`AggregateCommit`] embedded in a block header: enough
    /// weight signed, and the aggregate BLS signature checks out.
    pub fn verify_aggregate_commit(
        &self,
        commit: &AggregateCommit,
        params: &BftParameters,
        block_id: &Hash,
        state_root: &Hash,
        validators_hash: &Hash,
    ) -> bool {
        let signer_indices: Vec<usize> = (0..params.validators.len())
            .filter(|&i| commit.is_signer(i))
            .collect();

        let weight: u64 = signer_indices
            .iter()
            .map(|&i| params.validators[i].bft_weight)
            .sum();
        if weight < params.certificate_threshold {
            return false;
        }

        let public_keys: Vec<BlsPublicKey> = signer_indices
            .iter()
            .filter_map(|&i| BlsPublicKey::from_bytes(&params.validators[i].bls_public_key).ok())
            .collect();
        if public_keys.len() != signer_indices.len() {
            return false;
        }

        let signature = match BlsSignature::from_bytes(&commit.certificate_signature) {
            Ok(s) => s,
            Err(_) => return false,
        };

        let message = certificate_signing_bytes(
            &self.network_id,
            block_id,
            commit.height,
            commit.timestamp,
            state_root,
            validators_hash,
        );

        BlsAggregateSignature::fast_aggregate_verify(
            &signature,
            &message,
            &public_keys.iter().collect::<Vec<_>>(),
        )
    }

    /// Periodic maintenance: promote non-gossiped commits to the gossiped
    /// set (the caller is responsible for actually broadcasting them), and
    /// drop bookkeeping for heights at or below `floor_height`.
    pub fn job(&mut self, floor_height: BlockNumber) -> Vec<SingleCommit> {
        self.non_gossiped.retain(|&h, _| h > floor_height);
        self.gossiped.retain(|&h, _| h > floor_height);

        let heights: Vec<BlockNumber> = self.non_gossiped.keys().copied().collect();
        let mut to_broadcast = Vec::new();
        for height in heights {
            if let Some(by_validator) = self.non_gossiped.remove(&height) {
                to_broadcast.extend(by_validator.values().cloned());
                self.gossiped.entry(height).or_default().extend(by_validator);
            }
        }
        to_broadcast
    }

    /// Convenience accessor mirroring the block processor's retention depth.
    pub fn retention_depth() -> usize {
        COMMIT_RANGE_STORED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockchain_core::bft::ValidatorBftInfo;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[0] = byte;
        Address::new(bytes)
    }

    fn dummy_public_key() -> blockchain_crypto::PublicKey {
        blockchain_crypto::PublicKey::new(blockchain_crypto::SignatureScheme::Ed25519, vec![0u8; 32])
    }

    fn params_with(keypairs: &[(Address, &BlsKeyPair, u64)], threshold: u64) -> BftParameters {
        BftParameters {
            from_height: 0,
            validators: keypairs
                .iter()
                .map(|(a, kp, w)| {
                    ValidatorBftInfo::new(*a, dummy_public_key(), kp.public_key().to_bytes().to_vec(), *w)
                })
                .collect(),
            certificate_threshold: threshold,
        }
    }

    #[tokio::test]
    async fn add_and_fetch_commits() {
        let pool_net = b"testnet".to_vec();
        let mut pool = CommitPool::new(pool_net);
        let kp = BlsKeyPair::generate().unwrap();
        let validator = addr(1);
        let params = params_with(&[(validator, &kp, 10)], 10);
        let mut history = BftParametersHistory::new();
        history.insert(params);
        let mut heights = BftHeights::new();
        heights.max_height_precommitted = 5;

        let commit = pool.create_single_commit(
            Hash::zero(),
            5,
            1000,
            Hash::zero(),
            Hash::zero(),
            validator,
            &kp,
        );
        pool.add_commit(commit, &history, &heights, Some(Hash::zero()), false).await.unwrap();

        assert_eq!(pool.get_commits_by_height(5).len(), 1);
    }

    #[tokio::test]
    async fn validate_commit_rejects_block_mismatch() {
        let mut pool = CommitPool::new(b"testnet".to_vec());
        let kp = BlsKeyPair::generate().unwrap();
        let validator = addr(1);
        let params = params_with(&[(validator, &kp, 10)], 10);
        let mut history = BftParametersHistory::new();
        history.insert(params);
        let mut heights = BftHeights::new();
        heights.max_height_precommitted = 5;

        let commit = pool.create_single_commit(Hash::zero(), 5, 1000, Hash::zero(), Hash::zero(), validator, &kp);

        let other_block = blockchain_crypto::hash::Hashable::hash(&b"other"[..]);
        assert!(matches!(
            pool.add_commit(commit.clone(), &history, &heights, Some(other_block), false).await,
            Err(CommitPoolError::UnknownBlock { height: 5 })
        ));
        assert!(matches!(
            pool.add_commit(commit, &history, &heights, None, false).await,
            Err(CommitPoolError::UnknownBlock { height: 5 })
        ));
    }

    #[tokio::test]
    async fn validate_commit_rejects_at_removal_floor() {
        let mut pool = CommitPool::new(b"testnet".to_vec());
        let kp = BlsKeyPair::generate().unwrap();
        let validator = addr(1);
        let params = params_with(&[(validator, &kp, 10)], 10);
        let mut history = BftParametersHistory::new();
        history.insert(params);
        let mut heights = BftHeights::new();
        heights.max_height_precommitted = 10;
        heights.max_removal_height = 5;

        // At the floor: rejected.
        let at_floor = pool.create_single_commit(Hash::zero(), 5, 1000, Hash::zero(), Hash::zero(), validator, &kp);
        assert!(matches!(
            pool.add_commit(at_floor, &history, &heights, Some(Hash::zero()), false).await,
            Err(CommitPoolError::BelowRemovalHeight { height: 5, floor: 5 })
        ));

        // One past the floor: accepted if everything else holds.
        let past_floor = pool.create_single_commit(Hash::zero(), 6, 1000, Hash::zero(), Hash::zero(), validator, &kp);
        pool.add_commit(past_floor, &history, &heights, Some(Hash::zero()), false).await.unwrap();
    }

    #[tokio::test]
    async fn select_aggregate_commit_requires_threshold() {
        let mut pool = CommitPool::new(b"testnet".to_vec());
        let kp1 = BlsKeyPair::generate().unwrap();
        let kp2 = BlsKeyPair::generate().unwrap();
        let v1 = addr(1);
        let v2 = addr(2);
        let params = params_with(&[(v1, &kp1, 5), (v2, &kp2, 5)], 10);
        let mut history = BftParametersHistory::new();
        history.insert(params.clone());

        let mut heights = BftHeights::new();
        heights.max_height_precommitted = 5;

        let c1 = pool.create_single_commit(Hash::zero(), 5, 1000, Hash::zero(), Hash::zero(), v1, &kp1);
        pool.add_commit(c1, &history, &heights, Some(Hash::zero()), false).await.unwrap();
        let empty = pool.select_aggregate_commit(&history, &heights).unwrap();
        assert_eq!(empty.height, 0);
        assert!(empty.aggregation_bits.is_empty());

        let c2 = pool.create_single_commit(Hash::zero(), 5, 1000, Hash::zero(), Hash::zero(), v2, &kp2);
        pool.add_commit(c2, &history, &heights, Some(Hash::zero()), false).await.unwrap();

        let aggregate = pool.select_aggregate_commit(&history, &heights).unwrap();
        assert_eq!(aggregate.height, 5);
        assert!(pool.verify_aggregate_commit(&aggregate, &params, &Hash::zero(), &Hash::zero(), &Hash::zero()));
    }

    #[tokio::test]
    async fn select_aggregate_commit_does_not_cross_param_change() {
        let mut pool = CommitPool::new(b"testnet".to_vec());
        let kp = BlsKeyPair::generate().unwrap();
        let v = addr(1);
        let params = params_with(&[(v, &kp, 10)], 10);
        let mut history = BftParametersHistory::new();
        history.insert(params.clone());
        history.insert(BftParameters {
            from_height: 6,
            ..params.clone()
        });

        let mut heights = BftHeights::new();
        heights.max_height_precommitted = 8;

        // A commit at height 7 is beyond the param-change boundary at 6, so
        // the scan (bounded by next_param_change - 1 = 5) must never see it
        // and should fall back to the empty aggregate.
        let commit = pool.create_single_commit(Hash::zero(), 7, 0, Hash::zero(), Hash::zero(), v, &kp);
        pool.add_commit(commit, &history, &heights, Some(Hash::zero()), false).await.unwrap();

        let aggregate = pool.select_aggregate_commit(&history, &heights).unwrap();
        assert_eq!(aggregate.height, 0);
        assert!(aggregate.aggregation_bits.is_empty());
    }

    #[tokio::test]
    async fn rejects_unknown_validator() {
        let mut pool = CommitPool::new(b"testnet".to_vec());
        let kp1 = BlsKeyPair::generate().unwrap();
        let known = addr(1);
        let params = params_with(&[(known, &kp1, 10)], 10);
        let mut history = BftParametersHistory::new();
        history.insert(params);
        let mut heights = BftHeights::new();
        heights.max_height_precommitted = 1;

        let impostor_kp = BlsKeyPair::generate().unwrap();
        let impostor = addr(2);
        let commit = pool.create_single_commit(Hash::zero(), 1, 0, Hash::zero(), Hash::zero(), impostor, &impostor_kp);

        assert!(matches!(
            pool.add_commit(commit, &history, &heights, Some(Hash::zero()), false).await,
            Err(CommitPoolError::UnknownValidator(_, _))
        ));
    }

    #[tokio::test]
    async fn rejects_duplicate_commit() {
        let mut pool = CommitPool::new(b"testnet".to_vec());
        let kp = BlsKeyPair::generate().unwrap();
        let v = addr(1);
        let params = params_with(&[(v, &kp, 10)], 10);
        let mut history = BftParametersHistory::new();
        history.insert(params);
        let heights = BftHeights { max_height_precommitted: 5, ..BftHeights::new() };

        let commit = pool.create_single_commit(Hash::zero(), 5, 0, Hash::zero(), Hash::zero(), v, &kp);
        pool.add_commit(commit.clone(), &history, &heights, Some(Hash::zero()), false).await.unwrap();
        assert!(matches!(
            pool.add_commit(commit, &history, &heights, Some(Hash::zero()), false).await,
            Err(CommitPoolError::Duplicate(_, _))
        ));
    }

    #[tokio::test]
    async fn rejects_commit_outside_window_with_no_future_param_change() {
        let mut pool = CommitPool::new(b"testnet".to_vec());
        let kp = BlsKeyPair::generate().unwrap();
        let v = addr(1);
        // Validators only registered from height 100 onward, so nothing
        // covers height 11 (commit.height + 1) and the commit can't be
        // excused as "ahead of an upcoming parameter change".
        let params = BftParameters { from_height: 100, ..params_with(&[(v, &kp, 10)], 10) };
        let mut history = BftParametersHistory::new();
        history.insert(params);
        let heights = BftHeights { max_height_precommitted: 200, ..BftHeights::new() };

        let commit = pool.create_single_commit(Hash::zero(), 10, 0, Hash::zero(), Hash::zero(), v, &kp);
        assert!(matches!(
            pool.add_commit(commit, &history, &heights, Some(Hash::zero()), false).await,
            Err(CommitPoolError::OutOfRange { height: 10 })
        ));
    }

    #[tokio::test]
    async fn job_promotes_and_prunes() {
        let mut pool = CommitPool::new(b"testnet".to_vec());
        let kp = BlsKeyPair::generate().unwrap();
        let v = addr(1);
        let params = params_with(&[(v, &kp, 10)], 10);
        let mut history = BftParametersHistory::new();
        history.insert(params);
        let mut heights = BftHeights::new();
        heights.max_height_precommitted = 5;

        let commit = pool.create_single_commit(Hash::zero(), 5, 0, Hash::zero(), Hash::zero(), v, &kp);
        pool.add_commit(commit, &history, &heights, Some(Hash::zero()), false).await.unwrap();

        let promoted = pool.job(0);
        assert_eq!(promoted.len(), 1);
        assert!(pool.non_gossiped.is_empty());
        assert_eq!(pool.get_commits_by_height(5).len(), 1);

        pool.job(5);
        assert!(pool.get_commits_by_height(5).is_empty());
    }
}
