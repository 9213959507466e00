// consensus/src/poas.rs
//!
//! Consensus-wide tunables and security-observability metrics.
//!
//! The teacher's original `PoASConsensus` engine (proposer selection,
//! stake-weighted validator registry, slashing, epoch transitions) is an
//! economic incentive layer outside this core's scope: the core tracks BFT
//! weights and certificate thresholds (`blockchain_core::bft`), not staking
//! or rewards. What remains here is the config struct the rest of the
//! consensus core reads its tunables from, and the Nakamoto/Gini security
//! metrics, which are cheap observability the teacher already computed and
//! nothing here excludes.

use serde::{Deserialize, Serialize};

/// Tunables for the BFT consensus core, read by the commit pool, the
/// synchronizer and the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Target time between blocks, in seconds.
    pub block_time: u64,
    /// Default certificate threshold used when registering the genesis
    /// BFT parameters (actual thresholds thereafter come from the stored
    /// parameter history).
    pub certificate_threshold_default: u64,
    /// Depth of the commit-validity window and temp-block/diff retention
    /// (`COMMIT_RANGE_STORED` in `blockchain_core::chain`).
    pub commit_range_stored: u64,
    /// Maximum height window the fast-chain-switch mechanism walks back
    /// before giving up in favor of full block-sync.
    pub two_rounds: u64,
    /// Maximum number of candidate ids probed by `getHighestCommonBlock`.
    pub common_block_probe_limit: usize,
    /// Per-call timeout for peer RPCs used by the synchronizer, in seconds.
    pub rpc_timeout_secs: u64,
    /// Maximum number of blocks returned per `getBlocksFromId` batch.
    pub block_sync_batch_size: usize,
    /// Network identifier mixed into the BLS certificate domain separator.
    pub network_id: Vec<u8>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            block_time: 3,
            certificate_threshold_default: 68,
            commit_range_stored: 50,
            two_rounds: 202,
            common_block_probe_limit: 20,
            rpc_timeout_secs: 5,
            block_sync_batch_size: 100,
            network_id: b"kainotes-mainnet".to_vec(),
        }
    }
}

/// Network security metrics derived from the active BFT weight
/// distribution: how concentrated voting power is, and a rough cost
/// estimate for a weight-based attack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityMetrics {
    /// Minimum number of validators whose combined weight reaches 1/3 of
    /// total weight.
    pub nakamoto_coefficient: usize,
    /// Gini coefficient of the weight distribution (0 = perfectly equal,
    /// 1 = maximally unequal).
    pub gini_coefficient: f64,
    /// Sum of all active validators' BFT weight.
    pub total_weight: u64,
    /// Number of active validators considered.
    pub active_validators: usize,
    /// Weight an attacker would need to control 33% of the total.
    pub attack_cost: u64,
}

/// Compute [`SecurityMetrics`] from the active validator weights.
pub fn calculate_security_metrics(weights: &[u64]) -> SecurityMetrics {
    let total_weight: u64 = weights.iter().sum();

    SecurityMetrics {
        nakamoto_coefficient: nakamoto_coefficient(weights),
        gini_coefficient: gini_coefficient(weights),
        total_weight,
        active_validators: weights.len(),
        attack_cost: total_weight * 33 / 100,
    }
}

/// Minimum number of validators, taken in descending weight order, whose
/// combined weight reaches 1/3 of the total.
fn nakamoto_coefficient(weights: &[u64]) -> usize {
    let mut sorted: Vec<u64> = weights.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    let total: u64 = sorted.iter().sum();
    let threshold = total / 3;

    let mut accumulated = 0u64;
    let mut count = 0;
    for weight in sorted {
        accumulated += weight;
        count += 1;
        if accumulated >= threshold {
            break;
        }
    }
    count
}

/// Gini coefficient of the weight distribution.
fn gini_coefficient(weights: &[u64]) -> f64 {
    if weights.is_empty() {
        return 0.0;
    }

    let mut sorted: Vec<f64> = weights.iter().map(|&w| w as f64).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let n = sorted.len() as f64;
    let sum: f64 = sorted.iter().sum();
    if sum == 0.0 {
        return 0.0;
    }

    let mut numerator = 0.0;
    for (i, weight) in sorted.iter().enumerate() {
        numerator += (2.0 * (i as f64 + 1.0) - n - 1.0) * weight;
    }
    numerator / (n * sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_protocol_tunables() {
        let config = ConsensusConfig::default();
        assert_eq!(config.commit_range_stored, 50);
        assert_eq!(config.two_rounds, 202);
        assert_eq!(config.common_block_probe_limit, 20);
        assert_eq!(config.rpc_timeout_secs, 5);
        assert_eq!(config.block_sync_batch_size, 100);
    }

    #[test]
    fn security_metrics_on_even_distribution() {
        let weights = vec![100u64; 10];
        let metrics = calculate_security_metrics(&weights);
        assert_eq!(metrics.active_validators, 10);
        assert_eq!(metrics.total_weight, 1000);
        assert!(metrics.nakamoto_coefficient > 0);
        assert!(metrics.gini_coefficient >= 0.0 && metrics.gini_coefficient <= 1.0);
        // Evenly distributed weight means low inequality.
        assert!(metrics.gini_coefficient < 0.2);
    }

    #[test]
    fn security_metrics_on_skewed_distribution() {
        let mut weights = vec![1u64; 9];
        weights.push(1000);
        let metrics = calculate_security_metrics(&weights);
        // A single dominant validator controls more than a third alone.
        assert_eq!(metrics.nakamoto_coefficient, 1);
        assert!(metrics.gini_coefficient > 0.5);
    }

    #[test]
    fn empty_weights_do_not_panic() {
        let metrics = calculate_security_metrics(&[]);
        assert_eq!(metrics.active_validators, 0);
        assert_eq!(metrics.total_weight, 0);
        assert_eq!(metrics.gini_coefficient, 0.0);
    }
}
