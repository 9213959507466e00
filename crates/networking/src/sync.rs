// networking/src/sync.rs
//!
//! Block synchronization: catching a node up to its peers' chain tip
//! (Block-Sync Mechanism), switching to a short-lived competing fork without
//! a full resync (Fast-Chain-Switch Mechanism), and the supervisor that
//! picks between them and translates mechanism failures into retry/penalty
//! decisions.

use crate::peer::{PeerId, PeerManager};
use blockchain_core::{current_timestamp, Block, BlockNumber, BlockProcessor, ExecuteOptions};
use blockchain_crypto::Hash;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Blocks requested per `GetBlocksFromId` round-trip.
pub const BLOCK_SYNC_BATCH_SIZE: usize = 100;
/// Maximum number of candidate ids sent in a `GetHighestCommonBlock` probe.
pub const COMMON_BLOCK_PROBE_LIMIT: usize = 20;
/// Window (in blocks) within which a competing fork is handled by the
/// fast-chain-switch mechanism instead of a full block sync.
pub const TWO_ROUNDS: u64 = 202;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Idle,
    Syncing { current: BlockNumber, target: BlockNumber },
    Complete,
}

#[derive(Debug, Clone, Copy)]
pub enum SyncStrategy {
    FastSync,
    FullSync,
}

/// Errors a sync mechanism can raise; the supervisor translates each variant
/// into a concrete recovery action.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Transient failure (e.g. a timed-out request): retry the same
    /// mechanism without penalizing anyone.
    #[error("sync mechanism must restart: {0}")]
    Restart(String),
    /// A specific peer misbehaved badly enough that the whole job must
    /// restart after penalizing it.
    #[error("penalizing peer {peer:?} and restarting: {reason}")]
    ApplyPenaltyAndRestart { peer: PeerId, reason: String },
    /// Unrecoverable: give up on this sync attempt entirely.
    #[error("aborting sync: {reason}")]
    Abort { reason: String },
}

/// Reputation points deducted from a peer for a penalizable sync failure,
/// reusing the ban threshold already enforced by [`PeerManager`].
pub const SYNC_PENALTY_POINTS: i32 = 100;

/// Abstraction over the request/response RPCs a sync mechanism needs from a
/// specific peer, so the mechanisms can be exercised without a live P2P
/// stack.
#[async_trait::async_trait]
pub trait PeerClient: Send + Sync {
    async fn get_last_block(&self, peer: PeerId) -> Result<Block, SyncError>;
    async fn get_blocks_from_id(
        &self,
        peer: PeerId,
        block_id: Hash,
        max_blocks: usize,
    ) -> Result<Vec<Block>, SyncError>;
    async fn get_highest_common_block(
        &self,
        peer: PeerId,
        block_ids: Vec<Hash>,
    ) -> Result<Option<Hash>, SyncError>;
}

/// Build a geometrically-spaced list of local block ids (most recent first,
/// capped at [`COMMON_BLOCK_PROBE_LIMIT`]) used to probe a peer for the
/// highest block both chains share.
pub fn build_probe_ids(processor: &BlockProcessor) -> Vec<Hash> {
    let tip = processor.height();
    let mut heights = Vec::new();
    let mut height = tip;
    let mut step = 1u64;

    loop {
        heights.push(height);
        if height == 0 || heights.len() >= COMMON_BLOCK_PROBE_LIMIT {
            break;
        }
        step = step.saturating_mul(2);
        height = height.saturating_sub(step);
    }

    heights
        .into_iter()
        .filter_map(|h| processor.chain().get_block_by_number(h).map(|b| b.hash()))
        .collect()
}

/// Catches the local chain up to a peer's tip: finds the highest shared
/// block, reverts any local blocks above it, then fetches and applies the
/// peer's chain in batches.
pub struct BlockSyncMechanism<C: PeerClient> {
    client: Arc<C>,
}

impl<C: PeerClient> BlockSyncMechanism<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    pub async fn run(
        &self,
        processor: &mut BlockProcessor,
        peer: PeerId,
        stop: &AtomicBool,
    ) -> Result<(), SyncError> {
        let peer_tip = self.client.get_last_block(peer).await?;
        if peer_tip.number() <= processor.height() {
            return Ok(());
        }

        let probe_ids = build_probe_ids(processor);
        let common = self
            .client
            .get_highest_common_block(peer, probe_ids)
            .await?
            .ok_or_else(|| SyncError::Abort {
                reason: "no common block found with peer".into(),
            })?;

        while processor.chain().head_block().hash() != common {
            if processor.height() == 0 {
                return Err(SyncError::Abort {
                    reason: "reverted to genesis without reaching common block".into(),
                });
            }
            processor.delete_last_block(true).map_err(|e| SyncError::Abort {
                reason: format!("failed reverting local chain: {}", e),
            })?;
        }

        let mut last_id = common;
        loop {
            if stop.load(Ordering::SeqCst) {
                return Err(SyncError::Abort { reason: "node is stopping".into() });
            }

            let batch = self
                .client
                .get_blocks_from_id(peer, last_id, BLOCK_SYNC_BATCH_SIZE)
                .await?;
            if batch.is_empty() {
                break;
            }

            let batch_len = batch.len();
            for block in &batch {
                processor
                    .execute(block.clone(), current_timestamp(), ExecuteOptions::default())
                    .map_err(|e| SyncError::ApplyPenaltyAndRestart {
                        peer,
                        reason: format!("invalid block from peer during sync: {}", e),
                    })?;
            }
            last_id = batch.last().expect("checked non-empty").hash();

            if batch_len < BLOCK_SYNC_BATCH_SIZE {
                break;
            }
        }

        Ok(())
    }
}

/// Switches to a short competing fork without falling back to a full resync:
/// walks back from the local tip probing `peer` for a common ancestor,
/// bounded to [`TWO_ROUNDS`] blocks, then reverts to that ancestor and
/// replays the peer's chain from there.
pub struct FastChainSwitchMechanism<C: PeerClient> {
    client: Arc<C>,
}

impl<C: PeerClient> FastChainSwitchMechanism<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Whether this mechanism (rather than a full block sync) should handle
    /// a fork rooted at `fork_height` given the current `current_height`.
    pub fn applies(current_height: BlockNumber, fork_height: BlockNumber) -> bool {
        current_height.saturating_sub(fork_height) <= TWO_ROUNDS
    }

    /// Attempts the switch. Returns `Ok(false)` without mutating the chain
    /// if no common ancestor with `peer` is found within [`TWO_ROUNDS`]
    /// blocks, so the caller can fall through to a full block sync.
    pub async fn run(
        &self,
        processor: &mut BlockProcessor,
        peer: PeerId,
        stop: &AtomicBool,
    ) -> Result<bool, SyncError> {
        let probe_ids: Vec<Hash> = build_probe_ids(processor)
            .into_iter()
            .take(TWO_ROUNDS as usize)
            .collect();

        let common = match self.client.get_highest_common_block(peer, probe_ids).await? {
            Some(id) => id,
            None => return Ok(false),
        };

        let common_height = match processor.chain().get_block(&common) {
            Some(block) => block.number(),
            None => return Ok(false),
        };

        if processor.height().saturating_sub(common_height) > TWO_ROUNDS {
            return Ok(false);
        }

        let mut reverted = 0u64;
        while processor.chain().head_block().hash() != common {
            if processor.height() == 0 {
                return Err(SyncError::Abort {
                    reason: "fork point not found in local chain".into(),
                });
            }
            processor.delete_last_block(true).map_err(|e| SyncError::Restart(e.to_string()))?;
            reverted += 1;
        }

        let mut last_id = common;
        loop {
            if stop.load(Ordering::SeqCst) {
                for _ in 0..reverted {
                    let _ = processor.restore_temp_block();
                }
                return Err(SyncError::Abort { reason: "node is stopping".into() });
            }

            let batch = self
                .client
                .get_blocks_from_id(peer, last_id, BLOCK_SYNC_BATCH_SIZE)
                .await?;
            if batch.is_empty() {
                break;
            }

            let batch_len = batch.len();
            for block in &batch {
                if let Err(e) = processor.execute(
                    block.clone(),
                    current_timestamp(),
                    ExecuteOptions { broadcast: true, ..Default::default() },
                ) {
                    // Undo the partial switch by restoring the original
                    // blocks from the temp-block table before surfacing the
                    // failure.
                    for _ in 0..reverted {
                        let _ = processor.restore_temp_block();
                    }
                    return Err(SyncError::ApplyPenaltyAndRestart {
                        peer,
                        reason: format!("invalid block during fast chain switch: {}", e),
                    });
                }
            }
            last_id = batch.last().expect("checked non-empty").hash();

            if batch_len < BLOCK_SYNC_BATCH_SIZE {
                break;
            }
        }

        Ok(true)
    }
}

/// What triggered a synchronizer run.
pub enum SyncTrigger {
    /// A peer announced a new block that doesn't extend our tip directly.
    ForkAnnouncement { peer: PeerId, blocks: Vec<Block> },
    /// Periodic catch-up against the best-known peer.
    Scheduled { peer: PeerId },
}

/// Supervises the block-sync and fast-chain-switch mechanisms: picks which
/// one applies, runs it, and translates [`SyncError`] into a concrete
/// recovery action (retry, penalize-and-continue, penalize-and-restart, or
/// abort).
pub struct Synchronizer<C: PeerClient> {
    block_sync: BlockSyncMechanism<C>,
    fast_switch: FastChainSwitchMechanism<C>,
    peers: Arc<RwLock<PeerManager>>,
    status: SyncStatus,
    strategy: SyncStrategy,
    max_restarts: u32,
    stop: Arc<AtomicBool>,
}

impl<C: PeerClient> Synchronizer<C> {
    pub fn new(client: Arc<C>, peers: Arc<RwLock<PeerManager>>, strategy: SyncStrategy) -> Self {
        Self::with_stop_flag(client, peers, strategy, Arc::new(AtomicBool::new(false)))
    }

    /// Build a synchronizer that checks `stop` between fetched batches, so a
    /// coordinator shutting down can interrupt a long-running sync instead of
    /// waiting for it to finish on its own.
    pub fn with_stop_flag(
        client: Arc<C>,
        peers: Arc<RwLock<PeerManager>>,
        strategy: SyncStrategy,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            block_sync: BlockSyncMechanism::new(client.clone()),
            fast_switch: FastChainSwitchMechanism::new(client),
            peers,
            status: SyncStatus::Idle,
            strategy,
            max_restarts: 3,
            stop,
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn is_syncing(&self) -> bool {
        matches!(self.status, SyncStatus::Syncing { .. })
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }

    /// Run the appropriate mechanism for `trigger`, retrying/penalizing per
    /// the error translation rules, until it succeeds or aborts.
    pub async fn run(&mut self, processor: &mut BlockProcessor, trigger: SyncTrigger) -> Result<(), SyncError> {
        if self.stop.load(Ordering::SeqCst) {
            return Err(SyncError::Abort { reason: "node is stopping".into() });
        }

        self.status = SyncStatus::Syncing {
            current: processor.height(),
            target: processor.height(),
        };

        let mut attempts = 0;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                self.status = SyncStatus::Idle;
                return Err(SyncError::Abort { reason: "node is stopping".into() });
            }

            let result = match &trigger {
                SyncTrigger::Scheduled { peer } => self.block_sync.run(processor, *peer, &self.stop).await,
                SyncTrigger::ForkAnnouncement { peer, blocks } => {
                    let fork_height = blocks.first().map(|b| b.number()).unwrap_or(0);
                    if FastChainSwitchMechanism::<C>::applies(processor.height(), fork_height) {
                        match self.fast_switch.run(processor, *peer, &self.stop).await {
                            Ok(true) => Ok(()),
                            // No common ancestor within the window: fall
                            // through to a full block sync instead.
                            Ok(false) => self.block_sync.run(processor, *peer, &self.stop).await,
                            Err(e) => Err(e),
                        }
                    } else {
                        self.block_sync.run(processor, *peer, &self.stop).await
                    }
                }
            };

            match result {
                Ok(()) => {
                    self.status = SyncStatus::Complete;
                    return Ok(());
                }
                Err(SyncError::Restart(reason)) => {
                    attempts += 1;
                    tracing::warn!(reason, attempts, "sync mechanism restarting");
                    if attempts >= self.max_restarts {
                        self.status = SyncStatus::Idle;
                        return Err(SyncError::Abort { reason });
                    }
                    continue;
                }
                Err(SyncError::ApplyPenaltyAndRestart { peer, reason }) => {
                    tracing::warn!(?peer, reason, "penalizing peer and restarting sync");
                    let _ = self.peers.write().await.decrease_reputation(&peer, SYNC_PENALTY_POINTS);
                    attempts += 1;
                    if attempts >= self.max_restarts {
                        self.status = SyncStatus::Idle;
                        return Err(SyncError::Abort { reason });
                    }
                    continue;
                }
                Err(SyncError::Abort { reason }) => {
                    tracing::error!(reason, "aborting sync");
                    self.status = SyncStatus::Idle;
                    return Err(SyncError::Abort { reason });
                }
            }
        }
    }

    /// Called by networking layer when a fork is detected to coordinate
    /// resolution.
    pub fn handle_fork_notification(&mut self) {
        tracing::info!("Synchronizer: fork notification received");
    }

    /// Trigger a mempool sync after catching up.
    pub fn trigger_mempool_sync(&mut self) {
        tracing::info!("Synchronizer: triggering mempool sync");
    }
}

/// Backwards-compatible alias retained for callers expecting the original
/// lightweight status tracker.
pub type SyncManager = Synchronizer<NullPeerClient>;

/// A `PeerClient` that always aborts; used only to let code that only needs
/// `SyncStatus`/`is_syncing()` construct a `Synchronizer` without a real
/// network client wired in yet.
pub struct NullPeerClient;

#[async_trait::async_trait]
impl PeerClient for NullPeerClient {
    async fn get_last_block(&self, peer: PeerId) -> Result<Block, SyncError> {
        Err(SyncError::Abort { reason: format!("no peer client configured ({:?})", peer) })
    }

    async fn get_blocks_from_id(
        &self,
        peer: PeerId,
        _block_id: Hash,
        _max_blocks: usize,
    ) -> Result<Vec<Block>, SyncError> {
        Err(SyncError::Abort { reason: format!("no peer client configured ({:?})", peer) })
    }

    async fn get_highest_common_block(
        &self,
        peer: PeerId,
        _block_ids: Vec<Hash>,
    ) -> Result<Option<Hash>, SyncError> {
        Err(SyncError::Abort { reason: format!("no peer client configured ({:?})", peer) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockchain_core::{Block, Blockchain};
    use std::sync::Mutex as StdMutex;

    fn fresh_processor() -> BlockProcessor {
        let genesis = Block::genesis(Hash::zero());
        BlockProcessor::new(Blockchain::new(genesis).unwrap())
    }

    struct ScriptedClient {
        last_block: Block,
        common_block: Option<Hash>,
        batches: StdMutex<Vec<Vec<Block>>>,
    }

    #[async_trait::async_trait]
    impl PeerClient for ScriptedClient {
        async fn get_last_block(&self, _peer: PeerId) -> Result<Block, SyncError> {
            Ok(self.last_block.clone())
        }

        async fn get_blocks_from_id(
            &self,
            _peer: PeerId,
            _block_id: Hash,
            _max_blocks: usize,
        ) -> Result<Vec<Block>, SyncError> {
            Ok(self.batches.lock().unwrap().pop().unwrap_or_default())
        }

        async fn get_highest_common_block(
            &self,
            _peer: PeerId,
            _block_ids: Vec<Hash>,
        ) -> Result<Option<Hash>, SyncError> {
            Ok(self.common_block)
        }
    }

    #[tokio::test]
    async fn block_sync_is_noop_when_peer_is_behind() {
        let mut processor = fresh_processor();
        let genesis_hash = processor.chain().head_block().hash();
        let client = Arc::new(ScriptedClient {
            last_block: processor.chain().genesis_block().clone(),
            common_block: Some(genesis_hash),
            batches: StdMutex::new(vec![]),
        });
        let mechanism = BlockSyncMechanism::new(client);
        let peer = PeerId::random();

        mechanism.run(&mut processor, peer, &AtomicBool::new(false)).await.unwrap();
        assert_eq!(processor.height(), 0);
    }

    #[tokio::test]
    async fn block_sync_applies_fetched_batch() {
        let mut processor = fresh_processor();
        let genesis = processor.chain().genesis_block().clone();
        let block1 = Block::new(
            1,
            genesis.hash(),
            processor.chain().state().state_root(),
            blockchain_crypto::Address::zero(),
            vec![],
            10_000_000,
        ).unwrap();

        let client = Arc::new(ScriptedClient {
            last_block: block1.clone(),
            common_block: Some(genesis.hash()),
            batches: StdMutex::new(vec![vec![block1]]),
        });
        let mechanism = BlockSyncMechanism::new(client);
        let peer = PeerId::random();

        mechanism.run(&mut processor, peer, &AtomicBool::new(false)).await.unwrap();
        assert_eq!(processor.height(), 1);
    }

    #[test]
    fn fast_switch_applies_within_window() {
        assert!(FastChainSwitchMechanism::<NullPeerClient>::applies(100, 50));
        assert!(!FastChainSwitchMechanism::<NullPeerClient>::applies(1000, 50));
    }

    #[tokio::test]
    async fn fast_switch_walks_back_past_single_block_fork() {
        let mut processor = fresh_processor();
        let genesis = processor.chain().genesis_block().clone();
        let state_root = processor.chain().state().state_root();

        let b1 = Block::new(1, genesis.hash(), state_root, blockchain_crypto::Address::zero(), vec![], 10_000_000).unwrap();
        processor.execute(b1.clone(), 0, ExecuteOptions::default()).unwrap();
        let b2 = Block::new(2, b1.hash(), state_root, blockchain_crypto::Address::zero(), vec![], 10_000_000).unwrap();
        processor.execute(b2.clone(), 0, ExecuteOptions::default()).unwrap();
        let b3 = Block::new(3, b2.hash(), state_root, blockchain_crypto::Address::zero(), vec![], 10_000_000).unwrap();
        processor.execute(b3.clone(), 0, ExecuteOptions::default()).unwrap();
        assert_eq!(processor.height(), 3);

        // Peer shares b1 as the common ancestor but diverges from there.
        let peer_b2 = Block::new(2, b1.hash(), state_root, blockchain_crypto::Address::new([9u8; 20]), vec![], 10_000_000).unwrap();
        let peer_b3 = Block::new(3, peer_b2.hash(), state_root, blockchain_crypto::Address::new([9u8; 20]), vec![], 10_000_000).unwrap();

        let client = Arc::new(ScriptedClient {
            last_block: peer_b3.clone(),
            common_block: Some(b1.hash()),
            batches: StdMutex::new(vec![vec![peer_b2, peer_b3.clone()]]),
        });
        let mechanism = FastChainSwitchMechanism::new(client);
        let peer = PeerId::random();

        let switched = mechanism.run(&mut processor, peer, &AtomicBool::new(false)).await.unwrap();
        assert!(switched);
        assert_eq!(processor.height(), 3);
        assert_eq!(processor.chain().head_block().hash(), peer_b3.hash());
    }

    #[tokio::test]
    async fn fast_switch_declines_when_no_common_ancestor() {
        let mut processor = fresh_processor();
        let genesis = processor.chain().genesis_block().clone();
        let state_root = processor.chain().state().state_root();
        let b1 = Block::new(1, genesis.hash(), state_root, blockchain_crypto::Address::zero(), vec![], 10_000_000).unwrap();
        processor.execute(b1, 0, ExecuteOptions::default()).unwrap();

        let client = Arc::new(ScriptedClient {
            last_block: processor.chain().head_block().clone(),
            common_block: None,
            batches: StdMutex::new(vec![]),
        });
        let mechanism = FastChainSwitchMechanism::new(client);
        let peer = PeerId::random();

        let switched = mechanism.run(&mut processor, peer, &AtomicBool::new(false)).await.unwrap();
        assert!(!switched);
        assert_eq!(processor.height(), 1);
    }

    #[test]
    fn probe_ids_include_genesis_and_tip() {
        let processor = fresh_processor();
        let ids = build_probe_ids(&processor);
        assert_eq!(ids, vec![processor.chain().genesis_block().hash()]);
    }
}
