// node/src/runtime.rs
//!
//! The consensus coordinator: owns the single `BlockProcessor` mutex that
//! every tip-mutating operation serializes through, wires the commit pool,
//! synchronizer and network/RPC surfaces around it, and translates inbound
//! blocks and locally-produced ones into the same `on_block_receive`/
//! `execute` pipeline.

use crate::NodeConfig;
use blockchain_core::{
    bft::{BftHeights, BftParameters, BftParametersHistory},
    current_timestamp, Block, BlockEvent, BlockNumber, BlockProcessor, Blockchain,
    ExecuteOptions, PoolConfig, ReceiveOutcome, Transaction, TransactionPool, BLOCK_HEADER_VERSION,
};
use blockchain_crypto::{Address, BlsKeyPair, Hash, KeyPair, SignatureScheme};
use consensus::CommitPool;
use networking::{
    p2p::{ConsensusHandler, NetworkConfig as NetConfig, NetworkService},
    peer::{PeerId, PeerManager},
    sync::{NullPeerClient, SyncManager, SyncStrategy, SyncTrigger, SYNC_PENALTY_POINTS},
    GossipService,
};
use rpc::{RpcConfig as RpcCfg, RpcMethods, RpcServer};
use storage::{Database, DatabaseConfig, PruningMode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{interval, Duration};

/// Capacity of the block-event broadcast channel. A slow or absent
/// subscriber simply misses the oldest events rather than stalling block
/// processing.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Key material for a node that also proposes blocks and signs BFT commits.
/// Loaded once at startup from the paths in [`crate::config::ValidatorConfig`].
struct ValidatorIdentity {
    address: Address,
    keypair: KeyPair,
    bls_keypair: BlsKeyPair,
}

/// Owns the block processor, commit pool, mempool, peer/sync state and the
/// optional network/RPC front ends. This is the single point every inbound
/// or locally-produced block passes through before it reaches storage or the
/// network.
pub struct Node {
    config: NodeConfig,
    processor: Arc<Mutex<BlockProcessor>>,
    commit_pool: Arc<Mutex<CommitPool>>,
    bft_history: Arc<RwLock<BftParametersHistory>>,
    bft_heights: Arc<RwLock<BftHeights>>,
    database: Arc<Database>,
    mempool: Arc<RwLock<TransactionPool>>,
    peers: Arc<RwLock<PeerManager>>,
    sync: Arc<Mutex<SyncManager>>,
    gossip: GossipService,
    network: RwLock<Option<Arc<RwLock<NetworkService>>>>,
    rpc: RwLock<Option<Arc<RpcServer>>>,
    validator: Option<ValidatorIdentity>,
    stopping: Arc<AtomicBool>,
    /// Publishes every [`BlockEvent`] emitted by block processing so
    /// external subscribers (RPC subscriptions, metrics, tests) can observe
    /// `BlockNew`/`BlockDelete`/`BlockBroadcast`/`ForkDetected` without
    /// polling storage.
    events: broadcast::Sender<BlockEvent>,
}

impl Node {
    /// Build the coordinator. Genesis registration and BFT-parameter loading
    /// are idempotent: restarting against an existing data directory reuses
    /// what's already on disk instead of re-deriving it.
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        tracing::info!("initializing node components");

        let pruning_mode = if config.storage.pruning == "archive" {
            PruningMode::Archive
        } else {
            PruningMode::Pruned { keep_blocks: config.storage.keep_blocks }
        };

        let db_config = DatabaseConfig {
            path: format!("{}/db", config.data_dir),
            cache_size: config.storage.cache_size_mb * 1024 * 1024,
            max_open_files: config.storage.max_open_files,
            pruning_mode,
            ..Default::default()
        };
        let database = Arc::new(Database::open(db_config)?);

        let genesis = Block::genesis(Hash::zero());
        if database.get_block(&genesis.hash())?.is_none() {
            database.store_block(&genesis)?;
            database.update_latest_block_number(0)?;
            tracing::info!("genesis block registered");
        }

        let mut processor = BlockProcessor::new(Blockchain::new(genesis)?);
        if let Some(finalized) = database.get_finalized_height()? {
            processor.set_finalized_height(finalized)?;
        }

        let bft_history = match database.get_bft_parameters()? {
            Some(history) => history,
            None => {
                let mut history = BftParametersHistory::new();
                history.insert(BftParameters {
                    from_height: 0,
                    validators: Vec::new(),
                    certificate_threshold: config.consensus.certificate_threshold_default,
                });
                database.store_bft_parameters(&history)?;
                history
            }
        };

        let mempool = TransactionPool::new(config.mempool.clone());

        let peers = Arc::new(RwLock::new(PeerManager::new(
            config.network.max_peers,
            config.network.max_peers / 2,
            config.network.max_peers / 2,
        )));

        let validator = match &config.validator {
            Some(v) => Some(load_validator_identity(v)?),
            None => None,
        };

        tracing::info!("node components initialized");

        let stopping = Arc::new(AtomicBool::new(false));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            processor: Arc::new(Mutex::new(processor)),
            commit_pool: Arc::new(Mutex::new(CommitPool::new(config.consensus.network_id.clone()))),
            bft_history: Arc::new(RwLock::new(bft_history)),
            bft_heights: Arc::new(RwLock::new(BftHeights::new())),
            database,
            mempool: Arc::new(RwLock::new(mempool)),
            sync: Arc::new(Mutex::new(SyncManager::with_stop_flag(
                Arc::new(NullPeerClient),
                peers.clone(),
                SyncStrategy::FullSync,
                stopping.clone(),
            ))),
            peers,
            gossip: GossipService::new(),
            network: RwLock::new(None),
            rpc: RwLock::new(None),
            validator,
            stopping,
            events,
            config,
        })
    }

    /// Subscribe to the four block-processing events
    /// (`BlockNew`/`BlockDelete`/`BlockBroadcast`/`ForkDetected`). Each
    /// subscriber gets its own receiver; events published before a receiver
    /// is created are never delivered to it.
    pub fn subscribe_events(&self) -> broadcast::Receiver<BlockEvent> {
        self.events.subscribe()
    }

    pub async fn start(self: Arc<Self>) -> anyhow::Result<()> {
        tracing::info!("starting consensus coordinator");

        let net_config = NetConfig {
            listen_addr: self.config.network.listen_addr,
            max_peers: self.config.network.max_peers,
            max_inbound: self.config.network.max_peers / 2,
            max_outbound: self.config.network.max_peers / 2,
            bootstrap_peers: self
                .config
                .network
                .bootstrap_peers
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect(),
        };
        let mut network = NetworkService::new(net_config);
        network.start().await?;
        *self.network.write().await = Some(Arc::new(RwLock::new(network)));
        tracing::info!(addr = %self.config.network.listen_addr, "network service started");

        if self.config.rpc.enabled {
            let rpc_config = RpcCfg {
                listen_addr: self.config.rpc.listen_addr,
                cors_origins: self.config.rpc.cors_origins.clone(),
                ..Default::default()
            };
            let methods = RpcMethods::new(self.processor.clone(), self.database.clone(), self.mempool.clone());
            let rpc_server = Arc::new(RpcServer::new(rpc_config, methods));
            *self.rpc.write().await = Some(rpc_server.clone());

            tokio::spawn(async move {
                if let Err(e) = rpc_server.start().await {
                    tracing::error!(error = %e, "rpc server error");
                }
            });
            tracing::info!(addr = %self.config.rpc.listen_addr, "rpc server started");
        }

        self.start_commit_pool_job();
        self.start_mempool_pruner();

        tracing::info!("node is operational");
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!("shutting down node");
        self.stopping.store(true, Ordering::SeqCst);

        // Take the processor lock once to let any in-flight block
        // application drain before flushing storage.
        let _ = self.processor.lock().await;

        self.database.compact()?;
        tracing::info!("node shutdown complete");
        Ok(())
    }

    pub fn processor(&self) -> &Arc<Mutex<BlockProcessor>> {
        &self.processor
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn mempool(&self) -> &Arc<RwLock<TransactionPool>> {
        &self.mempool
    }

    pub async fn finalized_height(&self) -> BlockNumber {
        self.processor.lock().await.finalized_height()
    }

    pub async fn is_syncing(&self) -> bool {
        self.sync.lock().await.is_syncing()
    }

    // ==================== BLOCK RECEIPT ====================

    /// Apply a block received from `peer`, following the fork-choice
    /// dispatch table. A `DifferentChain` verdict hands the block off to the
    /// synchronizer rather than applying it directly.
    pub async fn on_block_receive(&self, peer: PeerId, block: Block) -> anyhow::Result<()> {
        if self.stopping.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("node is stopping"));
        }

        if self.is_syncing().await {
            tracing::debug!(peer = %peer.to_hex(), "dropping block received mid-sync");
            return Ok(());
        }

        if !block.is_genesis() && block.header.version != BLOCK_HEADER_VERSION {
            tracing::warn!(
                peer = %peer.to_hex(),
                version = block.header.version,
                expected = BLOCK_HEADER_VERSION,
                "block header version mismatch, penalizing peer"
            );
            let _ = self.peers.write().await.decrease_reputation(&peer, SYNC_PENALTY_POINTS);
            return Ok(());
        }

        if !block.is_genesis() {
            self.verify_generator_signature(&block).await?;
        }

        let received_at = current_timestamp();
        let opts = ExecuteOptions { broadcast: true, skip_verify: false };
        let outcome = {
            let mut processor = self.processor.lock().await;
            processor.on_block_receive(block.clone(), received_at, opts)?
        };

        match outcome {
            ReceiveOutcome::Applied(events) => {
                self.apply_events(events).await;
                self.try_advance_finality(&block).await;
                self.sign_and_pool_commit(&block).await;
                Ok(())
            }
            ReceiveOutcome::Discarded { status, events } => {
                tracing::debug!(?status, "discarded block from peer");
                self.apply_events(events).await;
                Ok(())
            }
            ReceiveOutcome::NeedsSync { status } => {
                tracing::info!(?status, peer = %peer.to_hex(), "block requires sync, handing off");
                self.trigger_sync(SyncTrigger::ForkAnnouncement { peer, blocks: vec![block] }).await
            }
        }
    }

    /// Apply a block this node produced itself: already known valid, so
    /// fork-choice classification is skipped.
    pub async fn execute_own_block(&self, block: Block) -> anyhow::Result<()> {
        if self.stopping.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("node is stopping"));
        }

        let opts = ExecuteOptions { broadcast: true, skip_verify: true };
        let events = {
            let mut processor = self.processor.lock().await;
            processor.execute(block.clone(), current_timestamp(), opts)?
        };
        self.apply_events(events).await;
        self.sign_and_pool_commit(&block).await;
        Ok(())
    }

    /// Check that `block` was signed by a validator registered to propose
    /// at that height. Blocks from heights with no registered BFT
    /// parameters are rejected rather than silently trusted.
    async fn verify_generator_signature(&self, block: &Block) -> anyhow::Result<()> {
        let public_key = {
            let history = self.bft_history.read().await;
            let params = history.at(block.number()).ok_or_else(|| {
                anyhow::anyhow!("no BFT parameters registered for height {}", block.number())
            })?;
            let validator = params.validator(&block.header.proposer).ok_or_else(|| {
                anyhow::anyhow!(
                    "proposer {} is not a registered validator at height {}",
                    block.header.proposer.to_hex(),
                    block.number()
                )
            })?;
            validator.block_sign_public_key.clone()
        };

        let header = block.header.clone();
        tokio::task::spawn_blocking(move || header.verify_signature(&public_key))
            .await
            .map_err(|e| anyhow::anyhow!("signature verification task panicked: {}", e))??;
        Ok(())
    }

    async fn trigger_sync(&self, trigger: SyncTrigger) -> anyhow::Result<()> {
        let mut sync = self.sync.lock().await;
        let mut processor = self.processor.lock().await;
        match sync.run(&mut processor, trigger).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "synchronizer aborted");
                Ok(())
            }
        }
    }

    /// Persist newly applied/reverted blocks and forward broadcast events to
    /// the gossip layer.
    async fn apply_events(&self, events: Vec<BlockEvent>) {
        let mut to_gossip = Vec::new();

        for event in events {
            let _ = self.events.send(event.clone());
            match event {
                BlockEvent::BlockNew { block } => {
                    if let Err(e) = self.database.store_block(&block) {
                        tracing::error!(error = %e, height = block.number(), "failed to persist block");
                    }
                    if let Err(e) = self.database.update_latest_block_number(block.number()) {
                        tracing::error!(error = %e, "failed to persist latest block number");
                    }
                    self.mempool.write().await.remove_included(&block.transactions);
                    tracing::info!(height = block.number(), hash = %block.hash().to_hex(), "block applied");
                }
                BlockEvent::BlockDelete { block } => {
                    if let Err(e) = self.database.store_temp_block(&block) {
                        tracing::warn!(error = %e, "failed to stash reverted block");
                    }
                    tracing::info!(height = block.number(), "block reverted");
                }
                BlockEvent::BlockBroadcast { block } => to_gossip.push(block),
                BlockEvent::ForkDetected { height, status } => {
                    tracing::warn!(height, ?status, "fork detected");
                }
            }
        }

        for block in &to_gossip {
            self.gossip.broadcast_block(block);
        }
    }

    /// When a newly applied block carries a quorum-reaching aggregate
    /// commit, verify it against the BFT parameters active at its height
    /// and advance finality to that height.
    async fn try_advance_finality(&self, block: &Block) {
        let Some(aggregate) = block.header.aggregate_commit.clone() else { return };
        if aggregate.aggregation_bits.is_empty() {
            return;
        }

        let params = match self.bft_history.read().await.at(aggregate.height).cloned() {
            Some(p) => p,
            None => return,
        };

        let mut processor = self.processor.lock().await;
        let Some(certified) = processor.chain().get_block_by_number(aggregate.height).cloned() else {
            return;
        };

        let verified = {
            let commit_pool = self.commit_pool.lock().await;
            commit_pool.verify_aggregate_commit(
                &aggregate,
                &params,
                &certified.hash(),
                &certified.header.state_root,
                &certified.header.validators_hash,
            )
        };

        if verified && processor.set_finalized_height(aggregate.height).is_ok() {
            self.bft_heights.write().await.advance_finalized(aggregate.height);
            drop(processor);
            if let Err(e) = self.database.update_finalized_height(aggregate.height) {
                tracing::error!(error = %e, "failed to persist finalized height");
            }
            tracing::info!(height = aggregate.height, "advanced finality via aggregate commit");
        }
    }

    /// If this node is an active validator at the applied block's height,
    /// sign and pool a single commit for gossip.
    async fn sign_and_pool_commit(&self, block: &Block) {
        let Some(validator) = &self.validator else { return };

        let history = self.bft_history.read().await;
        let params = match history.at(block.number()) {
            Some(p) => p,
            None => return,
        };
        if params.validator(&validator.address).is_none() {
            return;
        }

        self.bft_heights.write().await.advance_precommitted(block.number());
        let heights = self.bft_heights.read().await;
        let local_block_id = self
            .processor
            .lock()
            .await
            .chain()
            .get_block_by_number(block.number())
            .map(|b| b.hash());

        let mut commit_pool = self.commit_pool.lock().await;
        let commit = commit_pool.create_single_commit(
            block.hash(),
            block.number(),
            block.header.timestamp,
            block.header.state_root,
            block.header.validators_hash,
            validator.address,
            &validator.bls_keypair,
        );
        if let Err(e) = commit_pool.add_commit(commit, &history, &heights, local_block_id, false).await {
            tracing::warn!(error = %e, "failed to pool local commit");
        }
    }

    // ==================== BLOCK PRODUCTION ====================

    /// Assemble a candidate block from pending mempool transactions. Block
    /// proposal/validator-turn selection belongs to the economic layer this
    /// core doesn't implement; this is the assembly step a caller invokes
    /// once it has otherwise decided it's this node's turn to propose.
    pub async fn produce_block(&self) -> anyhow::Result<Block> {
        let block_gas_limit = 8_000_000u64;
        let max_tx_count = 1000usize;

        let txs = self.mempool.read().await.get_pending(block_gas_limit, max_tx_count);

        let proposer = self.validator.as_ref().map(|v| v.address).unwrap_or_else(Address::zero);
        let (parent_number, parent_hash, state_root) = {
            let processor = self.processor.lock().await;
            (
                processor.height(),
                processor.chain().head_block().hash(),
                processor.chain().state().state_root(),
            )
        };
        let height = parent_number + 1;

        let block = Block::new(
            height,
            parent_hash,
            state_root,
            proposer,
            txs,
            block_gas_limit,
        )?;

        let validators_hash = {
            let history = self.bft_history.read().await;
            history
                .at(height)
                .map(|params| params.validators_hash())
                .unwrap_or_else(Hash::zero)
        };
        let (max_height_generated, max_height_precommitted) = {
            let bft_heights = self.bft_heights.read().await;
            (bft_heights.max_height_generated, bft_heights.max_height_precommitted)
        };
        let aggregate_commit = {
            let history = self.bft_history.read().await;
            let heights = self.bft_heights.read().await;
            let commit_pool = self.commit_pool.lock().await;
            commit_pool
                .select_aggregate_commit(&history, &heights)
                .ok()
                .filter(|agg| !agg.aggregation_bits.is_empty())
        };

        let mut block = block.with_bft_fields(
            validators_hash,
            max_height_generated,
            max_height_precommitted,
            aggregate_commit,
        );

        if let Some(validator) = &self.validator {
            block.sign(&validator.keypair)?;
        }

        self.bft_heights.write().await.advance_generated(height);

        tracing::info!(height = block.number(), txs = block.transactions.len(), "block produced");
        Ok(block)
    }

    /// Whether the local view of consensus progress at `height` is at least
    /// as advanced as a peer's claimed `(height, max_height_prevoted)`: true
    /// if this node's own `max_height_prevoted` strictly leads the claim, or
    /// matches it while this node's chain is at least as tall. Mirrors the
    /// weight comparison [`blockchain_core::fork::classify`] uses to decide
    /// whether an incoming chain is heavier than the local tip.
    pub async fn is_synced(&self, height: BlockNumber, max_height_prevoted: BlockNumber) -> bool {
        let local_prevoted = self.bft_heights.read().await.max_height_prevoted;
        if local_prevoted != max_height_prevoted {
            return local_prevoted > max_height_prevoted;
        }
        self.processor.lock().await.height() >= height
    }

    // ==================== TRANSACTION SUBMISSION ====================

    pub async fn submit_transaction(&self, tx: Transaction) -> anyhow::Result<serde_json::Value> {
        if self.stopping.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("node is stopping"));
        }

        tx.validate_basic()?;

        let sender_nonce = self.processor.lock().await.chain().state().get_nonce(&tx.from);
        if tx.nonce != sender_nonce {
            return Err(anyhow::anyhow!("invalid nonce: expected {}, got {}", sender_nonce, tx.nonce));
        }

        let mut pool = self.mempool.write().await;
        pool.add(tx.clone(), sender_nonce)?;
        let position = pool.metrics().pending_count;
        drop(pool);

        self.gossip.broadcast_transaction(&tx);
        tracing::info!(tx_hash = %tx.hash().to_hex(), position, "transaction submitted to pool");

        Ok(serde_json::json!({
            "tx_hash": tx.hash().to_hex(),
            "position": position,
        }))
    }

    pub async fn update_pool_config(&self, config: PoolConfig) {
        let mut pool = self.mempool.write().await;
        *pool = TransactionPool::new(config);
        tracing::info!("mempool configuration updated");
    }

    // ==================== BACKGROUND TASKS ====================

    /// Periodically promotes non-gossiped commits past the finalized floor,
    /// logging what would be broadcast. No real transport is wired, so
    /// actual peer broadcast of commits is a documented gap (see DESIGN.md).
    fn start_commit_pool_job(self: &Arc<Self>) {
        let node = self.clone();
        let period = Duration::from_secs(node.config.consensus.block_time.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if node.stopping.load(Ordering::SeqCst) {
                    break;
                }
                let floor = node.finalized_height().await;
                let promoted = node.commit_pool.lock().await.job(floor);
                if !promoted.is_empty() {
                    tracing::debug!(count = promoted.len(), "commits promoted for gossip");
                }
            }
        });
        tracing::info!("commit pool job started");
    }

    fn start_mempool_pruner(self: &Arc<Self>) {
        let node = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                if node.stopping.load(Ordering::SeqCst) {
                    break;
                }
                let mut pool = node.mempool.write().await;
                let before = pool.metrics().total_removed;
                pool.prune();
                let pruned = pool.metrics().total_removed.saturating_sub(before);
                if pruned > 0 {
                    tracing::debug!(pruned, "mempool pruning removed stale transactions");
                }
            }
        });
        tracing::info!("mempool pruner started");
    }
}

#[async_trait::async_trait]
impl ConsensusHandler for Node {
    async fn last_block(&self) -> Block {
        self.processor.lock().await.chain().head_block().clone()
    }

    async fn blocks_from_id(&self, block_id: Hash, max_blocks: usize) -> Vec<Block> {
        let Ok(Some(start)) = self.database.get_block_number(&block_id) else {
            return Vec::new();
        };
        let processor = self.processor.lock().await;
        let tip = processor.height();
        (start + 1..=tip)
            .take(max_blocks)
            .filter_map(|n| processor.chain().get_block_by_number(n).cloned())
            .collect()
    }

    async fn highest_common_block(&self, block_ids: Vec<Hash>) -> Option<Hash> {
        let processor = self.processor.lock().await;
        block_ids.into_iter().find(|id| processor.chain().get_block(id).is_some())
    }

    async fn receive_block(&self, peer: PeerId, block: Block) -> Result<(), String> {
        self.on_block_receive(peer, block).await.map_err(|e| e.to_string())
    }
}

fn load_validator_identity(config: &crate::config::ValidatorConfig) -> anyhow::Result<ValidatorIdentity> {
    let key_json = std::fs::read_to_string(&config.key_path)?;
    let key_value: serde_json::Value = serde_json::from_str(&key_json)?;
    let secret_hex = key_value["secret_key"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("missing secret_key in {}", config.key_path))?;
    let public_hex = key_value["public_key"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("missing public_key in {}", config.key_path))?;
    let secret_key = blockchain_crypto::SecretKey::from_hex(SignatureScheme::Ed25519, secret_hex)?;
    let public_key = blockchain_crypto::PublicKey::from_hex(SignatureScheme::Ed25519, public_hex)?;
    let keypair = KeyPair::from_keys(public_key, secret_key)?;
    let address = keypair.public_key().to_address();

    let bls_json = std::fs::read_to_string(&config.bls_key_path)?;
    let bls_value: serde_json::Value = serde_json::from_str(&bls_json)?;
    let bls_secret_hex = bls_value["secret_key"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("missing secret_key in {}", config.bls_key_path))?;
    let bls_secret = blockchain_crypto::BlsSecretKey::from_bytes(&hex::decode(bls_secret_hex)?)?;
    let bls_keypair = BlsKeyPair::from_secret_key(bls_secret);

    Ok(ValidatorIdentity { address, keypair, bls_keypair })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    static TEST_DIR_COUNTER: AtomicU32 = AtomicU32::new(0);

    struct TempDirGuard {
        path: std::path::PathBuf,
    }

    impl TempDirGuard {
        fn new() -> Self {
            let n = TEST_DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
            let path = std::env::temp_dir().join(format!("node-runtime-test-{}-{}", std::process::id(), n));
            std::fs::create_dir_all(&path).unwrap();
            Self { path }
        }

        fn config(&self) -> NodeConfig {
            let mut config = NodeConfig::default();
            config.data_dir = self.path.to_string_lossy().into_owned();
            config.rpc.enabled = false;
            config
        }
    }

    impl Drop for TempDirGuard {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    #[tokio::test]
    async fn node_creation_registers_genesis() {
        let dir = TempDirGuard::new();
        let node = Node::new(dir.config()).unwrap();
        assert_eq!(node.finalized_height().await, 0);
        assert_eq!(node.processor.lock().await.height(), 0);
    }

    #[tokio::test]
    async fn produce_block_with_empty_pool() {
        let dir = TempDirGuard::new();
        let node = Node::new(dir.config()).unwrap();
        let block = node.produce_block().await.unwrap();
        assert_eq!(block.number(), 1);
        assert!(block.transactions.is_empty());
    }

    #[tokio::test]
    async fn own_block_execution_persists_and_advances_height() {
        let dir = TempDirGuard::new();
        let node = Node::new(dir.config()).unwrap();
        let block = node.produce_block().await.unwrap();
        node.execute_own_block(block.clone()).await.unwrap();

        assert_eq!(node.processor.lock().await.height(), 1);
        assert_eq!(node.database.get_block(&block.hash()).unwrap().unwrap().number(), 1);
    }

    #[tokio::test]
    async fn own_block_execution_publishes_block_new_event() {
        let dir = TempDirGuard::new();
        let node = Node::new(dir.config()).unwrap();
        let mut events = node.subscribe_events();

        let block = node.produce_block().await.unwrap();
        node.execute_own_block(block.clone()).await.unwrap();

        let event = events.recv().await.unwrap();
        assert!(matches!(event, BlockEvent::BlockNew { block: b } if b.hash() == block.hash()));
    }

    #[tokio::test]
    async fn produce_block_advances_max_height_generated() {
        let dir = TempDirGuard::new();
        let node = Node::new(dir.config()).unwrap();
        let block = node.produce_block().await.unwrap();
        assert_eq!(node.bft_heights.read().await.max_height_generated, block.number());
    }

    #[tokio::test]
    async fn is_synced_reports_behind_on_lower_prevoted_mark() {
        let dir = TempDirGuard::new();
        let node = Node::new(dir.config()).unwrap();
        assert!(node.is_synced(0, 0).await);
        assert!(!node.is_synced(5, 10).await);
    }

    #[tokio::test]
    async fn stopped_node_rejects_mutating_entry_points() {
        let dir = TempDirGuard::new();
        let node = Node::new(dir.config()).unwrap();
        node.stop().await.unwrap();

        let block = Block::genesis(Hash::zero());
        assert!(node.execute_own_block(block.clone()).await.is_err());
        assert!(node.on_block_receive(PeerId::random(), block).await.is_err());
    }
}
