// blockchain-core/src/chain.rs

use crate::{
    block::{Block, BlockHeader},
    state::WorldState,
    transaction::{Transaction, TransactionReceipt},
    types::*,
    BlockchainError, BlockchainResult,
};
use blockchain_crypto::{Address, Hash};
use std::collections::HashMap;

/// Main blockchain structure
pub struct Blockchain {
    /// All blocks indexed by hash
    blocks: HashMap<Hash, Block>,
    /// Block hashes indexed by number
    block_by_number: HashMap<BlockNumber, Hash>,
    /// Current chain head
    head: Hash,
    /// Genesis block hash
    genesis: Hash,
    /// Current world state
    state: WorldState,
    /// Transaction receipts
    receipts: HashMap<Hash, TransactionReceipt>,
}

impl Blockchain {
    /// Create a new blockchain with genesis block
    pub fn new(genesis_block: Block) -> BlockchainResult<Self> {
        if !genesis_block.is_genesis() {
            return Err(BlockchainError::InvalidChain(
                "First block must be genesis".into()
            ));
        }

        let genesis_hash = genesis_block.hash();
        let mut blocks = HashMap::new();
        let mut block_by_number = HashMap::new();
        
        blocks.insert(genesis_hash, genesis_block.clone());
        block_by_number.insert(0, genesis_hash);

        let state = WorldState::new();

        Ok(Self {
            blocks,
            block_by_number,
            head: genesis_hash,
            genesis: genesis_hash,
            state,
            receipts: HashMap::new(),
        })
    }

    /// Get the genesis block
    pub fn genesis_block(&self) -> &Block {
        self.blocks.get(&self.genesis).unwrap()
    }

    /// Get the current head block
    pub fn head_block(&self) -> &Block {
        self.blocks.get(&self.head).unwrap()
    }

    /// Get current block height
    pub fn height(&self) -> BlockNumber {
        self.head_block().number()
    }

    /// Get block by hash
    pub fn get_block(&self, hash: &Hash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    /// Get block by number
    pub fn get_block_by_number(&self, number: BlockNumber) -> Option<&Block> {
        self.block_by_number.get(&number)
            .and_then(|hash| self.blocks.get(hash))
    }

    /// Get transaction receipt
    pub fn get_receipt(&self, tx_hash: &Hash) -> Option<&TransactionReceipt> {
        self.receipts.get(tx_hash)
    }

    /// Get current state
    pub fn state(&self) -> &WorldState {
        &self.state
    }

    /// Get mutable state reference
    pub fn state_mut(&mut self) -> &mut WorldState {
        &mut self.state
    }

    /// Add a new block to the chain
    pub fn add_block(&mut self, block: Block) -> BlockchainResult<()> {
        // Get parent block
        let parent = self.get_block(&block.header.parent_hash)
            .ok_or_else(|| BlockchainError::BlockNotFound(block.header.parent_hash))?
            .clone();

        // Validate block
        block.validate(&parent)?;

        // Verify state root matches
        if block.header.state_root != self.state.state_root() {
            return Err(BlockchainError::InvalidBlock(
                "State root mismatch".into()
            ));
        }

        // Add block to chain
        let block_hash = block.hash();
        let block_number = block.number();
        
        self.blocks.insert(block_hash, block);
        self.block_by_number.insert(block_number, block_hash);
        self.head = block_hash;

        Ok(())
    }

    /// Execute a transaction
    pub fn execute_transaction(
        &mut self,
        tx: &Transaction,
    ) -> BlockchainResult<TransactionReceipt> {
        // Validate transaction
        tx.validate_basic()?;

        // Check nonce
        let current_nonce = self.state.get_nonce(&tx.from);
        if tx.nonce != current_nonce {
            return Err(BlockchainError::NonceMismatch);
        }

        // Check balance for gas
        let max_gas_cost = Amount::from_u64(tx.gas_limit * tx.gas_price);
        let sender_balance = self.state.get_balance(&tx.from);
        if sender_balance.inner() < max_gas_cost.inner() {
            return Err(BlockchainError::InsufficientBalance);
        }

        // Execute transaction based on type
        self.state.checkpoint();
        
        let result = self.execute_transaction_type(tx);
        
        match result {
            Ok(receipt) => {
                self.state.commit();
                Ok(receipt)
            }
            Err(e) => {
                self.state.rollback();
                Err(e)
            }
        }
    }

    fn execute_transaction_type(
        &mut self,
        tx: &Transaction,
    ) -> BlockchainResult<TransactionReceipt> {
        use crate::transaction::TransactionType;

        // Increment nonce
        self.state.get_account_mut(&tx.from).increment_nonce();

        let status = match &tx.tx_type {
            TransactionType::Transfer { to, amount } => {
                self.state.transfer(&tx.from, to, amount)?;
                crate::transaction::ExecutionStatus::Success
            }
            TransactionType::Stake { amount } => {
                self.state.get_account_mut(&tx.from).stake(amount)?;
                crate::transaction::ExecutionStatus::Success
            }
            TransactionType::Unstake { amount } => {
                self.state.get_account_mut(&tx.from).unstake(amount)?;
                crate::transaction::ExecutionStatus::Success
            }
        };

        // Deduct gas fee
        let gas_used = 21000; // Simplified, would calculate actual usage
        let gas_fee = tx.calculate_fee(gas_used);
        self.state.get_account_mut(&tx.from).sub_balance(&gas_fee)?;

        // Create receipt
        let receipt = TransactionReceipt {
            tx_hash: tx.hash(),
            block_number: self.height() + 1, // Will be in next block
            from: tx.from,
            to: tx.recipient(),
            gas_used,
            status,
            contract_address: None,
            logs: Vec::new(),
        };

        // Store receipt
        self.receipts.insert(tx.hash(), receipt.clone());

        Ok(receipt)
    }

    /// Remove the current head block, restoring `state` to `prior_state` and
    /// the chain pointer to the removed block's parent. Used by
    /// [`BlockProcessor::delete_last_block`] to revert the tip.
    pub fn remove_head_block(&mut self, prior_state: WorldState) -> BlockchainResult<Block> {
        if self.head == self.genesis {
            return Err(BlockchainError::InvalidChain(
                "cannot remove the genesis block".into(),
            ));
        }

        let removed = self.blocks.remove(&self.head)
            .ok_or_else(|| BlockchainError::BlockNotFound(self.head))?;
        self.block_by_number.remove(&removed.number());

        self.head = removed.header.parent_hash;
        self.state = prior_state;

        Ok(removed)
    }

    /// Re-insert a previously removed block without re-validating it against
    /// its parent. Used to restore a block from the temp-block table.
    pub fn restore_block(&mut self, block: Block, new_state: WorldState) {
        let hash = block.hash();
        let number = block.number();
        self.block_by_number.insert(number, hash);
        self.blocks.insert(hash, block);
        self.head = hash;
        self.state = new_state;
    }

    /// Verify the entire chain
    pub fn verify_chain(&self) -> BlockchainResult<()> {
        let mut current = self.genesis_block().clone();
        let height = self.height();

        for i in 1..=height {
            let next = self.get_block_by_number(i)
                .ok_or_else(|| BlockchainError::InvalidChain(
                    format!("Missing block at height {}", i)
                ))?;
            
            next.validate(&current)?;
            current = next.clone();
        }

        Ok(())
    }
}

/// Default number of recent per-height world-state snapshots kept so that
/// `delete_last_block` can revert without replaying the whole chain.
pub const COMMIT_RANGE_STORED: usize = 50;

/// Events emitted while processing a block, mirroring the four typed
/// notifications the consensus coordinator forwards to the network layer.
#[derive(Debug, Clone)]
pub enum BlockEvent {
    BlockNew { block: Block },
    BlockDelete { block: Block },
    BlockBroadcast { block: Block },
    ForkDetected { height: BlockNumber, status: crate::fork::ForkStatus },
}

/// Options controlling how a received block is processed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Broadcast the block to peers once it has been applied.
    pub broadcast: bool,
    /// Skip re-validating a block already known to be valid (e.g. one this
    /// node produced itself).
    pub skip_verify: bool,
}

/// Result of [`BlockProcessor::on_block_receive`]: either the block was
/// applied (possibly after a tie-break swap), discarded outright, or it
/// belongs to a heavier chain the caller must fetch via the synchronizer
/// before it can be applied.
#[derive(Debug, Clone)]
pub enum ReceiveOutcome {
    Applied(Vec<BlockEvent>),
    Discarded { status: crate::fork::ForkStatus, events: Vec<BlockEvent> },
    NeedsSync { status: crate::fork::ForkStatus },
}

/// Wraps [`Blockchain`] with the block-processing pipeline described for the
/// consensus coordinator: verify/classify, execute, delete-with-revert, and
/// a bounded temp-block table used during chain switches.
pub struct BlockProcessor {
    chain: Blockchain,
    finalized_height: BlockNumber,
    /// Local wall-clock time at which the current tip was received, used by
    /// the fork-choice rule to decide whether it is still live for its slot.
    tip_received_at: Timestamp,
    /// World state immediately before the block at this height was applied,
    /// capped at `COMMIT_RANGE_STORED` entries (oldest dropped first).
    pre_state_by_height: std::collections::BTreeMap<BlockNumber, WorldState>,
    /// Most recently deleted blocks, kept so a fast chain-switch can restore
    /// them without a network round-trip.
    temp_blocks: Vec<Block>,
}

impl BlockProcessor {
    /// Build a processor around an already-initialized chain. Loading the
    /// genesis block is idempotent: constructing a `Blockchain` always
    /// starts from a genesis block, so repeated calls with the same genesis
    /// simply produce an equivalent processor.
    pub fn new(chain: Blockchain) -> Self {
        Self {
            chain,
            finalized_height: 0,
            tip_received_at: 0,
            pre_state_by_height: std::collections::BTreeMap::new(),
            temp_blocks: Vec::new(),
        }
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn height(&self) -> BlockNumber {
        self.chain.height()
    }

    pub fn finalized_height(&self) -> BlockNumber {
        self.finalized_height
    }

    /// Advance the finalized height. Returns an error if `height` would move
    /// it backwards, since finality is meant to be monotonic.
    pub fn set_finalized_height(&mut self, height: BlockNumber) -> BlockchainResult<()> {
        if height < self.finalized_height {
            return Err(BlockchainError::InvalidChain(format!(
                "finalized height cannot move backwards: {} -> {}",
                self.finalized_height, height
            )));
        }
        self.finalized_height = height;
        self.prune_snapshots();
        Ok(())
    }

    /// Classify `block` against the current tip without mutating state.
    /// `now` is the local wall-clock time used to reject headers forged for
    /// a slot that hasn't arrived yet.
    pub fn verify(&self, block: &Block, now: Timestamp) -> crate::fork::ForkStatus {
        crate::fork::classify(self.chain.head_block(), self.tip_received_at, block, now)
    }

    /// Classify and dispatch a block received from a peer, following the
    /// fork-choice dispatch table: identical/double-forging/discard are
    /// reported back without touching the chain, a different (heavier)
    /// chain is reported back so the caller can hand it to the
    /// synchronizer, and a valid extension or same-height tie-break is
    /// applied directly. `received_at` is the local time the block arrived,
    /// recorded as its tip-received time if it becomes the new head.
    pub fn on_block_receive(
        &mut self,
        block: Block,
        received_at: Timestamp,
        opts: ExecuteOptions,
    ) -> BlockchainResult<ReceiveOutcome> {
        use crate::fork::ForkStatus;

        let status = self.verify(&block, received_at);

        match status {
            ForkStatus::IdenticalBlock => Ok(ReceiveOutcome::Discarded { status, events: Vec::new() }),
            ForkStatus::DoubleForging | ForkStatus::Discard => {
                let events = vec![BlockEvent::ForkDetected { height: block.number(), status }];
                Ok(ReceiveOutcome::Discarded { status, events })
            }
            ForkStatus::DifferentChain => Ok(ReceiveOutcome::NeedsSync { status }),
            ForkStatus::ValidBlock => {
                self.execute_validated(block.clone(), received_at)?;
                let mut events = vec![BlockEvent::BlockNew { block: block.clone() }];
                if opts.broadcast {
                    events.push(BlockEvent::BlockBroadcast { block });
                }
                Ok(ReceiveOutcome::Applied(events))
            }
            ForkStatus::TieBreak => {
                let tip = self.chain.head_block().clone();
                let tip_received_at = self.tip_received_at;
                let delete_event = self.delete_last_block(false)?;

                match self.execute_validated(block.clone(), received_at) {
                    Ok(()) => {
                        let mut events = vec![delete_event, BlockEvent::BlockNew { block: block.clone() }];
                        if opts.broadcast {
                            events.push(BlockEvent::BlockBroadcast { block });
                        }
                        Ok(ReceiveOutcome::Applied(events))
                    }
                    Err(e) => {
                        // Restore the original tip; its own re-application is
                        // never broadcast since nothing about it is new.
                        self.execute_validated(tip, tip_received_at)?;
                        Err(e)
                    }
                }
            }
        }
    }

    /// Apply a block already known (by the caller) to be a valid extension
    /// or winning tie-break of the current tip: verify → apply → save →
    /// emit, without redoing fork-choice classification. Used by the block
    /// sync and fast chain-switch mechanisms, which already know the blocks
    /// they feed in are meant to become the new tip.
    pub fn execute(
        &mut self,
        block: Block,
        received_at: Timestamp,
        opts: ExecuteOptions,
    ) -> BlockchainResult<Vec<BlockEvent>> {
        use crate::fork::ForkStatus;

        let status = if opts.skip_verify {
            ForkStatus::ValidBlock
        } else {
            self.verify(&block, received_at)
        };

        let mut events = Vec::new();

        match status {
            ForkStatus::IdenticalBlock => {
                // Already applied; nothing to do.
            }
            ForkStatus::DoubleForging | ForkStatus::Discard => {
                events.push(BlockEvent::ForkDetected { height: block.number(), status });
                return Err(BlockchainError::ForkDetected(format!("{:?}", status)));
            }
            ForkStatus::TieBreak | ForkStatus::DifferentChain => {
                events.push(BlockEvent::ForkDetected { height: block.number(), status });
                self.execute_validated(block.clone(), received_at)?;
                events.push(BlockEvent::BlockNew { block: block.clone() });
                if opts.broadcast {
                    events.push(BlockEvent::BlockBroadcast { block });
                }
            }
            ForkStatus::ValidBlock => {
                self.execute_validated(block.clone(), received_at)?;
                events.push(BlockEvent::BlockNew { block: block.clone() });
                if opts.broadcast {
                    events.push(BlockEvent::BlockBroadcast { block });
                }
            }
        }

        Ok(events)
    }

    /// Apply a block's transactions and append it to the chain, recording a
    /// pre-block state snapshot for later reversion.
    fn execute_validated(&mut self, block: Block, received_at: Timestamp) -> BlockchainResult<()> {
        let height = block.number();
        let snapshot = self.chain.state().clone();

        for tx in &block.transactions {
            if let Err(e) = self.chain.execute_transaction(tx) {
                return Err(e);
            }
        }

        let result = self.chain.add_block(block);
        if result.is_ok() {
            self.pre_state_by_height.insert(height, snapshot);
            self.tip_received_at = received_at;
            self.prune_snapshots();
        }
        result
    }

    fn prune_snapshots(&mut self) {
        while self.pre_state_by_height.len() > COMMIT_RANGE_STORED {
            if let Some(&oldest) = self.pre_state_by_height.keys().next() {
                self.pre_state_by_height.remove(&oldest);
            } else {
                break;
            }
        }
        // Never retain snapshots for already-finalized heights; they can't
        // be reverted past anyway.
        let floor = self.finalized_height;
        self.pre_state_by_height.retain(|&height, _| height > floor);
    }

    /// Delete the current tip block, reverting chain state to just before it
    /// was applied. Refuses to delete at or below the finalized height.
    /// When `save_temp_block` is set, the removed block is kept in the
    /// temp-block table so a subsequent chain switch can restore it quickly.
    pub fn delete_last_block(&mut self, save_temp_block: bool) -> BlockchainResult<BlockEvent> {
        let height = self.chain.height();
        if height <= self.finalized_height {
            return Err(BlockchainError::BelowFinalizedHeight { height: self.finalized_height });
        }

        let prior_state = self.pre_state_by_height.remove(&height)
            .ok_or_else(|| BlockchainError::InvalidChain(format!(
                "no retained state snapshot for height {}; cannot safely delete", height
            )))?;

        let removed = self.chain.remove_head_block(prior_state)?;

        if save_temp_block {
            self.temp_blocks.push(removed.clone());
            if self.temp_blocks.len() > COMMIT_RANGE_STORED {
                self.temp_blocks.remove(0);
            }
        }

        Ok(BlockEvent::BlockDelete { block: removed })
    }

    /// Re-apply the most recently deleted block from the temp-block table,
    /// if one is available (used by the fast chain-switch mechanism).
    pub fn restore_temp_block(&mut self) -> BlockchainResult<Option<Block>> {
        let Some(block) = self.temp_blocks.pop() else {
            return Ok(None);
        };
        let snapshot = self.chain.state().clone();
        for tx in &block.transactions {
            self.chain.execute_transaction(tx)?;
        }
        let new_state = self.chain.state().clone();
        self.chain.restore_block(block.clone(), new_state);
        self.pre_state_by_height.insert(block.number(), snapshot);
        self.tip_received_at = crate::current_timestamp();
        Ok(Some(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blockchain_creation() {
        let genesis = Block::genesis(Hash::zero());
        let chain = Blockchain::new(genesis).unwrap();
        
        assert_eq!(chain.height(), 0);
        assert!(chain.genesis_block().is_genesis());
    }

    #[test]
    fn test_add_block() {
        let genesis = Block::genesis(Hash::zero());
        let mut chain = Blockchain::new(genesis.clone()).unwrap();
        
        let block1 = Block::new(
            1,
            genesis.hash(),
            chain.state().state_root(),
            Address::zero(),
            vec![],
            10_000_000,
        ).unwrap();
        
        chain.add_block(block1).unwrap();
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn test_get_block_by_number() {
        let genesis = Block::genesis(Hash::zero());
        let chain = Blockchain::new(genesis).unwrap();
        
        let block = chain.get_block_by_number(0);
        assert!(block.is_some());
        assert_eq!(block.unwrap().number(), 0);
    }

    #[test]
    fn test_block_processor_execute_and_delete() {
        let genesis = Block::genesis(Hash::zero());
        let chain = Blockchain::new(genesis.clone()).unwrap();
        let mut processor = BlockProcessor::new(chain);

        let block1 = Block::new(
            1,
            genesis.hash(),
            processor.chain().state().state_root(),
            Address::zero(),
            vec![],
            10_000_000,
        ).unwrap();

        let events = processor.execute(block1.clone(), 0, ExecuteOptions::default()).unwrap();
        assert_eq!(processor.height(), 1);
        assert!(matches!(events[0], BlockEvent::BlockNew { .. }));

        let delete_event = processor.delete_last_block(true).unwrap();
        assert_eq!(processor.height(), 0);
        assert!(matches!(delete_event, BlockEvent::BlockDelete { .. }));

        let restored = processor.restore_temp_block().unwrap();
        assert!(restored.is_some());
        assert_eq!(processor.height(), 1);
    }

    #[test]
    fn test_block_processor_refuses_delete_below_finalized() {
        let genesis = Block::genesis(Hash::zero());
        let chain = Blockchain::new(genesis.clone()).unwrap();
        let mut processor = BlockProcessor::new(chain);

        let block1 = Block::new(
            1,
            genesis.hash(),
            processor.chain().state().state_root(),
            Address::zero(),
            vec![],
            10_000_000,
        ).unwrap();
        processor.execute(block1, 0, ExecuteOptions::default()).unwrap();
        processor.set_finalized_height(1).unwrap();

        let err = processor.delete_last_block(false).unwrap_err();
        assert!(matches!(err, BlockchainError::BelowFinalizedHeight { height: 1 }));
    }

    #[test]
    fn test_on_block_receive_applies_valid_extension() {
        let genesis = Block::genesis(Hash::zero());
        let chain = Blockchain::new(genesis.clone()).unwrap();
        let mut processor = BlockProcessor::new(chain);

        let block1 = Block::new(
            1,
            genesis.hash(),
            processor.chain().state().state_root(),
            Address::zero(),
            vec![],
            10_000_000,
        ).unwrap();

        let outcome = processor.on_block_receive(block1, 0, ExecuteOptions::default()).unwrap();
        match outcome {
            ReceiveOutcome::Applied(events) => {
                assert!(matches!(events[0], BlockEvent::BlockNew { .. }));
            }
            other => panic!("expected Applied, got {:?}", other),
        }
        assert_eq!(processor.height(), 1);
    }

    #[test]
    fn test_on_block_receive_tie_break_swaps_tip() {
        let genesis = Block::genesis(Hash::zero());
        let chain = Blockchain::new(genesis.clone()).unwrap();
        let mut processor = BlockProcessor::new(chain);

        let state_root = processor.chain().state().state_root();
        let proposer_a = Address::zero();
        let proposer_b = Address::new([7u8; 20]);

        let mut block_a = Block::new(1, genesis.hash(), state_root, proposer_a, vec![], 10_000_000)
            .unwrap()
            .with_bft_fields(Hash::zero(), 0, 0, None);
        block_a.header.timestamp = 1000;
        // Received well after its own slot (ends at 1010): stale for a
        // later same-slot rival to contest.
        processor
            .on_block_receive(block_a, 1010, ExecuteOptions::default())
            .unwrap();
        assert_eq!(processor.height(), 1);

        // Same height, same slot, different proposer, arriving in time: the
        // incoming block wins the tie break and replaces the stale tip.
        let mut block_b = Block::new(1, genesis.hash(), state_root, proposer_b, vec![], 10_000_000)
            .unwrap()
            .with_bft_fields(Hash::zero(), 0, 0, None);
        block_b.header.timestamp = 1005;

        let outcome = processor
            .on_block_receive(block_b.clone(), 1006, ExecuteOptions::default())
            .unwrap();
        match outcome {
            ReceiveOutcome::Applied(events) => {
                assert!(matches!(events[0], BlockEvent::BlockDelete { .. }));
                assert!(matches!(events[1], BlockEvent::BlockNew { .. }));
            }
            other => panic!("expected Applied, got {:?}", other),
        }
        assert_eq!(processor.chain().head_block().header.proposer, proposer_b);
    }

    #[test]
    fn test_on_block_receive_discards_tie_break_within_slot() {
        let genesis = Block::genesis(Hash::zero());
        let chain = Blockchain::new(genesis.clone()).unwrap();
        let mut processor = BlockProcessor::new(chain);

        let state_root = processor.chain().state().state_root();
        let proposer_a = Address::zero();
        let proposer_b = Address::new([7u8; 20]);

        let mut block_a = Block::new(1, genesis.hash(), state_root, proposer_a, vec![], 10_000_000)
            .unwrap()
            .with_bft_fields(Hash::zero(), 0, 0, None);
        block_a.header.timestamp = 1000;
        // Received within its own slot: still live, no tie break should win.
        processor
            .on_block_receive(block_a, 1002, ExecuteOptions::default())
            .unwrap();

        let mut block_b = Block::new(1, genesis.hash(), state_root, proposer_b, vec![], 10_000_000)
            .unwrap()
            .with_bft_fields(Hash::zero(), 0, 0, None);
        block_b.header.timestamp = 1005;

        let outcome = processor
            .on_block_receive(block_b, 1006, ExecuteOptions::default())
            .unwrap();
        match outcome {
            ReceiveOutcome::Discarded { status: crate::fork::ForkStatus::Discard, events } => {
                assert!(matches!(events[0], BlockEvent::ForkDetected { .. }));
            }
            other => panic!("expected Discarded, got {:?}", other),
        }
        assert_eq!(processor.height(), 1);
        assert_eq!(processor.chain().head_block().header.proposer, proposer_a);
    }

    #[test]
    fn test_on_block_receive_discards_double_forging() {
        let genesis = Block::genesis(Hash::zero());
        let chain = Blockchain::new(genesis.clone()).unwrap();
        let mut processor = BlockProcessor::new(chain);

        let state_root = processor.chain().state().state_root();
        let proposer = Address::zero();

        let block_a = Block::new(1, genesis.hash(), state_root, proposer, vec![], 10_000_000)
            .unwrap()
            .with_bft_fields(Hash::zero(), 0, 0, None);
        processor
            .on_block_receive(block_a, 0, ExecuteOptions::default())
            .unwrap();

        let block_b = Block::new(1, genesis.hash(), state_root, proposer, vec![], 9_000_000)
            .unwrap()
            .with_bft_fields(Hash::zero(), 0, 0, None);

        let outcome = processor
            .on_block_receive(block_b, 0, ExecuteOptions::default())
            .unwrap();
        match outcome {
            ReceiveOutcome::Discarded { status: crate::fork::ForkStatus::DoubleForging, events } => {
                assert!(matches!(events[0], BlockEvent::ForkDetected { .. }));
            }
            other => panic!("expected Discarded, got {:?}", other),
        }
        assert_eq!(processor.height(), 1);
    }
}