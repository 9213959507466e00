// networking/src/protocol.rs

use blockchain_core::{Block, BlockNumber};
use blockchain_crypto::Hash;
use serde::{Deserialize, Serialize};

/// Protocol message types. Limited to what the consensus core's network
/// endpoint (C8) actually speaks: the request/response pairs the
/// synchronizer uses to probe peers and fetch blocks, node-info exchange for
/// passive fork-choice hints, block propagation, and keepalive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProtocolMessage {
    /// Announce a freshly produced block to a peer, expecting it to be
    /// validated and applied rather than merely gossiped.
    PostBlock(PostBlockMessage),
    /// Exchange local node status (best block, etc) with a peer.
    PostNodeInfo(PostNodeInfoMessage),
    /// Request the peer's current chain tip.
    GetLastBlock,
    /// Response to `GetLastBlock`.
    LastBlock(LastBlockMessage),
    /// Request a batch of blocks starting after a given block id.
    GetBlocksFromId(GetBlocksFromIdMessage),
    /// Response to `GetBlocksFromId`.
    BlocksFromId(BlocksFromIdMessage),
    /// Probe a peer for the highest block id shared with the local chain,
    /// out of a geometrically-spaced list of candidate ids.
    GetHighestCommonBlock(GetHighestCommonBlockMessage),
    /// Response to `GetHighestCommonBlock`.
    HighestCommonBlock(HighestCommonBlockMessage),
    /// Ping/Pong for keepalive
    Ping,
    Pong,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostBlockMessage {
    pub block: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostNodeInfoMessage {
    pub best_block: BlockNumber,
    pub best_block_hash: Hash,
    pub finalized_height: BlockNumber,
    /// Highest height the sender considers prevoted, used by the recipient's
    /// fork-choice rule without waiting for a full block fetch.
    pub max_height_prevoted: BlockNumber,
    pub block_version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastBlockMessage {
    pub block: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBlocksFromIdMessage {
    pub block_id: Hash,
    pub max_blocks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocksFromIdMessage {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetHighestCommonBlockMessage {
    /// Candidate block ids, geometrically spaced from the local tip back
    /// toward genesis, most recent first.
    pub block_ids: Vec<Hash>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighestCommonBlockMessage {
    pub block_id: Option<Hash>,
}
