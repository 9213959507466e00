// blockchain-core/src/fork.rs

use crate::{Block, Timestamp};
use serde::{Deserialize, Serialize};

/// Length of a forging slot in seconds. Not pinned by an external constant;
/// chosen so the tie-break boundary matches the spec's worked example (a tip
/// timestamped 1000 that is still live at 1010 triggers a tie break).
pub const SLOT_PERIOD_SECONDS: u64 = 10;

/// Slot index a timestamp falls into.
pub fn slot_of(timestamp: Timestamp) -> u64 {
    timestamp / SLOT_PERIOD_SECONDS
}

/// First timestamp of the slot *after* the one containing `timestamp`, i.e.
/// the instant at which a block forged in that slot is considered stale.
fn slot_end(timestamp: Timestamp) -> Timestamp {
    (slot_of(timestamp) + 1) * SLOT_PERIOD_SECONDS
}

/// Outcome of classifying a newly received block against the current chain
/// tip, telling the block processor exactly what to do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForkStatus {
    /// The incoming block is the same block already at the tip.
    IdenticalBlock,
    /// Same generator produced two different blocks at the same height.
    DoubleForging,
    /// Same height and slot, different generator, and the current tip was
    /// received after its own slot closed: resolved by swapping in the
    /// incoming block rather than a reorg.
    TieBreak,
    /// The incoming block extends a chain that is heavier (more prevoted
    /// weight) than the current tip and requires switching chains.
    DifferentChain,
    /// The incoming block is a normal, valid extension of the current tip.
    ValidBlock,
    /// The incoming block is stale or lighter than the current tip.
    Discard,
}

/// Classify `new_block` against `current_head` following the ordered rule
/// evaluation: identical block, then normal extension, then same-height
/// conflicts (double forging / tie break), then cross-chain weight
/// comparison, defaulting to discard.
///
/// `tip_received_at` is the local wall-clock time at which `current_head` was
/// received (not its embedded header timestamp); `now` is the current time,
/// used to reject incoming headers forged for a slot that hasn't arrived yet.
pub fn classify(
    current_head: &Block,
    tip_received_at: Timestamp,
    new_block: &Block,
    now: Timestamp,
) -> ForkStatus {
    if new_block.hash() == current_head.hash() {
        return ForkStatus::IdenticalBlock;
    }

    if new_block.number() == current_head.number() + 1
        && new_block.header.parent_hash == current_head.hash()
    {
        return ForkStatus::ValidBlock;
    }

    let same_height = new_block.number() == current_head.number();
    let same_parent = new_block.header.parent_hash == current_head.header.parent_hash;

    if same_height && same_parent && new_block.header.proposer == current_head.header.proposer {
        return ForkStatus::DoubleForging;
    }

    let same_slot = slot_of(new_block.header.timestamp) == slot_of(current_head.header.timestamp);
    let header_not_future = slot_of(new_block.header.timestamp) <= slot_of(now);
    let tip_received_late = tip_received_at >= slot_end(current_head.header.timestamp);

    if same_height && same_slot && header_not_future && tip_received_late {
        return ForkStatus::TieBreak;
    }

    let heavier = new_block.header.max_height_prevoted > current_head.header.max_height_prevoted
        || (new_block.header.max_height_prevoted == current_head.header.max_height_prevoted
            && new_block.number() > current_head.number());

    if heavier {
        return ForkStatus::DifferentChain;
    }

    ForkStatus::Discard
}
