//! Proof-of-work search over a candidate block.
//!
//! `mine` is synchronous and CPU-bound by design — the only suspension
//! point in the whole node that isn't an I/O wait. The caller is
//! expected to run it on a blocking thread (`tokio::task::spawn_blocking`)
//! and cancel it via the `CancellationToken` from another task.

use tokio_util::sync::CancellationToken;

use crate::block::{Block, BlockHeader};
use crate::error::{NodeError, Result};
use crate::primitives::Address;
use crate::primitives::Hash;
use crate::transaction::SignedTransaction;

/// A not-yet-sealed block: everything `mine` needs except a winning nonce.
pub struct Candidate {
    pub parent: Hash,
    pub number: u64,
    pub miner: Address,
    pub txs: Vec<SignedTransaction>,
    pub time: u64,
}

/// Search `nonce` over `u32` starting from 0 until the block hash
/// satisfies `difficulty`, or until `cancel` fires.
///
/// On a full `u32` wraparound without success, `time` is bumped by one
/// second to move into a fresh nonce space — difficulty 0-2 never
/// exhausts a u32 in practice, but the fallback keeps the search total
/// rather than merely probabilistic.
pub fn mine(candidate: Candidate, difficulty: u32, cancel: &CancellationToken) -> Result<Block> {
    let mut block = Block::new(
        BlockHeader {
            parent: candidate.parent,
            number: candidate.number,
            nonce: 0,
            time: candidate.time,
            miner: candidate.miner,
        },
        candidate.txs,
    );

    loop {
        if cancel.is_cancelled() {
            return Err(NodeError::MiningCancelled);
        }

        if block.meets_difficulty(difficulty) {
            return Ok(block);
        }

        let (next_nonce, overflowed) = block.header.nonce.overflowing_add(1);
        block.header.nonce = next_nonce;
        if overflowed {
            block.header.time = block.header.time.saturating_add(1);
        }
    }
}
