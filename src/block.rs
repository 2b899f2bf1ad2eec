//! Block headers, blocks, and the on-disk record envelope.

use serde::{Deserialize, Serialize};

use crate::primitives::{sha256, Address, Hash};
use crate::transaction::SignedTransaction;

/// Block header. Field order matters for canonical hashing of the
/// enclosing block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent: Hash,
    pub number: u64,
    pub nonce: u32,
    pub time: u64,
    pub miner: Address,
}

/// A sealed or candidate block: a header plus its ordered transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<SignedTransaction>,
}

impl Block {
    pub fn new(header: BlockHeader, txs: Vec<SignedTransaction>) -> Self {
        Self { header, txs }
    }

    pub fn is_genesis(&self) -> bool {
        self.header.number == 0
    }

    /// sha256 over the canonical JSON of {header, txs}.
    pub fn hash(&self) -> Hash {
        let bytes = serde_json::to_vec(self).expect("Block serialization is infallible");
        sha256(&bytes)
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        self.hash().meets_difficulty(difficulty)
    }
}

/// On-disk envelope: one JSON object per line in the chain log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    pub key: Hash,
    pub value: Block,
}

impl BlockRecord {
    pub fn new(block: Block) -> Self {
        Self { key: block.hash(), value: block }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64, parent: Hash) -> BlockHeader {
        BlockHeader { parent, number, nonce: 0, time: 1_000 + number, miner: Address::zero() }
    }

    #[test]
    fn genesis_detection_is_based_on_number() {
        let block = Block::new(header(0, Hash::zero()), vec![]);
        assert!(block.is_genesis());
        let child = Block::new(header(1, block.hash()), vec![]);
        assert!(!child.is_genesis());
    }

    #[test]
    fn block_record_key_matches_block_hash() {
        let block = Block::new(header(0, Hash::zero()), vec![]);
        let record = BlockRecord::new(block.clone());
        assert_eq!(record.key, block.hash());
    }

    #[test]
    fn difficulty_zero_is_always_satisfied() {
        let block = Block::new(header(0, Hash::zero()), vec![]);
        assert!(block.meets_difficulty(0));
    }

    #[test]
    fn record_round_trips_through_json() {
        let block = Block::new(header(2, Hash::zero()), vec![]);
        let record = BlockRecord::new(block);
        let line = serde_json::to_string(&record).unwrap();
        let back: BlockRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back.key, record.key);
        assert_eq!(back.value.header.number, record.value.header.number);
    }
}
