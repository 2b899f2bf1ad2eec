//! The deterministic ledger: balances, nonces, block application and
//! rewind, and fork-point detection. State owns the `ChainStore` and is
//! the only component that touches the chain log on disk.

use std::collections::HashMap;
use std::path::Path;

use crate::block::{Block, BlockRecord};
use crate::chain_store::{ChainStore, Genesis};
use crate::error::{NodeError, Result};
use crate::primitives::{Address, Hash};
use crate::transaction::SignedTransaction;

/// Fixed protocol reward credited to the miner of each block, in
/// addition to the fees of the transactions it includes.
pub const BLOCK_REWARD: u64 = 100;

/// Balances and nonces only — the minimal mutable ledger shared by
/// `State` (the canonical chain) and the mempool's pending-state
/// shadow. Kept as its own type so the shadow can be a true deep copy
/// that never points into `State`'s maps.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub balances: HashMap<Address, u64>,
    pub next_nonces: HashMap<Address, u64>,
}

impl Ledger {
    pub fn balance(&self, addr: &Address) -> u64 {
        *self.balances.get(addr).unwrap_or(&0)
    }

    pub fn next_nonce(&self, addr: &Address) -> u64 {
        *self.next_nonces.get(addr).unwrap_or(&0)
    }

    pub fn credit(&mut self, addr: Address, amount: u64) {
        *self.balances.entry(addr).or_insert(0) += amount;
    }

    pub fn debit(&mut self, addr: Address, amount: u64) {
        let entry = self.balances.entry(addr).or_insert(0);
        *entry = entry.saturating_sub(amount);
    }

    /// Authenticity, nonce, and balance checks, then debit/credit/nonce
    /// update. Used both for real block application and for pending-state
    /// admission in the mempool.
    pub fn apply_tx(&mut self, signed: &SignedTransaction) -> Result<()> {
        signed.require_authentic()?;

        let tx = &signed.tx;
        let expected_nonce = self.next_nonce(&tx.from) + 1;
        if tx.nonce != expected_nonce {
            return Err(NodeError::InvalidNonce { expected: expected_nonce, found: tx.nonce });
        }

        let cost = tx.cost();
        let available = self.balance(&tx.from);
        if available < cost {
            return Err(NodeError::InsufficientBalance {
                address: tx.from.hex(),
                required: cost,
                available,
            });
        }

        self.debit(tx.from, cost);
        self.credit(tx.to, tx.value);
        self.next_nonces.insert(tx.from, tx.nonce);
        Ok(())
    }

    /// Inverse of `apply_tx`: credit back the sender's cost, debit the
    /// recipient's value, and decrement the sender's nonce back to
    /// `tx.nonce - 1`. Used by `State::remove_blocks`.
    pub fn reverse_tx(&mut self, signed: &SignedTransaction) {
        let tx = &signed.tx;
        self.credit(tx.from, tx.cost());
        self.debit(tx.to, tx.value);
        if tx.nonce == 0 {
            self.next_nonces.remove(&tx.from);
        } else {
            self.next_nonces.insert(tx.from, tx.nonce - 1);
        }
    }
}

pub struct State {
    ledger: Ledger,
    store: ChainStore,
    latest_block: Option<Block>,
    latest_hash: Hash,
    has_genesis: bool,
    difficulty: u32,
    hash_index: HashMap<String, u64>,
    height_index: HashMap<u64, u64>,
}

impl State {
    /// Initialize the data directory (genesis file + empty chain log if
    /// absent), then scan and apply every block already on disk.
    pub fn replay(dir: &Path, difficulty: u32, default_genesis: &Genesis) -> Result<Self> {
        let (mut store, genesis) = ChainStore::init_if_absent(dir, default_genesis)?;

        let mut ledger = Ledger::default();
        for (address, amount) in genesis.balances()? {
            ledger.credit(address, amount);
        }

        let records = store.scan()?;

        let mut state = State {
            ledger,
            store,
            latest_block: None,
            latest_hash: Hash::zero(),
            has_genesis: false,
            difficulty,
            hash_index: HashMap::new(),
            height_index: HashMap::new(),
        };

        for (offset, record) in records {
            state.apply_block_at(record.value, Some(offset))?;
        }

        Ok(state)
    }

    pub fn latest_hash(&self) -> Hash {
        self.latest_hash
    }

    pub fn latest_number(&self) -> u64 {
        self.latest_block.as_ref().map(|b| b.header.number).unwrap_or(0)
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.latest_block.as_ref()
    }

    pub fn has_genesis(&self) -> bool {
        self.has_genesis
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn balance(&self, addr: &Address) -> u64 {
        self.ledger.balance(addr)
    }

    pub fn next_nonce(&self, addr: &Address) -> u64 {
        self.ledger.next_nonce(addr)
    }

    pub fn balances(&self) -> &HashMap<Address, u64> {
        &self.ledger.balances
    }

    /// A deep copy of balances + nonces only, never pointing into this
    /// State's maps. Used by the mempool as the pending-state shadow.
    pub fn pending_ledger(&self) -> Ledger {
        self.ledger.clone()
    }

    /// The on-disk envelope `{key, value}` for the block at `height`,
    /// matching the wire/disk shape of a chain-log line (`BlockFS` in the
    /// original implementation).
    pub fn block_record_at_height(&mut self, height: u64) -> Result<BlockRecord> {
        let offset = *self
            .height_index
            .get(&height)
            .ok_or_else(|| NodeError::BlockNotFound(format!("height {height}")))?;
        self.store.read_at(offset)
    }

    /// The on-disk envelope `{key, value}` for the block with hash `hash`.
    pub fn block_record_by_hash(&mut self, hash: &Hash) -> Result<BlockRecord> {
        let offset = *self
            .hash_index
            .get(&hash.hex())
            .ok_or_else(|| NodeError::BlockNotFound(hash.hex()))?;
        self.store.read_at(offset)
    }

    pub fn block_at_height(&mut self, height: u64) -> Result<Block> {
        Ok(self.block_record_at_height(height)?.value)
    }

    pub fn block_by_hash(&mut self, hash: &Hash) -> Result<Block> {
        Ok(self.block_record_by_hash(hash)?.value)
    }

    /// All blocks from genesis to tip, in ascending height order.
    pub fn all_blocks(&mut self) -> Result<Vec<Block>> {
        let mut out = Vec::with_capacity(self.height_index.len());
        for h in 0..=self.latest_number() {
            if self.height_index.contains_key(&h) {
                out.push(self.block_at_height(h)?);
            }
        }
        Ok(out)
    }

    /// Blocks strictly after `from_hash`; empty hash means from genesis.
    pub fn blocks_after(&mut self, from_hash: &Hash) -> Result<Vec<Block>> {
        if from_hash.is_zero() {
            return self.all_blocks();
        }
        let start_height = {
            let offset = *self
                .hash_index
                .get(&from_hash.hex())
                .ok_or_else(|| NodeError::BlockNotFound(from_hash.hex()))?;
            self.store.read_at(offset)?.value.header.number
        };
        let mut out = Vec::new();
        for h in (start_height + 1)..=self.latest_number() {
            if self.height_index.contains_key(&h) {
                out.push(self.block_at_height(h)?);
            }
        }
        Ok(out)
    }

    /// Validate and apply `block`, persisting it to the chain log only on
    /// complete success (all-or-nothing).
    pub fn apply_block(&mut self, block: Block) -> Result<()> {
        self.apply_block_at(block, None)
    }

    /// Shared implementation for both fresh application (`offset = None`,
    /// in which case the block is appended to the log) and replay
    /// (`offset = Some(existing)`, in which case the block is assumed
    /// already on disk at that offset and is only validated + folded into
    /// the in-memory ledger/indices).
    fn apply_block_at(&mut self, block: Block, offset: Option<u64>) -> Result<()> {
        // Step 1: height must be exactly one past the tip once we have a genesis.
        if self.has_genesis {
            let expected = self.latest_number() + 1;
            if block.header.number != expected {
                return Err(NodeError::InvalidBlock(format!(
                    "expected block number {expected}, got {}",
                    block.header.number
                )));
            }
        }

        // Step 2: parent check, intentionally skipped for the block that
        // immediately follows genesis (latest.number == 0) — see SPEC_FULL.md §9.
        if self.has_genesis && self.latest_number() > 0 && block.header.parent != self.latest_hash {
            return Err(NodeError::InvalidBlock(format!(
                "block parent {} does not match latest hash {}",
                block.header.parent, self.latest_hash
            )));
        }

        // Step 3: proof-of-work validity against the current difficulty.
        let block_hash = block.hash();
        if !block_hash.meets_difficulty(self.difficulty) {
            return Err(NodeError::InvalidBlock(format!(
                "block hash {block_hash} does not satisfy difficulty {}",
                self.difficulty
            )));
        }

        // Step 4: apply transactions in ascending `time` order, on a shallow
        // copy first so a mid-block failure leaves State untouched.
        let mut candidate_ledger = self.ledger.clone();
        let mut ordered_txs: Vec<&SignedTransaction> = block.txs.iter().collect();
        ordered_txs.sort_by_key(|tx| tx.tx.time);
        for signed in &ordered_txs {
            candidate_ledger.apply_tx(signed)?;
        }

        // Step 5: credit the miner with the block reward plus accumulated fees.
        let fee_total = crate::transaction::TX_FEE * block.txs.len() as u64;
        candidate_ledger.credit(block.header.miner, BLOCK_REWARD + fee_total);

        // All checks passed: commit.
        self.ledger = candidate_ledger;
        let record = BlockRecord::new(block);
        let record_offset = match offset {
            Some(existing) => existing,
            None => self.store.append(&record)?,
        };
        self.hash_index.insert(record.key.hex(), record_offset);
        self.height_index.insert(record.value.header.number, record_offset);
        self.latest_hash = record.key;
        self.latest_block = Some(record.value);
        self.has_genesis = true;

        Ok(())
    }

    /// Pop blocks from the tip back toward, but not including, `target`.
    /// Fails if `target` is never reached (it is not on the local chain).
    pub fn remove_blocks(&mut self, target: Hash) -> Result<()> {
        loop {
            if self.latest_hash == target {
                return Ok(());
            }
            let Some(current) = self.latest_block.clone() else {
                return Err(NodeError::NoForkFound);
            };

            let mut ordered_txs: Vec<&SignedTransaction> = current.txs.iter().collect();
            ordered_txs.sort_by_key(|tx| tx.tx.time);
            for signed in ordered_txs.into_iter().rev() {
                self.ledger.reverse_tx(signed);
            }
            let fee_total = crate::transaction::TX_FEE * current.txs.len() as u64;
            self.ledger.debit(current.header.miner, BLOCK_REWARD + fee_total);

            let popped_hash = self.latest_hash;
            let popped_offset = *self
                .height_index
                .get(&current.header.number)
                .ok_or(NodeError::NoForkFound)?;

            self.hash_index.remove(&popped_hash.hex());
            self.height_index.remove(&current.header.number);

            let parent_hash = current.header.parent;
            let parent_block = if current.header.number == 0 {
                None
            } else {
                let parent_offset = *self
                    .hash_index
                    .get(&parent_hash.hex())
                    .ok_or(NodeError::NoForkFound)?;
                Some(self.store.read_at(parent_offset)?.value)
            };

            self.store.truncate_to(popped_offset)?;

            match parent_block {
                Some(parent) => {
                    self.latest_hash = parent_hash;
                    self.latest_block = Some(parent);
                }
                None => {
                    self.latest_hash = Hash::zero();
                    self.latest_block = None;
                    self.has_genesis = false;
                }
            }

            if self.latest_hash == target {
                return Ok(());
            }
            if self.latest_block.is_none() {
                return Err(NodeError::NoForkFound);
            }
        }
    }

    /// Walk the local chain in parallel with `peer_blocks` from genesis.
    /// The fork point is the last block where both agree AND the next
    /// local block's timestamp is strictly less than the corresponding
    /// peer block's timestamp (rewarding older competing chains — a
    /// non-standard tie-break retained for compatibility).
    pub fn find_fork_point(&mut self, peer_blocks: &[Block]) -> Result<Hash> {
        let common_len = std::cmp::min(self.latest_number() as usize + 1, peer_blocks.len());
        let mut fork_point: Option<Hash> = None;

        for i in 0..common_len {
            let local = match self.height_index.get(&(i as u64)) {
                Some(&offset) => self.store.read_at(offset)?.value,
                None => break,
            };
            if local.hash() != peer_blocks[i].hash() {
                break;
            }
            if i + 1 < common_len {
                let next_local = match self.height_index.get(&((i + 1) as u64)) {
                    Some(&offset) => self.store.read_at(offset)?.value,
                    None => break,
                };
                let next_peer = &peer_blocks[i + 1];
                if next_local.header.time < next_peer.header.time {
                    fork_point = Some(local.hash());
                }
            }
        }

        fork_point.ok_or(NodeError::NoForkFound)
    }
}
