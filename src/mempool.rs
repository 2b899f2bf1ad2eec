//! The pending-transaction pool and its pending-state shadow.
//!
//! Admission hashes the transaction, rejects silently if it is already
//! pending or archived, otherwise applies it to a deep copy of the
//! ledger (the "pending-state shadow") to pre-validate authenticity,
//! nonce, and balance before ever touching the mempool map. After every
//! block application the shadow is reset from the freshly-updated
//! canonical ledger so mempool validation always reflects the latest
//! balances and nonces.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;

use crate::block::Block;
use crate::error::Result;
use crate::state::Ledger;
use crate::transaction::SignedTransaction;

pub struct Mempool {
    pending: HashMap<String, SignedTransaction>,
    archived: HashSet<String>,
    pending_ledger: Ledger,
    new_pending_tx: mpsc::UnboundedSender<SignedTransaction>,
    new_pending_tx_rx: Option<mpsc::UnboundedReceiver<SignedTransaction>>,
}

impl Mempool {
    /// Build an empty mempool whose pending-state shadow starts as a
    /// deep copy of `ledger`.
    pub fn new(ledger: Ledger) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            pending: HashMap::new(),
            archived: HashSet::new(),
            pending_ledger: ledger,
            new_pending_tx: tx,
            new_pending_tx_rx: Some(rx),
        }
    }

    /// Take the receiving half of the new-pending-tx channel. Can only be
    /// taken once; later callers get `None`.
    pub fn take_new_pending_tx_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SignedTransaction>> {
        self.new_pending_tx_rx.take()
    }

    /// Attempt to admit `tx`. Returns `Ok(true)` on admission, `Ok(false)`
    /// if the transaction was already pending or archived (a silent,
    /// non-error rejection), or `Err` if pre-validation against the
    /// pending-state shadow fails.
    pub fn admit(&mut self, tx: SignedTransaction) -> Result<bool> {
        let key = tx.hash().hex();
        if self.pending.contains_key(&key) || self.archived.contains(&key) {
            return Ok(false);
        }

        self.pending_ledger.apply_tx(&tx)?;

        self.pending.insert(key, tx.clone());
        let _ = self.new_pending_tx.send(tx);
        Ok(true)
    }

    /// Reset the pending-state shadow to a fresh copy of `ledger`,
    /// called after every block application (mined or synced).
    pub fn reset_pending_state(&mut self, ledger: Ledger) {
        self.pending_ledger = ledger;
    }

    /// Move every transaction in `block` from pending to archived,
    /// preventing re-admission of replayed transactions. Transactions
    /// that were never pending locally (e.g. included only in a synced
    /// block from a peer) are archived too, so this node never
    /// re-admits them either.
    pub fn archive_block_txs(&mut self, block: &Block) {
        for tx in &block.txs {
            let key = tx.hash().hex();
            self.pending.remove(&key);
            self.archived.insert(key);
        }
    }

    /// Discard a pending transaction without archiving it (e.g. an
    /// operator-triggered eviction). Not exercised by normal flow.
    pub fn discard(&mut self, hash_hex: &str) {
        self.pending.remove(hash_hex);
    }

    pub fn snapshot(&self) -> Vec<SignedTransaction> {
        self.pending.values().cloned().collect()
    }

    pub fn as_map(&self) -> HashMap<String, SignedTransaction> {
        self.pending.clone()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::Address;
    use crate::transaction::{sign_transaction, Transaction};

    fn keypair() -> (secp256k1::SecretKey, secp256k1::PublicKey) {
        let secp = secp256k1::Secp256k1::new();
        secp.generate_keypair(&mut rand::thread_rng())
    }

    fn funded_ledger(addr: Address, amount: u64) -> Ledger {
        let mut ledger = Ledger::default();
        ledger.credit(addr, amount);
        ledger
    }

    #[test]
    fn admitting_same_tx_twice_leaves_mempool_unchanged() {
        let (sk, pk) = keypair();
        let from = Address::from_public_key(&pk);
        let ledger = funded_ledger(from, 1000);
        let mut pool = Mempool::new(ledger);

        let tx = Transaction::new(from, Address::zero(), 100, 1, String::new(), 1000);
        let signed = sign_transaction(tx, &sk);

        assert!(pool.admit(signed.clone()).unwrap());
        assert_eq!(pool.len(), 1);
        assert!(!pool.admit(signed).unwrap());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn archived_tx_cannot_be_readmitted() {
        let (sk, pk) = keypair();
        let from = Address::from_public_key(&pk);
        let ledger = funded_ledger(from, 1000);
        let mut pool = Mempool::new(ledger);

        let tx = Transaction::new(from, Address::zero(), 100, 1, String::new(), 1000);
        let signed = sign_transaction(tx, &sk);
        pool.admit(signed.clone()).unwrap();

        let block = Block::new(
            crate::block::BlockHeader {
                parent: crate::primitives::Hash::zero(),
                number: 0,
                nonce: 0,
                time: 1000,
                miner: Address::zero(),
            },
            vec![signed.clone()],
        );
        pool.archive_block_txs(&block);
        assert!(pool.is_empty());

        assert!(!pool.admit(signed).unwrap());
    }

    #[test]
    fn rejects_insufficient_balance() {
        let (sk, pk) = keypair();
        let from = Address::from_public_key(&pk);
        let ledger = funded_ledger(from, 10);
        let mut pool = Mempool::new(ledger);

        let tx = Transaction::new(from, Address::zero(), 100, 1, String::new(), 1000);
        let signed = sign_transaction(tx, &sk);
        assert!(pool.admit(signed).is_err());
    }

    #[test]
    fn reset_pending_state_allows_next_nonce() {
        let (sk, pk) = keypair();
        let from = Address::from_public_key(&pk);
        let ledger = funded_ledger(from, 1000);
        let mut pool = Mempool::new(ledger);

        let tx1 = Transaction::new(from, Address::zero(), 100, 1, String::new(), 1000);
        pool.admit(sign_transaction(tx1, &sk)).unwrap();

        let mut next_ledger = Ledger::default();
        next_ledger.credit(from, 850);
        next_ledger.next_nonces.insert(from, 1);
        pool.reset_pending_state(next_ledger);

        let tx2 = Transaction::new(from, Address::zero(), 50, 2, String::new(), 1001);
        assert!(pool.admit(sign_transaction(tx2, &sk)).unwrap());
    }
}
