//! Transactions: the unsigned payload, the signed envelope, and the
//! authenticity check tying a signature back to its declared sender.

use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};
use crate::primitives::{recover_public_key, sha256, Address, Hash};

/// Fixed per-transaction fee, in the same unit as `value`.
pub const TX_FEE: u64 = 50;

/// Reserved `data` sentinel. Coinbase-style rewards are never stored as
/// transactions; this value is recognized but not specially handled by
/// transaction application itself (block application credits the miner
/// directly — see `state::apply_block`).
pub const REWARD_DATA: &str = "reward";

/// Unsigned transaction. Field order is load-bearing: it is the exact
/// order serialized into the canonical JSON that gets hashed and signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub value: u64,
    pub nonce: u64,
    pub data: String,
    pub time: u64,
}

impl Transaction {
    pub fn new(from: Address, to: Address, value: u64, nonce: u64, data: String, time: u64) -> Self {
        Self { from, to, value, nonce, data, time }
    }

    /// Total debit against the sender: value plus the fixed fee.
    pub fn cost(&self) -> u64 {
        self.value + TX_FEE
    }

    /// sha256 over the canonical JSON encoding of this transaction.
    pub fn hash(&self) -> Hash {
        let bytes = serde_json::to_vec(self).expect("Transaction serialization is infallible");
        sha256(&bytes)
    }
}

/// A transaction plus its 65-byte recoverable secp256k1 signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    #[serde(flatten)]
    pub tx: Transaction,
    pub signature: String,
}

impl SignedTransaction {
    pub fn new(tx: Transaction, signature: [u8; 65]) -> Self {
        Self { tx, signature: hex::encode(signature) }
    }

    pub fn hash(&self) -> Hash {
        self.tx.hash()
    }

    fn signature_bytes(&self) -> Result<[u8; 65]> {
        let bytes = hex::decode(&self.signature)
            .map_err(|e| NodeError::InvalidTransaction(format!("bad signature hex: {e}")))?;
        if bytes.len() != 65 {
            return Err(NodeError::InvalidTransaction(format!(
                "signature must be 65 bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; 65];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// A transaction is authentic iff the address recovered from its
    /// signature equals its declared `from`.
    pub fn is_authentic(&self) -> Result<bool> {
        let sig = self.signature_bytes()?;
        let tx_hash = self.tx.hash();
        let pubkey = recover_public_key(&tx_hash, &sig)?;
        let recovered = Address::from_public_key(&pubkey);
        Ok(recovered == self.tx.from)
    }

    pub fn require_authentic(&self) -> Result<()> {
        if self.is_authentic()? {
            Ok(())
        } else {
            let sig = self.signature_bytes()?;
            let recovered = recover_public_key(&self.tx.hash(), &sig)
                .map(|pk| Address::from_public_key(&pk).hex())
                .unwrap_or_else(|_| "<unrecoverable>".to_string());
            Err(NodeError::ForgedSender {
                recovered,
                declared: self.tx.from.hex(),
            })
        }
    }
}

/// Sign `tx` with `secret_key`, producing a 65-byte recoverable signature
/// over sha256(canonical-JSON(tx)).
pub fn sign_transaction(
    tx: Transaction,
    secret_key: &secp256k1::SecretKey,
) -> SignedTransaction {
    let secp = secp256k1::Secp256k1::new();
    let tx_hash = tx.hash();
    let msg = secp256k1::Message::from_digest(tx_hash.0);
    let recoverable = secp.sign_ecdsa_recoverable(&msg, secret_key);
    let (recovery_id, compact) = recoverable.serialize_compact();
    let mut sig = [0u8; 65];
    sig[..64].copy_from_slice(&compact);
    sig[64] = recovery_id.to_i32() as u8;
    SignedTransaction::new(tx, sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> (secp256k1::SecretKey, secp256k1::PublicKey) {
        let secp = secp256k1::Secp256k1::new();
        secp.generate_keypair(&mut rand::thread_rng())
    }

    #[test]
    fn sign_and_verify_round_trips() {
        let (sk, pk) = keypair();
        let from = Address::from_public_key(&pk);
        let to = Address::zero();
        let tx = Transaction::new(from, to, 100, 1, String::new(), 1_000);
        let signed = sign_transaction(tx, &sk);
        assert!(signed.is_authentic().unwrap());
    }

    #[test]
    fn tampered_signer_is_not_authentic() {
        let (sk, _pk) = keypair();
        let (_sk2, pk2) = keypair();
        let from = Address::from_public_key(&pk2); // claims to be pk2's address
        let tx = Transaction::new(from, Address::zero(), 1, 1, String::new(), 1);
        let signed = sign_transaction(tx, &sk); // but signs with a different key
        assert!(!signed.is_authentic().unwrap());
        assert!(signed.require_authentic().is_err());
    }

    #[test]
    fn cost_includes_fixed_fee() {
        let tx = Transaction::new(Address::zero(), Address::zero(), 100, 1, String::new(), 1);
        assert_eq!(tx.cost(), 150);
    }

    #[test]
    fn serde_round_trip_preserves_equality() {
        let (sk, pk) = keypair();
        let from = Address::from_public_key(&pk);
        let tx = Transaction::new(from, Address::zero(), 5, 2, "memo".into(), 42);
        let signed = sign_transaction(tx, &sk);
        let json = serde_json::to_string(&signed).unwrap();
        let back: SignedTransaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tx, signed.tx);
        assert_eq!(back.signature, signed.signature);
    }

    #[test]
    fn canonical_field_order_is_stable() {
        let tx = Transaction::new(Address::zero(), Address::zero(), 1, 2, "x".into(), 3);
        let json = serde_json::to_string(&tx).unwrap();
        let from_idx = json.find("\"from\"").unwrap();
        let to_idx = json.find("\"to\"").unwrap();
        let value_idx = json.find("\"value\"").unwrap();
        let nonce_idx = json.find("\"nonce\"").unwrap();
        let data_idx = json.find("\"data\"").unwrap();
        let time_idx = json.find("\"time\"").unwrap();
        assert!(from_idx < to_idx);
        assert!(to_idx < value_idx);
        assert!(value_idx < nonce_idx);
        assert!(nonce_idx < data_idx);
        assert!(data_idx < time_idx);
    }
}
