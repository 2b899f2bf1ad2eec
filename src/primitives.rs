//! Core value types shared by every other module: 32-byte block/tx
//! hashes, 20-byte secp256k1-derived addresses, canonical JSON encoding
//! for hashing, and the proof-of-work validity predicate.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use std::fmt;

use crate::error::{NodeError, Result};

pub const HASH_LEN: usize = 32;
pub const ADDRESS_LEN: usize = 20;

/// A 32-byte hash. The zero hash is the sentinel for "no block" — used
/// as genesis's parent and as the empty-chain marker.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    pub const fn zero() -> Self {
        Hash([0u8; HASH_LEN])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Hash::zero());
        }
        let bytes = hex::decode(s).map_err(|e| NodeError::InvalidArgument(e.to_string()))?;
        if bytes.len() != HASH_LEN {
            return Err(NodeError::InvalidArgument(format!(
                "expected {HASH_LEN}-byte hash, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&bytes);
        Ok(Hash(out))
    }

    /// Does this hash satisfy the proof-of-work predicate for `difficulty`:
    /// its hex encoding begins with `difficulty` leading `'0'` characters.
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        let hex = self.hex();
        let needed = difficulty as usize;
        if needed > hex.len() {
            return false;
        }
        hex.as_bytes()[..needed].iter().all(|&b| b == b'0')
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex())
    }
}

impl Serialize for Hash {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Hash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A 20-byte account address, derived from a secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const fn zero() -> Self {
        Address([0u8; ADDRESS_LEN])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }

    pub fn hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let cleaned = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(cleaned).map_err(|e| NodeError::InvalidArgument(e.to_string()))?;
        if bytes.len() != ADDRESS_LEN {
            return Err(NodeError::InvalidArgument(format!(
                "expected {ADDRESS_LEN}-byte address, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }

    /// Derive the address owned by `pubkey`: keccak256 of the uncompressed
    /// public key (65 bytes, skipping the leading 0x04 tag byte), last 20
    /// bytes of the digest.
    pub fn from_public_key(pubkey: &secp256k1::PublicKey) -> Self {
        let uncompressed = pubkey.serialize_uncompressed();
        let digest = Keccak256::digest(&uncompressed[1..]);
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest[digest.len() - ADDRESS_LEN..]);
        Address(out)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex())
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// sha256 over arbitrary canonical bytes.
pub fn sha256(bytes: &[u8]) -> Hash {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&digest);
    Hash(out)
}

/// Recover the public key that produced `signature` over `message_hash`,
/// where `signature` is a 65-byte recoverable ECDSA signature (64 bytes
/// of (r, s) followed by a 1-byte recovery id).
pub fn recover_public_key(
    message_hash: &Hash,
    signature: &[u8; 65],
) -> Result<secp256k1::PublicKey> {
    let recovery_id = secp256k1::ecdsa::RecoveryId::from_i32(signature[64] as i32)
        .map_err(|e| NodeError::Crypto(e.to_string()))?;
    let recoverable = secp256k1::ecdsa::RecoverableSignature::from_compact(
        &signature[..64],
        recovery_id,
    )
    .map_err(|e| NodeError::Crypto(e.to_string()))?;
    let msg = secp256k1::Message::from_digest(message_hash.0);
    let secp = secp256k1::Secp256k1::new();
    secp.recover_ecdsa(&msg, &recoverable)
        .map_err(|e| NodeError::Crypto(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_roundtrips_through_hex() {
        let h = Hash::zero();
        assert_eq!(Hash::from_hex(&h.hex()).unwrap(), h);
        assert!(h.is_zero());
    }

    #[test]
    fn empty_string_decodes_to_zero_hash() {
        assert_eq!(Hash::from_hex("").unwrap(), Hash::zero());
    }

    #[test]
    fn difficulty_zero_accepts_everything() {
        let h = sha256(b"anything");
        assert!(h.meets_difficulty(0));
    }

    #[test]
    fn difficulty_checks_leading_hex_zeros() {
        let h = Hash::from_hex(&"00".repeat(16)).unwrap();
        assert!(h.meets_difficulty(2));
        assert!(h.meets_difficulty(32));
    }

    #[test]
    fn address_roundtrips_through_hex() {
        let secp = secp256k1::Secp256k1::new();
        let (_, pk) = secp.generate_keypair(&mut rand::thread_rng());
        let addr = Address::from_public_key(&pk);
        assert_eq!(Address::from_hex(&addr.hex()).unwrap(), addr);
    }
}
