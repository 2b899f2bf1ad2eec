//! The known-peer set. A `PeerNode` is added on bootstrap or discovery
//! (via sync or the `/node/peer` handler) and removed when a status
//! query against it fails — mirroring the source's `KnownPeers` map.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::primitives::Address;

/// One known peer, addressed by its `ip:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerNode {
    pub ip: String,
    pub port: u64,
    pub is_bootstrap: bool,
    pub account: Address,
    /// Whether this node has already asked the peer to add it back.
    #[serde(default)]
    pub connected: bool,
}

impl PeerNode {
    pub fn new(ip: impl Into<String>, port: u64, is_bootstrap: bool, account: Address, connected: bool) -> Self {
        Self { ip: ip.into(), port, is_bootstrap, account, connected }
    }

    pub fn tcp_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn api_base_url(&self) -> String {
        format!("http://{}", self.tcp_address())
    }
}

/// In-memory map of known peers, keyed by `ip:port`. Not persisted
/// across restarts — peers are rediscovered via bootstrap config and
/// gossip in `/node/status` responses.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<String, PeerNode>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self { peers: HashMap::new() }
    }

    pub fn add(&mut self, peer: PeerNode) {
        self.peers.insert(peer.tcp_address(), peer);
    }

    pub fn remove(&mut self, peer: &PeerNode) {
        self.peers.remove(&peer.tcp_address());
    }

    pub fn remove_by_address(&mut self, tcp_address: &str) {
        self.peers.remove(tcp_address);
    }

    pub fn contains(&self, peer: &PeerNode) -> bool {
        self.peers.contains_key(&peer.tcp_address())
    }

    pub fn get(&self, tcp_address: &str) -> Option<&PeerNode> {
        self.peers.get(tcp_address)
    }

    pub fn set_connected(&mut self, tcp_address: &str, connected: bool) {
        if let Some(peer) = self.peers.get_mut(tcp_address) {
            peer.connected = connected;
        }
    }

    pub fn all(&self) -> Vec<PeerNode> {
        self.peers.values().cloned().collect()
    }

    pub fn as_map(&self) -> HashMap<String, PeerNode> {
        self.peers.clone()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(ip: &str, port: u64) -> PeerNode {
        PeerNode::new(ip, port, false, Address::zero(), false)
    }

    #[test]
    fn add_then_contains() {
        let mut reg = PeerRegistry::new();
        let p = peer("10.0.0.1", 8080);
        reg.add(p.clone());
        assert!(reg.contains(&p));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_drops_the_entry() {
        let mut reg = PeerRegistry::new();
        let p = peer("10.0.0.1", 8080);
        reg.add(p.clone());
        reg.remove(&p);
        assert!(!reg.contains(&p));
        assert!(reg.is_empty());
    }

    #[test]
    fn set_connected_updates_in_place() {
        let mut reg = PeerRegistry::new();
        let p = peer("10.0.0.1", 8080);
        reg.add(p.clone());
        reg.set_connected(&p.tcp_address(), true);
        assert!(reg.get(&p.tcp_address()).unwrap().connected);
    }
}
