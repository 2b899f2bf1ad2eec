//! The sync loop: for every known peer, query its status, join it back
//! if it doesn't yet know us, pull any blocks we're missing, merge its
//! peer list into ours, and pull its pending transactions into our
//! mempool. Grounded in the source's `sync.go` (`doSync`, `syncBlocks`,
//! `syncKnownPeers`, `syncPendingTXs`, `joinKnownPeers`).

use std::sync::Arc;
use std::time::Duration;

use crate::http::{AddPeerResponse, StatusResponse};
use crate::node::{BlockSource, Node};
use crate::peer_db::PeerNode;

impl Node {
    pub(crate) async fn sync_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.sync_interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.do_sync().await,
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    async fn do_sync(self: &Arc<Self>) {
        let known_peers = self.core.read_async().await.peers.all();
        for peer in known_peers {
            if self.is_self(&peer) {
                continue;
            }
            self.sync_with_peer(&peer).await;
        }
    }

    async fn sync_with_peer(self: &Arc<Self>, peer: &PeerNode) {
        let status = match self.query_peer_status(peer).await {
            Ok(status) => status,
            Err(e) => {
                log::warn!("peer {} unreachable, forgetting it: {e}", peer.tcp_address());
                self.core.write_async().await.peers.remove(peer);
                return;
            }
        };

        self.join_known_peer_if_needed(peer).await;
        self.sync_blocks_from_peer(peer, &status).await;
        self.merge_known_peers(&status).await;
        self.sync_pending_txs(&status).await;
    }

    async fn query_peer_status(&self, peer: &PeerNode) -> crate::error::Result<StatusResponse> {
        let url = format!("{}/node/status", peer.api_base_url());
        let response = self.http_client.get(url).send().await?;
        Ok(response.json::<StatusResponse>().await?)
    }

    /// Ask the peer to add us back, unless our local registry already
    /// records it as connected.
    async fn join_known_peer_if_needed(self: &Arc<Self>, peer: &PeerNode) {
        let already_connected = self
            .core
            .read_async()
            .await
            .peers
            .get(&peer.tcp_address())
            .map(|p| p.connected)
            .unwrap_or(false);
        if already_connected {
            return;
        }

        let url = format!(
            "{}/node/peer?ip={}&port={}&miner={}",
            peer.api_base_url(),
            self.self_info.ip,
            self.self_info.port,
            self.self_info.account.hex(),
        );
        match self.http_client.get(url).send().await {
            Ok(response) => match response.json::<AddPeerResponse>().await {
                Ok(reply) if reply.success => {
                    self.core.write_async().await.peers.set_connected(&peer.tcp_address(), true);
                }
                Ok(reply) => log::warn!("peer {} refused join: {:?}", peer.tcp_address(), reply.error),
                Err(e) => log::warn!("peer {} sent an unreadable join reply: {e}", peer.tcp_address()),
            },
            Err(e) => log::warn!("failed to join peer {}: {e}", peer.tcp_address()),
        }
    }

    async fn sync_blocks_from_peer(self: &Arc<Self>, peer: &PeerNode, status: &StatusResponse) {
        if status.hash.is_zero() {
            return;
        }
        let local_number = self.latest_number().await;
        if status.number < local_number {
            return;
        }
        if status.number == local_number && status.hash == self.latest_hash().await {
            return;
        }

        let local_hash = self.latest_hash().await;
        let url = format!("{}/node/sync?fromBlock={}", peer.api_base_url(), local_hash.hex());
        let response = match self.http_client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("failed to fetch blocks from {}: {e}", peer.tcp_address());
                return;
            }
        };
        let body = match response.json::<crate::http::SyncResponse>().await {
            Ok(b) => b,
            Err(e) => {
                log::warn!("unreadable sync response from {}: {e}", peer.tcp_address());
                return;
            }
        };

        for block in body.blocks {
            let height = block.header.number;
            let hash = block.hash();
            if let Err(e) = self.apply_block(block, BlockSource::Synced).await {
                log::warn!("rejected block {height} from {}: {e}", peer.tcp_address());
                return;
            }
            log::info!("synced block {hash} at height {height} from {}", peer.tcp_address());
        }
    }

    async fn merge_known_peers(self: &Arc<Self>, status: &StatusResponse) {
        let mut core = self.core.write_async().await;
        for (address, candidate) in &status.known_peers {
            if core.peers.get(address).is_none() && !self.is_self(candidate) {
                core.peers.add(PeerNode::new(
                    candidate.ip.clone(),
                    candidate.port,
                    candidate.is_bootstrap,
                    candidate.account,
                    false,
                ));
            }
        }
    }

    async fn sync_pending_txs(self: &Arc<Self>, status: &StatusResponse) {
        for tx in status.pending_txs.values() {
            let _ = self.add_pending_tx(tx.clone()).await;
        }
    }
}
