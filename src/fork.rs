//! The fork-check loop: periodically compare tip with every known peer
//! and rewind to the fork point if a peer is ahead and has diverged.
//! Grounded in the source's `fork.go` (`checkForkedState`, `doCheckForkedState`).

use std::sync::Arc;
use std::time::Duration;

use crate::http::StatusResponse;
use crate::node::Node;
use crate::peer_db::PeerNode;

impl Node {
    pub(crate) async fn fork_check_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.fork_check_interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.do_fork_check().await,
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    async fn do_fork_check(self: &Arc<Self>) {
        let known_peers = self.core.read_async().await.peers.all();
        for peer in known_peers {
            if self.is_self(&peer) {
                continue;
            }
            self.check_forked_state_against(&peer).await;
        }
    }

    async fn check_forked_state_against(self: &Arc<Self>, peer: &PeerNode) {
        let status = match self.query_status_for_fork_check(peer).await {
            Ok(status) => status,
            Err(e) => {
                log::debug!("fork check: {} unreachable, forgetting it: {e}", peer.tcp_address());
                self.core.write_async().await.peers.remove(peer);
                return;
            }
        };

        let local_hash = self.latest_hash().await;
        let local_number = self.latest_number().await;
        if status.hash == local_hash || status.number <= local_number {
            return;
        }

        let peer_blocks = match self.fetch_full_block_list(peer).await {
            Ok(blocks) => blocks,
            Err(e) => {
                log::warn!("fork check: could not fetch block list from {}: {e}", peer.tcp_address());
                return;
            }
        };

        let mut core = self.core.write_async().await;
        let fork_point = match core.state.find_fork_point(&peer_blocks) {
            Ok(hash) => hash,
            Err(_) => {
                log::debug!("fork check: no common ancestor with {}", peer.tcp_address());
                return;
            }
        };
        if fork_point == local_hash {
            return;
        }

        log::warn!(
            "rewinding from {local_hash} to fork point {fork_point} in favor of {}'s chain",
            peer.tcp_address()
        );
        if let Err(e) = core.state.remove_blocks(fork_point) {
            log::error!("fork rewind failed: {e}");
            return;
        }
        let fresh_ledger = core.state.pending_ledger();
        core.mempool.reset_pending_state(fresh_ledger);
    }

    async fn query_status_for_fork_check(&self, peer: &PeerNode) -> crate::error::Result<StatusResponse> {
        let url = format!("{}/node/status", peer.api_base_url());
        let response = self.http_client.get(url).send().await?;
        Ok(response.json::<StatusResponse>().await?)
    }

    async fn fetch_full_block_list(&self, peer: &PeerNode) -> crate::error::Result<Vec<crate::block::Block>> {
        let url = format!("{}/blocks/list", peer.api_base_url());
        let response = self.http_client.get(url).send().await?;
        Ok(response.json::<Vec<crate::block::Block>>().await?)
    }
}
