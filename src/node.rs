//! The `Node`: exclusive owner of `State`, `Mempool`, and `PeerRegistry`
//! behind one coarse lock, plus the mining loop and HTTP server. The
//! sync loop and fork-check loop are implemented as further `impl Node`
//! blocks in `sync.rs` and `fork.rs` respectively — mirroring the
//! source's split across `node.go`, `sync.go`, and `fork.go` — but all
//! three share this module's lock and state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::block::Block;
use crate::chain_store::Genesis;
use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::mempool::Mempool;
use crate::miner::{mine, Candidate};
use crate::peer_db::{PeerNode, PeerRegistry};
use crate::primitives::Address;
use crate::state::State;
use crate::transaction::{SignedTransaction, Transaction};
use crate::RwLock;

/// A narrow stand-in for the encrypted keystore / signing service this
/// node talks to. The real keystore is out of scope for the core; the
/// node only needs to ask "sign this transaction for this address under
/// this password" and get back a `SignedTransaction` or an error.
pub trait Signer: Send + Sync {
    fn sign(&self, tx: Transaction, from: &Address, from_pwd: &str) -> Result<SignedTransaction>;
}

/// An in-process signer backed by a plaintext map of address -> (password,
/// key). Adequate for tests and single-operator deployments; a real
/// deployment would swap this for a call into an external keystore
/// process without changing anything else in the node.
#[derive(Default)]
pub struct InMemorySigner {
    accounts: std::collections::HashMap<Address, (String, secp256k1::SecretKey)>,
}

impl InMemorySigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&mut self, password: impl Into<String>, secret_key: secp256k1::SecretKey) -> Address {
        let secp = secp256k1::Secp256k1::new();
        let public_key = secp256k1::PublicKey::from_secret_key(&secp, &secret_key);
        let address = Address::from_public_key(&public_key);
        self.accounts.insert(address, (password.into(), secret_key));
        address
    }
}

impl Signer for InMemorySigner {
    fn sign(&self, tx: Transaction, from: &Address, from_pwd: &str) -> Result<SignedTransaction> {
        let (password, secret_key) = self
            .accounts
            .get(from)
            .ok_or_else(|| NodeError::InvalidArgument(format!("unknown account {}", from.hex())))?;
        if password != from_pwd {
            return Err(NodeError::InvalidArgument("wrong password for account".to_string()));
        }
        Ok(crate::transaction::sign_transaction(tx, secret_key))
    }
}

/// Which path produced a block, so the caller can decide whether to
/// preempt an in-flight mining search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSource {
    Mined,
    Synced,
}

/// State + Mempool + PeerRegistry behind one lock, per §5's coarse-lock
/// discipline: never held across network I/O or a mining search.
pub(crate) struct Core {
    pub state: State,
    pub mempool: Mempool,
    pub peers: PeerRegistry,
}

pub struct Node {
    pub config: NodeConfig,
    pub self_info: PeerNode,
    pub(crate) core: RwLock<Core>,
    pub(crate) signer: Arc<dyn Signer>,
    pub(crate) http_client: reqwest::Client,
    pub(crate) cancel: CancellationToken,
    pub(crate) is_mining: AtomicBool,
    pub(crate) mining_cancel: AsyncMutex<Option<CancellationToken>>,
    pub(crate) new_synced_blocks_tx: mpsc::UnboundedSender<Block>,
    pub(crate) new_synced_blocks_rx: AsyncMutex<Option<mpsc::UnboundedReceiver<Block>>>,
}

pub fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

impl Node {
    /// Replay the chain log, seed the peer registry from
    /// `config.bootstrap_peers`, and build the node's self-description.
    pub fn bootstrap(
        config: NodeConfig,
        listen_ip: String,
        miner_account: Address,
        signer: Arc<dyn Signer>,
        default_genesis: Genesis,
    ) -> Result<Arc<Node>> {
        let state = State::replay(&config.data_dir, config.difficulty, &default_genesis)?;
        let mempool = Mempool::new(state.pending_ledger());

        let mut peers = PeerRegistry::new();
        for entry in &config.bootstrap_peers {
            if let Some((ip, port)) = entry.rsplit_once(':') {
                if let Ok(port) = port.parse::<u64>() {
                    peers.add(PeerNode::new(ip, port, true, Address::zero(), false));
                }
            }
        }

        let self_info = PeerNode::new(listen_ip, config.listen_port as u64, false, miner_account, true);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.peer_request_timeout_secs))
            .build()?;

        let (tx, rx) = mpsc::unbounded_channel();

        Ok(Arc::new(Node {
            config,
            self_info,
            core: RwLock::new(Core { state, mempool, peers }),
            signer,
            http_client,
            cancel: CancellationToken::new(),
            is_mining: AtomicBool::new(false),
            mining_cancel: AsyncMutex::new(None),
            new_synced_blocks_tx: tx,
            new_synced_blocks_rx: AsyncMutex::new(Some(rx)),
        }))
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn latest_hash(&self) -> crate::primitives::Hash {
        self.core.read_async().await.state.latest_hash()
    }

    pub async fn latest_number(&self) -> u64 {
        self.core.read_async().await.state.latest_number()
    }

    /// Submit `tx` to the mempool. Returns `Ok(true)` if newly admitted,
    /// `Ok(false)` if it was already pending/archived.
    pub async fn add_pending_tx(&self, tx: SignedTransaction) -> Result<bool> {
        let mut core = self.core.write_async().await;
        core.mempool.admit(tx)
    }

    /// Build a `Transaction` with the account's next nonce, ask the
    /// signer to sign it, and admit it.
    pub async fn submit_new_transaction(
        &self,
        from: Address,
        from_pwd: &str,
        to: Address,
        value: u64,
        data: String,
    ) -> Result<bool> {
        let nonce = {
            let core = self.core.read_async().await;
            core.state.next_nonce(&from) + 1
        };
        let tx = Transaction::new(from, to, value, nonce, data, unix_now());
        let signed = self.signer.sign(tx, &from, from_pwd)?;
        self.add_pending_tx(signed).await
    }

    /// Apply `block`, archive its transactions out of the mempool, and
    /// reset the mempool's pending-state shadow. If it came from sync
    /// while a mining search is active, the search is cancelled first so
    /// the apply below is the only write in flight.
    pub async fn apply_block(&self, block: Block, source: BlockSource) -> Result<()> {
        if source == BlockSource::Synced && self.is_mining.load(Ordering::SeqCst) {
            if let Some(token) = self.mining_cancel.lock().await.as_ref() {
                token.cancel();
            }
        }

        let mut core = self.core.write_async().await;
        core.state.apply_block(block.clone())?;
        core.mempool.archive_block_txs(&block);
        let fresh_ledger = core.state.pending_ledger();
        core.mempool.reset_pending_state(fresh_ledger);
        drop(core);

        if source == BlockSource::Synced {
            let _ = self.new_synced_blocks_tx.send(block);
        }
        Ok(())
    }

    pub fn is_self(&self, peer: &PeerNode) -> bool {
        peer.ip == self.self_info.ip && peer.port == self.self_info.port
    }

    /// Spawn the mining loop, sync loop, and fork-check loop, then serve
    /// HTTP until the node's cancellation token fires.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        log::info!("listening on {}:{}", self.self_info.ip, self.self_info.port);
        {
            let core = self.core.read_async().await;
            log::info!(
                "blockchain state: height={} hash={}",
                core.state.latest_number(),
                core.state.latest_hash()
            );
        }

        let mining_node = self.clone();
        tokio::spawn(async move { mining_node.mining_loop().await });

        let sync_node = self.clone();
        tokio::spawn(async move { sync_node.sync_loop().await });

        let fork_node = self.clone();
        tokio::spawn(async move { fork_node.fork_check_loop().await });

        self.serve_http().await
    }

    async fn mining_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.mining_tick_secs));
        let mut rx = self
            .new_synced_blocks_rx
            .lock()
            .await
            .take()
            .expect("mining loop takes the synced-block receiver exactly once");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.is_mining.load(Ordering::SeqCst) {
                        continue;
                    }
                    let has_pending = {
                        let core = self.core.read_async().await;
                        !core.mempool.is_empty()
                    };
                    if !has_pending {
                        continue;
                    }
                    self.spawn_mining_attempt();
                }
                Some(block) = rx.recv() => {
                    log::info!("peer mined block {} faster; preempted local search", block.hash());
                }
                _ = self.cancel.cancelled() => {
                    return;
                }
            }
        }
    }

    fn spawn_mining_attempt(self: &Arc<Self>) {
        let node = self.clone();
        self.is_mining.store(true, Ordering::SeqCst);
        tokio::spawn(async move {
            let token = CancellationToken::new();
            *node.mining_cancel.lock().await = Some(token.clone());

            let (candidate, difficulty) = {
                let core = node.core.read_async().await;
                let txs = core.mempool.snapshot();
                let candidate = Candidate {
                    parent: core.state.latest_hash(),
                    number: core.state.latest_number() + if core.state.has_genesis() { 1 } else { 0 },
                    miner: node.self_info.account,
                    txs,
                    time: unix_now(),
                };
                (candidate, core.state.difficulty())
            };

            let result = tokio::task::spawn_blocking(move || mine(candidate, difficulty, &token))
                .await
                .unwrap_or(Err(NodeError::MiningCancelled));

            match result {
                Ok(block) => {
                    log::info!("sealed block {} at height {}", block.hash(), block.header.number);
                    if let Err(e) = node.apply_block(block, BlockSource::Mined).await {
                        log::error!("failed to apply locally mined block: {e}");
                    }
                }
                Err(NodeError::MiningCancelled) => {
                    log::debug!("mining search cancelled");
                }
                Err(e) => {
                    log::error!("mining error: {e}");
                }
            }

            *node.mining_cancel.lock().await = None;
            node.is_mining.store(false, Ordering::SeqCst);
        });
    }

    async fn serve_http(self: Arc<Self>) -> Result<()> {
        let port = self.config.listen_port;
        let routes = crate::http::routes(self.clone());
        let cancel = self.cancel.clone();

        let (_addr, server) = warp::serve(routes).bind_with_graceful_shutdown(
            ([0, 0, 0, 0], port),
            async move { cancel.cancelled().await },
        );
        server.await;
        Ok(())
    }
}
