pub mod block;
pub mod chain_store;
pub mod config;
pub mod error;
pub mod fork;
pub mod http;
pub mod mempool;
pub mod miner;
pub mod node;
pub mod peer_db;
pub mod primitives;
pub mod state;
pub mod sync;
pub mod sync_lock;
pub mod transaction;

pub use block::{Block, BlockHeader, BlockRecord};
pub use chain_store::{ChainStore, Genesis};
pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use mempool::Mempool;
pub use node::{InMemorySigner, Node, Signer};
pub use peer_db::{PeerNode, PeerRegistry};
pub use primitives::{Address, Hash};
pub use state::{Ledger, State};
pub use transaction::{sign_transaction, SignedTransaction, Transaction};

/// Re-export the Tokio-backed RwLock used to guard `State` + `Mempool` +
/// `PeerRegistry` as one unit.
pub use sync_lock::RwLock;
