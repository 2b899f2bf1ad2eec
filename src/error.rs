use thiserror::Error;

/// Crate-wide error type. Every fallible operation in the node returns
/// `Result<T>` built on this enum so callers can match on failure kind
/// without downcasting.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid nonce: expected {expected}, found {found}")]
    InvalidNonce { expected: u64, found: u64 },

    #[error("insufficient balance: address {address} needs {required}, has {available}")]
    InsufficientBalance {
        address: String,
        required: u64,
        available: u64,
    },

    #[error("forged sender: recovered {recovered}, declared {declared}")]
    ForgedSender { recovered: String, declared: String },

    #[error("no fork found")]
    NoForkFound,

    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("chain store error: {0}")]
    ChainStore(String),

    #[error("mining cancelled")]
    MiningCancelled,

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, NodeError>;

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        NodeError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        NodeError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for NodeError {
    fn from(err: toml::de::Error) -> Self {
        NodeError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for NodeError {
    fn from(err: toml::ser::Error) -> Self {
        NodeError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for NodeError {
    fn from(err: reqwest::Error) -> Self {
        NodeError::Network(err.to_string())
    }
}

impl From<secp256k1::Error> for NodeError {
    fn from(err: secp256k1::Error) -> Self {
        NodeError::Crypto(err.to_string())
    }
}
