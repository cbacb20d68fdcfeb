//! Error types for chain access and indexing

use common::event_store::StoreError;
use common::ContractName;

/// Errors raised by a [`crate::ChainProvider`].
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("WebSocket error: {0}")]
    WebSocket(String),
    #[error("subscription error: {0}")]
    Subscription(String),
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChainError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ChainError::WebSocket(err.to_string())
    }
}

/// Errors raised by the indexer.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("indexer not initialized")]
    NotInitialized,
    #[error("contract {0} is not configured")]
    ContractNotConfigured(ContractName),
    #[error("invalid address '{address}' for {contract}")]
    InvalidAddress {
        contract: ContractName,
        address: String,
    },
    #[error("invalid ABI for {contract}: {reason}")]
    InvalidAbi {
        contract: ContractName,
        reason: String,
    },
}
