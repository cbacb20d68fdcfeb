//! The ledger RPC seam the indexer reads through.

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ChainError;

/// A log as delivered by the node, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub block_hash: Option<B256>,
    pub transaction_hash: Option<B256>,
    pub transaction_index: Option<u64>,
    pub log_index: Option<u64>,
    /// Set when the log was dropped by a reorg
    pub removed: bool,
}

impl From<alloy::rpc::types::Log> for RawLog {
    fn from(log: alloy::rpc::types::Log) -> Self {
        Self {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
            block_number: log.block_number,
            block_hash: log.block_hash,
            transaction_hash: log.transaction_hash,
            transaction_index: log.transaction_index,
            log_index: log.log_index,
            removed: log.removed,
        }
    }
}

/// Block metadata the indexer needs. Immutable once final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    pub number: u64,
    pub hash: B256,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
}

/// Read access to a chain plus a live log feed.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Current head block number.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Logs emitted by `address` in the inclusive range `[from, to]`.
    async fn get_logs(&self, address: Address, from: u64, to: u64)
        -> Result<Vec<RawLog>, ChainError>;

    async fn get_block(&self, number: u64) -> Result<Option<BlockInfo>, ChainError>;

    /// Push live logs from `addresses` into `sink` until `cancel` fires or
    /// the receiving side is dropped.
    ///
    /// Delivery is best-effort; callers must not rely on it for completeness.
    async fn watch_logs(
        &self,
        addresses: Vec<Address>,
        sink: mpsc::Sender<RawLog>,
        cancel: CancellationToken,
    ) -> Result<(), ChainError>;
}
