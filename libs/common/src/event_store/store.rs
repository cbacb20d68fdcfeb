//! The document-store seam the indexer writes through.

use async_trait::async_trait;

use super::types::{ActivityBucket, ContractEventCount, EventFilter, IndexedEvent, NaturalKey};
use crate::contracts::ContractName;

/// Errors surfaced by an event store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An event with the same `(tx_hash, log_index)` already exists.
    #[error("duplicate event {tx_hash}:{log_index}")]
    Duplicate { tx_hash: String, log_index: u64 },
    /// Backing store cannot be reached
    #[error("event store unavailable: {0}")]
    Unavailable(String),
    /// Write rejected for a reason other than a duplicate key
    #[error("write failed: {0}")]
    Write(String),
    #[error("query failed: {0}")]
    Query(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }
}

/// Result of an unordered bulk insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Durable collection of [`IndexedEvent`] records.
///
/// Implementations must enforce uniqueness of the natural key. Bulk inserts
/// are unordered: every record is attempted, duplicates are counted and
/// skipped, and the first non-duplicate error is returned after the whole
/// batch has been attempted.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert a single event, failing with [`StoreError::Duplicate`] on collision.
    async fn insert(&self, event: IndexedEvent) -> Result<(), StoreError>;

    async fn insert_many(&self, events: Vec<IndexedEvent>) -> Result<InsertOutcome, StoreError>;

    /// Highest block number stored for a contract on a chain.
    async fn last_indexed_block(
        &self,
        contract: ContractName,
        chain_id: u64,
    ) -> Result<Option<u64>, StoreError>;

    /// Matching events, newest first, honoring `skip`/`limit`.
    async fn find(&self, filter: &EventFilter) -> Result<Vec<IndexedEvent>, StoreError>;

    /// Unprocessed events, oldest first.
    async fn find_unprocessed(
        &self,
        contract: Option<ContractName>,
        limit: usize,
    ) -> Result<Vec<IndexedEvent>, StoreError>;

    /// Mark events processed. Returns how many actually transitioned.
    async fn mark_processed(
        &self,
        keys: &[NaturalKey],
        error: Option<String>,
    ) -> Result<usize, StoreError>;

    /// Attach a processing error to an event that is already processed.
    /// Returns false when the event is missing or still unprocessed.
    async fn record_processing_error(
        &self,
        key: &NaturalKey,
        error: String,
    ) -> Result<bool, StoreError>;

    /// Activity of one (lowercase) address grouped by contract and event.
    async fn user_activity(&self, address: &str) -> Result<Vec<ActivityBucket>, StoreError>;

    /// Totals grouped by contract and event.
    async fn event_counts(&self) -> Result<Vec<ContractEventCount>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}
