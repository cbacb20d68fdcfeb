//! Event store for mirrored contract events.
//!
//! This module provides:
//! - `IndexedEvent`, one record per decoded on-chain log
//! - The `EventStore` trait describing the document-store collaborator
//! - `MemoryEventStore`, an in-process implementation keyed by natural key
//! - `SnapshotManager`, atomic JSON snapshots of the in-memory store
//!
//! # Concurrency
//!
//! The natural key `(tx_hash, log_index)` is the only concurrency control.
//! Historical sync, live delivery and the polling backstop may all insert
//! the same log; the second insert is reported as a duplicate and dropped.

pub mod manager;
pub mod memory;
pub mod store;
pub mod types;

pub use manager::{SnapshotError, SnapshotManager, SNAPSHOT_PATH_ENV_VAR};
pub use memory::MemoryEventStore;
pub use store::{EventStore, InsertOutcome, StoreError};
pub use types::{
    ActivityBucket, ContractEventCount, EventFilter, IndexedEvent, NaturalKey, NormalizedArgs,
    INDEXER_VERSION,
};
