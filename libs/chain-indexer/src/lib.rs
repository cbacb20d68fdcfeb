//! Chain event indexer.
//!
//! Mirrors tracked contract events into an [`common::event_store::EventStore`]
//! and keeps it consistent with the chain:
//!
//! - [`ChainProvider`]: the RPC seam, with [`RpcChainProvider`] over alloy
//! - [`ContractDecoder`]: per-contract ABI decoding of raw logs
//! - [`BlockchainIndexer`]: historical sync, live consumer, polling
//!   backstop and the cached query surface
//!
//! # Example
//!
//! ```ignore
//! let indexer = Arc::new(BlockchainIndexer::new(config, provider, store, cache));
//! indexer.start().await?;
//! let recent = indexer.query_events(&EventFilter::default()).await?;
//! indexer.shutdown().await;
//! ```

mod config;
mod decoder;
mod error;
mod indexer;
mod provider;
mod query;
mod rpc;

pub use config::{ContractConfig, IndexerConfig};
pub use decoder::{to_json, ContractDecoder, DecodedLog};
pub use error::{ChainError, IndexerError};
pub use indexer::{BlockchainIndexer, IndexerNotification, NetworkInfo, PollReport, SyncReport};
pub use provider::{BlockInfo, ChainProvider, RawLog};
pub use query::{IndexerStats, TrackedContract, UserActivity};
pub use rpc::{derive_ws_url, RpcChainProvider, WsSettings};
