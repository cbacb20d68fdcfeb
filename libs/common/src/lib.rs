//! Shared domain types for the chain mirror services.
//!
//! - `contracts`: the closed set of mirrored contracts and their ABI tables
//! - `network`: chain id to network name lookup
//! - `event_store`: the `IndexedEvent` record, the `EventStore` trait and
//!   its in-memory implementation with JSON snapshots
//! - `interfaces`: `sol!` call interfaces for outgoing transactions

pub mod contracts;
pub mod event_store;
pub mod interfaces;
pub mod network;

pub use contracts::{ContractName, UnknownContract};
pub use network::{network_name, DEFAULT_CHAIN_ID};

/// Lowercase an address-like string, trimming surrounding whitespace.
///
/// Addresses are compared and stored in lowercase form everywhere so that
/// checksummed and non-checksummed inputs map to the same key.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}
