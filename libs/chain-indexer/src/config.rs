use std::time::Duration;

use common::{ContractName, DEFAULT_CHAIN_ID};

pub const INDEXER_POLL_INTERVAL_ENV: &str = "INDEXER_POLL_INTERVAL_SECS";
pub const INDEXER_BATCH_SIZE_ENV: &str = "INDEXER_BATCH_SIZE";
pub const INDEXER_LOOKBACK_ENV: &str = "INDEXER_LOOKBACK_BLOCKS";
pub const INDEXER_BATCH_DELAY_ENV: &str = "INDEXER_BATCH_DELAY_MS";

/// One mirrored contract.
#[derive(Debug, Clone)]
pub struct ContractConfig {
    pub name: ContractName,
    /// `None` means the contract is skipped at init
    pub address: Option<String>,
    /// Event names to keep; everything else is dropped after decoding
    pub events: Vec<String>,
}

impl ContractConfig {
    pub fn with_address(name: ContractName, address: impl Into<String>) -> Self {
        Self {
            name,
            address: Some(address.into()),
            events: name.default_tracked_events(),
        }
    }
}

/// Configuration for [`crate::BlockchainIndexer`].
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Used when the provider cannot report its chain id
    pub chain_id: u64,
    /// Blocks per `get_logs` request
    pub batch_size: u64,
    /// How far back a contract with no indexed events starts
    pub lookback_blocks: u64,
    /// Pause between historical batches
    pub batch_delay: Duration,
    /// Polling backstop interval
    pub poll_interval: Duration,
    /// Capacity of the live log channel
    pub live_channel_capacity: usize,
    pub contracts: Vec<ContractConfig>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            batch_size: 1000,
            lookback_blocks: 10_000,
            batch_delay: Duration::from_millis(100),
            poll_interval: Duration::from_secs(12),
            live_channel_capacity: 1024,
            contracts: Vec::new(),
        }
    }
}

impl IndexerConfig {
    pub fn apply_env_overrides(&mut self) {
        if let Some(chain_id) = env_u64("CHAIN_ID") {
            self.chain_id = chain_id;
        }
        if let Some(secs) = env_u64(INDEXER_POLL_INTERVAL_ENV).filter(|v| *v > 0) {
            self.poll_interval = Duration::from_secs(secs);
        }
        if let Some(size) = env_u64(INDEXER_BATCH_SIZE_ENV).filter(|v| *v > 0) {
            self.batch_size = size;
        }
        if let Some(blocks) = env_u64(INDEXER_LOOKBACK_ENV) {
            self.lookback_blocks = blocks;
        }
        if let Some(ms) = env_u64(INDEXER_BATCH_DELAY_ENV) {
            self.batch_delay = Duration::from_millis(ms);
        }
    }

    pub fn with_contract(mut self, contract: ContractConfig) -> Self {
        self.contracts.retain(|c| c.name != contract.name);
        self.contracts.push(contract);
        self
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexerConfig::default();
        assert_eq!(config.chain_id, 137);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.lookback_blocks, 10_000);
        assert_eq!(config.poll_interval, Duration::from_secs(12));
        assert_eq!(config.live_channel_capacity, 1024);
    }

    #[test]
    fn test_with_contract_replaces() {
        let config = IndexerConfig::default()
            .with_contract(ContractConfig::with_address(ContractName::Token, "0x01"))
            .with_contract(ContractConfig::with_address(ContractName::Token, "0x02"));
        assert_eq!(config.contracts.len(), 1);
        assert_eq!(config.contracts[0].address.as_deref(), Some("0x02"));
        assert!(config.contracts[0].events.contains(&"Transfer".to_string()));
    }
}
