use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chain_indexer::{derive_ws_url, ContractConfig, IndexerConfig};
use common::{ContractName, DEFAULT_CHAIN_ID};
use serde::{Deserialize, Serialize};
use tiered_cache::{redis_url_from_env, CacheConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub rpc_url: String,
    /// Derived from `rpc_url` when absent
    pub ws_url: Option<String>,
    pub chain_id: u64,
    /// Deployed address per contract; missing contracts are not mirrored
    pub contracts: BTreeMap<ContractName, String>,
    pub indexer: IndexerSection,
    pub cache: CacheSection,
    pub jobs: JobsSection,
    pub snapshot_path: Option<String>,
    pub ai_service_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerSection {
    pub poll_interval_secs: u64,
    pub batch_size: u64,
    pub lookback_blocks: u64,
    pub batch_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub namespace: String,
    pub l1_max_keys: usize,
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsSection {
    pub cleanup_interval_secs: u64,
    /// Completed jobs are kept this long; failed ones seven times longer
    pub retention_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            ws_url: None,
            chain_id: DEFAULT_CHAIN_ID,
            contracts: BTreeMap::new(),
            indexer: IndexerSection::default(),
            cache: CacheSection::default(),
            jobs: JobsSection::default(),
            snapshot_path: None,
            ai_service_url: None,
        }
    }
}

impl Default for IndexerSection {
    fn default() -> Self {
        let defaults = IndexerConfig::default();
        Self {
            poll_interval_secs: defaults.poll_interval.as_secs(),
            batch_size: defaults.batch_size,
            lookback_blocks: defaults.lookback_blocks,
            batch_delay_ms: defaults.batch_delay.as_millis() as u64,
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            namespace: defaults.namespace,
            l1_max_keys: defaults.l1_max_keys,
            redis_url: None,
        }
    }
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 600,
            retention_secs: 3600,
        }
    }
}

impl MirrorConfig {
    pub async fn load_from_file(path: &Path) -> eyre::Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Environment variables win over file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = env("RPC_URL") {
            self.rpc_url = url;
        }
        if let Some(url) = env("WS_URL") {
            self.ws_url = Some(url);
        }
        if let Some(chain_id) = env("CHAIN_ID").and_then(|v| v.parse().ok()) {
            self.chain_id = chain_id;
        }
        for name in ContractName::ALL {
            if let Some(address) = env(name.address_env_var()) {
                self.contracts.insert(name, address);
            }
        }

        if let Some(url) = redis_url_from_env() {
            self.cache.redis_url = Some(url);
        }

        if let Some(path) = env(common::event_store::SNAPSHOT_PATH_ENV_VAR) {
            self.snapshot_path = Some(path);
        }
        if let Some(url) = env("AI_SERVICE_URL") {
            self.ai_service_url = Some(url);
        }
        self
    }

    pub fn resolved_ws_url(&self) -> Option<String> {
        self.ws_url.clone().or_else(|| derive_ws_url(&self.rpc_url))
    }

    /// Indexer settings, with the `INDEXER_*` variables applied last.
    pub fn indexer_config(&self) -> IndexerConfig {
        let mut config = IndexerConfig {
            chain_id: self.chain_id,
            batch_size: self.indexer.batch_size.max(1),
            lookback_blocks: self.indexer.lookback_blocks,
            batch_delay: Duration::from_millis(self.indexer.batch_delay_ms),
            poll_interval: Duration::from_secs(self.indexer.poll_interval_secs.max(1)),
            ..IndexerConfig::default()
        };
        config.apply_env_overrides();

        for name in ContractName::ALL {
            let contract = match self.contracts.get(&name) {
                Some(address) => ContractConfig::with_address(name, address.clone()),
                None => ContractConfig {
                    address: None,
                    ..ContractConfig::with_address(name, "")
                },
            };
            config = config.with_contract(contract);
        }
        config
    }

    /// Cache settings, with the `CACHE_*` variables applied last.
    pub fn cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::default()
            .with_namespace(self.cache.namespace.clone())
            .with_l1_max_keys(self.cache.l1_max_keys.max(1));
        config.apply_env_overrides();
        config
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror.json");
        std::fs::write(
            &path,
            r#"{
                "rpc_url": "https://polygon-rpc.example",
                "contracts": { "Token": "0x00000000000000000000000000000000000000aa" },
                "indexer": { "batch_size": 500 }
            }"#,
        )
        .unwrap();

        let config = MirrorConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.rpc_url, "https://polygon-rpc.example");
        assert_eq!(config.chain_id, 137);
        assert_eq!(config.indexer.batch_size, 500);
        assert_eq!(config.indexer.poll_interval_secs, 12);
        assert_eq!(
            config.resolved_ws_url().as_deref(),
            Some("wss://polygon-rpc.example")
        );

        let indexer = config.indexer_config();
        assert_eq!(indexer.contracts.len(), ContractName::ALL.len());
        let configured: Vec<_> = indexer
            .contracts
            .iter()
            .filter(|c| c.address.is_some())
            .map(|c| c.name)
            .collect();
        assert_eq!(configured, vec![ContractName::Token]);
    }
}
