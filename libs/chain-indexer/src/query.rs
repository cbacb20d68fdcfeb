//! Read surface over the indexed events.

use std::sync::atomic::Ordering;

use alloy::primitives::keccak256;
use chrono::{DateTime, Utc};
use common::event_store::{ActivityBucket, ContractEventCount, EventFilter, IndexedEvent};
use common::{normalize_address, ContractName};
use serde::{Deserialize, Serialize};
use tiered_cache::{CacheKey, CacheStats, Ttl};

use crate::error::IndexerError;
use crate::indexer::BlockchainIndexer;

/// Aggregated activity of one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub address: String,
    pub total_events: u64,
    pub last_activity: Option<DateTime<Utc>>,
    /// Per contract/event counts
    pub activity: Vec<ActivityBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedContract {
    pub name: ContractName,
    pub address: String,
}

/// Indexer status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerStats {
    pub chain_id: Option<u64>,
    pub network: Option<String>,
    /// `None` when the head could not be read
    pub current_block: Option<u64>,
    pub is_running: bool,
    pub contracts: Vec<TrackedContract>,
    pub total_events: usize,
    pub event_counts: Vec<ContractEventCount>,
    pub cache: CacheStats,
}

/// Cache key for a query: scoped by contract so inserts can invalidate it,
/// suffixed with a hash of the full option set.
pub(crate) fn events_query_key(filter: &EventFilter) -> String {
    let scope = filter.contract_name.map_or("all", |c| c.as_str());
    let encoded = serde_json::to_vec(filter).unwrap_or_default();
    CacheKey::events_query(scope, &hex::encode(keccak256(&encoded)))
}

impl BlockchainIndexer {
    /// Matching events, newest first. Results are cached for 30s.
    pub async fn query_events(&self, filter: &EventFilter) -> Result<Vec<IndexedEvent>, IndexerError> {
        let mut filter = filter.clone();
        filter.user_address = filter.user_address.as_deref().map(normalize_address);

        let key = events_query_key(&filter);
        self.cache
            .get_or_set(&key, Ttl::EVENTS_QUERY, || async {
                self.store.find(&filter).await.map_err(IndexerError::from)
            })
            .await
    }

    /// Per contract/event activity of `address`, cached for 5 minutes.
    pub async fn get_user_activity(&self, address: &str) -> Result<UserActivity, IndexerError> {
        let address = normalize_address(address);
        let key = CacheKey::user_activity(&address);

        self.cache
            .get_or_set(&key, Ttl::USER_ACTIVITY, || async {
                let activity = self.store.user_activity(&address).await?;
                Ok::<_, IndexerError>(UserActivity {
                    address: address.clone(),
                    total_events: activity.iter().map(|b| b.count).sum(),
                    last_activity: activity.iter().map(|b| b.last_activity).max(),
                    activity,
                })
            })
            .await
    }

    /// Head, per-contract counts and running status. Never cached.
    pub async fn get_stats(&self) -> Result<IndexerStats, IndexerError> {
        let current_block = match self.provider.block_number().await {
            Ok(head) => Some(head),
            Err(e) => {
                tracing::warn!("Failed to read chain head for stats: {}", e);
                None
            }
        };
        let event_counts = self.store.event_counts().await?;
        let total_events = self.store.count().await?;
        let network = self.network_info();

        Ok(IndexerStats {
            chain_id: network.as_ref().map(|n| n.chain_id),
            network: network.map(|n| n.name),
            current_block,
            is_running: self.running.load(Ordering::SeqCst),
            contracts: self
                .tracked()
                .into_iter()
                .map(|(name, address)| TrackedContract {
                    name,
                    address: format!("0x{}", hex::encode(address.as_slice())),
                })
                .collect(),
            total_events,
            event_counts,
            cache: self.cache.stats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_key_scoped_and_stable() {
        let filter = EventFilter {
            contract_name: Some(ContractName::Staking),
            ..Default::default()
        };
        let key = events_query_key(&filter);
        assert!(key.starts_with(&CacheKey::events_scope("Staking")));
        assert_eq!(key, events_query_key(&filter.clone()));

        let paged = EventFilter { skip: 50, ..filter };
        assert_ne!(key, events_query_key(&paged));
        assert!(events_query_key(&EventFilter::default()).starts_with("events:all:"));
    }
}
