//! In-process event store.
//!
//! Records live in a `BTreeMap` keyed by natural key, so the uniqueness
//! constraint is the map key itself.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::store::{EventStore, InsertOutcome, StoreError};
use super::types::{ActivityBucket, ContractEventCount, EventFilter, IndexedEvent, NaturalKey};
use crate::contracts::ContractName;
use crate::normalize_address;

/// Thread-safe in-memory [`EventStore`].
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<BTreeMap<NaturalKey, IndexedEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from previously persisted events. Later duplicates are dropped.
    pub fn from_events(events: Vec<IndexedEvent>) -> Self {
        let mut map = BTreeMap::new();
        for event in events {
            map.entry(event.natural_key()).or_insert(event);
        }
        Self {
            events: RwLock::new(map),
        }
    }

    /// Copy of every stored event, ordered by natural key.
    pub fn snapshot(&self) -> Vec<IndexedEvent> {
        self.events.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert(&self, event: IndexedEvent) -> Result<(), StoreError> {
        let mut events = self.events.write();
        let key = event.natural_key();
        if events.contains_key(&key) {
            return Err(StoreError::Duplicate {
                tx_hash: key.0,
                log_index: key.1,
            });
        }
        events.insert(key, event);
        Ok(())
    }

    async fn insert_many(&self, batch: Vec<IndexedEvent>) -> Result<InsertOutcome, StoreError> {
        let mut events = self.events.write();
        let mut outcome = InsertOutcome::default();
        for event in batch {
            let key = event.natural_key();
            if events.contains_key(&key) {
                outcome.duplicates += 1;
                continue;
            }
            events.insert(key, event);
            outcome.inserted += 1;
        }
        Ok(outcome)
    }

    async fn last_indexed_block(
        &self,
        contract: ContractName,
        chain_id: u64,
    ) -> Result<Option<u64>, StoreError> {
        Ok(self
            .events
            .read()
            .values()
            .filter(|e| e.contract_name == contract && e.chain_id == chain_id)
            .map(|e| e.block_number)
            .max())
    }

    async fn find(&self, filter: &EventFilter) -> Result<Vec<IndexedEvent>, StoreError> {
        let events = self.events.read();
        let mut matching: Vec<&IndexedEvent> = events.values().filter(|e| filter.matches(e)).collect();
        matching.sort_by(|a, b| {
            b.block_number
                .cmp(&a.block_number)
                .then(b.log_index.cmp(&a.log_index))
        });
        Ok(matching
            .into_iter()
            .skip(filter.skip)
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn find_unprocessed(
        &self,
        contract: Option<ContractName>,
        limit: usize,
    ) -> Result<Vec<IndexedEvent>, StoreError> {
        let events = self.events.read();
        let mut pending: Vec<&IndexedEvent> = events
            .values()
            .filter(|e| !e.processed && contract.map_or(true, |c| e.contract_name == c))
            .collect();
        pending.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(pending.into_iter().take(limit).cloned().collect())
    }

    async fn mark_processed(
        &self,
        keys: &[NaturalKey],
        error: Option<String>,
    ) -> Result<usize, StoreError> {
        let mut events = self.events.write();
        let now = Utc::now();
        let mut transitioned = 0;
        for key in keys {
            if let Some(event) = events.get_mut(key) {
                if event.mark_processed(error.clone(), now) {
                    transitioned += 1;
                }
            }
        }
        Ok(transitioned)
    }

    async fn record_processing_error(
        &self,
        key: &NaturalKey,
        error: String,
    ) -> Result<bool, StoreError> {
        let mut events = self.events.write();
        match events.get_mut(key) {
            Some(event) if event.processed => {
                event.processing_error = Some(error);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn user_activity(&self, address: &str) -> Result<Vec<ActivityBucket>, StoreError> {
        let address = normalize_address(address);
        let events = self.events.read();
        let mut buckets: BTreeMap<(ContractName, String), ActivityBucket> = BTreeMap::new();

        for event in events.values().filter(|e| e.normalized.involves(&address)) {
            buckets
                .entry((event.contract_name, event.event_name.clone()))
                .and_modify(|b| {
                    b.count += 1;
                    b.first_block = b.first_block.min(event.block_number);
                    if event.block_number >= b.last_block {
                        b.last_block = event.block_number;
                    }
                    b.last_activity = b.last_activity.max(event.block_timestamp);
                })
                .or_insert_with(|| ActivityBucket {
                    contract_name: event.contract_name,
                    event_name: event.event_name.clone(),
                    count: 1,
                    first_block: event.block_number,
                    last_block: event.block_number,
                    last_activity: event.block_timestamp,
                });
        }

        Ok(buckets.into_values().collect())
    }

    async fn event_counts(&self) -> Result<Vec<ContractEventCount>, StoreError> {
        let events = self.events.read();
        let mut counts: BTreeMap<(ContractName, String), ContractEventCount> = BTreeMap::new();

        for event in events.values() {
            counts
                .entry((event.contract_name, event.event_name.clone()))
                .and_modify(|c| {
                    c.count += 1;
                    c.min_block = c.min_block.min(event.block_number);
                    c.max_block = c.max_block.max(event.block_number);
                })
                .or_insert_with(|| ContractEventCount {
                    contract_name: event.contract_name,
                    event_name: event.event_name.clone(),
                    count: 1,
                    min_block: event.block_number,
                    max_block: event.block_number,
                });
        }

        Ok(counts.into_values().collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.events.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::types::fixtures::event;

    #[tokio::test]
    async fn test_insert_duplicate_rejected() {
        let store = MemoryEventStore::new();
        let e = event(ContractName::Token, "Transfer", "0xa", 0, 10);

        store.insert(e.clone()).await.unwrap();
        let err = store.insert(e).await.unwrap_err();

        assert!(err.is_duplicate());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_many_unordered() {
        let store = MemoryEventStore::new();
        store
            .insert(event(ContractName::Token, "Transfer", "0xa", 0, 10))
            .await
            .unwrap();

        let outcome = store
            .insert_many(vec![
                event(ContractName::Token, "Transfer", "0xa", 0, 10),
                event(ContractName::Token, "Transfer", "0xa", 1, 10),
                event(ContractName::Token, "Transfer", "0xb", 0, 11),
            ])
            .await
            .unwrap();

        assert_eq!(outcome, InsertOutcome { inserted: 2, duplicates: 1 });
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_last_indexed_block_per_contract_and_chain() {
        let store = MemoryEventStore::new();
        let mut other_chain = event(ContractName::Token, "Transfer", "0xc", 0, 900);
        other_chain.chain_id = 1;

        store
            .insert_many(vec![
                event(ContractName::Token, "Transfer", "0xa", 0, 10),
                event(ContractName::Token, "Transfer", "0xb", 0, 42),
                event(ContractName::Staking, "Staked", "0xd", 0, 99),
                other_chain,
            ])
            .await
            .unwrap();

        assert_eq!(store.last_indexed_block(ContractName::Token, 137).await.unwrap(), Some(42));
        assert_eq!(store.last_indexed_block(ContractName::Token, 1).await.unwrap(), Some(900));
        assert_eq!(store.last_indexed_block(ContractName::Nft, 137).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_newest_first_with_paging() {
        let store = MemoryEventStore::new();
        for block in 1..=5u64 {
            store
                .insert(event(ContractName::Token, "Transfer", &format!("0x{}", block), 0, block))
                .await
                .unwrap();
        }

        let filter = EventFilter {
            limit: 2,
            skip: 1,
            ..Default::default()
        };
        let found = store.find(&filter).await.unwrap();
        let blocks: Vec<u64> = found.iter().map(|e| e.block_number).collect();
        assert_eq!(blocks, vec![4, 3]);
    }

    #[tokio::test]
    async fn test_mark_processed_transitions_once() {
        let store = MemoryEventStore::new();
        store
            .insert(event(ContractName::Token, "Transfer", "0xa", 0, 10))
            .await
            .unwrap();
        let keys = vec![("0xa".to_string(), 0u64), ("0xmissing".to_string(), 3u64)];

        assert_eq!(store.mark_processed(&keys, None).await.unwrap(), 1);
        assert_eq!(store.mark_processed(&keys, None).await.unwrap(), 0);
        assert!(store.find_unprocessed(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_processing_error_needs_processed_event() {
        let store = MemoryEventStore::new();
        store
            .insert(event(ContractName::Token, "Transfer", "0xa", 0, 10))
            .await
            .unwrap();
        let key = ("0xa".to_string(), 0u64);

        assert!(!store.record_processing_error(&key, "boom".into()).await.unwrap());
        assert_eq!(store.mark_processed(&[key.clone()], None).await.unwrap(), 1);
        assert!(store.record_processing_error(&key, "boom".into()).await.unwrap());

        let stored = store.snapshot();
        assert!(stored[0].processed);
        assert_eq!(stored[0].processing_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_user_activity_groups_by_contract_event() {
        let store = MemoryEventStore::new();
        let user = "0xabc0000000000000000000000000000000000001";

        let mut staked1 = event(ContractName::Staking, "Staked", "0x1", 0, 10);
        staked1.normalized.user = Some(user.into());
        let mut staked2 = event(ContractName::Staking, "Staked", "0x2", 0, 20);
        staked2.normalized.user = Some(user.into());
        let mut transfer = event(ContractName::Token, "Transfer", "0x3", 0, 15);
        transfer.normalized.to = Some(user.into());
        let unrelated = event(ContractName::Token, "Transfer", "0x4", 0, 16);

        store
            .insert_many(vec![staked1, staked2, transfer, unrelated])
            .await
            .unwrap();

        let activity = store.user_activity(&user.to_uppercase().replace("0X", "0x")).await.unwrap();
        assert_eq!(activity.len(), 2);

        let staked = activity
            .iter()
            .find(|b| b.contract_name == ContractName::Staking)
            .unwrap();
        assert_eq!(staked.count, 2);
        assert_eq!(staked.first_block, 10);
        assert_eq!(staked.last_block, 20);
    }

    #[tokio::test]
    async fn test_event_counts_min_max() {
        let store = MemoryEventStore::new();
        store
            .insert_many(vec![
                event(ContractName::Token, "Transfer", "0x1", 0, 30),
                event(ContractName::Token, "Transfer", "0x2", 0, 5),
                event(ContractName::Token, "Approval", "0x3", 0, 7),
            ])
            .await
            .unwrap();

        let counts = store.event_counts().await.unwrap();
        let transfers = counts.iter().find(|c| c.event_name == "Transfer").unwrap();
        assert_eq!(transfers.count, 2);
        assert_eq!(transfers.min_block, 5);
        assert_eq!(transfers.max_block, 30);
    }
}
