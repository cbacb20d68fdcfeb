//! Keeps the event store consistent with chain state.
//!
//! Three paths feed the store concurrently:
//! - historical sync, once per contract at start
//! - the live consumer, draining logs pushed by the provider's subscription
//! - the polling backstop, replaying any range the live feed missed
//!
//! They may deliver the same log more than once; the store's natural key
//! absorbs the duplicates.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use common::event_store::{EventStore, IndexedEvent, NormalizedArgs, INDEXER_VERSION};
use common::{network_name, ContractName};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tiered_cache::{CacheKey, MultiLevelCache, Ttl};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::IndexerConfig;
use crate::decoder::ContractDecoder;
use crate::error::{ChainError, IndexerError};
use crate::provider::{BlockInfo, ChainProvider, RawLog};

const NOTIFICATION_CAPACITY: usize = 256;

/// Chain identity resolved at init.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub chain_id: u64,
    pub name: String,
}

/// Outcome of syncing one contract over a block range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub contract: ContractName,
    pub from_block: u64,
    pub to_block: u64,
    pub fetched_logs: usize,
    pub decoded: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

impl SyncReport {
    fn new(contract: ContractName, from_block: u64, to_block: u64) -> Self {
        Self {
            contract,
            from_block,
            to_block,
            fetched_logs: 0,
            decoded: 0,
            inserted: 0,
            duplicates: 0,
        }
    }

    /// `true` when the range was empty (cursor already at head).
    pub fn is_up_to_date(&self) -> bool {
        self.from_block > self.to_block
    }
}

/// Outcome of one polling backstop tick.
#[derive(Debug, Clone, Default)]
pub struct PollReport {
    pub synced: Vec<SyncReport>,
    pub failed: Vec<(ContractName, String)>,
}

impl PollReport {
    pub fn inserted(&self) -> usize {
        self.synced.iter().map(|r| r.inserted).sum()
    }
}

/// Domain notifications emitted by the indexer.
#[derive(Debug, Clone)]
pub enum IndexerNotification {
    /// A live event was persisted for the first time
    EventIndexed(Box<IndexedEvent>),
    /// A historical or backstop sync inserted events
    SyncCompleted(SyncReport),
}

/// The event indexer service.
pub struct BlockchainIndexer {
    pub(crate) config: IndexerConfig,
    pub(crate) provider: Arc<dyn ChainProvider>,
    pub(crate) store: Arc<dyn EventStore>,
    pub(crate) cache: Arc<MultiLevelCache>,
    network: RwLock<Option<NetworkInfo>>,
    decoders: RwLock<BTreeMap<ContractName, Arc<ContractDecoder>>>,
    /// Highest block scanned by cursor-driven syncs, per contract
    scanned: Mutex<HashMap<ContractName, u64>>,
    pub(crate) running: AtomicBool,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    notifications: broadcast::Sender<IndexerNotification>,
}

impl BlockchainIndexer {
    pub fn new(
        config: IndexerConfig,
        provider: Arc<dyn ChainProvider>,
        store: Arc<dyn EventStore>,
        cache: Arc<MultiLevelCache>,
    ) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            config,
            provider,
            store,
            cache,
            network: RwLock::new(None),
            decoders: RwLock::new(BTreeMap::new()),
            scanned: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            notifications,
        }
    }

    /// Resolve network identity and build a decoder per configured contract.
    ///
    /// Contracts without an address are skipped.
    pub async fn init(&self) -> Result<NetworkInfo, IndexerError> {
        let chain_id = self.provider.chain_id().await?;
        let network = NetworkInfo {
            chain_id,
            name: network_name(chain_id).to_string(),
        };
        if chain_id != self.config.chain_id {
            tracing::warn!(
                configured = self.config.chain_id,
                reported = chain_id,
                "Provider chain id differs from configuration, using provider's"
            );
        }

        let mut decoders = BTreeMap::new();
        for contract in &self.config.contracts {
            let Some(raw_address) = contract.address.as_deref() else {
                tracing::info!("⏭️ No address configured for {}, skipping", contract.name);
                continue;
            };
            let address: Address =
                raw_address
                    .trim()
                    .parse()
                    .map_err(|_| IndexerError::InvalidAddress {
                        contract: contract.name,
                        address: raw_address.to_string(),
                    })?;
            let decoder = ContractDecoder::for_contract(contract.name, address, &contract.events)?;
            tracing::info!(
                "📋 Tracking {} at {:?} ({} events)",
                contract.name,
                address,
                contract.events.len()
            );
            decoders.insert(contract.name, Arc::new(decoder));
        }

        tracing::info!(
            chain_id,
            network = %network.name,
            contracts = decoders.len(),
            "🔗 Indexer initialized"
        );
        *self.decoders.write() = decoders;
        *self.network.write() = Some(network.clone());
        Ok(network)
    }

    pub fn network_info(&self) -> Option<NetworkInfo> {
        self.network.read().clone()
    }

    fn network(&self) -> Result<NetworkInfo, IndexerError> {
        self.network.read().clone().ok_or(IndexerError::NotInitialized)
    }

    fn decoder(&self, contract: ContractName) -> Result<Arc<ContractDecoder>, IndexerError> {
        if self.network.read().is_none() {
            return Err(IndexerError::NotInitialized);
        }
        self.decoders
            .read()
            .get(&contract)
            .cloned()
            .ok_or(IndexerError::ContractNotConfigured(contract))
    }

    /// Contracts with a decoder, in stable order.
    pub fn contracts(&self) -> Vec<ContractName> {
        self.decoders.read().keys().copied().collect()
    }

    pub(crate) fn tracked(&self) -> Vec<(ContractName, Address)> {
        self.decoders
            .read()
            .values()
            .map(|d| (d.contract(), d.address()))
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexerNotification> {
        self.notifications.subscribe()
    }

    /// Historical sync for every contract, then spawn the live consumer,
    /// the subscription watcher and the polling backstop.
    pub async fn start(self: &Arc<Self>) -> Result<(), IndexerError> {
        if self.network.read().is_none() {
            self.init().await?;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let contracts = self.contracts();
        tracing::info!("🚀 Starting blockchain indexer ({} contracts)", contracts.len());

        for contract in contracts {
            if let Err(e) = self.sync_contract(contract).await {
                tracing::error!(
                    contract = %contract,
                    error = %e,
                    "❌ Historical sync failed, backstop will retry"
                );
            }
        }

        let (tx, rx) = mpsc::channel(self.config.live_channel_capacity.max(1));
        let addresses: Vec<Address> = self.tracked().into_iter().map(|(_, a)| a).collect();

        let provider = self.provider.clone();
        let cancel = self.cancel.clone();
        let watcher = tokio::spawn(async move {
            if let Err(e) = provider.watch_logs(addresses, tx, cancel).await {
                tracing::error!("❌ Live subscription ended: {}", e);
            }
        });

        let this = Arc::clone(self);
        let consumer = tokio::spawn(async move { this.run_live_consumer(rx).await });

        let this = Arc::clone(self);
        let poller = tokio::spawn(async move { this.run_poll_loop().await });

        self.tasks.lock().extend([watcher, consumer, poller]);
        tracing::info!("✅ Indexer running");
        Ok(())
    }

    /// Stop polling, detach the live feed, drain delivered logs and wait for
    /// in-flight syncs to finish.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("🛑 Stopping blockchain indexer");
        self.cancel.cancel();

        let handles = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Indexer task ended abnormally: {}", e);
            }
        }
        tracing::info!("✅ Indexer stopped");
    }

    async fn run_live_consumer(&self, mut rx: mpsc::Receiver<RawLog>) {
        // ends once the watcher drops its sender and the channel is drained
        while let Some(raw) = rx.recv().await {
            if let Err(e) = self.handle_live_log(raw).await {
                tracing::warn!("⚠️ Failed to index live log: {}", e);
            }
        }
        tracing::debug!("Live consumer drained");
    }

    async fn run_poll_loop(&self) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires immediately; historical sync just ran
        ticker.tick().await;

        tracing::info!(
            "📊 Polling backstop every {:?}",
            self.config.poll_interval
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }

    /// One backstop tick over every contract. Failures are contained per
    /// contract and reported.
    pub async fn poll_once(&self) -> PollReport {
        let mut report = PollReport::default();
        for contract in self.contracts() {
            match self.sync_contract(contract).await {
                Ok(sync) => {
                    if sync.inserted > 0 {
                        tracing::info!(
                            "🩹 Backstop recovered {} {} events in blocks {}..={}",
                            sync.inserted,
                            contract,
                            sync.from_block,
                            sync.to_block
                        );
                    }
                    report.synced.push(sync);
                }
                Err(e) => {
                    tracing::warn!(contract = %contract, error = %e, "Backstop sync failed");
                    report.failed.push((contract, e.to_string()));
                }
            }
        }
        report
    }

    /// Sync `contract` from its cursor to the current head.
    ///
    /// The cursor is `last indexed block + 1`, re-read from the store on
    /// every call, or `head - lookback` when nothing is indexed yet.
    pub async fn sync_contract(&self, contract: ContractName) -> Result<SyncReport, IndexerError> {
        let decoder = self.decoder(contract)?;
        let network = self.network()?;

        let head = self.provider.block_number().await.map_err(|e| {
            tracing::warn!(contract = %contract, error = %e, "⚠️ Failed to read chain head");
            e
        })?;
        let from = self.cursor(contract, network.chain_id, head).await?;

        if from > head {
            return Ok(SyncReport::new(contract, from, head));
        }
        self.sync_blocks(&decoder, &network, from, head, true).await
    }

    /// First block `sync_contract` would fetch.
    ///
    /// Derived from the highest stored block, so a live event stored ahead
    /// of an unscanned range moves the cursor past that range. The live
    /// path logs a warning when that happens.
    pub(crate) async fn cursor(
        &self,
        contract: ContractName,
        chain_id: u64,
        head: u64,
    ) -> Result<u64, IndexerError> {
        let from = match self.store.last_indexed_block(contract, chain_id).await? {
            Some(last) => last + 1,
            None => head.saturating_sub(self.config.lookback_blocks),
        };
        // skip windows already scanned and found empty
        let scanned = self.scanned.lock().get(&contract).copied();
        Ok(match scanned {
            Some(scanned) => from.max(scanned + 1),
            None => from,
        })
    }

    /// Sync an explicit inclusive block range.
    pub async fn sync_range(
        &self,
        contract: ContractName,
        from: u64,
        to: u64,
    ) -> Result<SyncReport, IndexerError> {
        let decoder = self.decoder(contract)?;
        let network = self.network()?;
        self.sync_blocks(&decoder, &network, from, to, false).await
    }

    async fn sync_blocks(
        &self,
        decoder: &ContractDecoder,
        network: &NetworkInfo,
        from: u64,
        to: u64,
        advance_scan: bool,
    ) -> Result<SyncReport, IndexerError> {
        let contract = decoder.contract();
        let mut report = SyncReport::new(contract, from, to);
        if from > to {
            return Ok(report);
        }

        tracing::debug!(contract = %contract, from_block = from, to_block = to, "🔄 Syncing");

        let batch_size = self.config.batch_size.max(1);
        let mut start = from;
        loop {
            let end = start.saturating_add(batch_size - 1).min(to);

            let logs = self
                .provider
                .get_logs(decoder.address(), start, end)
                .await
                .map_err(|e| {
                    tracing::warn!(
                        contract = %contract,
                        from_block = start,
                        to_block = end,
                        error = %e,
                        "⚠️ Batch fetch failed, cursor unchanged"
                    );
                    e
                })?;
            report.fetched_logs += logs.len();

            let mut events = Vec::new();
            for raw in &logs {
                if let Some(event) = self.build_event(decoder, network, raw).await? {
                    events.push(event);
                }
            }
            report.decoded += events.len();

            if !events.is_empty() {
                let mut involved: Vec<String> = Vec::new();
                for event in &events {
                    for address in event.normalized.involved_addresses() {
                        if !involved.iter().any(|a| a == address) {
                            involved.push(address.to_string());
                        }
                    }
                }

                let outcome = self.store.insert_many(events).await.map_err(|e| {
                    tracing::error!(
                        contract = %contract,
                        from_block = start,
                        to_block = end,
                        error = %e,
                        "❌ Failed to persist batch"
                    );
                    e
                })?;
                report.inserted += outcome.inserted;
                report.duplicates += outcome.duplicates;
                if outcome.inserted > 0 {
                    // the batch may hold duplicates too, so this over-invalidates
                    for address in &involved {
                        self.cache.invalidate(address).await;
                    }
                    self.invalidate_contract(contract).await;
                }
            }

            if advance_scan {
                let mut scanned = self.scanned.lock();
                let entry = scanned.entry(contract).or_insert(end);
                *entry = (*entry).max(end);
            }

            if end >= to {
                break;
            }
            start = end + 1;
            if !self.config.batch_delay.is_zero() {
                sleep(self.config.batch_delay).await;
            }
        }

        if report.inserted > 0 {
            tracing::info!(
                "✅ {} synced blocks {}..={}: {} new events ({} duplicates)",
                contract,
                from,
                to,
                report.inserted,
                report.duplicates
            );
            let _ = self
                .notifications
                .send(IndexerNotification::SyncCompleted(report.clone()));
        }
        Ok(report)
    }

    /// Decode, persist and announce one live log.
    ///
    /// Returns the stored event, or `None` when the log was skipped or
    /// already indexed.
    pub async fn handle_live_log(&self, raw: RawLog) -> Result<Option<IndexedEvent>, IndexerError> {
        let network = self.network()?;
        let decoder = self
            .decoders
            .read()
            .values()
            .find(|d| d.address() == raw.address)
            .cloned();
        let Some(decoder) = decoder else {
            tracing::trace!("Ignoring log from untracked address {:?}", raw.address);
            return Ok(None);
        };

        let Some(event) = self.build_event(&decoder, &network, &raw).await? else {
            return Ok(None);
        };

        match self.store.insert(event.clone()).await {
            Ok(()) => {}
            Err(e) if e.is_duplicate() => {
                tracing::debug!(
                    tx_hash = %event.transaction_hash,
                    log_index = event.log_index,
                    "Live log already indexed"
                );
                return Ok(None);
            }
            Err(e) => {
                tracing::error!(error = %e, "❌ Failed to persist live event");
                return Err(e.into());
            }
        }

        tracing::info!(
            "📥 {}.{} at block {}",
            event.contract_name,
            event.event_name,
            event.block_number
        );

        let scanned = self.scanned.lock().get(&event.contract_name).copied();
        if let Some(scanned) = scanned {
            if event.block_number > scanned.saturating_add(self.config.batch_size) {
                tracing::warn!(
                    contract = %event.contract_name,
                    block = event.block_number,
                    scanned_to = scanned,
                    "⚠️ Live event far ahead of scanned range, blocks in between will not be backfilled"
                );
            }
        }

        for address in event.normalized.involved_addresses() {
            self.cache.invalidate(address).await;
        }
        self.invalidate_contract(event.contract_name).await;

        let _ = self
            .notifications
            .send(IndexerNotification::EventIndexed(Box::new(event.clone())));
        Ok(Some(event))
    }

    async fn invalidate_contract(&self, contract: ContractName) {
        self.cache
            .invalidate(&CacheKey::events_scope(contract.as_str()))
            .await;
        self.cache.invalidate(&CacheKey::events_scope("all")).await;
    }

    async fn build_event(
        &self,
        decoder: &ContractDecoder,
        network: &NetworkInfo,
        raw: &RawLog,
    ) -> Result<Option<IndexedEvent>, IndexerError> {
        if raw.removed {
            return Ok(None);
        }
        let Some(decoded) = decoder.decode(raw) else {
            return Ok(None);
        };
        let (Some(block_number), Some(tx_hash), Some(log_index)) =
            (raw.block_number, raw.transaction_hash, raw.log_index)
        else {
            tracing::debug!("Skipping pending {} log", decoded.name);
            return Ok(None);
        };

        let block = self.get_block_with_cache(block_number).await?;
        let block_timestamp = DateTime::from_timestamp(block.timestamp as i64, 0).unwrap_or_default();
        let normalized = NormalizedArgs::extract(&decoded.args);

        Ok(Some(IndexedEvent {
            contract_name: decoder.contract(),
            contract_address: hex_string(decoder.address().as_slice()),
            event_name: decoded.name,
            event_signature: decoded.signature,
            args: decoded.args,
            normalized,
            block_number,
            block_hash: hex_string(raw.block_hash.unwrap_or(block.hash).as_slice()),
            block_timestamp,
            transaction_hash: hex_string(tx_hash.as_slice()),
            transaction_index: raw.transaction_index.unwrap_or_default(),
            log_index,
            chain_id: network.chain_id,
            network: network.name.clone(),
            processed: false,
            processed_at: None,
            processing_error: None,
            indexed_at: Utc::now(),
            indexer_version: INDEXER_VERSION.to_string(),
        }))
    }

    /// Block metadata through the cache. Blocks are immutable, so they are
    /// kept for a day.
    pub async fn get_block_with_cache(&self, number: u64) -> Result<BlockInfo, IndexerError> {
        let chain_id = self
            .network
            .read()
            .as_ref()
            .map_or(self.config.chain_id, |n| n.chain_id);

        let block = self
            .cache
            .get_or_set(&CacheKey::block(chain_id, number), Ttl::BLOCKCHAIN_DATA, || async {
                self.provider
                    .get_block(number)
                    .await?
                    .ok_or(ChainError::BlockNotFound(number))
            })
            .await?;
        Ok(block)
    }
}

fn hex_string(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
