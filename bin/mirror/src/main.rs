use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;
use chain_indexer::{BlockchainIndexer, RpcChainProvider, WsSettings};
use clap::Parser;
use common::event_store::{MemoryEventStore, SnapshotManager};
use eyre::{Result, WrapErr};
use job_queue::{JobHandlers, QueueConfig, QueueService};
use tiered_cache::{CacheStore, MemoryStore, MultiLevelCache};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod followups;
mod handlers;

use config::MirrorConfig;
use followups::FollowUps;
use handlers::{HttpAnalyzer, LoggingNotifier, TxHandler};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration directory
    #[arg(long, default_value = "./configs/dev")]
    config_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run the job queue only
    #[arg(long)]
    no_indexer: bool,

    /// Run the indexer only
    #[arg(long)]
    no_queue: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Chain Mirror");

    let config_file = PathBuf::from(&cli.config_path).join("mirror.json");
    let config = if config_file.exists() {
        MirrorConfig::load_from_file(&config_file)
            .await
            .wrap_err_with(|| format!("failed to load {}", config_file.display()))?
    } else {
        tracing::warn!("mirror.json not found, using defaults");
        MirrorConfig::default()
    }
    .with_env_overrides();

    tracing::info!(
        rpc = %config.rpc_url,
        chain_id = config.chain_id,
        contracts = config.contracts.len(),
        "Config loaded"
    );

    let cache = Arc::new(build_cache(&config).await);

    let snapshot = config.snapshot_path.as_ref().map(SnapshotManager::new);
    let store = Arc::new(match &snapshot {
        Some(snapshot) => {
            let store = snapshot.load_store()?;
            tracing::info!(events = store.len(), path = %snapshot.path().display(), "Event store restored");
            store
        }
        None => MemoryEventStore::new(),
    });

    let queue = if cli.no_queue {
        tracing::warn!("Job queue disabled");
        None
    } else {
        let queue = Arc::new(build_queue(&config)?);
        queue.init();
        Some(queue)
    };

    // submitted content is validated only when a validator is available
    let validation_queue = queue
        .clone()
        .filter(|_| config.ai_service_url.is_some());
    let followups = Arc::new(FollowUps::new(
        store.clone(),
        validation_queue,
        snapshot.clone(),
    ));

    let indexer = if cli.no_indexer {
        tracing::warn!("Indexer disabled");
        None
    } else {
        let http = ProviderBuilder::new().connect_http(config.rpc_url.parse()?);
        let ws = WsSettings {
            url: config.resolved_ws_url(),
            ..WsSettings::default()
        };
        let provider = Arc::new(RpcChainProvider::new(http, ws));
        let indexer = Arc::new(BlockchainIndexer::new(
            config.indexer_config(),
            provider,
            store.clone(),
            cache.clone(),
        ));

        followups.clone().spawn(indexer.subscribe());
        indexer.start().await.wrap_err("indexer failed to start")?;
        followups.catch_up().await;

        match indexer.get_stats().await {
            Ok(stats) => tracing::info!(
                network = ?stats.network,
                head = ?stats.current_block,
                events = stats.total_events,
                "📊 Indexer ready"
            ),
            Err(e) => tracing::warn!("Stats unavailable: {}", e),
        }
        Some(indexer)
    };

    let cancel = CancellationToken::new();
    let cleanup = queue
        .clone()
        .map(|queue| spawn_job_cleanup(queue, &config, cancel.clone()));

    tracing::info!(
        indexer = indexer.is_some(),
        queue = queue.is_some(),
        "Chain Mirror running"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutdown signal received");
    cancel.cancel();

    if let Some(indexer) = &indexer {
        indexer.shutdown().await;
    }
    if let Some(queue) = &queue {
        queue.shutdown().await;
    }
    if let Some(cleanup) = cleanup {
        let _ = cleanup.await;
    }
    followups.save_snapshot().await;

    tracing::info!("Chain Mirror stopped");
    Ok(())
}

async fn build_cache(config: &MirrorConfig) -> MultiLevelCache {
    let remote: Arc<dyn CacheStore> = match &config.cache.redis_url {
        #[cfg(feature = "redis")]
        Some(url) => match tiered_cache::RedisStore::connect(url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!("Redis unavailable ({}), using in-process L2", e);
                Arc::new(MemoryStore::new())
            }
        },
        _ => Arc::new(MemoryStore::new()),
    };
    MultiLevelCache::new(config.cache_config(), Some(remote))
}

fn build_queue(config: &MirrorConfig) -> Result<QueueService> {
    let mut handlers = JobHandlers::new().with_notification(Arc::new(LoggingNotifier));

    match std::env::var("PRIVATE_KEY").ok().filter(|k| !k.is_empty()) {
        Some(private_key) => {
            let signer: PrivateKeySigner = private_key.parse()?;
            tracing::info!(from = %signer.address(), "Wallet loaded for signing transactions");
            let provider = ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer))
                .connect_http(config.rpc_url.parse()?);

            let tx = Arc::new(TxHandler::new(provider, contract_addresses(config)));
            handlers = handlers.with_blockchain(tx.clone()).with_nft(tx);
        }
        None => {
            tracing::warn!("PRIVATE_KEY not set, blockchain and NFT jobs will fail");
        }
    }

    if let Some(url) = &config.ai_service_url {
        let analyzer = Arc::new(HttpAnalyzer::new(url.clone(), Duration::from_secs(30))?);
        handlers = handlers.with_ai(analyzer.clone()).with_validation(analyzer);
        tracing::info!(%url, "AI service configured");
    }

    Ok(QueueService::new(QueueConfig::default(), handlers))
}

fn contract_addresses(config: &MirrorConfig) -> BTreeMap<common::ContractName, Address> {
    config
        .contracts
        .iter()
        .filter_map(|(name, address)| match address.parse::<Address>() {
            Ok(parsed) => Some((*name, parsed)),
            Err(_) => {
                tracing::warn!(contract = %name, %address, "Invalid contract address, skipping");
                None
            }
        })
        .collect()
}

fn spawn_job_cleanup(
    queue: Arc<QueueService>,
    config: &MirrorConfig,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let every = Duration::from_secs(config.jobs.cleanup_interval_secs.max(1));
    let retention = Duration::from_secs(config.jobs.retention_secs);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = queue.clean_old_jobs(retention) {
                        tracing::debug!("Job cleanup skipped: {}", e);
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}
