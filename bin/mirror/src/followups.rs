//! Work triggered by indexed events.

use std::sync::Arc;

use chain_indexer::IndexerNotification;
use common::event_store::{EventStore, IndexedEvent, MemoryEventStore, SnapshotManager};
use common::ContractName;
use job_queue::{JobHandle, JobOptions, QueueError, QueueService};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

const CONTENT_SUBMITTED: &str = "ContentSubmitted";

/// Routes indexer notifications to the job queue and the snapshot file.
pub struct FollowUps {
    store: Arc<MemoryEventStore>,
    queue: Option<Arc<QueueService>>,
    snapshot: Option<SnapshotManager>,
}

impl FollowUps {
    /// `queue` is `None` when submitted content should not be validated.
    pub fn new(
        store: Arc<MemoryEventStore>,
        queue: Option<Arc<QueueService>>,
        snapshot: Option<SnapshotManager>,
    ) -> Self {
        Self {
            store,
            queue,
            snapshot,
        }
    }

    /// Enqueue validation for submitted content still marked unprocessed.
    pub async fn catch_up(&self) -> usize {
        let pending = match self
            .store
            .find_unprocessed(Some(ContractName::ContentRegistry), 1000)
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!("Unprocessed event lookup failed: {}", e);
                return 0;
            }
        };

        let mut queued = 0;
        for event in pending.iter().filter(|e| e.event_name == CONTENT_SUBMITTED) {
            if self.handle_event(event).await {
                queued += 1;
            }
        }
        if queued > 0 {
            tracing::info!("⏪ Queued validation for {} pending submissions", queued);
        }
        queued
    }

    /// Handle one indexed event. Returns whether a job was queued.
    ///
    /// The event is claimed by flipping its processed flag before anything
    /// is submitted, so only one caller ever queues a job for it.
    pub async fn handle_event(&self, event: &IndexedEvent) -> bool {
        if event.contract_name != ContractName::ContentRegistry
            || event.event_name != CONTENT_SUBMITTED
        {
            return false;
        }
        let Some(queue) = &self.queue else {
            return false;
        };

        let key = event.natural_key();
        match self.store.mark_processed(std::slice::from_ref(&key), None).await {
            Ok(1) => {}
            Ok(_) => {
                tracing::trace!(tx = %event.transaction_hash, "Submission already handled");
                return false;
            }
            Err(e) => {
                tracing::warn!("Failed to claim {}: {}", event.transaction_hash, e);
                return false;
            }
        }

        match submit_validation(queue, event) {
            Ok(handle) => {
                tracing::info!(
                    post_id = ?event.normalized.post_id,
                    job_id = handle.id,
                    "📝 Content submitted, validation queued"
                );
                true
            }
            Err(e) => {
                tracing::error!(tx = %event.transaction_hash, "❌ Could not queue validation: {}", e);
                if let Err(e) = self.store.record_processing_error(&key, e.to_string()).await {
                    tracing::warn!("Failed to record error for {}: {}", event.transaction_hash, e);
                }
                false
            }
        }
    }

    pub async fn save_snapshot(&self) {
        let Some(snapshot) = self.snapshot.clone() else {
            return;
        };
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || snapshot.save_store(&store)).await {
            Ok(Ok(count)) => tracing::debug!("💾 Snapshot saved ({} events)", count),
            Ok(Err(e)) => tracing::error!("❌ Snapshot save failed: {}", e),
            Err(e) => tracing::error!("❌ Snapshot task failed: {}", e),
        }
    }

    pub fn spawn(
        self: Arc<Self>,
        mut notifications: broadcast::Receiver<IndexerNotification>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(IndexerNotification::EventIndexed(event)) => {
                        self.handle_event(&event).await;
                    }
                    Ok(IndexerNotification::SyncCompleted(report)) => {
                        if report.contract == ContractName::ContentRegistry {
                            self.catch_up().await;
                        }
                        self.save_snapshot().await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("Follow-ups lagged by {} notifications", missed);
                        self.catch_up().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

fn submit_validation(queue: &QueueService, event: &IndexedEvent) -> Result<JobHandle, QueueError> {
    let content_hash = event
        .args
        .get("contentHash")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let mut opts = JobOptions::default().with_tracking_id(format!(
        "content:{}",
        event.normalized.post_id.as_deref().unwrap_or(&event.transaction_hash)
    ));
    opts.user_address = event.normalized.user.clone();

    // content is resolved from the hash by the validator
    queue.add_validation_job(content_hash, String::new(), opts)
}
