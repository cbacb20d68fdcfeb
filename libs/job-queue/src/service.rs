//! Submission, status and lifecycle surface of the job orchestrator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::handlers::JobHandlers;
use crate::store::JobStore;
use crate::types::{
    AiRequest, CleanupReport, ContentValidation, Job, JobHandle, JobId, JobOptions, JobPayload,
    JobEvent, NotificationPayload, OnChainOperation, QueueClass, QueueStats,
};
use crate::worker::{ClassWorker, WorkerShared};

struct Running {
    store: Arc<JobStore>,
    wakeups: HashMap<QueueClass, Arc<Notify>>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

/// Job orchestrator with one worker pool per [`QueueClass`].
///
/// Constructed idle; [`QueueService::init`] starts the pools and
/// [`QueueService::shutdown`] drains them. Submissions outside that window
/// fail with [`QueueError::NotInitialized`].
pub struct QueueService {
    config: QueueConfig,
    handlers: JobHandlers,
    events: broadcast::Sender<JobEvent>,
    running: RwLock<Option<Running>>,
}

impl QueueService {
    pub fn new(config: QueueConfig, handlers: JobHandlers) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            handlers,
            events,
            running: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Start every class worker. Must be called inside a tokio runtime.
    /// Calling it again while running is a no-op.
    pub fn init(&self) {
        let mut running = self.running.write();
        if running.is_some() {
            return;
        }

        let store = Arc::new(JobStore::new());
        let shared = Arc::new(WorkerShared {
            store: store.clone(),
            handlers: self.handlers.clone(),
            events: self.events.clone(),
            gas_multiplier_step: self.config.gas_multiplier_step,
        });
        let cancel = CancellationToken::new();
        let mut wakeups = HashMap::new();
        let mut workers = Vec::new();

        for class in QueueClass::ALL {
            let wakeup = Arc::new(Notify::new());
            let worker = ClassWorker::new(
                class,
                self.config.class(class),
                shared.clone(),
                wakeup.clone(),
                cancel.child_token(),
            );
            workers.push(tokio::spawn(worker.run()));
            wakeups.insert(class, wakeup);
        }

        tracing::info!("🚀 Job queue started with {} classes", workers.len());
        *running = Some(Running {
            store,
            wakeups,
            cancel,
            workers,
        });
    }

    pub fn is_running(&self) -> bool {
        self.running.read().is_some()
    }

    /// Lifecycle notifications for every job, correlated by tracking id.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Submit a contract transaction. NFT operations route to the NFT class.
    pub fn add_blockchain_job(
        &self,
        operation: impl Into<OnChainOperation>,
        opts: JobOptions,
    ) -> Result<JobHandle, QueueError> {
        self.submit(JobPayload::from(operation.into()), opts)
    }

    pub fn add_validation_job(
        &self,
        content_hash: impl Into<String>,
        content: impl Into<String>,
        opts: JobOptions,
    ) -> Result<JobHandle, QueueError> {
        self.submit(
            JobPayload::ValidateContent(ContentValidation {
                content_hash: content_hash.into(),
                content: content.into(),
            }),
            opts,
        )
    }

    pub fn add_ai_job(&self, request: AiRequest, opts: JobOptions) -> Result<JobHandle, QueueError> {
        self.submit(JobPayload::AiAnalyze(request), opts)
    }

    /// Best-effort: returns `None` and logs when the queue is not running.
    pub fn add_notification(
        &self,
        user_id: impl Into<String>,
        kind: impl Into<String>,
        data: Value,
    ) -> Option<JobHandle> {
        let payload = JobPayload::Notification(NotificationPayload {
            user_id: user_id.into(),
            kind: kind.into(),
            data,
        });
        match self.submit(payload, JobOptions::default()) {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!("Dropping notification: {}", err);
                None
            }
        }
    }

    /// Current record of a job. `None` when the id is unknown to `class`.
    pub fn get_job_status(&self, class: QueueClass, id: JobId) -> Result<Option<Job>, QueueError> {
        Ok(self.store()?.get(class, id))
    }

    pub fn find_by_tracking_id(&self, tracking_id: &str) -> Result<Vec<Job>, QueueError> {
        Ok(self.store()?.find_by_tracking_id(tracking_id))
    }

    pub fn get_queue_stats(&self) -> Result<QueueStats, QueueError> {
        Ok(self.store()?.stats())
    }

    /// Purge completed jobs older than `grace` and failed ones older than
    /// seven times `grace`.
    pub fn clean_old_jobs(&self, grace: Duration) -> Result<CleanupReport, QueueError> {
        let store = self.store()?;
        let now = Utc::now();
        let completed_cutoff = cutoff(now, grace);
        let failed_cutoff = cutoff(now, grace.saturating_mul(7));

        let report = store.cleanup(completed_cutoff, failed_cutoff);
        tracing::info!(
            completed = report.completed_removed,
            failed = report.failed_removed,
            "🧹 Cleaned old jobs"
        );
        Ok(report)
    }

    /// Stop accepting work, let in-flight jobs finish, then drop every record.
    pub async fn shutdown(&self) {
        let running = self.running.write().take();
        let Some(running) = running else {
            return;
        };

        tracing::info!("🛑 Shutting down job queue");
        running.cancel.cancel();
        for worker in running.workers {
            if let Err(e) = worker.await {
                tracing::error!("Job worker panicked: {:?}", e);
            }
        }
        tracing::info!("✓ Job queue stopped");
    }

    fn submit(&self, payload: JobPayload, opts: JobOptions) -> Result<JobHandle, QueueError> {
        let running = self.running.read();
        let running = running.as_ref().ok_or(QueueError::NotInitialized)?;

        let class = payload.class();
        let max_attempts = self.config.class(class).max_attempts;
        let handle = running.store.insert(payload, opts, max_attempts);
        if let Some(wakeup) = running.wakeups.get(&class) {
            wakeup.notify_one();
        }

        tracing::debug!(
            %class,
            job_id = handle.id,
            tracking_id = %handle.tracking_id,
            "Job queued"
        );
        Ok(handle)
    }

    fn store(&self) -> Result<Arc<JobStore>, QueueError> {
        self.running
            .read()
            .as_ref()
            .map(|r| r.store.clone())
            .ok_or(QueueError::NotInitialized)
    }
}

fn cutoff(now: DateTime<Utc>, grace: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(grace)
        .ok()
        .and_then(|grace| now.checked_sub_signed(grace))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
