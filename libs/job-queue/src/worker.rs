//! Per-class dispatcher: pulls eligible jobs and runs them on a bounded pool.

use std::sync::Arc;

use tokio::sync::{broadcast, Notify, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, timeout};
use tokio_util::sync::CancellationToken;

use crate::config::ClassConfig;
use crate::handlers::JobHandlers;
use crate::rate_limiter::RateLimiter;
use crate::retry::{self, RetryDecision};
use crate::store::JobStore;
use crate::types::{Job, JobContext, JobEvent, JobState, QueueClass};

/// Everything a running job needs.
pub(crate) struct WorkerShared {
    pub store: Arc<JobStore>,
    pub handlers: JobHandlers,
    pub events: broadcast::Sender<JobEvent>,
    pub gas_multiplier_step: f64,
}

pub(crate) struct ClassWorker {
    class: QueueClass,
    config: ClassConfig,
    shared: Arc<WorkerShared>,
    /// Signalled on submission and on retry scheduling
    wakeup: Arc<Notify>,
    cancel: CancellationToken,
}

impl ClassWorker {
    pub fn new(
        class: QueueClass,
        config: ClassConfig,
        shared: Arc<WorkerShared>,
        wakeup: Arc<Notify>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            class,
            config,
            shared,
            wakeup,
            cancel,
        }
    }

    /// Dispatch until cancelled, then wait for in-flight jobs.
    pub async fn run(self) {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut limiter = self.config.rate_limit.map(RateLimiter::from_limit);
        let mut in_flight = JoinSet::new();

        tracing::debug!(
            class = %self.class,
            concurrency = self.config.concurrency,
            "Worker started"
        );

        loop {
            while in_flight.try_join_next().is_some() {}

            let permit = tokio::select! {
                _ = self.cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            if let Some(limiter) = limiter.as_mut() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = limiter.wait_for_slot() => {}
                }
            }

            let Some(job) = self.next_job().await else {
                break;
            };
            if let Some(limiter) = limiter.as_mut() {
                limiter.record_operation();
            }

            let shared = self.shared.clone();
            let wakeup = self.wakeup.clone();
            let config = self.config.clone();
            in_flight.spawn(async move {
                run_job(shared, wakeup, config, job).await;
                drop(permit);
            });
        }

        let draining = in_flight.len();
        if draining > 0 {
            tracing::info!(class = %self.class, draining, "Waiting for in-flight jobs");
        }
        while in_flight.join_next().await.is_some() {}
        tracing::debug!(class = %self.class, "Worker stopped");
    }

    /// Next eligible job, or `None` once cancelled.
    async fn next_job(&self) -> Option<Job> {
        loop {
            if let Some(job) = self.shared.store.take_next(self.class) {
                return Some(job);
            }

            let next_due = self.shared.store.next_wakeup(self.class);
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = self.wakeup.notified() => {}
                _ = async {
                    match next_due {
                        Some(at) => sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {}
            }
        }
    }
}

async fn run_job(shared: Arc<WorkerShared>, wakeup: Arc<Notify>, config: ClassConfig, job: Job) {
    let class = job.class;
    let ctx = JobContext {
        job_id: job.id,
        class,
        tracking_id: job.tracking_id.clone(),
        attempt: job.attempts_made,
        gas_multiplier: job.gas_multiplier,
        user_address: job.user_address.clone(),
    };

    tracing::debug!(
        %class,
        job_id = job.id,
        job_type = %job.job_type,
        attempt = ctx.attempt,
        "Running job"
    );

    let result = match timeout(config.timeout, shared.handlers.dispatch(&job.payload, &ctx)).await {
        Ok(result) => result,
        Err(_) => Err(crate::JobError::Timeout(config.timeout)),
    };

    let event = match result {
        Ok(value) => {
            shared.store.complete(job.id, value.clone());
            tracing::info!(%class, job_id = job.id, job_type = %job.job_type, "✅ Job completed");
            JobEvent::Completed {
                class,
                job_id: job.id,
                tracking_id: job.tracking_id,
                return_value: value,
            }
        }
        Err(err) => {
            let reason = err.to_string();
            match retry::decide(class, &config, job.attempts_made, &err) {
                RetryDecision::Retry { delay, bump_gas } => {
                    let step = bump_gas.then_some(shared.gas_multiplier_step);
                    let gas_multiplier = shared
                        .store
                        .schedule_retry(job.id, reason.clone(), delay, step)
                        .map_or(job.gas_multiplier, |j| j.gas_multiplier);
                    wakeup.notify_one();

                    tracing::warn!(
                        %class,
                        job_id = job.id,
                        attempt = job.attempts_made,
                        delay_ms = delay.as_millis() as u64,
                        gas_multiplier,
                        "🔁 Job failed, retrying: {}",
                        reason
                    );
                    JobEvent::Retrying {
                        class,
                        job_id: job.id,
                        tracking_id: job.tracking_id,
                        attempt: job.attempts_made,
                        delay_ms: delay.as_millis() as u64,
                        gas_multiplier,
                        reason,
                    }
                }
                RetryDecision::DeadLetter => {
                    shared
                        .store
                        .finish_failed(job.id, reason.clone(), JobState::DeadLettered);
                    tracing::error!(
                        %class,
                        job_id = job.id,
                        tracking_id = %job.tracking_id,
                        attempts = job.attempts_made,
                        "💀 Job dead-lettered: {}",
                        reason
                    );
                    JobEvent::DeadLettered {
                        class,
                        job_id: job.id,
                        tracking_id: job.tracking_id,
                        attempts: job.attempts_made,
                        reason,
                    }
                }
                RetryDecision::Fail => {
                    shared
                        .store
                        .finish_failed(job.id, reason.clone(), JobState::Failed);
                    tracing::error!(
                        %class,
                        job_id = job.id,
                        tracking_id = %job.tracking_id,
                        "❌ Job failed permanently: {}",
                        reason
                    );
                    JobEvent::Failed {
                        class,
                        job_id: job.id,
                        tracking_id: job.tracking_id,
                        reason,
                    }
                }
            }
        }
    };

    // No subscribers is fine
    let _ = shared.events.send(event);
}
