//! In-process job records and per-class ready/delayed indexes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::types::{
    ClassCounts, CleanupReport, Job, JobHandle, JobId, JobOptions, JobPayload, JobState,
    QueueClass, QueueStats,
};

#[derive(Debug, Default)]
struct Inner {
    next_id: JobId,
    jobs: HashMap<JobId, Job>,
    /// Eligible jobs ordered by (priority, id)
    ready: BTreeMap<QueueClass, BTreeSet<(i32, JobId)>>,
    /// Jobs waiting on a delay or retry backoff
    delayed: BTreeMap<QueueClass, BTreeSet<(Instant, JobId)>>,
}

/// Job records for every class.
///
/// Ids are unique across classes and assigned in submission order.
#[derive(Debug, Default)]
pub struct JobStore {
    inner: Mutex<Inner>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new job, `Delayed` when `opts.delay` is set and `Waiting` otherwise.
    pub fn insert(&self, payload: JobPayload, opts: JobOptions, max_attempts: u32) -> JobHandle {
        let class = payload.class();
        let now = Utc::now();
        let tracking_id = opts
            .tracking_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let priority = opts.priority.unwrap_or(0);
        let delay = opts.delay.filter(|d| !d.is_zero());

        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;

        let job = Job {
            id,
            class,
            job_type: payload.job_type(),
            payload,
            tracking_id: tracking_id.clone(),
            user_address: opts.user_address,
            priority,
            state: if delay.is_some() {
                JobState::Delayed
            } else {
                JobState::Waiting
            },
            attempts_made: 0,
            max_attempts,
            gas_multiplier: 1.0,
            created_at: now,
            run_at: delay.map(|d| after(now, d)),
            processed_on: None,
            finished_on: None,
            return_value: None,
            failed_reason: None,
            attempt_errors: Vec::new(),
        };
        inner.jobs.insert(id, job);

        match delay {
            Some(delay) => {
                inner
                    .delayed
                    .entry(class)
                    .or_default()
                    .insert((Instant::now() + delay, id));
            }
            None => {
                inner.ready.entry(class).or_default().insert((priority, id));
            }
        }

        JobHandle {
            class,
            id,
            tracking_id,
        }
    }

    /// Pop the next eligible job of `class` and mark it active.
    pub fn take_next(&self, class: QueueClass) -> Option<Job> {
        let mut inner = self.inner.lock();
        Self::promote_due(&mut inner, class, Instant::now());

        let (_, id) = inner.ready.get_mut(&class)?.pop_first()?;
        let job = inner.jobs.get_mut(&id)?;
        job.state = JobState::Active;
        job.attempts_made += 1;
        job.processed_on = Some(Utc::now());
        job.run_at = None;
        Some(job.clone())
    }

    /// When the earliest delayed job of `class` becomes eligible.
    pub fn next_wakeup(&self, class: QueueClass) -> Option<Instant> {
        self.inner
            .lock()
            .delayed
            .get(&class)
            .and_then(|set| set.first().map(|(at, _)| *at))
    }

    pub fn complete(&self, id: JobId, value: Value) -> Option<Job> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.get_mut(&id)?;
        job.state = JobState::Completed;
        job.return_value = Some(value);
        job.finished_on = Some(Utc::now());
        Some(job.clone())
    }

    /// Put an active job back behind `delay`, recording the failure.
    ///
    /// `gas_step` multiplies the job's gas multiplier before the next attempt.
    pub fn schedule_retry(
        &self,
        id: JobId,
        reason: String,
        delay: Duration,
        gas_step: Option<f64>,
    ) -> Option<Job> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.get_mut(&id)?;
        job.state = JobState::Delayed;
        job.attempt_errors.push(reason.clone());
        job.failed_reason = Some(reason);
        if let Some(step) = gas_step {
            job.gas_multiplier *= step;
        }
        job.run_at = Some(after(Utc::now(), delay));
        let snapshot = job.clone();

        inner
            .delayed
            .entry(snapshot.class)
            .or_default()
            .insert((Instant::now() + delay, id));
        Some(snapshot)
    }

    /// Terminal failure, `Failed` or `DeadLettered`. The reason is kept verbatim.
    pub fn finish_failed(&self, id: JobId, reason: String, state: JobState) -> Option<Job> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.get_mut(&id)?;
        job.state = state;
        job.attempt_errors.push(reason.clone());
        job.failed_reason = Some(reason);
        job.finished_on = Some(Utc::now());
        Some(job.clone())
    }

    /// Job `id` if it belongs to `class`.
    pub fn get(&self, class: QueueClass, id: JobId) -> Option<Job> {
        self.inner
            .lock()
            .jobs
            .get(&id)
            .filter(|job| job.class == class)
            .cloned()
    }

    pub fn find_by_tracking_id(&self, tracking_id: &str) -> Vec<Job> {
        let inner = self.inner.lock();
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|job| job.tracking_id == tracking_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }

    /// Counts per state for every class, including empty ones.
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        let mut stats: QueueStats = QueueClass::ALL
            .iter()
            .map(|class| (*class, ClassCounts::default()))
            .collect();

        for job in inner.jobs.values() {
            let counts = stats.entry(job.class).or_default();
            match job.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Delayed => counts.delayed += 1,
                JobState::Active => counts.active += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
                JobState::DeadLettered => counts.dead_lettered += 1,
            }
        }
        stats
    }

    /// Drop completed jobs finished at or before `completed_cutoff` and
    /// failed or dead-lettered ones finished at or before `failed_cutoff`.
    pub fn cleanup(
        &self,
        completed_cutoff: DateTime<Utc>,
        failed_cutoff: DateTime<Utc>,
    ) -> CleanupReport {
        let mut inner = self.inner.lock();
        let mut report = CleanupReport::default();

        inner.jobs.retain(|_, job| {
            let Some(finished) = job.finished_on else {
                return true;
            };
            match job.state {
                JobState::Completed if finished <= completed_cutoff => {
                    report.completed_removed += 1;
                    false
                }
                JobState::Failed | JobState::DeadLettered if finished <= failed_cutoff => {
                    report.failed_removed += 1;
                    false
                }
                _ => true,
            }
        });
        report
    }

    fn promote_due(inner: &mut Inner, class: QueueClass, now: Instant) {
        let Some(delayed) = inner.delayed.get_mut(&class) else {
            return;
        };
        let mut due = Vec::new();
        while let Some(&(at, id)) = delayed.first() {
            if at > now {
                break;
            }
            delayed.pop_first();
            due.push(id);
        }

        for id in due {
            if let Some(job) = inner.jobs.get_mut(&id) {
                job.state = JobState::Waiting;
                let priority = job.priority;
                inner.ready.entry(class).or_default().insert((priority, id));
            }
        }
    }
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockchainTx, NotificationPayload};

    fn notification(user: &str) -> JobPayload {
        JobPayload::Notification(NotificationPayload {
            user_id: user.into(),
            kind: "test".into(),
            data: Value::Null,
        })
    }

    #[test]
    fn test_priority_then_fifo() {
        let store = JobStore::new();
        let a = store.insert(notification("a"), JobOptions::default(), 2);
        let b = store.insert(notification("b"), JobOptions::default().with_priority(-1), 2);
        let c = store.insert(notification("c"), JobOptions::default(), 2);

        let order: Vec<JobId> = std::iter::from_fn(|| store.take_next(QueueClass::Notification))
            .map(|job| job.id)
            .collect();
        assert_eq!(order, vec![b.id, a.id, c.id]);
    }

    #[test]
    fn test_classes_are_disjoint() {
        let store = JobStore::new();
        let handle = store.insert(
            JobPayload::Blockchain(BlockchainTx::ClaimRewards { pool_id: 1 }),
            JobOptions::default(),
            5,
        );

        assert!(store.take_next(QueueClass::Notification).is_none());
        assert!(store.get(QueueClass::Notification, handle.id).is_none());
        assert_eq!(
            store.take_next(QueueClass::BlockchainTx).map(|j| j.attempts_made),
            Some(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_job_becomes_eligible() {
        let store = JobStore::new();
        let handle = store.insert(
            notification("a"),
            JobOptions::default().with_delay(Duration::from_secs(5)),
            2,
        );

        assert_eq!(
            store.get(QueueClass::Notification, handle.id).map(|j| j.state),
            Some(JobState::Delayed)
        );
        assert!(store.take_next(QueueClass::Notification).is_none());
        assert!(store.next_wakeup(QueueClass::Notification).is_some());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(
            store.take_next(QueueClass::Notification).map(|j| j.id),
            Some(handle.id)
        );
    }

    #[test]
    fn test_retry_records_reason_and_gas() {
        let store = JobStore::new();
        let handle = store.insert(
            JobPayload::Blockchain(BlockchainTx::ClaimRewards { pool_id: 1 }),
            JobOptions::default(),
            5,
        );
        store.take_next(QueueClass::BlockchainTx);

        let job = store
            .schedule_retry(handle.id, "gas too low".into(), Duration::ZERO, Some(1.2))
            .unwrap();
        assert_eq!(job.state, JobState::Delayed);
        assert_eq!(job.attempt_errors, vec!["gas too low".to_string()]);
        assert!((job.gas_multiplier - 1.2).abs() < 1e-9);

        let retried = store.take_next(QueueClass::BlockchainTx).unwrap();
        assert_eq!(retried.attempts_made, 2);
    }

    #[test]
    fn test_cleanup_cutoffs() {
        let store = JobStore::new();
        let done = store.insert(notification("a"), JobOptions::default(), 2);
        let failed = store.insert(notification("b"), JobOptions::default(), 2);
        let pending = store.insert(notification("c"), JobOptions::default(), 2);
        store.complete(done.id, Value::Null);
        store.finish_failed(failed.id, "boom".into(), JobState::DeadLettered);

        let now = Utc::now();
        let report = store.cleanup(now, now - chrono::Duration::hours(1));
        assert_eq!(
            report,
            CleanupReport {
                completed_removed: 1,
                failed_removed: 0
            }
        );
        assert!(store.get(QueueClass::Notification, failed.id).is_some());
        assert!(store.get(QueueClass::Notification, pending.id).is_some());
    }
}
