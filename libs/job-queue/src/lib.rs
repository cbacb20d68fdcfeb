//! Job orchestrator.
//!
//! Typed jobs are submitted to one of five [`QueueClass`]es. Each class has
//! its own worker pool with bounded concurrency, a per-attempt timeout, an
//! optional sliding-window rate limit and a retry policy. On-chain classes
//! retry gas-economics failures with an escalating `gas_multiplier`.
//!
//! ```ignore
//! let queue = QueueService::new(QueueConfig::default(), handlers);
//! queue.init();
//! let handle = queue.add_blockchain_job(
//!     BlockchainTx::Stake { amount: "100".into(), pool_id: 0, user: None },
//!     JobOptions::for_user("0xabc"),
//! )?;
//! let job = queue.get_job_status(handle.class, handle.id)?;
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod rate_limiter;
pub mod retry;
pub mod service;
pub mod store;
pub mod types;
mod worker;

pub use config::{ClassConfig, QueueConfig, RateLimit};
pub use error::{JobError, QueueError};
pub use handlers::{
    AiHandler, BlockchainHandler, JobHandlers, NftHandler, NotificationHandler, ValidationHandler,
};
pub use rate_limiter::RateLimiter;
pub use retry::{decide, exponential_backoff, is_gas_error, RetryDecision, GAS_ERROR_PATTERNS};
pub use service::QueueService;
pub use store::JobStore;
pub use types::{
    AiRequest, BlockchainTx, ClassCounts, CleanupReport, ContentValidation, Job, JobContext,
    JobEvent, JobHandle, JobId, JobOptions, JobPayload, JobState, JobType, NftOperation,
    NotificationPayload, OnChainOperation, QueueClass, QueueStats,
};
