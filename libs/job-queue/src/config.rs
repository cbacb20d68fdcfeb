use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::QueueClass;

/// Sliding-window admission limit for a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max: usize,
    pub window: Duration,
}

/// Worker pool settings for one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassConfig {
    /// Jobs run concurrently
    pub concurrency: usize,
    /// Bound on a single attempt
    pub timeout: Duration,
    pub max_attempts: u32,
    /// First retry delay; doubles per failed attempt
    pub backoff_base: Duration,
    pub rate_limit: Option<RateLimit>,
}

impl ClassConfig {
    pub fn defaults_for(class: QueueClass) -> Self {
        match class {
            QueueClass::BlockchainTx => Self {
                concurrency: 3,
                timeout: Duration::from_secs(120),
                max_attempts: 5,
                backoff_base: Duration::from_secs(5),
                rate_limit: Some(RateLimit {
                    max: 5,
                    window: Duration::from_secs(10),
                }),
            },
            QueueClass::ContentValidation => Self {
                concurrency: 10,
                timeout: Duration::from_secs(60),
                max_attempts: 5,
                backoff_base: Duration::from_secs(2),
                rate_limit: None,
            },
            QueueClass::AiProcessing => Self {
                concurrency: 2,
                timeout: Duration::from_secs(30),
                max_attempts: 2,
                backoff_base: Duration::from_secs(5),
                rate_limit: Some(RateLimit {
                    max: 10,
                    window: Duration::from_secs(60),
                }),
            },
            QueueClass::NftMinting => Self {
                concurrency: 2,
                timeout: Duration::from_secs(180),
                max_attempts: 3,
                backoff_base: Duration::from_secs(10),
                rate_limit: None,
            },
            QueueClass::Notification => Self {
                concurrency: 20,
                timeout: Duration::from_secs(10),
                max_attempts: 2,
                backoff_base: Duration::from_secs(1),
                rate_limit: None,
            },
        }
    }
}

/// Configuration for [`crate::QueueService`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub classes: BTreeMap<QueueClass, ClassConfig>,
    /// Factor applied to `gas_multiplier` on each gas-related retry
    pub gas_multiplier_step: f64,
    /// Capacity of the job event broadcast channel
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            classes: QueueClass::ALL
                .iter()
                .map(|class| (*class, ClassConfig::defaults_for(*class)))
                .collect(),
            gas_multiplier_step: 1.2,
            event_capacity: 1024,
        }
    }
}

impl QueueConfig {
    pub fn class(&self, class: QueueClass) -> ClassConfig {
        self.classes
            .get(&class)
            .cloned()
            .unwrap_or_else(|| ClassConfig::defaults_for(class))
    }

    pub fn with_class(mut self, class: QueueClass, config: ClassConfig) -> Self {
        self.classes.insert(class, config);
        self
    }

    /// Apply `f` to every class config.
    pub fn map_classes(mut self, f: impl Fn(QueueClass, &mut ClassConfig)) -> Self {
        for (class, config) in self.classes.iter_mut() {
            f(*class, config);
        }
        self
    }
}
