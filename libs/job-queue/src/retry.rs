//! Retry policy: exponential backoff plus gas-aware fee escalation.

use std::time::Duration;

use crate::config::ClassConfig;
use crate::error::JobError;
use crate::types::QueueClass;

/// Substrings (lowercase) identifying fee-related transaction failures.
pub const GAS_ERROR_PATTERNS: &[&str] = &[
    "replacement fee too low",
    "replacement transaction underpriced",
    "transaction underpriced",
    "insufficient funds for gas",
    "gas too low",
    "intrinsic gas too low",
    "max fee per gas less than block base fee",
    "fee cap less than block base fee",
];

/// Whether an error message reports insufficient gas economics.
pub fn is_gas_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    GAS_ERROR_PATTERNS.iter().any(|p| lower.contains(p))
}

/// `base * 2^(failures - 1)`, saturating.
pub fn exponential_backoff(base: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

/// What to do with a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    Retry {
        delay: Duration,
        /// Scale the job's gas multiplier before the next attempt
        bump_gas: bool,
    },
    /// Attempts exhausted
    DeadLetter,
    /// Permanent error
    Fail,
}

/// Decide the next step after attempt number `failures` failed with `error`.
pub fn decide(
    class: QueueClass,
    config: &ClassConfig,
    failures: u32,
    error: &JobError,
) -> RetryDecision {
    if error.is_permanent() {
        return RetryDecision::Fail;
    }
    if failures >= config.max_attempts {
        return RetryDecision::DeadLetter;
    }

    match error {
        JobError::Failed(message) if class.is_onchain() && is_gas_error(message) => {
            RetryDecision::Retry {
                delay: config.backoff_base,
                bump_gas: true,
            }
        }
        _ => RetryDecision::Retry {
            delay: exponential_backoff(config.backoff_base, failures),
            bump_gas: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobType;

    #[test]
    fn test_gas_error_classification() {
        assert!(is_gas_error("replacement fee too low"));
        assert!(is_gas_error("server returned: Transaction Underpriced"));
        assert!(is_gas_error(
            "err: max fee per gas less than block base fee: address 0x01, maxFeePerGas: 1"
        ));
        assert!(is_gas_error("insufficient funds for gas * price + value"));
        assert!(!is_gas_error("execution reverted: not owner"));
        assert!(!is_gas_error("nonce too low"));
    }

    #[test]
    fn test_exponential_backoff() {
        let base = Duration::from_secs(5);
        assert_eq!(exponential_backoff(base, 1), Duration::from_secs(5));
        assert_eq!(exponential_backoff(base, 2), Duration::from_secs(10));
        assert_eq!(exponential_backoff(base, 4), Duration::from_secs(40));
        assert_eq!(exponential_backoff(base, 0), Duration::from_secs(5));
    }

    #[test]
    fn test_gas_retry_uses_base_delay() {
        let config = ClassConfig::defaults_for(QueueClass::BlockchainTx);
        let err = JobError::failed("transaction underpriced");

        assert_eq!(
            decide(QueueClass::BlockchainTx, &config, 3, &err),
            RetryDecision::Retry {
                delay: Duration::from_secs(5),
                bump_gas: true
            }
        );
    }

    #[test]
    fn test_gas_message_off_chain_is_generic() {
        let config = ClassConfig::defaults_for(QueueClass::ContentValidation);
        let err = JobError::failed("transaction underpriced");

        assert_eq!(
            decide(QueueClass::ContentValidation, &config, 2, &err),
            RetryDecision::Retry {
                delay: Duration::from_secs(4),
                bump_gas: false
            }
        );
    }

    #[test]
    fn test_exhaustion_and_permanent_errors() {
        let config = ClassConfig::defaults_for(QueueClass::BlockchainTx);

        assert_eq!(
            decide(QueueClass::BlockchainTx, &config, 5, &JobError::failed("gas too low")),
            RetryDecision::DeadLetter
        );
        assert_eq!(
            decide(
                QueueClass::BlockchainTx,
                &config,
                1,
                &JobError::UnknownJobType(JobType::Stake)
            ),
            RetryDecision::Fail
        );
        assert_eq!(
            decide(QueueClass::BlockchainTx, &config, 1, &JobError::Timeout(config.timeout)),
            RetryDecision::Retry {
                delay: Duration::from_secs(5),
                bump_gas: false
            }
        );
    }
}
