//! Sliding-window admission limit for a job class.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::RateLimit;

/// Allows at most `rate_limit` job starts within any `window`.
///
/// Owned by a single class dispatcher, so no interior locking.
#[derive(Debug)]
pub struct RateLimiter {
    /// Start times of recent jobs within the sliding window
    timestamps: VecDeque<Instant>,
    rate_limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn with_window(rate_limit: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(rate_limit),
            rate_limit: rate_limit.max(1),
            window,
        }
    }

    pub fn from_limit(limit: RateLimit) -> Self {
        Self::with_window(limit.max, limit.window)
    }

    /// Wait until a slot is free.
    pub async fn wait_for_slot(&mut self) {
        self.cleanup_old_timestamps();

        if self.timestamps.len() >= self.rate_limit {
            if let Some(oldest) = self.timestamps.front() {
                let elapsed = oldest.elapsed();
                if elapsed < self.window {
                    let sleep_duration = self.window - elapsed;
                    tracing::debug!(
                        "Rate limit: waiting {:?} ({}/{} slots used)",
                        sleep_duration,
                        self.timestamps.len(),
                        self.rate_limit
                    );
                    tokio::time::sleep(sleep_duration).await;
                    self.cleanup_old_timestamps();
                }
            }
        }
    }

    /// Record a job start. Call right after the slot is used.
    pub fn record_operation(&mut self) {
        self.timestamps.push_back(Instant::now());
        while self.timestamps.len() > self.rate_limit {
            self.timestamps.pop_front();
        }
    }

    fn cleanup_old_timestamps(&mut self) {
        let now = Instant::now();
        while let Some(oldest) = self.timestamps.front() {
            if now.duration_since(*oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_class_limit() {
        let limiter = RateLimiter::from_limit(RateLimit {
            max: 5,
            window: Duration::from_secs(10),
        });
        assert_eq!(limiter.rate_limit, 5);
        assert_eq!(limiter.window, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_slot_blocks_at_capacity() {
        let mut limiter = RateLimiter::with_window(2, Duration::from_secs(10));

        let start = Instant::now();
        for _ in 0..2 {
            limiter.wait_for_slot().await;
            limiter.record_operation();
        }
        assert!(start.elapsed() < Duration::from_millis(1));

        limiter.wait_for_slot().await;
        assert!(start.elapsed() >= Duration::from_secs(10));
        limiter.record_operation();
        assert_eq!(limiter.timestamps.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_cleanup() {
        let mut limiter = RateLimiter::with_window(2, Duration::from_millis(50));

        limiter.record_operation();
        limiter.record_operation();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let start = Instant::now();
        limiter.wait_for_slot().await;
        assert!(start.elapsed() < Duration::from_millis(1));
        assert!(limiter.timestamps.is_empty());
    }
}
