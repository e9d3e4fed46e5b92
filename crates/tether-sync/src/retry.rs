//! Per-item retry policy for outbox items
//!
//! `Immediate` retries every pending item on every sync round.
//! `Exponential` skips an item until `base * 2^(retries - 1)` (capped at
//! `max`) has elapsed since its last failed attempt.

use std::time::Duration;

use tether_core::config::RetryConfig;
use tether_core::domain::{OutboxItem, Timestamp};

/// When a failed outbox item becomes eligible again
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    #[default]
    Immediate,
    Exponential { base: Duration, max: Duration },
}

impl RetryPolicy {
    /// Build from the `retry` config section; unknown strategies fall back
    /// to `Immediate`
    pub fn from_config(config: &RetryConfig) -> Self {
        match config.strategy.as_str() {
            "exponential" => RetryPolicy::Exponential {
                base: Duration::from_millis(config.base_delay_ms),
                max: Duration::from_millis(config.max_delay_ms),
            },
            _ => RetryPolicy::Immediate,
        }
    }

    /// Delay to wait after the `retry_count`-th failure
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        match *self {
            RetryPolicy::Immediate => Duration::ZERO,
            RetryPolicy::Exponential { base, max } => {
                if retry_count == 0 {
                    return Duration::ZERO;
                }
                let factor = 1u32.checked_shl(retry_count - 1).unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(max).min(max)
            }
        }
    }

    /// True if `item` should be attempted at `now`
    pub fn is_due(&self, item: &OutboxItem, now: Timestamp) -> bool {
        match item.last_attempt_at {
            None => true,
            Some(last) => last.elapsed_until(now) >= self.delay_for(item.retry_count),
        }
    }
}
