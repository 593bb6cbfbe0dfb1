//! Retry policy for dispatch operations.
//!
//! Owns the retry budget and the backoff formula, which feeds both the delay
//! between provider sweeps and the idempotency cache's next-retry timestamp:
//!
//! `backoff(n) = base_delay * 2^n + uniform[0, max_jitter)`
//!
//! With the defaults that is `2^n` seconds plus up to a second of jitter.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

/// Retry policy configuration for dispatch operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of full provider sweeps a dispatch may make.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Delay unit that is doubled for every sweep (in milliseconds).
    ///
    /// Default: 1000 (one second)
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound (exclusive) of the random jitter added to every delay
    /// (in milliseconds). Zero disables jitter.
    ///
    /// Default: 1000
    #[serde(default = "defaults::max_jitter_ms")]
    pub max_jitter_ms: u64,

    /// Shared by every clone of this policy
    #[serde(skip, default = "defaults::jitter_source")]
    jitter_source: Arc<Mutex<StdRng>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            base_delay_ms: defaults::base_delay_ms(),
            max_jitter_ms: defaults::max_jitter_ms(),
            jitter_source: defaults::jitter_source(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_delay_ms: u64, max_jitter_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_jitter_ms,
            jitter_source: defaults::jitter_source(),
        }
    }

    /// Replace the jitter source with a deterministic one.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            jitter_source: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
            ..self
        }
    }

    /// Whether another sweep may run after `retry_count` sweeps.
    #[must_use]
    pub const fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Delay before sweep number `retry_count` (and the retry window recorded
    /// for a key), `base_delay * 2^retry_count` plus jitter.
    ///
    /// The exponential part saturates instead of overflowing.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let multiplier = 1_u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        let exponential = Duration::from_millis(self.base_delay_ms).saturating_mul(multiplier);

        exponential.saturating_add(self.jitter())
    }

    /// When a key that used `retry_count` sweeps may be dispatched again.
    ///
    /// Returns `None` once the retry budget is spent.
    pub fn next_retry_at(&self, retry_count: u32) -> Option<DateTime<Utc>> {
        if !self.should_retry(retry_count) {
            return None;
        }

        let delay = TimeDelta::from_std(self.backoff(retry_count.saturating_add(1))).ok()?;
        Utc::now().checked_add_signed(delay)
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter_ms == 0 {
            return Duration::ZERO;
        }

        let millis = self.jitter_source.lock().random_range(0..self.max_jitter_ms);
        Duration::from_millis(millis)
    }
}

mod defaults {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use rand::{SeedableRng, rngs::StdRng};

    pub const fn max_retries() -> u32 {
        3
    }

    pub const fn base_delay_ms() -> u64 {
        1000
    }

    pub const fn max_jitter_ms() -> u64 {
        1000
    }

    pub fn jitter_source() -> Arc<Mutex<StdRng>> {
        Arc::new(Mutex::new(StdRng::from_os_rng()))
    }
}
