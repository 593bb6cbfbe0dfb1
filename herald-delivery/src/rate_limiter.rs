//! Global send spacing
//!
//! Every dispatch that reaches the providers first waits until at least the
//! configured minimum delay has passed since the previous dispatch finished.
//! There is a single timestamp for the whole engine, shared by all requests
//! and providers.
//!
//! # Example
//!
//! ```text
//! Minimum delay: 1s
//! - t=0.0s first dispatch runs immediately, finishes at t=0.2s
//! - t=0.5s second dispatch waits 0.7s, runs at t=1.2s
//! ```

use std::time::{Duration, Instant};

use herald_common::tracing;
use parking_lot::Mutex;

#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    /// When the last dispatch finished; unset until the first one does
    last_send: Mutex<Option<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub const fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_send: Mutex::new(None),
        }
    }

    /// Check if a dispatch may proceed now
    ///
    /// Returns `Ok(())` if allowed, `Err(Duration)` with the remaining wait
    /// otherwise
    pub fn check(&self) -> Result<(), Duration> {
        let Some(last_send) = *self.last_send.lock() else {
            return Ok(());
        };

        let elapsed = Instant::now().duration_since(last_send);
        if elapsed >= self.min_delay {
            Ok(())
        } else {
            Err(self.min_delay - elapsed)
        }
    }

    /// Sleep until the minimum delay since the last stamp has passed
    pub async fn wait(&self) {
        if let Err(wait_time) = self.check() {
            tracing::debug!(
                wait_ms = wait_time.as_millis(),
                "Rate limit in effect, delaying dispatch"
            );
            tokio::time::sleep(wait_time).await;
        }
    }

    /// Record that a dispatch has just finished
    pub fn stamp(&self) {
        *self.last_send.lock() = Some(Instant::now());
    }
}
