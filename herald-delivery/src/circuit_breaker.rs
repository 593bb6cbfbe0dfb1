//! Per-provider circuit breaker
//!
//! Stops routing attempts to a provider after repeated failures until a
//! cooldown has elapsed since the most recent failure.
//!
//! # States
//!
//! ```text
//! ┌─────────┐  failure_count reaches threshold  ┌──────┐
//! │ Closed  │ ────────────────────────────────> │ Open │
//! └─────────┘                                    └──────┘
//!      ^                                            │
//!      │  queried after reset timeout, or reset()   │
//!      └────────────────────────────────────────────┘
//! ```
//!
//! There is no half-open trial: once the timeout has passed the next
//! `is_open()` query closes the circuit and clears the failure count, whether
//! or not the provider has recovered.
//!
//! # Example
//!
//! ```text
//! Threshold: 3 failures
//! Reset timeout: 5 minutes
//!
//! t=0s:    Closed
//! t=20s:   3rd failure → Open, provider skipped by every sweep
//! t=320s+: is_open() → Closed, failure count cleared
//! ```

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of failures required to open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long after the last failure an open circuit closes again (seconds)
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,

    /// Per-provider overrides, keyed by provider name
    #[serde(default)]
    pub provider_overrides: ahash::AHashMap<String, ProviderCircuitBreakerConfig>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
            provider_overrides: ahash::AHashMap::default(),
        }
    }
}

impl CircuitBreakerConfig {
    /// The effective settings for `provider`, falling back to the defaults
    #[must_use]
    pub fn for_provider(&self, provider: &str) -> ProviderCircuitBreakerConfig {
        self.provider_overrides.get(provider).cloned().unwrap_or(
            ProviderCircuitBreakerConfig {
                failure_threshold: self.failure_threshold,
                reset_timeout_secs: self.reset_timeout_secs,
            },
        )
    }
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_reset_timeout_secs() -> u64 {
    300 // 5 minutes
}

/// Circuit breaker settings for a single provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Attempts are routed to the provider
    Closed,
    /// The provider is skipped
    Open,
}

#[derive(Debug)]
struct CircuitBreakerData {
    state: CircuitState,
    /// Failures since the last reset
    failure_count: u32,
    last_failure_at: Option<Instant>,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreakerData {
    fn new(config: ProviderCircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            failure_threshold: config.failure_threshold,
            reset_timeout: Duration::from_secs(config.reset_timeout_secs),
        }
    }

    fn is_reset_timeout_expired(&self) -> bool {
        self.last_failure_at
            .is_some_and(|at| Instant::now().duration_since(at) > self.reset_timeout)
    }

    fn is_open(&mut self, provider: &str) -> bool {
        if self.state == CircuitState::Open && self.is_reset_timeout_expired() {
            self.state = CircuitState::Closed;
            self.failure_count = 0;
            info!(
                provider = %provider,
                "Circuit breaker CLOSED - reset timeout elapsed"
            );
            return false;
        }

        self.state == CircuitState::Open
    }

    /// Returns `true` if this failure opened the circuit
    fn record_failure(&mut self, provider: &str) -> bool {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_at = Some(Instant::now());

        if self.state == CircuitState::Closed && self.failure_count >= self.failure_threshold {
            self.state = CircuitState::Open;
            warn!(
                provider = %provider,
                failure_count = self.failure_count,
                threshold = self.failure_threshold,
                reset_timeout_secs = self.reset_timeout.as_secs(),
                "Circuit breaker OPENED - skipping provider until reset timeout elapses"
            );
            return true;
        }

        false
    }

    fn reset(&mut self) {
        self.failure_count = 0;
        self.state = CircuitState::Closed;
    }
}

/// Failure-tracking state machine for a single provider
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: String,
    data: Mutex<CircuitBreakerData>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(provider: impl Into<String>, config: ProviderCircuitBreakerConfig) -> Self {
        Self {
            provider: provider.into(),
            data: Mutex::new(CircuitBreakerData::new(config)),
        }
    }

    /// Whether attempts to this provider should be skipped.
    ///
    /// An open circuit whose reset timeout has elapsed since the last failure
    /// is closed (and its failure count cleared) by this call.
    pub fn is_open(&self) -> bool {
        self.data.lock().is_open(&self.provider)
    }

    /// Record a failed attempt
    ///
    /// Returns `true` if circuit transitioned to Open state
    pub fn record_failure(&self) -> bool {
        self.data.lock().record_failure(&self.provider)
    }

    /// Record a successful delivery, closing the circuit
    pub fn reset(&self) {
        self.data.lock().reset();
    }

    pub fn state(&self) -> CircuitState {
        self.data.lock().state
    }

    /// Snapshot for monitoring; does not apply the reset timeout
    pub fn stats(&self) -> CircuitBreakerStats {
        let data = self.data.lock();
        CircuitBreakerStats {
            provider: self.provider.clone(),
            state: data.state,
            failure_count: data.failure_count,
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub provider: String,
    pub state: CircuitState,
    /// Failures since the last reset
    pub failure_count: u32,
}
