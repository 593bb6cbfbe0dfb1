//! Built-in providers and their configuration

use std::{ops::Range, sync::Arc, time::Duration};

use async_trait::async_trait;
use herald_common::{DeliveryRequest, DeliveryResult, tracing};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    error::{DeliveryError, ProviderError},
    provider::Provider,
};

/// Provider configuration, in fail-over order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProviderConfig {
    /// A stand-in backend with random latency and failures
    Simulated {
        name: String,
        #[serde(default = "defaults::min_latency_ms")]
        min_latency_ms: u64,
        #[serde(default = "defaults::max_latency_ms")]
        max_latency_ms: u64,
        /// Probability in `[0, 1]` that an attempt fails
        #[serde(default = "defaults::failure_rate")]
        failure_rate: f64,
    },
    /// Logs every request and reports success
    Log { name: String },
}

impl ProviderConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Simulated { name, .. } | Self::Log { name } => name,
        }
    }

    /// Build the provider described by this configuration
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if the name is empty, the
    /// latency range is inverted or the failure rate is outside `[0, 1]`.
    pub fn build(&self) -> Result<Arc<dyn Provider>, DeliveryError> {
        if self.name().trim().is_empty() {
            return Err(DeliveryError::Configuration(
                "Provider name must not be empty".to_string(),
            ));
        }

        match self {
            Self::Simulated {
                name,
                min_latency_ms,
                max_latency_ms,
                failure_rate,
            } => Ok(Arc::new(SimulatedProvider::new(
                name.clone(),
                *min_latency_ms..*max_latency_ms,
                *failure_rate,
            )?)),
            Self::Log { name } => Ok(Arc::new(LogProvider::new(name.clone()))),
        }
    }
}

mod defaults {
    pub const fn min_latency_ms() -> u64 {
        100
    }

    pub const fn max_latency_ms() -> u64 {
        500
    }

    pub const fn failure_rate() -> f64 {
        1.0 / 3.0
    }
}

/// Sleeps for a random latency, then succeeds or fails at random
#[derive(Debug)]
pub struct SimulatedProvider {
    name: String,
    latency_ms: Range<u64>,
    failure_rate: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedProvider {
    /// Create a provider sleeping within `latency_ms` and failing with
    /// probability `failure_rate`
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if the latency range is
    /// inverted or the failure rate is outside `[0, 1]` (NaN included).
    pub fn new(
        name: impl Into<String>,
        latency_ms: Range<u64>,
        failure_rate: f64,
    ) -> Result<Self, DeliveryError> {
        let name = name.into();

        if latency_ms.start > latency_ms.end {
            return Err(DeliveryError::Configuration(format!(
                "Provider {name}: min_latency_ms ({}) exceeds max_latency_ms ({})",
                latency_ms.start, latency_ms.end
            )));
        }

        if !(0.0..=1.0).contains(&failure_rate) {
            return Err(DeliveryError::Configuration(format!(
                "Provider {name}: failure_rate must be between 0 and 1, got {failure_rate}"
            )));
        }

        Ok(Self {
            name,
            latency_ms,
            failure_rate,
            rng: Mutex::new(StdRng::from_os_rng()),
        })
    }

    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Pick the latency and outcome of one attempt
    fn roll(&self) -> (Duration, bool) {
        let mut rng = self.rng.lock();

        let latency = if self.latency_ms.is_empty() {
            self.latency_ms.start
        } else {
            rng.random_range(self.latency_ms.clone())
        };
        let fails = rng.random_bool(self.failure_rate);

        (Duration::from_millis(latency), fails)
    }
}

#[async_trait]
impl Provider for SimulatedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt_delivery(
        &self,
        request: &DeliveryRequest,
    ) -> Result<DeliveryResult, ProviderError> {
        let (latency, fails) = self.roll();
        tokio::time::sleep(latency).await;

        if fails {
            tracing::debug!(
                provider = %self.name,
                recipient = %request.recipient,
                "Simulated delivery failure"
            );
            return Ok(DeliveryResult::failure(
                self.name.clone(),
                format!("Failed to send notification via {}", self.name),
            ));
        }

        Ok(DeliveryResult::success(
            self.name.clone(),
            format!("Notification sent successfully via {}", self.name),
        ))
    }
}

/// Writes every request to the log and reports success
#[derive(Debug)]
pub struct LogProvider {
    name: String,
}

impl LogProvider {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Provider for LogProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt_delivery(
        &self,
        request: &DeliveryRequest,
    ) -> Result<DeliveryResult, ProviderError> {
        tracing::info!(
            provider = %self.name,
            recipient = %request.recipient,
            subject = %request.subject,
            body_len = request.body.len(),
            "Notification logged"
        );

        Ok(DeliveryResult::success(
            self.name.clone(),
            format!("Notification logged by {}", self.name),
        ))
    }
}
