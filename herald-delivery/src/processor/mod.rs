//! Delivery processor orchestration
//!
//! Owns the engine configuration and, once initialised, the shared
//! [`DispatchCoordinator`] together with the queue that feeds it.

use std::{sync::Arc, time::Duration};

use herald_common::{Signal, internal, tracing};
use herald_tracing::traced;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::{
    circuit_breaker::CircuitBreakerConfig,
    coordinator::DispatchCoordinator,
    error::DeliveryError,
    policy::RetryPolicy,
    provider::Provider,
    providers::ProviderConfig,
    queue::{self, DeliveryQueue, QueueConsumer},
};

const fn default_rate_limit_delay_ms() -> u64 {
    1000
}

/// The dispatch engine: configuration plus the runtime state built from it
/// by [`DeliveryProcessor::init`].
#[derive(Debug, Deserialize)]
pub struct DeliveryProcessor {
    /// Minimum spacing between dispatches (in milliseconds)
    ///
    /// Default: 1000
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,

    /// Retry budget and backoff between sweeps
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Circuit breaker configuration, shared by every provider unless
    /// overridden
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Providers in fail-over order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    #[serde(skip)]
    pub(crate) coordinator: Option<Arc<DispatchCoordinator>>,

    #[serde(skip)]
    pub(crate) queue: Option<DeliveryQueue>,

    /// Taken by `serve()`
    #[serde(skip)]
    consumer: Mutex<Option<QueueConsumer>>,
}

impl Default for DeliveryProcessor {
    fn default() -> Self {
        Self {
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            providers: Vec::new(),
            coordinator: None,
            queue: None,
            consumer: Mutex::new(None),
        }
    }
}

impl DeliveryProcessor {
    /// Initialize the processor from the configured providers
    ///
    /// # Errors
    ///
    /// Returns an error if a provider configuration is invalid or the
    /// provider list cannot form a working engine
    pub fn init(&mut self) -> Result<(), DeliveryError> {
        internal!("Initialising Delivery Processor ...");

        let providers = self
            .providers
            .iter()
            .map(ProviderConfig::build)
            .collect::<Result<Vec<_>, _>>()?;

        self.init_with_providers(providers)
    }

    /// Initialize the processor with an explicit provider list, ignoring the
    /// configured one
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if the list is empty, contains
    /// duplicate names or the retry budget is zero
    pub fn init_with_providers(
        &mut self,
        providers: Vec<Arc<dyn Provider>>,
    ) -> Result<(), DeliveryError> {
        let coordinator = Arc::new(DispatchCoordinator::new(
            providers,
            self.retry.clone(),
            Duration::from_millis(self.rate_limit_delay_ms),
            &self.circuit_breaker,
        )?);

        let (queue, consumer) = queue::channel(coordinator.clone());

        internal!(
            level = INFO,
            "Delivery processor initialised: providers={:?}, max_retries={}, rate_limit_delay={}ms, failure_threshold={}, reset_timeout={}s",
            coordinator.provider_names(),
            self.retry.max_retries,
            self.rate_limit_delay_ms,
            self.circuit_breaker.failure_threshold,
            self.circuit_breaker.reset_timeout_secs
        );

        self.coordinator = Some(coordinator);
        self.queue = Some(queue);
        *self.consumer.lock() = Some(consumer);

        Ok(())
    }

    /// Run the queue consumer until a shutdown signal is received
    ///
    /// Requests already being dispatched finish first; anything still queued
    /// at shutdown is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor was not initialised or is already
    /// serving
    #[traced(instrument(level = tracing::Level::TRACE, skip_all))]
    pub async fn serve(
        &self,
        shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), DeliveryError> {
        if self.coordinator.is_none() {
            return Err(DeliveryError::NotInitialized(
                "Delivery processor not initialized. Call init() first.".to_string(),
            ));
        }

        let consumer = self.consumer.lock().take();
        let Some(consumer) = consumer else {
            return Err(DeliveryError::AlreadyServing);
        };

        consumer.serve(shutdown).await;

        internal!("Delivery processor shutdown complete");
        Ok(())
    }

    /// The shared coordinator
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotInitialized`] before `init()`
    pub fn coordinator(&self) -> Result<&Arc<DispatchCoordinator>, DeliveryError> {
        self.coordinator.as_ref().ok_or_else(|| {
            DeliveryError::NotInitialized(
                "Dispatch coordinator not initialized. Call init() first.".to_string(),
            )
        })
    }

    /// The producer side of the delivery queue
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotInitialized`] before `init()`
    pub fn queue(&self) -> Result<&DeliveryQueue, DeliveryError> {
        self.queue.as_ref().ok_or_else(|| {
            DeliveryError::NotInitialized(
                "Delivery queue not initialized. Call init() first.".to_string(),
            )
        })
    }
}
