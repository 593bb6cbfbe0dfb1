//! Typed error handling for the dispatch engine.
//!
//! Two layers are kept apart:
//! - [`ProviderError`]: an unexpected failure raised by a provider. The
//!   coordinator never lets these escape; it converts them into failed
//!   `DeliveryResult`s so the retry loop can continue.
//! - [`DeliveryError`]: failures of the engine itself (wiring, configuration,
//!   queue shutdown). An ordinary delivery failure is never one of these.

use thiserror::Error;

/// Unexpected failure raised by a provider while attempting delivery.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider could not be reached or refused to serve.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider panicked; the payload is kept as text.
    #[error("Provider panicked: {0}")]
    Panicked(String),
}

/// Failures of the dispatch engine itself.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The queue consumer has stopped, so nothing can be enqueued.
    #[error("Delivery queue is closed")]
    QueueClosed,

    /// The processor was used before `init()`.
    #[error("Delivery processor not initialized: {0}")]
    NotInitialized(String),

    /// The configuration cannot produce a working engine.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The queue consumer was started twice.
    #[error("Delivery processor is already serving")]
    AlreadyServing,
}

impl ProviderError {
    /// Converts a panic payload into a [`ProviderError::Panicked`].
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());

        Self::Panicked(message)
    }
}
