//! Service trait abstraction for the dispatch engine
//!
//! Control interfaces talk to [`DeliveryService`] instead of the concrete
//! `DeliveryProcessor`, which keeps them mockable in tests.

use async_trait::async_trait;
use herald_common::{DeliveryRequest, DeliveryResult, DeliveryStatus, audit};

use crate::{
    circuit_breaker::CircuitBreakerStats, error::DeliveryError, processor::DeliveryProcessor,
    queue::DeliveryQueue,
};

/// Operations the engine exposes to its callers
///
/// # Example
///
/// ```rust,ignore
/// async fn send(service: &dyn DeliveryService, request: DeliveryRequest) -> bool {
///     service.dispatch(request).await.is_ok_and(|result| result.success)
/// }
/// ```
#[async_trait]
pub trait DeliveryService: Send + Sync {
    /// Dispatch a request and wait for its outcome
    ///
    /// # Errors
    ///
    /// Only fails if the engine is not initialised; delivery failures are
    /// reported through the returned result.
    async fn dispatch(&self, request: DeliveryRequest) -> Result<DeliveryResult, DeliveryError>;

    /// Queue a request for background dispatch, returning the queue depth
    ///
    /// # Errors
    ///
    /// Fails if the engine is not initialised or the consumer has stopped.
    fn enqueue(&self, request: DeliveryRequest) -> Result<usize, DeliveryError>;

    /// Last known outcome for an idempotency key
    fn get_status(&self, key: &str) -> Option<DeliveryStatus>;

    /// Number of requests waiting in the queue
    fn queue_len(&self) -> usize;

    /// Number of idempotency keys with a recorded outcome
    fn cached_statuses(&self) -> usize;

    /// Circuit breaker snapshots in provider order
    fn circuit_states(&self) -> Vec<CircuitBreakerStats>;
}

#[async_trait]
impl DeliveryService for DeliveryProcessor {
    async fn dispatch(&self, request: DeliveryRequest) -> Result<DeliveryResult, DeliveryError> {
        let coordinator = self.coordinator()?;

        audit::log_dispatch_accepted(&request.recipient, request.idempotency_key(), "dispatch");
        Ok(coordinator.dispatch(&request).await)
    }

    fn enqueue(&self, request: DeliveryRequest) -> Result<usize, DeliveryError> {
        let queue = self.queue()?;

        audit::log_dispatch_accepted(&request.recipient, request.idempotency_key(), "queue");
        queue.enqueue(request)
    }

    fn get_status(&self, key: &str) -> Option<DeliveryStatus> {
        self.coordinator
            .as_ref()
            .and_then(|coordinator| coordinator.get_status(key))
    }

    fn queue_len(&self) -> usize {
        self.queue.as_ref().map_or(0, DeliveryQueue::len)
    }

    fn cached_statuses(&self) -> usize {
        self.coordinator
            .as_ref()
            .map_or(0, |coordinator| coordinator.cached_statuses())
    }

    fn circuit_states(&self) -> Vec<CircuitBreakerStats> {
        self.coordinator
            .as_ref()
            .map(|coordinator| coordinator.circuit_states())
            .unwrap_or_default()
    }
}
