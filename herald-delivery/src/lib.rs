//! Resilient dispatch engine for notifications
//!
//! This crate provides:
//! - Ordered provider fail-over with per-provider circuit breakers
//! - Retry sweeps with exponential backoff and jitter
//! - Global rate limiting between dispatches
//! - Idempotency-keyed duplicate suppression
//! - An asynchronous FIFO queue with a single consumer

mod circuit_breaker;
mod coordinator;
mod error;
mod idempotency;
pub mod policy;
mod processor;
mod provider;
pub mod providers;
pub mod queue;
mod rate_limiter;
mod service;
mod types;

// Re-export circuit breaker types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
    ProviderCircuitBreakerConfig,
};
// Re-export core types
pub use coordinator::DispatchCoordinator;
// Re-export error types
pub use error::{DeliveryError, ProviderError};
pub use herald_common::{DeliveryRequest, DeliveryResult, DeliveryStatus};
pub use idempotency::{CacheLookup, IdempotencyCache};
pub use policy::RetryPolicy;
pub use processor::DeliveryProcessor;
pub use provider::Provider;
pub use providers::{LogProvider, ProviderConfig, SimulatedProvider};
pub use queue::{DeliveryQueue, Dispatcher, QueueConsumer};
pub use rate_limiter::RateLimiter;
pub use service::DeliveryService;
pub use types::DispatchOutcome;
