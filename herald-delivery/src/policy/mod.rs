//! Policy abstractions for dispatch operations.
//!
//! - [`RetryPolicy`]: retry budget, backoff and jitter

pub mod retry;

pub use retry::RetryPolicy;
