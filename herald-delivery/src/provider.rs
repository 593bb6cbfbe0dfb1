//! The capability the coordinator consumes: something that can attempt to
//! deliver a notification.

use async_trait::async_trait;
use herald_common::{DeliveryRequest, DeliveryResult};

use crate::error::ProviderError;

/// An interchangeable delivery backend.
///
/// Providers are handed to the coordinator as an ordered list; the order is
/// the fail-over priority.
///
/// # Example
///
/// ```rust,ignore
/// struct Loopback;
///
/// #[async_trait]
/// impl Provider for Loopback {
///     fn name(&self) -> &str {
///         "loopback"
///     }
///
///     async fn attempt_delivery(
///         &self,
///         _request: &DeliveryRequest,
///     ) -> Result<DeliveryResult, ProviderError> {
///         Ok(DeliveryResult::success(self.name(), "looped back"))
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable name, used as the circuit breaker key
    fn name(&self) -> &str;

    /// Attempt to deliver `request`.
    ///
    /// An `Ok` result with `success == false` is an ordinary provider
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns an error for unexpected failures. The coordinator converts it
    /// into a failed result carrying this provider's name.
    async fn attempt_delivery(
        &self,
        request: &DeliveryRequest,
    ) -> Result<DeliveryResult, ProviderError>;
}

impl core::fmt::Debug for dyn Provider {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        fmt.debug_struct("Provider")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}
