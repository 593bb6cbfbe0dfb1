//! Error types for the herald-common crate.

use thiserror::Error;

/// Reasons a [`DeliveryRequest`](crate::DeliveryRequest) is refused before it
/// reaches the dispatch engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The recipient was empty (or only whitespace).
    #[error("Recipient is required")]
    EmptyRecipient,

    /// The subject was empty (or only whitespace).
    #[error("Subject is required")]
    EmptySubject,
}
