//! Type definitions shared by the coordinator and the queue consumer

use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// How a dispatch, or one step of it, ended.
///
/// Attached to trace and audit events; callers only ever see a
/// `DeliveryResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchOutcome {
    /// A provider accepted the notification
    Delivered,
    /// A provider returned an unsuccessful result
    ProviderFailure,
    /// A provider returned an error or panicked
    ProviderException,
    /// A provider was skipped because its circuit is open
    CircuitOpenSkip,
    /// Every sweep ran without success
    RetryExhausted,
    /// The idempotency key was already delivered
    DuplicateSuppressed,
    /// The idempotency key failed recently and its retry window is still open
    RetryNotYetAllowed,
}

impl DispatchOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "Delivered",
            Self::ProviderFailure => "ProviderFailure",
            Self::ProviderException => "ProviderException",
            Self::CircuitOpenSkip => "CircuitOpenSkip",
            Self::RetryExhausted => "RetryExhausted",
            Self::DuplicateSuppressed => "DuplicateSuppressed",
            Self::RetryNotYetAllowed => "RetryNotYetAllowed",
        }
    }
}

impl Display for DispatchOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_variant() {
        assert_eq!(
            DispatchOutcome::ProviderException.to_string(),
            "ProviderException"
        );
    }
}
