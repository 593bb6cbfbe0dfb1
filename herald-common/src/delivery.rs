//! The delivery data model passed between callers, the dispatch engine and
//! providers.

use core::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A single notification to be delivered through one of the providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    /// Recipient address
    pub recipient: String,
    /// Subject line
    pub subject: String,
    /// Message body, may be empty
    #[serde(default)]
    pub body: String,
    /// Caller-supplied key identifying logically repeated submissions
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl DeliveryRequest {
    #[must_use]
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            idempotency_key: None,
        }
    }

    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// The idempotency key, treating an empty key as absent
    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key
            .as_deref()
            .filter(|key| !key.is_empty())
    }

    /// Checks the fields the acceptance surface requires before handing the
    /// request to the engine.
    ///
    /// # Errors
    ///
    /// Returns the first missing required field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.recipient.trim().is_empty() {
            return Err(ValidationError::EmptyRecipient);
        }

        if self.subject.trim().is_empty() {
            return Err(ValidationError::EmptySubject);
        }

        Ok(())
    }
}

/// Outcome of one delivery attempt, or of a whole dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    /// Name of the provider that produced this result, empty when no provider
    /// was attempted
    pub provider: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryResult {
    #[must_use]
    pub fn success(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            provider: provider.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn failure(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            provider: provider.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

impl Display for DeliveryResult {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        let outcome = if self.success { "delivered" } else { "failed" };

        if self.provider.is_empty() {
            write!(fmt, "{outcome}: {}", self.message)
        } else {
            write!(fmt, "{outcome} via {}: {}", self.provider, self.message)
        }
    }
}

/// Last known outcome for an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub idempotency_key: String,
    pub last_result: DeliveryResult,
    /// Retry sweeps used by the dispatch that produced `last_result`
    pub retry_count: u32,
    /// Earliest time a failed request may be dispatched again
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl DeliveryStatus {
    /// Whether a failed request is still inside its retry window at `now`
    pub fn is_retry_pending(&self, now: DateTime<Utc>) -> bool {
        !self.last_result.success && self.next_retry_at.is_some_and(|at| at > now)
    }
}
