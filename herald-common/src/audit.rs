//! Audit logging for the dispatch lifecycle
//!
//! Events are emitted through `tracing` under the `herald::audit` target:
//!
//! - `DispatchAccepted`: a request entered the engine (direct or queued)
//! - `DeliveryAttempt`: a provider is about to be invoked
//! - `DeliverySuccess`: a provider accepted the notification
//! - `DeliveryFailure`: a dispatch ended without success
//!
//! Recipient addresses can be redacted through [`AuditConfig`].

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Emit audit events at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Replace the local part of recipient addresses with `[REDACTED]`
    #[serde(default)]
    pub redact_recipients: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_recipients: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

static AUDIT_CONFIG: OnceLock<Arc<AuditConfig>> = OnceLock::new();

/// Initialise audit logging; only the first call takes effect
pub fn init(config: AuditConfig) {
    AUDIT_CONFIG.get_or_init(|| Arc::new(config));
}

#[must_use]
pub fn config() -> Arc<AuditConfig> {
    AUDIT_CONFIG
        .get()
        .cloned()
        .unwrap_or_else(|| Arc::new(AuditConfig::default()))
}

/// Redact a recipient if redaction is enabled, keeping the domain
#[must_use]
pub fn redact_recipient(recipient: &str, redact: bool) -> String {
    if !redact {
        return recipient.to_string();
    }

    recipient.split_once('@').map_or_else(
        || "[REDACTED]".to_string(),
        |(_, domain)| format!("[REDACTED]@{domain}"),
    )
}

/// Log that a request has been accepted, `path` being `"dispatch"` or `"queue"`
pub fn log_dispatch_accepted(recipient: &str, idempotency_key: Option<&str>, path: &str) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        target: "herald::audit",
        tracing::Level::INFO,
        event = "DispatchAccepted",
        recipient = %redact_recipient(recipient, config.redact_recipients),
        idempotency_key = idempotency_key.unwrap_or_default(),
        path = %path,
        "Audit: Dispatch accepted"
    );
}

/// Log a provider invocation; `sweep` is 1-based
pub fn log_delivery_attempt(recipient: &str, provider: &str, sweep: u32) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        target: "herald::audit",
        tracing::Level::INFO,
        event = "DeliveryAttempt",
        recipient = %redact_recipient(recipient, config.redact_recipients),
        provider = %provider,
        sweep,
        "Audit: Delivery attempt"
    );
}

pub fn log_delivery_success(recipient: &str, provider: &str, sweep: u32, duration_ms: u128) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        target: "herald::audit",
        tracing::Level::INFO,
        event = "DeliverySuccess",
        recipient = %redact_recipient(recipient, config.redact_recipients),
        provider = %provider,
        sweep,
        duration_ms,
        "Audit: Delivery successful"
    );
}

/// Log the terminal failure of a dispatch, `outcome` naming why it ended
pub fn log_delivery_failure(recipient: &str, error: &str, sweeps: u32, outcome: &str) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        target: "herald::audit",
        tracing::Level::WARN,
        event = "DeliveryFailure",
        recipient = %redact_recipient(recipient, config.redact_recipients),
        error = %error,
        sweeps,
        outcome = %outcome,
        "Audit: Delivery failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_recipient() {
        assert_eq!(
            redact_recipient("user@example.com", true),
            "[REDACTED]@example.com"
        );
        assert_eq!(
            redact_recipient("user@example.com", false),
            "user@example.com"
        );
        assert_eq!(redact_recipient("invalid", true), "[REDACTED]");
        assert_eq!(redact_recipient("invalid", false), "invalid");
    }

    #[test]
    fn test_default_config() {
        let config = AuditConfig::default();
        assert!(config.enabled);
        assert!(!config.redact_recipients);
    }

    #[test]
    fn test_audit_events_do_not_panic() {
        log_dispatch_accepted("rcpt@example.com", Some("k1"), "queue");
        log_delivery_attempt("rcpt@example.com", "Primary", 1);
        log_delivery_success("rcpt@example.com", "Primary", 1, 12);
        log_delivery_failure("rcpt@example.com", "All providers failed", 3, "RetryExhausted");
    }
}
