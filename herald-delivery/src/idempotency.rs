//! Outcome cache keyed by caller-supplied idempotency keys
//!
//! A key that has already been delivered is answered from the cache without
//! contacting any provider. A key whose last dispatch failed is refused until
//! its retry window has passed.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use herald_common::{DeliveryResult, DeliveryStatus};

use crate::policy::RetryPolicy;

/// What a dispatch should do with a keyed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// No usable entry, go ahead and dispatch
    Proceed,
    /// Already delivered; the cached result is returned unchanged
    Duplicate(DeliveryResult),
    /// The last attempt failed and its retry window is still open
    RetryNotYetAllowed(DeliveryResult),
}

#[derive(Debug)]
pub struct IdempotencyCache {
    statuses: DashMap<String, DeliveryStatus>,
    policy: Arc<RetryPolicy>,
}

impl IdempotencyCache {
    #[must_use]
    pub fn new(policy: Arc<RetryPolicy>) -> Self {
        Self {
            statuses: DashMap::new(),
            policy,
        }
    }

    pub fn lookup(&self, key: &str) -> CacheLookup {
        let Some(status) = self.statuses.get(key) else {
            return CacheLookup::Proceed;
        };

        if status.last_result.success {
            return CacheLookup::Duplicate(status.last_result.clone());
        }

        match status.next_retry_at {
            Some(next_retry_at) if status.is_retry_pending(Utc::now()) => {
                CacheLookup::RetryNotYetAllowed(DeliveryResult::failure(
                    String::new(),
                    format!(
                        "Retry not yet allowed. Next retry at: {}",
                        next_retry_at.to_rfc3339()
                    ),
                ))
            }
            _ => CacheLookup::Proceed,
        }
    }

    /// Store the outcome of a dispatch that used `retry_count` sweeps,
    /// overwriting any previous status for `key`
    pub fn update(&self, key: &str, result: DeliveryResult, retry_count: u32) {
        let next_retry_at = self.policy.next_retry_at(retry_count);

        self.statuses.insert(
            key.to_string(),
            DeliveryStatus {
                idempotency_key: key.to_string(),
                last_result: result,
                retry_count,
                next_retry_at,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<DeliveryStatus> {
        self.statuses.get(key).map(|status| status.value().clone())
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn cache() -> IdempotencyCache {
        IdempotencyCache::new(Arc::new(RetryPolicy::new(3, 1000, 0)))
    }

    #[test]
    fn test_unknown_key_proceeds() {
        let cache = cache();
        assert_eq!(cache.lookup("missing"), CacheLookup::Proceed);
        assert!(cache.get("missing").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_success_is_a_duplicate() {
        let cache = cache();
        let result = DeliveryResult::success("Primary", "sent");

        cache.update("k1", result.clone(), 0);

        assert_eq!(cache.lookup("k1"), CacheLookup::Duplicate(result));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failure_inside_window_is_refused() {
        let cache = cache();
        cache.update("k1", DeliveryResult::failure("Primary", "bounced"), 0);

        let status = cache.get("k1").unwrap();
        assert!(status.next_retry_at.is_some());

        match cache.lookup("k1") {
            CacheLookup::RetryNotYetAllowed(result) => {
                assert!(!result.success);
                assert!(result.message.starts_with("Retry not yet allowed"));
            }
            other => panic!("expected RetryNotYetAllowed, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_after_window_proceeds() {
        let cache = cache();
        cache.update("k1", DeliveryResult::failure("Primary", "bounced"), 0);

        cache.statuses.get_mut("k1").unwrap().next_retry_at =
            Some(Utc::now() - TimeDelta::seconds(1));

        assert_eq!(cache.lookup("k1"), CacheLookup::Proceed);
    }

    #[test]
    fn test_exhausted_failure_proceeds() {
        let cache = cache();
        cache.update("k1", DeliveryResult::failure("Primary", "bounced"), 3);

        let status = cache.get("k1").unwrap();
        assert_eq!(status.retry_count, 3);
        assert!(status.next_retry_at.is_none());
        assert_eq!(cache.lookup("k1"), CacheLookup::Proceed);
    }

    #[test]
    fn test_update_overwrites() {
        let cache = cache();
        cache.update("k1", DeliveryResult::failure("Primary", "bounced"), 3);
        cache.update("k1", DeliveryResult::success("Backup", "sent"), 1);

        let status = cache.get("k1").unwrap();
        assert!(status.last_result.success);
        assert_eq!(status.last_result.provider, "Backup");
        assert_eq!(status.retry_count, 1);
        assert_eq!(cache.len(), 1);
    }
}
