//! Provider fail-over, retry sweeps, rate limiting and idempotency for a
//! single delivery request.
//!
//! A dispatch runs up to `max_retries` sweeps over the ordered provider list.
//! The first successful attempt wins; providers whose circuit is open are
//! skipped. Between sweeps the coordinator sleeps for the retry policy's
//! backoff. Every dispatch yields a `DeliveryResult`, never an error.

use std::{
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use ahash::AHashSet;
use futures_util::FutureExt;
use herald_common::{
    DeliveryRequest, DeliveryResult, DeliveryStatus, audit, internal,
    tracing::{self, debug, info, warn},
};
use herald_tracing::traced;

use crate::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats},
    error::{DeliveryError, ProviderError},
    idempotency::{CacheLookup, IdempotencyCache},
    policy::RetryPolicy,
    provider::Provider,
    rate_limiter::RateLimiter,
    types::DispatchOutcome,
};

const ALL_PROVIDERS_FAILED: &str = "All providers failed";

#[derive(Debug)]
struct ProviderSlot {
    provider: Arc<dyn Provider>,
    breaker: CircuitBreaker,
}

#[derive(Debug)]
pub struct DispatchCoordinator {
    providers: Vec<ProviderSlot>,
    cache: IdempotencyCache,
    rate_limiter: RateLimiter,
    policy: Arc<RetryPolicy>,
}

impl DispatchCoordinator {
    /// Build a coordinator over `providers`, tried in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if there are no providers,
    /// two providers share a name or the retry budget is zero.
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        policy: RetryPolicy,
        rate_limit_delay: Duration,
        breaker_config: &CircuitBreakerConfig,
    ) -> Result<Self, DeliveryError> {
        if providers.is_empty() {
            return Err(DeliveryError::Configuration(
                "At least one provider is required".to_string(),
            ));
        }

        if policy.max_retries == 0 {
            return Err(DeliveryError::Configuration(
                "max_retries must be at least 1".to_string(),
            ));
        }

        let mut seen = AHashSet::with_capacity(providers.len());
        for provider in &providers {
            if !seen.insert(provider.name().to_string()) {
                return Err(DeliveryError::Configuration(format!(
                    "Duplicate provider name: {}",
                    provider.name()
                )));
            }
        }

        let providers = providers
            .into_iter()
            .map(|provider| {
                let breaker = CircuitBreaker::new(
                    provider.name(),
                    breaker_config.for_provider(provider.name()),
                );
                ProviderSlot { provider, breaker }
            })
            .collect::<Vec<_>>();

        internal!(
            level = DEBUG,
            "Dispatch coordinator ready with providers: {:?}",
            providers
                .iter()
                .map(|slot| slot.provider.name())
                .collect::<Vec<_>>()
        );

        let policy = Arc::new(policy);

        Ok(Self {
            providers,
            cache: IdempotencyCache::new(Arc::clone(&policy)),
            rate_limiter: RateLimiter::new(rate_limit_delay),
            policy,
        })
    }

    /// Deliver `request` through the first provider that accepts it.
    ///
    /// Keyed requests are answered from the idempotency cache when they have
    /// already been delivered, or refused while their retry window is open.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(recipient = %request.recipient)), timing(precision = "ms"))]
    pub async fn dispatch(&self, request: &DeliveryRequest) -> DeliveryResult {
        let key = request.idempotency_key();

        if let Some(key) = key {
            match self.cache.lookup(key) {
                CacheLookup::Proceed => {}
                CacheLookup::Duplicate(result) => {
                    info!(
                        idempotency_key = %key,
                        outcome = %DispatchOutcome::DuplicateSuppressed,
                        "Returning cached result for already delivered request"
                    );
                    return result;
                }
                // Only a cache seeded with an unspent retry budget lands here;
                // a finished dispatch always records `next_retry_at = None`.
                CacheLookup::RetryNotYetAllowed(result) => {
                    info!(
                        idempotency_key = %key,
                        outcome = %DispatchOutcome::RetryNotYetAllowed,
                        "Request failed recently, refusing to retry yet"
                    );
                    return result;
                }
            }
        }

        self.rate_limiter.wait().await;

        let started = Instant::now();
        let mut retry_count = 0;
        let mut last_result = None;
        let mut skipped: Vec<&str> = Vec::new();

        while self.policy.should_retry(retry_count) {
            let sweep = retry_count.saturating_add(1);

            for slot in &self.providers {
                let name = slot.provider.name();

                if slot.breaker.is_open() {
                    warn!(
                        provider = %name,
                        sweep,
                        outcome = %DispatchOutcome::CircuitOpenSkip,
                        "Circuit breaker open, skipping provider"
                    );
                    if !skipped.contains(&name) {
                        skipped.push(name);
                    }
                    continue;
                }

                audit::log_delivery_attempt(&request.recipient, name, sweep);
                let (result, outcome) = Self::attempt(slot, request).await;

                if result.success {
                    slot.breaker.reset();
                    self.rate_limiter.stamp();
                    if let Some(key) = key {
                        self.cache.update(key, result.clone(), retry_count);
                    }

                    audit::log_delivery_success(
                        &request.recipient,
                        &result.provider,
                        sweep,
                        started.elapsed().as_millis(),
                    );
                    return result;
                }

                warn!(
                    provider = %name,
                    sweep,
                    outcome = %outcome,
                    error = %result.message,
                    "Delivery attempt failed"
                );
                slot.breaker.record_failure();
                last_result = Some(result);
            }

            retry_count = sweep;
            if self.policy.should_retry(retry_count) {
                let delay = self.policy.backoff(retry_count);
                debug!(
                    sweep,
                    delay_ms = delay.as_millis(),
                    "All providers failed this sweep, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }

        self.rate_limiter.stamp();

        let result = last_result.unwrap_or_else(|| Self::all_providers_failed(&skipped));
        if let Some(key) = key {
            self.cache.update(key, result.clone(), retry_count);
        }

        audit::log_delivery_failure(
            &request.recipient,
            &result.message,
            retry_count,
            DispatchOutcome::RetryExhausted.as_str(),
        );

        result
    }

    /// Invoke one provider, turning errors and panics into failed results
    /// tagged with the provider's name
    async fn attempt(
        slot: &ProviderSlot,
        request: &DeliveryRequest,
    ) -> (DeliveryResult, DispatchOutcome) {
        let name = slot.provider.name();

        match AssertUnwindSafe(slot.provider.attempt_delivery(request))
            .catch_unwind()
            .await
        {
            Ok(Ok(mut result)) => {
                if result.provider.is_empty() {
                    result.provider = name.to_string();
                }

                let outcome = if result.success {
                    DispatchOutcome::Delivered
                } else {
                    DispatchOutcome::ProviderFailure
                };
                (result, outcome)
            }
            Ok(Err(error)) => (
                DeliveryResult::failure(name, error.to_string()),
                DispatchOutcome::ProviderException,
            ),
            Err(payload) => (
                DeliveryResult::failure(
                    name,
                    ProviderError::from_panic(payload.as_ref()).to_string(),
                ),
                DispatchOutcome::ProviderException,
            ),
        }
    }

    fn all_providers_failed(skipped: &[&str]) -> DeliveryResult {
        let message = if skipped.is_empty() {
            ALL_PROVIDERS_FAILED.to_string()
        } else {
            format!("{ALL_PROVIDERS_FAILED}: circuit open for {}", skipped.join(", "))
        };

        DeliveryResult::failure(String::new(), message)
    }

    /// Last known outcome for an idempotency key
    pub fn get_status(&self, key: &str) -> Option<DeliveryStatus> {
        self.cache.get(key)
    }

    /// Number of idempotency keys with a recorded outcome
    pub fn cached_statuses(&self) -> usize {
        self.cache.len()
    }

    /// Circuit breaker snapshots in provider order
    pub fn circuit_states(&self) -> Vec<CircuitBreakerStats> {
        self.providers
            .iter()
            .map(|slot| slot.breaker.stats())
            .collect()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers
            .iter()
            .map(|slot| slot.provider.name())
            .collect()
    }
}
