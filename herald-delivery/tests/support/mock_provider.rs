//! Scripted provider for exercising the dispatch engine
//!
//! Each attempt consumes the next scripted behaviour; once the script runs
//! out the fallback behaviour repeats forever.
//!
//! # Example
//!
//! ```rust,ignore
//! let provider = MockProvider::builder("Primary")
//!     .then(Behaviour::Fail)
//!     .then(Behaviour::Error)
//!     .otherwise(Behaviour::Succeed)
//!     .build();
//!
//! assert_eq!(provider.calls(), 0);
//! ```

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use async_trait::async_trait;
use herald_delivery::{DeliveryRequest, DeliveryResult, Provider, ProviderError};
use parking_lot::Mutex;

/// What a single attempt does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Return a successful result
    Succeed,
    /// Return an unsuccessful result
    Fail,
    /// Return `Err(ProviderError::Unavailable)`
    Error,
    /// Panic inside the provider future
    Panic,
}

pub struct MockProviderBuilder {
    name: String,
    script: VecDeque<Behaviour>,
    fallback: Behaviour,
}

impl MockProviderBuilder {
    #[must_use]
    pub fn then(mut self, behaviour: Behaviour) -> Self {
        self.script.push_back(behaviour);
        self
    }

    #[must_use]
    pub const fn otherwise(mut self, behaviour: Behaviour) -> Self {
        self.fallback = behaviour;
        self
    }

    pub fn build(self) -> Arc<MockProvider> {
        Arc::new(MockProvider {
            name: self.name,
            script: Mutex::new(self.script),
            fallback: self.fallback,
            calls: AtomicUsize::new(0),
            attempts: Mutex::new(Vec::new()),
        })
    }
}

#[derive(Debug)]
pub struct MockProvider {
    name: String,
    script: Mutex<VecDeque<Behaviour>>,
    fallback: Behaviour,
    calls: AtomicUsize,
    /// Subject and start time of every attempt
    attempts: Mutex<Vec<(String, Instant)>>,
}

impl MockProvider {
    pub fn builder(name: impl Into<String>) -> MockProviderBuilder {
        MockProviderBuilder {
            name: name.into(),
            script: VecDeque::new(),
            fallback: Behaviour::Succeed,
        }
    }

    pub fn always(name: impl Into<String>, behaviour: Behaviour) -> Arc<Self> {
        Self::builder(name).otherwise(behaviour).build()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn subjects(&self) -> Vec<String> {
        self.attempts
            .lock()
            .iter()
            .map(|(subject, _)| subject.clone())
            .collect()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt_delivery(
        &self,
        request: &DeliveryRequest,
    ) -> Result<DeliveryResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.attempts
            .lock()
            .push((request.subject.clone(), Instant::now()));

        let behaviour = self.script.lock().pop_front().unwrap_or(self.fallback);

        match behaviour {
            Behaviour::Succeed => Ok(DeliveryResult::success(
                self.name.clone(),
                format!("Notification sent successfully via {}", self.name),
            )),
            Behaviour::Fail => Ok(DeliveryResult::failure(
                self.name.clone(),
                format!("Failed to send notification via {}", self.name),
            )),
            Behaviour::Error => Err(ProviderError::Unavailable(format!(
                "{} refused the connection",
                self.name
            ))),
            Behaviour::Panic => panic!("{} crashed", self.name),
        }
    }
}
