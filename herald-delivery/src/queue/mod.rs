//! Asynchronous delivery queue
//!
//! [`DeliveryQueue`] is the cloneable producer side: enqueueing never waits
//! for a dispatch. A single [`QueueConsumer`] drains requests in FIFO order
//! and dispatches them one at a time until shutdown.
//!
//! The queue is unbounded; its current depth is tracked for status reporting.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use herald_common::{
    DeliveryRequest, DeliveryResult, Signal, internal,
    tracing::{self, debug, error, warn},
};
use herald_tracing::traced;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};

use crate::{coordinator::DispatchCoordinator, error::DeliveryError};

/// Something the consumer can hand queued requests to
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: &DeliveryRequest) -> DeliveryResult;
}

#[async_trait]
impl Dispatcher for DispatchCoordinator {
    async fn dispatch(&self, request: &DeliveryRequest) -> DeliveryResult {
        Self::dispatch(self, request).await
    }
}

/// Create a connected producer/consumer pair feeding `dispatcher`
pub fn channel(dispatcher: Arc<dyn Dispatcher>) -> (DeliveryQueue, QueueConsumer) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));

    (
        DeliveryQueue {
            sender,
            depth: Arc::clone(&depth),
        },
        QueueConsumer {
            receiver,
            depth,
            dispatcher,
        },
    )
}

/// Producer handle for the delivery queue
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    sender: mpsc::UnboundedSender<DeliveryRequest>,
    depth: Arc<AtomicUsize>,
}

impl DeliveryQueue {
    /// Append a request for background dispatch
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::QueueClosed`] if the consumer has stopped.
    pub fn enqueue(&self, request: DeliveryRequest) -> Result<usize, DeliveryError> {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst).saturating_add(1);

        if self.sender.send(request).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(DeliveryError::QueueClosed);
        }

        debug!(depth, "Request queued for delivery");
        Ok(depth)
    }

    /// Number of requests waiting to be dispatched
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Drains the delivery queue
pub struct QueueConsumer {
    receiver: mpsc::UnboundedReceiver<DeliveryRequest>,
    depth: Arc<AtomicUsize>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl core::fmt::Debug for QueueConsumer {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        fmt.debug_struct("QueueConsumer")
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

/// Whether an event from the shutdown channel stops the consumer
///
/// Missed signals are not a reason to stop; the next receive yields the
/// oldest signal still buffered.
fn ends_consumer(signal: Result<Signal, RecvError>) -> bool {
    match signal {
        Ok(Signal::Shutdown | Signal::Finalised) => true,
        Err(RecvError::Lagged(skipped)) => {
            warn!("Queue consumer missed {skipped} shutdown channel message(s)");
            false
        }
        Err(RecvError::Closed) => {
            error!("Queue consumer shutdown channel closed");
            true
        }
    }
}

impl QueueConsumer {
    /// Dispatch queued requests until shutdown or until every producer is gone.
    ///
    /// Each request runs to completion before the next is taken. A dispatch
    /// that panics is logged and the loop carries on.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all))]
    pub async fn serve(mut self, mut shutdown: broadcast::Receiver<Signal>) {
        internal!("Queue consumer starting");

        loop {
            tokio::select! {
                biased;

                sig = shutdown.recv() => {
                    if ends_consumer(sig) {
                        internal!(
                            level = INFO,
                            "Queue consumer stopping, {} request(s) left queued",
                            self.depth.load(Ordering::SeqCst)
                        );
                        break;
                    }
                }
                request = self.receiver.recv() => {
                    let Some(request) = request else {
                        internal!("All queue producers dropped, stopping consumer");
                        break;
                    };
                    self.depth.fetch_sub(1, Ordering::SeqCst);

                    self.process(request).await;
                }
            }
        }

        self.receiver.close();
        internal!("Queue consumer shutdown complete");
    }

    async fn process(&self, request: DeliveryRequest) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let recipient = request.recipient.clone();

        let handle = tokio::spawn(async move { dispatcher.dispatch(&request).await });

        match handle.await {
            Ok(result) => {
                debug!(
                    recipient = %recipient,
                    success = result.success,
                    "Queued dispatch finished: {result}"
                );
            }
            Err(e) => {
                error!(
                    recipient = %recipient,
                    "Queued dispatch did not complete: {e}"
                );
            }
        }
    }
}
