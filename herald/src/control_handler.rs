//! Control handler implementation for herald
//!
//! This module implements the `CommandHandler` trait to process control requests
//! against the running dispatch engine.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use herald_common::incoming;
use herald_control::{
    CommandHandler, DeliveryCommand, ProviderStatus, Request, RequestCommand, Response,
    ResponseData, SystemCommand, SystemStatus,
};
use herald_delivery::DeliveryService;

/// Handler for control commands
pub struct HeraldControlHandler {
    delivery: Arc<dyn DeliveryService>,
    /// Server start time for uptime calculation
    start_time: Instant,
}

impl HeraldControlHandler {
    /// Create a new control handler
    #[must_use]
    pub fn new(delivery: Arc<dyn DeliveryService>) -> Self {
        Self {
            delivery,
            start_time: Instant::now(),
        }
    }
}

#[async_trait]
impl CommandHandler for HeraldControlHandler {
    async fn handle_request(&self, request: Request) -> herald_control::Result<Response> {
        match request.command {
            RequestCommand::Delivery(command) => self.handle_delivery_command(command).await,
            RequestCommand::System(command) => Ok(self.handle_system_command(&command)),
        }
    }
}

impl HeraldControlHandler {
    async fn handle_delivery_command(
        &self,
        command: DeliveryCommand,
    ) -> herald_control::Result<Response> {
        match command {
            DeliveryCommand::Send(request) => {
                request.validate()?;
                incoming!(
                    level = INFO,
                    "Dispatch requested for {} (key: {:?})",
                    request.recipient,
                    request.idempotency_key
                );

                let result = self.delivery.dispatch(request).await?;
                Ok(Response::data(ResponseData::Delivery(result)))
            }
            DeliveryCommand::Queue(request) => {
                request.validate()?;
                incoming!(
                    level = INFO,
                    "Queueing notification for {} (key: {:?})",
                    request.recipient,
                    request.idempotency_key
                );

                let depth = self.delivery.enqueue(request)?;
                Ok(Response::data(ResponseData::Queued { depth }))
            }
            DeliveryCommand::Status { key } => Ok(self.delivery.get_status(&key).map_or_else(
                || Response::error(format!("No status found for key {key}")),
                |status| Response::data(ResponseData::Status(status)),
            )),
        }
    }

    fn handle_system_command(&self, command: &SystemCommand) -> Response {
        match command {
            SystemCommand::Ping => Response::ok(),
            SystemCommand::Status => Response::data(ResponseData::SystemStatus(SystemStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: self.start_time.elapsed().as_secs(),
                queue_depth: self.delivery.queue_len(),
                cached_statuses: self.delivery.cached_statuses(),
                providers: self
                    .delivery
                    .circuit_states()
                    .into_iter()
                    .map(ProviderStatus::from)
                    .collect(),
            })),
        }
    }
}
