//! Types shared by every herald crate: the delivery data model, request
//! validation, logging setup and audit events.

pub mod audit;
pub mod delivery;
pub mod error;
pub mod logging;

pub use delivery::{DeliveryRequest, DeliveryResult, DeliveryStatus};
pub use error::ValidationError;
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
