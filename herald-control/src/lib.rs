//! Control protocol for a running herald instance
//!
//! This module provides an IPC mechanism using Unix domain sockets to:
//! - Dispatch notifications synchronously or through the queue
//! - Look up the outcome recorded for an idempotency key
//! - Check system health and circuit breaker state
//!
//! Messages are length-prefixed bincode frames (see [`frame`]).

pub mod client;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod server;

pub use client::ControlClient;
pub use error::{ControlError, Result};
pub use protocol::{
    DeliveryCommand, PROTOCOL_VERSION, ProviderStatus, Request, RequestCommand, Response,
    ResponseData, ResponsePayload, SystemCommand, SystemStatus,
};
pub use server::{CommandHandler, ControlServer};

/// Default path for the control socket
pub const DEFAULT_CONTROL_SOCKET: &str = "/tmp/herald.sock";
