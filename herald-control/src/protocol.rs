//! Control protocol types and serialization

use std::fmt::{Display, Formatter};

use herald_common::{DeliveryRequest, DeliveryResult, DeliveryStatus};
use herald_delivery::{CircuitBreakerStats, CircuitState};
use serde::{Deserialize, Serialize};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Request sent to the control server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version
    pub version: u32,
    /// The actual command to execute
    pub command: RequestCommand,
}

/// Request command types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestCommand {
    /// Notification delivery commands
    Delivery(DeliveryCommand),
    /// System management commands
    System(SystemCommand),
}

/// Notification delivery commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeliveryCommand {
    /// Dispatch now and wait for the outcome
    Send(DeliveryRequest),
    /// Queue for background dispatch
    Queue(DeliveryRequest),
    /// Last known outcome for an idempotency key
    Status { key: String },
}

/// System management commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemCommand {
    /// Check if the server is alive
    Ping,
    /// Engine status: uptime, queue depth, circuit states
    Status,
}

/// Response from the control server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version
    pub version: u32,
    /// The actual response payload
    pub payload: ResponsePayload,
}

/// Response payload types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// Command succeeded
    Ok,
    /// Command succeeded with data
    Data(Box<ResponseData>),
    /// Command failed with error message
    Error(String),
}

/// Response data types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseData {
    /// Outcome of a synchronous dispatch
    Delivery(DeliveryResult),
    /// The request was queued; `depth` counts it
    Queued { depth: usize },
    /// Cached status for an idempotency key
    Status(DeliveryStatus),
    /// System status information
    SystemStatus(SystemStatus),
}

/// System status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Herald version
    pub version: String,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Requests waiting in the delivery queue
    pub queue_depth: usize,
    /// Idempotency keys with a recorded outcome
    pub cached_statuses: usize,
    /// Providers in fail-over order
    pub providers: Vec<ProviderStatus>,
}

impl Display for SystemStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Version:         {}", self.version)?;
        writeln!(f, "Uptime:          {}", format_duration(self.uptime_secs))?;
        writeln!(f, "Queue depth:     {}", self.queue_depth)?;
        writeln!(f, "Cached statuses: {}", self.cached_statuses)?;
        write!(f, "Providers:")?;

        for provider in &self.providers {
            write!(f, "\n  {provider}")?;
        }

        Ok(())
    }
}

/// Format a duration in seconds as its two most significant units
fn format_duration(secs: u64) -> String {
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => format!("{}m {}s", secs / 60, secs % 60),
        3600..86400 => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
        _ => format!("{}d {}h", secs / 86400, (secs % 86400) / 3600),
    }
}

/// Circuit state of a single provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
}

impl From<CircuitBreakerStats> for ProviderStatus {
    fn from(stats: CircuitBreakerStats) -> Self {
        Self {
            name: stats.provider,
            state: stats.state,
            failure_count: stats.failure_count,
        }
    }
}

impl Display for ProviderStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            CircuitState::Closed => "closed",
            CircuitState::Open => "OPEN",
        };

        write!(
            f,
            "{} (circuit {state}, {} failure(s))",
            self.name, self.failure_count
        )
    }
}

impl Request {
    /// Create a new request with the current protocol version
    #[must_use]
    pub const fn new(command: RequestCommand) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            command,
        }
    }

    /// Check if the request version is compatible with the current version
    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        // For now, only exact version match is supported
        self.version == PROTOCOL_VERSION
    }
}

impl Response {
    /// Create an error response
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Error(message.into()),
        }
    }

    /// Create a success response with no data
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Ok,
        }
    }

    /// Create a response with data
    #[must_use]
    pub fn data(data: ResponseData) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Data(Box::new(data)),
        }
    }

    /// Check if the response indicates success (not an error)
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.payload, ResponsePayload::Error(_))
    }

    /// Check if the response version is compatible with the current version
    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}
