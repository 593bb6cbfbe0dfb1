//! Client for connecting to the control socket

use std::{path::Path, time::Duration};

use tokio::net::UnixStream;
use tracing::{debug, trace};

use crate::{ControlError, PROTOCOL_VERSION, Request, Response, ResponsePayload, Result, frame};

/// Maximum response size to prevent `DoS` attacks (10MB)
pub const MAX_RESPONSE_SIZE: u32 = 10_000_000;

/// Client for communicating with the herald control server
#[derive(Debug, Clone)]
pub struct ControlClient {
    socket_path: String,
    timeout: Duration,
}

impl ControlClient {
    /// Create a new control client with the given socket path
    #[must_use]
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the request timeout
    ///
    /// A synchronous `send` waits for the whole dispatch, retries included,
    /// so this should comfortably exceed the engine's worst-case backoff.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connect(&self) -> Result<UnixStream> {
        debug!("Connecting to control socket: {}", self.socket_path);
        let stream = UnixStream::connect(&self.socket_path).await?;
        Ok(stream)
    }

    /// Send a request and receive a response
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Connection fails
    /// - Protocol error occurs
    /// - Request times out
    /// - Server returns an error
    pub async fn send_request(&self, request: Request) -> Result<Response> {
        tokio::time::timeout(self.timeout, async {
            let mut stream = self.connect().await?;
            Self::send_and_receive(&mut stream, &request).await
        })
        .await
        .map_err(|_| ControlError::Timeout)?
    }

    /// Send request and receive response on an existing stream
    async fn send_and_receive(stream: &mut UnixStream, request: &Request) -> Result<Response> {
        trace!("Sending request: {request:?}");
        frame::write_frame(stream, request).await?;

        let response: Response = frame::read_frame(stream, MAX_RESPONSE_SIZE, "Response").await?;
        trace!("Received response: {response:?}");

        if !response.is_version_compatible() {
            return Err(ControlError::ProtocolDeserialization(
                bincode::error::DecodeError::OtherString(format!(
                    "Incompatible protocol version: server={}, client={PROTOCOL_VERSION}",
                    response.version
                )),
            ));
        }

        if let ResponsePayload::Error(ref err) = response.payload {
            return Err(ControlError::ServerError(err.clone()));
        }

        Ok(response)
    }

    /// Check if the control socket exists
    ///
    /// # Errors
    ///
    /// Returns an error if the socket doesn't exist
    pub fn check_socket_exists(&self) -> Result<()> {
        let path = Path::new(&self.socket_path);
        if !path.exists() {
            return Err(ControlError::InvalidSocketPath(format!(
                "Socket does not exist: {}",
                self.socket_path
            )));
        }
        Ok(())
    }
}
