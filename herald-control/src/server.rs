//! Control server implementation

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use herald_common::Signal;
use tokio::{
    net::{UnixListener, UnixStream},
    sync::broadcast,
};
use tracing::{debug, error, info, trace, warn};

use crate::{ControlError, PROTOCOL_VERSION, Request, Response, Result, frame};

/// Largest request frame the server accepts
pub const MAX_REQUEST_SIZE: u32 = 1_000_000;

/// Read/write timeout for a single connection
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Handler trait for processing control requests
///
/// Implement this trait to handle specific command types
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a request and return a response
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be processed
    async fn handle_request(&self, request: Request) -> Result<Response>;
}

/// Control server for managing herald via Unix domain socket
pub struct ControlServer {
    socket_path: String,
    handler: Arc<dyn CommandHandler>,
}

impl ControlServer {
    /// Create a new control server
    ///
    /// # Errors
    ///
    /// Returns an error if the socket path is empty
    pub fn new(socket_path: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Result<Self> {
        let socket_path = socket_path.into();
        if socket_path.trim().is_empty() {
            return Err(ControlError::InvalidSocketPath(
                "Socket path must not be empty".to_string(),
            ));
        }

        Ok(Self {
            socket_path,
            handler,
        })
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Start the control server
    ///
    /// This function runs until a shutdown signal is received.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another running instance owns the socket
    /// - The socket cannot be bound
    /// - Socket permissions cannot be set
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<()> {
        // Check for existing socket file
        let socket_path = Path::new(&self.socket_path);
        if socket_path.exists() {
            // Test if socket is active by attempting connection
            if UnixStream::connect(socket_path).await.is_ok() {
                return Err(ControlError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    format!(
                        "Socket already in use by running instance: {}",
                        self.socket_path
                    ),
                )));
            }
            // Stale socket from crashed process, safe to remove
            info!("Removing stale socket file: {}", self.socket_path);
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Owner read/write only
        #[cfg(unix)]
        {
            let metadata = tokio::fs::metadata(&self.socket_path).await?;
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(&self.socket_path, perms).await?;
            info!(
                "Control socket created with mode 0600 (owner only): {}",
                self.socket_path
            );
        }

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let handler = Arc::clone(&self.handler);
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, handler).await {
                                    error!("Error handling control connection: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting control connection: {e}");
                        }
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            info!("Control server shutting down");
                        }
                        Err(e) => {
                            error!("Control server shutdown channel error: {e}");
                        }
                    }
                    break;
                }
            }
        }

        if socket_path.exists() {
            debug!("Removing socket file: {}", self.socket_path);
            let _ = tokio::fs::remove_file(socket_path).await;
        }

        Ok(())
    }

    /// Handle a single client connection
    async fn handle_connection(
        mut stream: UnixStream,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<()> {
        let request: Request = tokio::time::timeout(
            CONNECTION_TIMEOUT,
            frame::read_frame(&mut stream, MAX_REQUEST_SIZE, "Request"),
        )
        .await
        .map_err(|_| ControlError::Timeout)??;

        trace!("Received request: {request:?}");

        let response = if request.is_version_compatible() {
            match handler.handle_request(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Error handling request: {e}");
                    Response::error(e.to_string())
                }
            }
        } else {
            warn!(
                "Rejecting request with protocol version {} (server speaks {PROTOCOL_VERSION})",
                request.version
            );
            Response::error(format!(
                "Incompatible protocol version: client={}, server={PROTOCOL_VERSION}",
                request.version
            ))
        };

        trace!("Sending response: {response:?}");

        tokio::time::timeout(
            CONNECTION_TIMEOUT,
            frame::write_frame(&mut stream, &response),
        )
        .await
        .map_err(|_| ControlError::Timeout)??;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    #[async_trait]
    impl CommandHandler for Nothing {
        async fn handle_request(&self, _request: Request) -> Result<Response> {
            Ok(Response::ok())
        }
    }

    #[test]
    fn test_empty_socket_path_rejected() {
        assert!(matches!(
            ControlServer::new("  ", Arc::new(Nothing)),
            Err(ControlError::InvalidSocketPath(_))
        ));
    }

    #[test]
    fn test_socket_path_kept() {
        let server = ControlServer::new("/tmp/herald-test.sock", Arc::new(Nothing));
        assert!(server.is_ok_and(|server| server.socket_path() == "/tmp/herald-test.sock"));
    }
}
