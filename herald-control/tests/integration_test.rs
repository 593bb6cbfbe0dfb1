//! Integration tests for control socket client/server communication
//!
//! These tests verify the full request/response cycle between the control
//! client and server, including error handling and protocol correctness.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::unreachable
)]

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use herald_common::{DeliveryRequest, DeliveryResult, DeliveryStatus, Signal};
use herald_control::{
    ControlClient, ControlError, ControlServer, Result,
    protocol::{
        DeliveryCommand, ProviderStatus, Request, RequestCommand, Response, ResponseData,
        ResponsePayload, SystemCommand, SystemStatus,
    },
    server::CommandHandler,
};
use herald_delivery::CircuitState;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixStream,
    sync::broadcast,
};

/// Mock command handler for testing
#[derive(Default)]
struct MockHandler {
    /// Outcomes recorded by `Send`, keyed by idempotency key
    statuses: Mutex<HashMap<String, DeliveryStatus>>,
    queued: Mutex<Vec<DeliveryRequest>>,
}

#[async_trait]
impl CommandHandler for MockHandler {
    async fn handle_request(&self, request: Request) -> Result<Response> {
        match request.command {
            RequestCommand::Delivery(cmd) => match cmd {
                DeliveryCommand::Send(request) => {
                    request.validate()?;
                    let result = DeliveryResult::success("Mock", "delivered");

                    if let Some(key) = request.idempotency_key() {
                        self.statuses.lock().insert(
                            key.to_string(),
                            DeliveryStatus {
                                idempotency_key: key.to_string(),
                                last_result: result.clone(),
                                retry_count: 0,
                                next_retry_at: None,
                            },
                        );
                    }

                    Ok(Response::data(ResponseData::Delivery(result)))
                }
                DeliveryCommand::Queue(request) => {
                    request.validate()?;
                    let mut queued = self.queued.lock();
                    queued.push(request);
                    Ok(Response::data(ResponseData::Queued {
                        depth: queued.len(),
                    }))
                }
                DeliveryCommand::Status { key } => self.statuses.lock().get(&key).map_or_else(
                    || Ok(Response::error(format!("No status found for key {key}"))),
                    |status| Ok(Response::data(ResponseData::Status(status.clone()))),
                ),
            },
            RequestCommand::System(cmd) => match cmd {
                SystemCommand::Ping => Ok(Response::ok()),
                SystemCommand::Status => {
                    Ok(Response::data(ResponseData::SystemStatus(SystemStatus {
                        version: "0.1.0".to_string(),
                        uptime_secs: 12345,
                        queue_depth: self.queued.lock().len(),
                        cached_statuses: self.statuses.lock().len(),
                        providers: vec![ProviderStatus {
                            name: "Mock".to_string(),
                            state: CircuitState::Closed,
                            failure_count: 0,
                        }],
                    })))
                }
            },
        }
    }
}

/// Helper to start a test server in the background
async fn start_test_server(
    socket_path: &str,
    handler: Arc<dyn CommandHandler>,
) -> (tokio::task::JoinHandle<()>, broadcast::Sender<Signal>) {
    let server = ControlServer::new(socket_path, handler).expect("Failed to create server");
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.serve(shutdown_rx).await {
            eprintln!("Server error: {e}");
        }
    });

    // Give server time to bind
    tokio::time::sleep(Duration::from_millis(100)).await;

    (server_handle, shutdown_tx)
}

fn request() -> DeliveryRequest {
    DeliveryRequest::new("user@example.com", "Welcome", "Hello there")
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_system_ping() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let handler = Arc::new(MockHandler::default());
    let (_server_handle, _shutdown_tx) = start_test_server(socket_str, handler).await;

    let client = ControlClient::new(socket_str);
    let request = Request::new(RequestCommand::System(SystemCommand::Ping));
    let response = client.send_request(request).await.unwrap();

    assert!(matches!(response.payload, ResponsePayload::Ok));
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_send_then_status() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let handler = Arc::new(MockHandler::default());
    let (_server_handle, _shutdown_tx) = start_test_server(socket_str, handler).await;
    let client = ControlClient::new(socket_str);

    let response = client
        .send_request(Request::new(RequestCommand::Delivery(DeliveryCommand::Send(
            request().with_idempotency_key("welcome-1"),
        ))))
        .await
        .unwrap();

    let delivered = match response.payload {
        ResponsePayload::Data(data) => match *data {
            ResponseData::Delivery(result) => result,
            other => panic!("Expected Delivery response, got {other:?}"),
        },
        other => panic!("Expected Data response, got {other:?}"),
    };
    assert!(delivered.success);

    let response = client
        .send_request(Request::new(RequestCommand::Delivery(
            DeliveryCommand::Status {
                key: "welcome-1".to_string(),
            },
        )))
        .await
        .unwrap();

    match response.payload {
        ResponsePayload::Data(data) => match *data {
            ResponseData::Status(status) => {
                assert_eq!(status.idempotency_key, "welcome-1");
                assert_eq!(status.last_result, delivered);
            }
            other => panic!("Expected Status response, got {other:?}"),
        },
        other => panic!("Expected Data response, got {other:?}"),
    }
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_unknown_status_is_server_error() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let handler = Arc::new(MockHandler::default());
    let (_server_handle, _shutdown_tx) = start_test_server(socket_str, handler).await;

    let client = ControlClient::new(socket_str);
    let result = client
        .send_request(Request::new(RequestCommand::Delivery(
            DeliveryCommand::Status {
                key: "missing".to_string(),
            },
        )))
        .await;

    match result {
        Err(ControlError::ServerError(message)) => {
            assert_eq!(message, "No status found for key missing");
        }
        other => panic!("Expected ServerError, got {other:?}"),
    }
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_handler_error_becomes_error_response() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let handler = Arc::new(MockHandler::default());
    let (_server_handle, _shutdown_tx) = start_test_server(socket_str, handler).await;

    let client = ControlClient::new(socket_str);
    let result = client
        .send_request(Request::new(RequestCommand::Delivery(DeliveryCommand::Queue(
            DeliveryRequest::new("", "Welcome", ""),
        ))))
        .await;

    match result {
        Err(ControlError::ServerError(message)) => {
            assert_eq!(message, "Invalid request: Recipient is required");
        }
        other => panic!("Expected ServerError, got {other:?}"),
    }
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_queue_and_system_status() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let handler = Arc::new(MockHandler::default());
    let (_server_handle, _shutdown_tx) = start_test_server(socket_str, handler).await;
    let client = ControlClient::new(socket_str);

    for expected_depth in 1..=2 {
        let response = client
            .send_request(Request::new(RequestCommand::Delivery(
                DeliveryCommand::Queue(request()),
            )))
            .await
            .unwrap();

        match response.payload {
            ResponsePayload::Data(data) => match *data {
                ResponseData::Queued { depth } => assert_eq!(depth, expected_depth),
                other => panic!("Expected Queued response, got {other:?}"),
            },
            other => panic!("Expected Data response, got {other:?}"),
        }
    }

    let response = client
        .send_request(Request::new(RequestCommand::System(SystemCommand::Status)))
        .await
        .unwrap();

    match response.payload {
        ResponsePayload::Data(data) => match *data {
            ResponseData::SystemStatus(status) => {
                assert_eq!(status.uptime_secs, 12345);
                assert_eq!(status.queue_depth, 2);
                assert_eq!(status.providers.len(), 1);
            }
            other => panic!("Expected SystemStatus response, got {other:?}"),
        },
        other => panic!("Expected Data response, got {other:?}"),
    }
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_incompatible_version_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let handler = Arc::new(MockHandler::default());
    let (_server_handle, _shutdown_tx) = start_test_server(socket_str, handler).await;

    let mut request = Request::new(RequestCommand::System(SystemCommand::Ping));
    request.version = 99;

    let result = ControlClient::new(socket_str).send_request(request).await;
    match result {
        Err(ControlError::ServerError(message)) => {
            assert!(message.contains("Incompatible protocol version"));
        }
        other => panic!("Expected ServerError, got {other:?}"),
    }
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_oversized_request_is_dropped() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let handler = Arc::new(MockHandler::default());
    let (_server_handle, _shutdown_tx) = start_test_server(socket_str, handler).await;

    let mut stream = UnixStream::connect(socket_str).await.unwrap();
    stream
        .write_all(&(2_000_000_u32).to_be_bytes())
        .await
        .unwrap();

    // The server closes the connection without answering
    let mut buf = [0u8; 4];
    let read = stream.read(&mut buf).await.unwrap();
    assert_eq!(read, 0);
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_socket_not_exist_error() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("nonexistent.sock");
    let socket_str = socket_path.to_str().unwrap();

    let client = ControlClient::new(socket_str);
    let request = Request::new(RequestCommand::System(SystemCommand::Ping));
    let result = client.send_request(request).await;

    assert!(matches!(result, Err(ControlError::Io(_))));
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_socket_permissions_and_cleanup() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let client = ControlClient::new(socket_str);
    assert!(matches!(
        client.check_socket_exists(),
        Err(ControlError::InvalidSocketPath(_))
    ));

    let handler = Arc::new(MockHandler::default());
    let (server_handle, shutdown_tx) = start_test_server(socket_str, handler).await;

    assert!(client.check_socket_exists().is_ok());
    let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    shutdown_tx.send(Signal::Shutdown).unwrap();
    server_handle.await.unwrap();
    assert!(!socket_path.exists());
}

#[tokio::test]
#[cfg_attr(miri, ignore)]
async fn test_active_socket_is_not_stolen() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let (_server_handle, _shutdown_tx) =
        start_test_server(socket_str, Arc::new(MockHandler::default())).await;

    let second = ControlServer::new(socket_str, Arc::new(MockHandler::default())).unwrap();
    let (_tx, rx) = broadcast::channel(1);
    let result = second.serve(rx).await;

    assert!(matches!(result, Err(ControlError::Io(e)) if e.kind() == std::io::ErrorKind::AddrInUse));
}
