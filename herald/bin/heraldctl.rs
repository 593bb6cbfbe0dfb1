//! Command-line utility for a running herald instance
//!
//! Talks to the control socket to:
//! - Dispatch notifications, either waiting for the outcome or queueing them
//! - Look up the recorded outcome for an idempotency key
//! - Check liveness and circuit breaker state

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use herald_common::{DeliveryRequest, DeliveryResult, DeliveryStatus};
use herald_control::{
    ControlClient, DEFAULT_CONTROL_SOCKET, DeliveryCommand, Request, RequestCommand,
    ResponseData, ResponsePayload, SystemCommand, SystemStatus,
};

/// Command-line utility for managing herald
#[derive(Parser, Debug)]
#[command(name = "heraldctl")]
#[command(about = "Send notifications through a running herald", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the control socket
    #[arg(short = 'c', long, default_value = DEFAULT_CONTROL_SOCKET)]
    socket: String,

    /// Seconds to wait for a response
    ///
    /// A synchronous send blocks for the whole dispatch, backoff included.
    #[arg(short, long, default_value = "120")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dispatch a notification and wait for the outcome
    Send(NotificationArgs),
    /// Queue a notification for background dispatch
    Queue(NotificationArgs),
    /// Show the last recorded outcome for an idempotency key
    Status {
        /// The idempotency key used when sending
        key: String,
    },
    /// Check if herald is responding
    Ping,
    /// Show uptime, queue depth and circuit breaker state
    System,
}

#[derive(Args, Debug)]
struct NotificationArgs {
    /// Recipient address
    #[arg(long)]
    to: String,

    /// Notification subject
    #[arg(long)]
    subject: String,

    /// Notification body
    #[arg(long, default_value = "")]
    body: String,

    /// Idempotency key; repeated submissions with the same key are not re-sent
    #[arg(short, long)]
    key: Option<String>,
}

impl From<NotificationArgs> for DeliveryRequest {
    fn from(args: NotificationArgs) -> Self {
        let request = Self::new(args.to, args.subject, args.body);
        match args.key {
            Some(key) => request.with_idempotency_key(key),
            None => request,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let client = ControlClient::new(&cli.socket)
        .with_timeout(Duration::from_secs(cli.timeout));
    client.check_socket_exists().map_err(|e| {
        anyhow::anyhow!("{e}\nIs herald running? Control socket: {}", cli.socket)
    })?;

    let command = match cli.command {
        Commands::Send(args) => RequestCommand::Delivery(DeliveryCommand::Send(args.into())),
        Commands::Queue(args) => RequestCommand::Delivery(DeliveryCommand::Queue(args.into())),
        Commands::Status { key } => RequestCommand::Delivery(DeliveryCommand::Status { key }),
        Commands::Ping => RequestCommand::System(SystemCommand::Ping),
        Commands::System => RequestCommand::System(SystemCommand::Status),
    };

    let response = client.send_request(Request::new(command)).await?;

    match response.payload {
        ResponsePayload::Ok => println!("✓ Pong! herald is responding"),
        ResponsePayload::Data(data) => match *data {
            ResponseData::Delivery(result) => print_result(&result)?,
            ResponseData::Queued { depth } => {
                println!("✓ Queued for dispatch ({depth} request(s) waiting)");
            }
            ResponseData::Status(status) => println!("{}", format_status(&status)),
            ResponseData::SystemStatus(status) => print_system_status(&status),
        },
        ResponsePayload::Error(err) => anyhow::bail!("Server error: {err}"),
    }

    Ok(())
}

fn print_result(result: &DeliveryResult) -> anyhow::Result<()> {
    if result.success {
        println!("✓ {result}");
        Ok(())
    } else {
        anyhow::bail!("{result}")
    }
}

fn format_status(status: &DeliveryStatus) -> String {
    let mut lines = vec![
        format!("Key:        {}", status.idempotency_key),
        format!("Outcome:    {}", status.last_result),
        format!(
            "At:         {}",
            status.last_result.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        format!("Sweeps:     {}", status.retry_count),
    ];

    if let Some(next) = status.next_retry_at {
        lines.push(format!(
            "Next retry: {}",
            next.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }

    lines.join("\n")
}

fn print_system_status(status: &SystemStatus) {
    println!("=== herald Status ===\n");
    println!("{status}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reports_sweeps_not_attempts() {
        let status = DeliveryStatus {
            idempotency_key: "k1".to_string(),
            last_result: DeliveryResult::success("Primary", "sent"),
            retry_count: 0,
            next_retry_at: None,
        };

        let rendered = format_status(&status);
        assert!(rendered.contains("Sweeps:     0"));
        assert!(!rendered.contains("Attempts"));
        assert!(!rendered.contains("Next retry"));
    }
}
