use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use herald_common::{
    Signal,
    audit::{self, AuditConfig},
    internal, logging,
};
use herald_control::{ControlServer, DEFAULT_CONTROL_SOCKET};
use herald_delivery::DeliveryProcessor;
use herald_tracing::traced;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::control_handler::HeraldControlHandler;

/// Top-level configuration, loaded from `herald.config.ron`
#[derive(Debug, Default, Deserialize)]
pub struct Herald {
    /// The dispatch engine
    #[serde(alias = "dispatch", default)]
    delivery: DeliveryProcessor,
    #[serde(default)]
    control: ControlConfig,
    #[serde(default)]
    audit: AuditConfig,
}

/// Control socket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// Path of the Unix domain socket
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

fn default_socket_path() -> String {
    DEFAULT_CONTROL_SOCKET.to_string()
}

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "HERALD_CONFIG";

/// Searched in order when `HERALD_CONFIG` is unset
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["./herald.config.ron", "/etc/herald/herald.config.ron"];

/// Pick the configuration file: an explicit path wins, otherwise the first
/// default location that exists
fn locate_config(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
    {
        return Ok(path);
    }

    let paths_tried = DEFAULT_CONFIG_PATHS
        .iter()
        .map(|p| format!("  - {p}"))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[traced(instrument(level = tracing::Level::TRACE))]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

impl Herald {
    /// Load the configuration from `HERALD_CONFIG`, `./herald.config.ron`
    /// or `/etc/herald/herald.config.ron`, in that order
    ///
    /// # Errors
    ///
    /// Returns an error if no configuration file is found, or it cannot be
    /// read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        let path = locate_config(std::env::var_os(CONFIG_ENV).map(PathBuf::from))?;
        Self::from_path(&path)
    }

    /// Load the configuration from a RON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid
    /// configuration.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {e}", path.display())
        })?;

        ron::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config in {}: {e}", path.display()))
    }

    pub const fn delivery(&self) -> &DeliveryProcessor {
        &self.delivery
    }

    pub const fn control(&self) -> &ControlConfig {
        &self.control
    }

    /// Run the dispatch engine and the control socket until shutdown
    ///
    /// # Errors
    ///
    /// This function will return an error if the engine cannot be
    /// initialised from its configuration, or the control socket cannot be
    /// bound.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, err), timing(precision = "s"))]
    pub async fn run(mut self) -> anyhow::Result<()> {
        logging::init();
        audit::init(self.audit.clone());

        self.delivery.init()?;
        let delivery = Arc::new(self.delivery);

        let handler = Arc::new(HeraldControlHandler::new(delivery.clone()));
        let control = ControlServer::new(self.control.socket_path, handler)?;

        internal!(level = INFO, "Controller running, control socket at {}", control.socket_path());

        let services = async {
            tokio::try_join!(
                async {
                    delivery
                        .serve(SHUTDOWN_BROADCAST.subscribe())
                        .await
                        .map_err(anyhow::Error::from)
                },
                async {
                    control
                        .serve(SHUTDOWN_BROADCAST.subscribe())
                        .await
                        .map_err(anyhow::Error::from)
                },
            )
            .map(|_| ())
        };

        let ret = tokio::select! {
            r = services => {
                r
            }
            r = shutdown() => {
                r
            }
        };

        internal!("Shutting down...");

        ret
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_config() {
        let herald: Herald = ron::from_str("()").unwrap();

        assert_eq!(herald.control().socket_path, DEFAULT_CONTROL_SOCKET);
        assert_eq!(herald.delivery().retry.max_retries, 3);
        assert!(herald.delivery().providers.is_empty());
        assert!(herald.audit.enabled);
    }

    #[test]
    fn test_sample_config_parses() {
        let herald: Herald =
            ron::from_str(include_str!("../../herald.config.ron")).unwrap();

        assert_eq!(herald.delivery().providers.len(), 3);
        assert_eq!(herald.delivery().rate_limit_delay_ms, 1000);
        assert_eq!(herald.control().socket_path, "/tmp/herald.sock");
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"(control: (socket_path: "/run/herald/control.sock"))"#,
        )
        .unwrap();

        let path = locate_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(path, file.path());

        let herald = Herald::from_path(&path).unwrap();
        assert_eq!(herald.control().socket_path, "/run/herald/control.sock");
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("absent.ron");

        let error = locate_config(Some(missing)).unwrap_err();
        assert!(error
            .to_string()
            .starts_with("HERALD_CONFIG points to non-existent file"));
    }

    #[test]
    fn test_invalid_config_names_the_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "(delivery: (providers: 7))").unwrap();

        let error = Herald::from_path(file.path()).unwrap_err();
        assert!(error.to_string().starts_with("Invalid config in "));
    }
}
