//! Transport layer for device communication.
//!
//! Everything above this module talks to devices through the [`Transport`]
//! trait: a connected shell session that executes commands and reads UCI
//! package dumps. The shipped implementation is SSH ([`ssh::SshTransport`]);
//! a serial-console session satisfies the same contract but is provided
//! externally, so serial targets are recognised but reported as unsupported.

/// SSH shell transport built on russh.
pub mod ssh;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub use ssh::{SshTransport, SshTransportFactory};

/// Errors that can occur during transport operations.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to establish the initial connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication was rejected by the device.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Command execution failed (not a non-zero exit code, but a transport
    /// level failure).
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// Connection or operation timed out.
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// Connection was closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No transport implementation is available for the target.
    #[error("Unsupported transport for target '{0}'")]
    UnsupportedTransport(String),

    /// SSH-specific error from the underlying implementation.
    #[error("SSH error: {0}")]
    SshError(String),

    /// I/O error during connection operations.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for transport operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// The result of executing a command over a transport.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code of the command (0 typically indicates success).
    pub exit_code: i32,
    /// Content written to standard output.
    pub stdout: String,
    /// Content written to standard error.
    pub stderr: String,
    /// Convenience flag: `true` if `exit_code == 0`.
    pub success: bool,
}

impl CommandResult {
    /// Create a new successful command result
    pub fn success(stdout: String, stderr: String) -> Self {
        Self {
            exit_code: 0,
            stdout,
            stderr,
            success: true,
        }
    }

    /// Create a new failed command result
    pub fn failure(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            success: false,
        }
    }

    /// Get the combined output (stdout + stderr)
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// A connected shell session on a device.
///
/// The contract is synchronous from the pipeline's point of view: each
/// `execute` resolves only once the remote shell has returned. Bounded
/// parallelism is achieved by running workers, never by pipelining inside
/// one session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identifier for logging (host, user@host:port, device path).
    fn identifier(&self) -> &str;

    /// Whether the session is still usable.
    async fn is_open(&self) -> bool;

    /// Executes a command and waits for the remote shell to finish it.
    async fn execute(&self, command: &str) -> ConnectionResult<CommandResult>;

    /// Reads one UCI package dump, parsable by [`crate::uci::parser`].
    async fn get_uci_config(&self, package: &str) -> ConnectionResult<String> {
        let result = self.execute(&format!("uci export {}", package)).await?;
        if result.success {
            Ok(result.stdout)
        } else {
            Err(ConnectionError::ExecutionFailed(format!(
                "uci export {} exited {}: {}",
                package,
                result.exit_code,
                result.stderr.trim()
            )))
        }
    }

    /// Closes the session. Safe to call more than once.
    async fn disconnect(&self) -> ConnectionResult<()>;
}

/// Credentials and limits for opening a transport.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Login username.
    pub username: String,
    /// Login password (SSH password auth or serial login).
    pub password: Option<String>,
    /// SSH private key file.
    pub key_file: Option<PathBuf>,
    /// Connect timeout.
    pub timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            username: "root".to_string(),
            password: None,
            key_file: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A parsed connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// Network shell target.
    Ssh {
        /// Hostname or address.
        host: String,
        /// TCP port.
        port: u16,
        /// Username from a `user@host` form, if given.
        username: Option<String>,
    },
    /// Serial console target (`/dev/tty*`, `COM*`).
    Serial {
        /// Device path.
        port: String,
    },
}

impl TargetSpec {
    /// Parses a target string.
    ///
    /// Supported forms: `host`, `host:port`, `user@host[:port]`,
    /// `[v6addr]:port`, and serial device paths (`/dev/ttyUSB0`, `COM3`).
    pub fn parse(target: &str) -> Self {
        if target.starts_with("/dev/") || target.to_ascii_uppercase().starts_with("COM") {
            return TargetSpec::Serial {
                port: target.to_string(),
            };
        }

        let (username, rest) = match target.split_once('@') {
            Some((user, rest)) => (Some(user.to_string()), rest),
            None => (None, target),
        };

        // IPv6 literals come bracketed: [::1] or [::1]:2222.
        if let Some(stripped) = rest.strip_prefix('[') {
            if let Some((host, after)) = stripped.split_once(']') {
                let port = after
                    .strip_prefix(':')
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(22);
                return TargetSpec::Ssh {
                    host: host.to_string(),
                    port,
                    username,
                };
            }
        }

        match rest.rsplit_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => TargetSpec::Ssh {
                    host: host.to_string(),
                    port,
                    username,
                },
                // Not a valid port, treat the whole thing as a hostname.
                Err(_) => TargetSpec::Ssh {
                    host: rest.to_string(),
                    port: 22,
                    username,
                },
            },
            None => TargetSpec::Ssh {
                host: rest.to_string(),
                port: 22,
                username,
            },
        }
    }
}

/// Opens transports from target strings.
///
/// The fleet executor and the CLI go through a factory so tests can inject
/// scripted sessions without a network.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Opens a connected transport for the target.
    async fn open(
        &self,
        target: &str,
        options: &ConnectOptions,
    ) -> ConnectionResult<Box<dyn Transport>>;
}
