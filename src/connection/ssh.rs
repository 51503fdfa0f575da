//! SSH shell transport built on russh.
//!
//! A thin session wrapper: connect, authenticate (key file, default
//! identities, then password), run commands over exec channels, disconnect.
//! Embedded device shells are single-user and short-lived, so there is no
//! pooling and no pipelining; one channel is opened per command.

use async_trait::async_trait;
use russh::client::{Handle, Handler};
use russh::keys::key::PublicKey;
use russh::keys::load_secret_key;
use russh::ChannelMsg;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use super::{
    CommandResult, ConnectOptions, ConnectionError, ConnectionResult, TargetSpec, Transport,
    TransportFactory,
};

/// Wrapper for russh errors, required by the `Handler` trait contract.
#[derive(Debug)]
pub struct SshHandlerError(pub russh::Error);

impl From<russh::Error> for SshHandlerError {
    fn from(err: russh::Error) -> Self {
        SshHandlerError(err)
    }
}

impl std::fmt::Display for SshHandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SSH error: {}", self.0)
    }
}

impl std::error::Error for SshHandlerError {}

impl From<russh::Error> for ConnectionError {
    fn from(err: russh::Error) -> Self {
        ConnectionError::SshError(err.to_string())
    }
}

/// Client-side session handler.
///
/// Device fleets are provisioned on isolated management networks and
/// frequently reflashed, so unknown host keys are accepted with a warning
/// (the behaviour of `StrictHostKeyChecking=accept-new`).
struct ClientHandler {
    host: String,
}

#[async_trait]
impl Handler for ClientHandler {
    type Error = SshHandlerError;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(host = %self.host, "Accepting server host key");
        Ok(true)
    }
}

/// An SSH session to one device.
pub struct SshTransport {
    identifier: String,
    /// Read lock: channel opens during execute. Write lock: disconnect only.
    handle: Arc<RwLock<Option<Handle<ClientHandler>>>>,
    connected: Arc<AtomicBool>,
}

impl SshTransport {
    /// Connects and authenticates to `host:port`.
    pub async fn connect(
        host: &str,
        port: u16,
        options: &ConnectOptions,
    ) -> ConnectionResult<Self> {
        let user = options.username.as_str();
        debug!(host = %host, port = %port, user = %user, "Connecting via SSH");

        let mut config = russh::client::Config::default();
        config.inactivity_timeout = Some(options.timeout);
        let config = Arc::new(config);

        let addr = format!("{}:{}", host, port);
        let socket = tokio::time::timeout(options.timeout, tokio::net::TcpStream::connect(&addr))
            .await
            .map_err(|_| ConnectionError::Timeout(options.timeout.as_secs()))?
            .map_err(|e| {
                ConnectionError::ConnectionFailed(format!("Failed to connect to {}: {}", addr, e))
            })?;
        socket.set_nodelay(true).map_err(|e| {
            ConnectionError::ConnectionFailed(format!("Failed to set TCP_NODELAY: {}", e))
        })?;

        let handler = ClientHandler {
            host: host.to_string(),
        };
        let mut session = russh::client::connect_stream(config, socket, handler)
            .await
            .map_err(|e| {
                ConnectionError::ConnectionFailed(format!("SSH handshake failed: {}", e))
            })?;

        Self::authenticate(&mut session, user, options).await?;

        let identifier = format!("{}@{}:{}", user, host, port);
        debug!(identifier = %identifier, "SSH connection established");

        Ok(Self {
            identifier,
            handle: Arc::new(RwLock::new(Some(session))),
            connected: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Authentication ladder: explicit key file, default identity files,
    /// then password.
    async fn authenticate(
        session: &mut Handle<ClientHandler>,
        user: &str,
        options: &ConnectOptions,
    ) -> ConnectionResult<()> {
        if let Some(key_file) = &options.key_file {
            let key_path = expand_path(key_file);
            return Self::try_key_auth(session, user, &key_path, options.password.as_deref())
                .await;
        }

        for key_path in default_identity_files() {
            if key_path.exists()
                && Self::try_key_auth(session, user, &key_path, None).await.is_ok()
            {
                debug!(key = %key_path.display(), "Authenticated using default identity");
                return Ok(());
            }
        }

        if let Some(password) = &options.password {
            let authenticated = session
                .authenticate_password(user, password.as_str())
                .await
                .map_err(|e| {
                    ConnectionError::AuthenticationFailed(format!(
                        "Password authentication failed: {}",
                        e
                    ))
                })?;
            if authenticated {
                debug!("Authenticated using password");
                return Ok(());
            }
        }

        Err(ConnectionError::AuthenticationFailed(
            "All authentication methods failed".to_string(),
        ))
    }

    /// Key-based authentication with an optional passphrase.
    async fn try_key_auth(
        session: &mut Handle<ClientHandler>,
        user: &str,
        key_path: &Path,
        passphrase: Option<&str>,
    ) -> ConnectionResult<()> {
        if !key_path.exists() {
            return Err(ConnectionError::AuthenticationFailed(format!(
                "Key file not found: {}",
                key_path.display()
            )));
        }

        let key_pair = load_secret_key(key_path, passphrase).map_err(|e| {
            ConnectionError::AuthenticationFailed(format!(
                "Failed to load key {}: {}",
                key_path.display(),
                e
            ))
        })?;

        let authenticated = session
            .authenticate_publickey(user, Arc::new(key_pair))
            .await
            .map_err(|e| {
                ConnectionError::AuthenticationFailed(format!(
                    "Key authentication failed for {}: {}",
                    key_path.display(),
                    e
                ))
            })?;

        if authenticated {
            debug!(key = %key_path.display(), "Authenticated using key");
            Ok(())
        } else {
            Err(ConnectionError::AuthenticationFailed(
                "Key rejected by server".to_string(),
            ))
        }
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.handle.read().await.is_some()
    }

    async fn execute(&self, command: &str) -> ConnectionResult<CommandResult> {
        trace!(command = %command, "Executing remote command");

        let handle_guard = self.handle.read().await;
        let handle = handle_guard
            .as_ref()
            .ok_or(ConnectionError::ConnectionClosed)?;

        let mut channel = handle.channel_open_session().await.map_err(|e| {
            ConnectionError::ExecutionFailed(format!("Failed to open channel: {}", e))
        })?;
        drop(handle_guard);

        channel.exec(true, command).await.map_err(|e| {
            ConnectionError::ExecutionFailed(format!("Failed to execute command: {}", e))
        })?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => {
                    stdout.extend_from_slice(data);
                }
                ChannelMsg::ExtendedData { ref data, ext } => {
                    // Extended data type 1 is stderr
                    if ext == 1 {
                        stderr.extend_from_slice(data);
                    }
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(exit_status as i32);
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        let exit_code = exit_code.unwrap_or(i32::MAX);
        let stdout = String::from_utf8_lossy(&stdout).to_string();
        let stderr = String::from_utf8_lossy(&stderr).to_string();
        trace!(exit_code = %exit_code, "Command completed");

        if exit_code == 0 {
            Ok(CommandResult::success(stdout, stderr))
        } else {
            Ok(CommandResult::failure(exit_code, stdout, stderr))
        }
    }

    async fn disconnect(&self) -> ConnectionResult<()> {
        self.connected.store(false, Ordering::SeqCst);

        let handle = {
            let mut guard = self.handle.write().await;
            guard.take()
        };

        if let Some(handle) = handle {
            debug!(identifier = %self.identifier, "Closing SSH connection");
            handle
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
                .map_err(|e| ConnectionError::SshError(e.to_string()))?;
        }
        Ok(())
    }
}

/// Default factory: SSH targets connect, serial targets are refused.
#[derive(Debug, Default, Clone)]
pub struct SshTransportFactory;

#[async_trait]
impl TransportFactory for SshTransportFactory {
    async fn open(
        &self,
        target: &str,
        options: &ConnectOptions,
    ) -> ConnectionResult<Box<dyn Transport>> {
        match TargetSpec::parse(target) {
            TargetSpec::Ssh {
                host,
                port,
                username,
            } => {
                // A user embedded in the target wins over the option default.
                let mut options = options.clone();
                if let Some(user) = username {
                    options.username = user;
                }
                let transport = SshTransport::connect(&host, port, &options).await?;
                Ok(Box::new(transport))
            }
            TargetSpec::Serial { port } => {
                warn!(port = %port, "Serial console transport is not built in");
                Err(ConnectionError::UnsupportedTransport(port))
            }
        }
    }
}

/// Expands `~` in a key path.
fn expand_path(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(text.as_ref()).into_owned())
}

/// Identity files tried when no key is configured, in preference order.
fn default_identity_files() -> Vec<PathBuf> {
    let Some(home) = std::env::var_os("HOME") else {
        return Vec::new();
    };
    let ssh_dir = PathBuf::from(home).join(".ssh");
    ["id_ed25519", "id_rsa", "id_ecdsa"]
        .iter()
        .map(|name| ssh_dir.join(name))
        .collect()
}
