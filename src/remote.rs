//! Remote command execution over SSH.
//!
//! The scan pipeline sees two capabilities:
//!
//! - [`RemoteConnector`] opens an authenticated transport to the jump host.
//! - [`RemoteExecutor`] runs one shell command and returns its stdout.
//!
//! Every [`RemoteExecutor::execute`] call opens a fresh session channel,
//! runs exactly one command, and closes the channel. Channels are never
//! reused or pooled.
//!
//! Host keys are **not verified**. The jump host is an internal machine and
//! the connector accepts whatever key it presents; a warning is logged on
//! every connect so operators know.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::JumpHostConfig;
use crate::error::RemoteError;

/// Opens authenticated remote transports.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RemoteExecutor>, RemoteError>;
}

/// Runs commands on an open transport, one session per command.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` and return its stdout.
    ///
    /// A non-zero exit status yields [`RemoteError::CommandFailed`] and a
    /// terminating signal [`RemoteError::Killed`], each carrying whatever
    /// stdout was produced before the failure.
    async fn execute(&self, command: &str) -> Result<String, RemoteError>;

    /// Tear down the transport. Idempotent.
    async fn close(&self);
}

/// Quote `value` for a POSIX shell using single quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Join a listed directory (`./a/b`, `.`) onto the scan root.
pub fn join_remote(root: &str, directory: &str) -> String {
    let root = if root.len() > 1 {
        root.trim_end_matches('/')
    } else {
        root
    };
    let rest = directory
        .strip_prefix("./")
        .unwrap_or(directory)
        .trim_matches('/');
    if rest.is_empty() || rest == "." {
        root.to_string()
    } else if root.ends_with('/') {
        format!("{}{}", root, rest)
    } else {
        format!("{}/{}", root, rest)
    }
}

/// Command that prints the contents of `file` inside `directory`.
pub fn read_command(root: &str, directory: &str, file: &str) -> String {
    let path = format!("{}/{}", join_remote(root, directory).trim_end_matches('/'), file);
    format!("cat {}", shell_quote(&path))
}

/// SSH client handler that accepts any server key.
struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Password-authenticated SSH connector for the jump host.
pub struct SshConnector {
    host: String,
    port: u16,
    username: String,
    password: String,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SshConnector {
    pub fn new(jump: &JumpHostConfig, connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            host: jump.host.clone(),
            port: jump.port,
            username: jump.username.clone(),
            password: jump.password.clone(),
            connect_timeout,
            command_timeout,
        }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteExecutor>, RemoteError> {
        let addr = self.addr();
        warn!(addr = %addr, "Host key verification is disabled for the jump host");

        let config = Arc::new(client::Config::default());
        let connect = client::connect(
            config,
            (self.host.as_str(), self.port),
            AcceptAnyHostKey,
        );
        let mut handle = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| RemoteError::Timeout(self.connect_timeout))?
            .map_err(|e| RemoteError::Connect {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        let authenticated = tokio::time::timeout(
            self.connect_timeout,
            handle.authenticate_password(self.username.as_str(), self.password.as_str()),
        )
        .await
        .map_err(|_| RemoteError::Timeout(self.connect_timeout))?
        .map_err(|e| RemoteError::Connect {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;
        if !authenticated {
            return Err(RemoteError::AuthRejected(self.username.clone()));
        }

        debug!(addr = %addr, user = %self.username, "SSH session established");
        Ok(Box::new(SshExecutor {
            handle: Mutex::new(Some(handle)),
            command_timeout: self.command_timeout,
        }))
    }
}

/// An authenticated SSH transport. Each command gets its own channel.
pub struct SshExecutor {
    handle: Mutex<Option<Handle<AcceptAnyHostKey>>>,
    command_timeout: Duration,
}

impl SshExecutor {
    async fn run(&self, command: &str) -> Result<String, RemoteError> {
        let guard = self.handle.lock().await;
        let handle = guard.as_ref().ok_or(RemoteError::Closed)?;

        let mut channel = handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut stdout = Vec::new();
        let mut exit = CommandExit::default();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => exit.status = Some(exit_status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    exit.signal = Some(format!("{signal_name:?}"))
                }
                _ => {}
            }
        }
        drop(guard);

        exit.into_result(String::from_utf8_lossy(&stdout).into_owned())
    }
}

/// How a remote command ended, as reported on its channel.
#[derive(Debug, Default)]
struct CommandExit {
    status: Option<u32>,
    signal: Option<String>,
}

impl CommandExit {
    fn into_result(self, output: String) -> Result<String, RemoteError> {
        if let Some(signal) = self.signal {
            return Err(RemoteError::Killed { signal, output });
        }
        match self.status {
            Some(0) | None => Ok(output),
            Some(status) => Err(RemoteError::CommandFailed { status, output }),
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, command: &str) -> Result<String, RemoteError> {
        debug!(command = %command, "Executing remote command");
        tokio::time::timeout(self.command_timeout, self.run(command))
            .await
            .map_err(|_| RemoteError::Timeout(self.command_timeout))?
    }

    async fn close(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
            {
                debug!(error = %e, "SSH disconnect failed");
            }
        }
    }
}
