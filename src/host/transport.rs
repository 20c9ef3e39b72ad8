//! Remote command channel
//!
//! Abstracts the SSH session for testability:
//! - RemoteShell trait: run one shell command on the server
//! - SshShell: the system `ssh` client with a multiplexed control connection
//! - MockShell (see `mock`): scripted replies for tests

use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use crate::config::{Configuration, ConfigError, Environment, ServerAuth};

/// Runs shell commands on the remote server.
pub trait RemoteShell: Send + Sync {
    /// Run `command` through the remote login shell and return its stdout.
    ///
    /// A non-zero exit status is an error.
    fn run(&self, command: &str) -> Result<String, TransportError>;
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remote command `{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("remote output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// SSH connection settings.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub user: String,
    /// SSH port (default 22)
    pub port: u16,
    pub auth: SshAuth,
    /// Connection timeout in seconds
    pub connect_timeout_seconds: u32,
    /// How long the control master outlives the last command
    pub control_persist_seconds: u32,
}

/// How the session authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum SshAuth {
    /// Private key file
    Key(PathBuf),
    /// Password handed to `sshpass` through its environment
    Password(String),
}

impl std::fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SshAuth::Key(path) => f.debug_tuple("Key").field(path).finish(),
            SshAuth::Password(_) => f.write_str("Password(..)"),
        }
    }
}

impl SshConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>, auth: SshAuth) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: 22,
            auth,
            connect_timeout_seconds: 30,
            control_persist_seconds: 60,
        }
    }

    /// Settings for the configured server.
    pub fn from_config(config: &Configuration, env: &dyn Environment) -> Result<Self, ConfigError> {
        let auth = match config.server.auth(env)? {
            ServerAuth::Key(path) => SshAuth::Key(path),
            ServerAuth::Password(password) => SshAuth::Password(password),
        };
        Ok(Self::new(&config.server.ip, &config.server.user, auth))
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// SSH session backed by the system `ssh` binary.
///
/// All commands of one session share a control master; it is shut down when
/// the session is dropped.
pub struct SshShell {
    config: SshConfig,
    control_path: PathBuf,
}

impl SshShell {
    pub fn new(config: SshConfig) -> Self {
        let control_path = std::env::temp_dir().join(format!("k3s-deploy-{}-%C", std::process::id()));
        Self {
            config,
            control_path,
        }
    }

    /// Options shared by every invocation, up to and including the destination.
    fn build_ssh_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_seconds),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            "ControlMaster=auto".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", self.control_path.display()),
            "-o".to_string(),
            format!("ControlPersist={}", self.config.control_persist_seconds),
            "-p".to_string(),
            self.config.port.to_string(),
        ];

        match &self.config.auth {
            SshAuth::Key(path) => {
                args.push("-o".to_string());
                args.push("BatchMode=yes".to_string());
                args.push("-i".to_string());
                args.push(path.display().to_string());
            }
            SshAuth::Password(_) => {
                args.push("-o".to_string());
                args.push("PreferredAuthentications=password,keyboard-interactive".to_string());
            }
        }

        args.push(self.config.destination());
        args
    }

    fn command(&self) -> Command {
        match &self.config.auth {
            SshAuth::Key(_) => Command::new("ssh"),
            SshAuth::Password(password) => {
                let mut command = Command::new("sshpass");
                command.arg("-e").arg("ssh").env("SSHPASS", password);
                command
            }
        }
    }

    fn program(&self) -> &'static str {
        match self.config.auth {
            SshAuth::Key(_) => "ssh",
            SshAuth::Password(_) => "sshpass",
        }
    }
}

impl RemoteShell for SshShell {
    fn run(&self, command: &str) -> Result<String, TransportError> {
        tracing::debug!(host = %self.config.host, command = %command, "remote command");

        let output: Output = self
            .command()
            .args(self.build_ssh_args())
            .arg("--")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| TransportError::Spawn {
                program: self.program().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(TransportError::CommandFailed {
                command: first_line(command),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8(output.stdout)?)
    }
}

impl Drop for SshShell {
    fn drop(&mut self) {
        let result = Command::new("ssh")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .arg("-O")
            .arg("exit")
            .arg(self.config.destination())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = result {
            tracing::debug!(error = %e, "failed to close ssh control master");
        }
    }
}

/// First line of a command, for error messages about heredoc commands.
fn first_line(command: &str) -> String {
    match command.split_once('\n') {
        Some((first, _)) => format!("{} ...", first),
        None => command.to_string(),
    }
}
