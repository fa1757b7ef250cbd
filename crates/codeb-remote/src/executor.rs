//! Command executors
//!
//! [`SshExecutor`] runs commands on the CodeB server through the `ssh` CLI,
//! [`LocalExecutor`] runs them through `sh -c` on the current machine.

use crate::command::RemoteCommand;
use crate::error::{RemoteError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::process::Command;

/// ssh `ConnectTimeout`
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall timeout for a single command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// ssh exits with 255 when the connection itself fails
const SSH_TRANSPORT_EXIT_CODE: i32 = 255;

/// Result of a command execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub succeeded: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    fn from_error(err: &RemoteError) -> Self {
        Self {
            succeeded: false,
            exit_code: None,
            stdout: String::new(),
            stderr: err.to_string(),
        }
    }
}

/// Executes [`RemoteCommand`]s against one host
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Human readable target (e.g. `root@141.164.60.51`)
    fn target(&self) -> &str;

    /// Build the local process that runs `script` on the target
    fn process(&self, script: &str) -> Command;

    /// Whether a non-zero exit code means the transport failed
    fn is_transport_exit(&self, _exit_code: Option<i32>) -> bool {
        false
    }

    /// Run a command and capture its output.
    ///
    /// With `ignore_failure = false` a non-zero exit status or a transport
    /// failure is returned as an error carrying stderr. With
    /// `ignore_failure = true` the same conditions come back as
    /// `succeeded: false`. An empty or unrenderable command is always an error.
    async fn execute(
        &self,
        command: &RemoteCommand,
        timeout: Duration,
        ignore_failure: bool,
    ) -> Result<ExecOutput> {
        let script = command.render()?;
        tracing::debug!("Running on {}: {}", self.target(), command.describe());

        let mut process = self.process(&script);
        process
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let program = process.as_std().get_program().to_string_lossy().to_string();

        let output = match tokio::time::timeout(timeout, process.output()).await {
            Err(_) => Err(RemoteError::Timeout {
                target: self.target().to_string(),
                after: timeout,
            }),
            Ok(Err(source)) => Err(RemoteError::Spawn { program, source }),
            Ok(Ok(output)) => Ok(output),
        };

        let output = match output {
            Ok(output) => output,
            Err(err) if ignore_failure => {
                tracing::debug!("Ignoring failure on {}: {}", self.target(), err);
                return Ok(ExecOutput::from_error(&err));
            }
            Err(err) => return Err(err),
        };

        let result = ExecOutput {
            succeeded: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };

        if result.succeeded || ignore_failure {
            return Ok(result);
        }

        if self.is_transport_exit(result.exit_code) {
            Err(RemoteError::Transport {
                target: self.target().to_string(),
                stderr: result.stderr,
            })
        } else {
            Err(RemoteError::CommandFailed {
                exit_code: result.exit_code,
                stderr: result.stderr,
            })
        }
    }
}

/// ssh `StrictHostKeyChecking` policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Only known hosts
    Strict,
    /// Trust on first use, reject changed keys
    #[default]
    AcceptNew,
    /// No host key verification
    Off,
}

impl HostKeyPolicy {
    fn ssh_value(self) -> &'static str {
        match self {
            HostKeyPolicy::Strict => "yes",
            HostKeyPolicy::AcceptNew => "accept-new",
            HostKeyPolicy::Off => "no",
        }
    }
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKeyPolicy::Strict => write!(f, "strict"),
            HostKeyPolicy::AcceptNew => write!(f, "accept-new"),
            HostKeyPolicy::Off => write!(f, "off"),
        }
    }
}

impl FromStr for HostKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "yes" => Ok(HostKeyPolicy::Strict),
            "accept-new" => Ok(HostKeyPolicy::AcceptNew),
            "off" | "no" => Ok(HostKeyPolicy::Off),
            other => Err(format!("unknown host key policy: {}", other)),
        }
    }
}

/// ssh connection target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
}

impl SshTarget {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: None,
            identity_file: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Runs commands over ssh
pub struct SshExecutor {
    target: SshTarget,
    destination: String,
    connect_timeout: Duration,
    host_key_policy: HostKeyPolicy,
}

impl SshExecutor {
    pub fn new(target: SshTarget) -> Self {
        let destination = target.destination();
        Self {
            target,
            destination,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            host_key_policy: HostKeyPolicy::default(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout.min(DEFAULT_CONNECT_TIMEOUT);
        self
    }

    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    fn target(&self) -> &str {
        &self.destination
    }

    fn process(&self, script: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.connect_timeout.as_secs().max(1)
            ))
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!(
                "StrictHostKeyChecking={}",
                self.host_key_policy.ssh_value()
            ));

        if let Some(port) = self.target.port {
            cmd.arg("-p").arg(port.to_string());
        }
        if let Some(identity) = &self.target.identity_file {
            cmd.arg("-i").arg(identity);
        }

        cmd.arg(&self.destination).arg(script);
        cmd
    }

    fn is_transport_exit(&self, exit_code: Option<i32>) -> bool {
        exit_code == Some(SSH_TRANSPORT_EXIT_CODE)
    }
}

/// Runs commands with the local `sh`
pub struct LocalExecutor {
    shell: String,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    fn target(&self) -> &str {
        "local"
    }

    fn process(&self, script: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(script);
        cmd
    }
}
