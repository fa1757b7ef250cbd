//! Remote command execution for CodeB
//!
//! This crate runs single shell commands on the CodeB server and returns
//! their exit status and captured output.
//!
//! # Transports
//!
//! - **ssh**: `ssh user@host '<command>'` with connect timeout and host key policy
//! - **local**: `sh -c '<command>'` when running on the server itself
//!
//! Commands are built as [`RemoteCommand`] values instead of raw strings.
//! Arguments are single-quote escaped and file payloads are shipped as
//! base64, so arbitrary bytes (quotes, newlines, Korean text) survive the
//! shell round trip.
//!
//! No retries are performed here; retry policy belongs to the caller.
//!
//! # Example
//!
//! ```ignore
//! use codeb_remote::{RemoteCommand, RemoteExecutor, SshExecutor, SshTarget};
//! use std::time::Duration;
//!
//! let executor = SshExecutor::new(SshTarget::new("141.164.60.51", "root"));
//! let output = executor
//!     .execute(&RemoteCommand::read_file("/opt/codeb/registry.json"), Duration::from_secs(30), false)
//!     .await?;
//! println!("{}", output.stdout);
//! ```

pub mod command;
pub mod error;
pub mod executor;

pub use command::{MAX_INLINE_PAYLOAD, RemoteCommand, shell_quote};
pub use error::{RemoteError, Result};
pub use executor::{
    DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, ExecOutput, HostKeyPolicy, LocalExecutor,
    RemoteExecutor, SshExecutor, SshTarget,
};
