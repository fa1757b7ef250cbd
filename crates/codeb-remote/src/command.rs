//! Typed remote commands
//!
//! Every command is rendered into a single POSIX shell string. Untrusted
//! content never reaches the shell unquoted: arguments are wrapped in single
//! quotes and file contents travel as base64.

use crate::error::{RemoteError, Result};
use base64::Engine;

/// Upper bound for the base64 payload of [`RemoteCommand::WriteFile`].
///
/// The rendered command ends up as one argv entry of `sh -c` on the server,
/// and Linux caps a single argument at 128 KiB.
pub const MAX_INLINE_PAYLOAD: usize = 120 * 1024;

/// A command to run on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Print a file to stdout
    ReadFile { path: String },

    /// Replace a file with the given bytes (tmp file + rename, keeping the
    /// existing file's mode and owner)
    WriteFile { path: String, contents: Vec<u8> },

    /// Run a program with arguments
    Shell { program: String, args: Vec<String> },
}

impl RemoteCommand {
    pub fn read_file(path: impl Into<String>) -> Self {
        Self::ReadFile { path: path.into() }
    }

    pub fn write_file(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self::WriteFile {
            path: path.into(),
            contents: contents.into(),
        }
    }

    pub fn shell(program: impl Into<String>) -> Self {
        Self::Shell {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument (only meaningful for [`RemoteCommand::Shell`])
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        if let Self::Shell { args, .. } = &mut self {
            args.push(arg.into());
        }
        self
    }

    pub fn args<I, S>(mut self, new_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Self::Shell { args, .. } = &mut self {
            args.extend(new_args.into_iter().map(Into::into));
        }
        self
    }

    /// Render the command into the string handed to the remote shell
    pub fn render(&self) -> Result<String> {
        match self {
            Self::ReadFile { path } => {
                validate_path(path)?;
                Ok(format!("cat {}", shell_quote(path)))
            }
            Self::WriteFile { path, contents } => {
                validate_path(path)?;
                let encoded = base64::engine::general_purpose::STANDARD.encode(contents);
                if encoded.len() > MAX_INLINE_PAYLOAD {
                    return Err(RemoteError::PayloadTooLarge {
                        size: encoded.len(),
                        limit: MAX_INLINE_PAYLOAD,
                    });
                }
                let tmp = format!("{}.tmp", path);
                let (path, tmp) = (shell_quote(path), shell_quote(&tmp));
                // tmp inherits the existing file's mode and owner before it is overwritten
                Ok(format!(
                    "{{ [ ! -e {path} ] || cp -p {path} {tmp}; }} && \
                     printf '%s' {} | base64 -d > {tmp} && mv {tmp} {path}",
                    shell_quote(&encoded),
                ))
            }
            Self::Shell { program, args } => {
                if program.trim().is_empty() {
                    return Err(RemoteError::EmptyCommand);
                }
                let mut rendered = shell_quote(program);
                for arg in args {
                    rendered.push(' ');
                    rendered.push_str(&shell_quote(arg));
                }
                Ok(rendered)
            }
        }
    }

    /// Short description for logs (never includes file payloads)
    pub fn describe(&self) -> String {
        match self {
            Self::ReadFile { path } => format!("cat {}", path),
            Self::WriteFile { path, contents } => {
                format!("write {} ({} bytes)", path, contents.len())
            }
            Self::Shell { program, args } => {
                if args.is_empty() {
                    program.clone()
                } else {
                    format!("{} {}", program, args.join(" "))
                }
            }
        }
    }
}

fn validate_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(RemoteError::EmptyCommand);
    }
    if path.contains('\0') || path.contains('\n') {
        return Err(RemoteError::InvalidPath(path.escape_debug().to_string()));
    }
    Ok(())
}

/// Wrap a string in single quotes for POSIX shells
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
