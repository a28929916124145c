//! FTP-specific error type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised FTP error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpError {
    pub kind: FtpErrorKind,
    pub message: String,
    /// FTP reply code that triggered the error, if any.
    pub code: Option<u16>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FtpErrorKind {
    /// A command that needs a session was issued without one.
    NotConnected,
    /// `connect` while a control connection is already open.
    AlreadyConnected,
    /// TCP / DNS resolution failure.
    ConnectionFailed,
    /// Socket idle timeout or a `421` reply. Always tears the session down.
    Timeout,
    /// Server closed the control connection.
    Disconnected,
    /// Server answered with a 4xx/5xx reply.
    CommandRejected,
    /// Server sent something we cannot interpret (bad code, bad PASV tuple).
    ProtocolError,
    /// Bytes could not be decoded/encoded with the configured encoding.
    DecodeError,
    /// Missing local source, or file/directory mismatch on the local side.
    LocalFilesystem,
    /// Unknown verb or missing arguments.
    InvalidCommand,
    /// Config / parameter validation error.
    InvalidConfig,
    /// Any other local I/O error.
    Io,
}

pub type FtpResult<T> = Result<T, FtpError>;

// ── Construction helpers ─────────────────────────────────────────────

impl FtpError {
    pub fn new(kind: FtpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
        }
    }

    // ── Convenience constructors ─────────────────────────────────

    pub fn not_connected(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::NotConnected, msg)
    }

    pub fn already_connected(host: &str) -> Self {
        Self::new(
            FtpErrorKind::AlreadyConnected,
            format!("Already connected to {}, use close first.", host),
        )
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ConnectionFailed, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Timeout, msg)
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Disconnected, msg)
    }

    /// A failed operation with no reply code behind it
    /// (e.g. "Could not create directory").
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::CommandRejected, msg)
    }

    pub fn protocol_error(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ProtocolError, msg)
    }

    pub fn decode_error(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::DecodeError, msg)
    }

    pub fn local_fs(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::LocalFilesystem, msg)
    }

    pub fn invalid_command(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::InvalidCommand, msg)
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::InvalidConfig, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Io, msg)
    }

    /// Classify a failing reply. `421` is the server telling us the
    /// session is gone, everything else is a rejected command.
    pub fn from_reply(code: u16, text: &str) -> Self {
        let kind = match code {
            421 => FtpErrorKind::Timeout,
            _ => FtpErrorKind::CommandRejected,
        };
        Self {
            kind,
            message: text.to_string(),
            code: Some(code),
        }
    }

    /// Errors after which the control connection can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            FtpErrorKind::Timeout | FtpErrorKind::Disconnected
        )
    }

    /// A server-side refusal the caller has already been told about.
    pub fn is_command_rejected(&self) -> bool {
        self.kind == FtpErrorKind::CommandRejected
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            // Server text already starts with the code.
            FtpErrorKind::CommandRejected | FtpErrorKind::Timeout if self.code.is_some() => {
                write!(f, "{}", self.message.trim_end())
            }
            _ => write!(f, "[FTP {:?}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for FtpError {}

impl From<std::io::Error> for FtpError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => Self::timeout(format!("I/O timeout: {}", e)),
            std::io::ErrorKind::NotFound
            | std::io::ErrorKind::AlreadyExists
            | std::io::ErrorKind::PermissionDenied => Self::local_fs(e.to_string()),
            _ => Self::io_error(e.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for FtpError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("timed out")
    }
}

impl From<FtpError> for String {
    fn from(e: FtpError) -> String {
        e.message
    }
}
