//! FTP client engine (RFC 959 subset).
//!
//! Architecture:
//! - `types` — config, session info, reply and transfer data structures
//! - `error` — FTP-specific error type
//! - `encoding` — control-channel text encoding
//! - `protocol` — reply framer + command/response codec
//! - `connection` — TCP control connection establishment
//! - `client` — session state machine and control-channel commands
//! - `transfer` — data channel negotiation (PASV / PORT)
//! - `directory` — ls, cd, mkdir, size, NLST
//! - `file_ops` — get/send for files and directory trees
//! - `progress` — transfer progress snapshots and observers
//! - `commands` — verb → handler dispatch used by the shell

pub mod types;
pub mod error;
pub mod encoding;
pub mod protocol;
pub mod connection;
pub mod client;
pub mod transfer;
pub mod directory;
pub mod file_ops;
pub mod progress;
pub mod commands;

pub use types::*;
pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use client::FtpClient;
