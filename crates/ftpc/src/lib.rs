//! # ftpc
//!
//! FTP client protocol engine. Keeps a control-channel session with a
//! remote server, negotiates a passive or active data channel per transfer,
//! frames multi-line replies, and drives single-file and recursive
//! directory `get`/`send` transfers.
//!
//! The interactive shell is not part of this crate; it talks to the engine
//! through [`ftp::commands::dispatch`] or directly through [`FtpClient`].

pub mod ftp;

pub use ftp::client::FtpClient;
pub use ftp::commands::{dispatch, FtpCommand, FtpCommandHandler};
pub use ftp::error::{FtpError, FtpErrorKind, FtpResult};
pub use ftp::types::*;
