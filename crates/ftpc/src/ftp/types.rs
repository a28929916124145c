//! Shared types for the FTP crate.

use crate::ftp::encoding::TextEncoding;
use crate::ftp::error::{FtpError, FtpResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ─── Configuration ───────────────────────────────────────────────────

/// How the data channel is established for each transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DataChannelMode {
    /// Client connects to the endpoint the server advertises via `PASV`.
    Passive,
    /// Server connects back to a listener advertised via `PORT`.
    Active,
}

impl Default for DataChannelMode {
    fn default() -> Self {
        Self::Passive
    }
}

/// Client configuration, fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpConfig {
    /// Use `PORT` instead of `PASV`.
    #[serde(default)]
    pub active_mode: bool,
    /// Surface server preliminary replies at info level.
    #[serde(default)]
    pub debug: bool,
    /// Control-channel text encoding.
    #[serde(default)]
    pub encoding: TextEncoding,
    /// Idle timeout applied to every socket operation, in milliseconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,
}

fn default_idle_timeout() -> u64 {
    10_000
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            active_mode: false,
            debug: false,
            encoding: TextEncoding::Utf8,
            idle_timeout_ms: default_idle_timeout(),
        }
    }
}

impl FtpConfig {
    /// Load a config from JSON, filling omitted fields with defaults.
    pub fn from_json(json: &str) -> FtpResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| FtpError::invalid_config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FtpResult<()> {
        if self.idle_timeout_ms == 0 {
            return Err(FtpError::invalid_config("idle timeout must be positive"));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn data_channel_mode(&self) -> DataChannelMode {
        if self.active_mode {
            DataChannelMode::Active
        } else {
            DataChannelMode::Passive
        }
    }
}

// ─── Session ─────────────────────────────────────────────────────────

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Disconnected,
    Connected,
    Authenticated,
}

/// Snapshot of the current session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpSessionInfo {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub status: SessionStatus,
    pub server_banner: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
}

impl Default for FtpSessionInfo {
    fn default() -> Self {
        Self {
            host: None,
            port: 21,
            username: None,
            status: SessionStatus::Disconnected,
            server_banner: None,
            connected_at: None,
            last_activity: None,
            bytes_uploaded: 0,
            bytes_downloaded: 0,
        }
    }
}

// ─── Transfer ────────────────────────────────────────────────────────

/// Direction of a file transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferDirection {
    /// Download (`RETR`).
    Get,
    /// Upload (`STOR`).
    Send,
}

/// Current state of a transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferState {
    InProgress,
    Completed,
    Failed,
}

/// One unit of work for the transfer engine. Directory tasks expand into
/// one child task per entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTask {
    pub direction: TransferDirection,
    pub remote_path: String,
    pub local_path: PathBuf,
    pub total_bytes: Option<u64>,
    pub is_directory: bool,
}

impl TransferTask {
    pub fn child(&self, remote_name: &str, local_name: &str, is_directory: bool) -> Self {
        Self {
            direction: self.direction,
            remote_path: remote_name.to_string(),
            local_path: self.local_path.join(local_name),
            total_bytes: None,
            is_directory,
        }
    }
}

/// Live progress snapshot for a single transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub transfer_id: String,
    pub direction: TransferDirection,
    pub local_path: String,
    pub remote_path: String,
    pub total_bytes: Option<u64>,
    pub transferred_bytes: u64,
    pub speed_bps: u64,
    pub eta_seconds: Option<u32>,
    pub percent: f32,
    pub state: TransferState,
}

// ─── FTP Response ────────────────────────────────────────────────────

/// A single FTP reply (may be multi-line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpResponse {
    pub code: u16,
    /// Decoded lines without their line terminators.
    pub lines: Vec<String>,
    /// The reply exactly as received, terminators included.
    pub raw: String,
}

impl FtpResponse {
    /// Full response text (all lines joined).
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// First digit 4 or 5.
    pub fn is_failure(&self) -> bool {
        (400..600).contains(&self.code)
    }

    /// Permanent negative completion (5xx).
    pub fn is_permanent_failure(&self) -> bool {
        (500..600).contains(&self.code)
    }

    /// Whether this is a positive-preliminary reply (1xx).
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// Whether this is a positive-completion reply (2xx).
    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Turn a 4xx/5xx reply into an error, pass anything else through.
    pub fn into_result(self) -> FtpResult<Self> {
        if self.is_failure() {
            Err(FtpError::from_reply(self.code, &self.raw))
        } else {
            Ok(self)
        }
    }
}
