//! Stateful FTP client — owns the control connection and issues commands.
//!
//! Lifecycle: `Disconnected --connect()--> Connected --login()--> Authenticated`.
//! A timeout, a `421`, an EOF on the control socket, `close()` or `exit()`
//! all return the session to `Disconnected`; the caller has to `reconnect()`
//! before issuing further commands.
//!
//! The client exposes the control-channel helpers used by `directory.rs`
//! and `file_ops.rs` for higher-level operations.

use crate::ftp::connection;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::progress::{NoopObserver, TransferObserver};
use crate::ftp::protocol::FtpCodec;
use crate::ftp::transfer;
use crate::ftp::types::*;
use chrono::Utc;
use std::time::Duration;
use tokio::net::TcpStream;

/// Credentials kept after a successful login so `reconnect()` can replay it.
#[derive(Clone)]
struct Credentials {
    username: String,
    password: String,
}

/// An FTP client session.
pub struct FtpClient {
    config: FtpConfig,
    codec: Option<FtpCodec>,
    info: FtpSessionInfo,
    credentials: Option<Credentials>,
    pub(crate) observer: Box<dyn TransferObserver>,
    last_preliminary: Option<FtpResponse>,
    exit_requested: bool,
}

impl FtpClient {
    pub fn new(config: FtpConfig) -> Self {
        Self {
            config,
            codec: None,
            info: FtpSessionInfo::default(),
            credentials: None,
            observer: Box::new(NoopObserver),
            last_preliminary: None,
            exit_requested: false,
        }
    }

    /// Replace the progress observer fed by `get`/`send`.
    pub fn with_observer(mut self, observer: impl TransferObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn set_observer(&mut self, observer: impl TransferObserver + 'static) {
        self.observer = Box::new(observer);
    }

    // ─── State ───────────────────────────────────────────────────

    pub fn config(&self) -> &FtpConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        self.info.status
    }

    pub fn is_connected(&self) -> bool {
        self.codec.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.info.status == SessionStatus::Authenticated
    }

    pub fn info(&self) -> &FtpSessionInfo {
        &self.info
    }

    /// Set once `exit()` ran; the shell stops its loop on it.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Preliminary reply (usually `150`) of the most recent transfer command.
    pub fn last_preliminary(&self) -> Option<&FtpResponse> {
        self.last_preliminary.as_ref()
    }

    pub(crate) fn data_timeout(&self) -> Duration {
        self.config.idle_timeout()
    }

    // ─── Connect / disconnect ────────────────────────────────────

    /// Open the control connection and return the server banner.
    pub async fn connect(&mut self, host: &str, port: u16) -> FtpResult<FtpResponse> {
        if self.codec.is_some() {
            let current = self.info.host.clone().unwrap_or_default();
            return Err(FtpError::already_connected(&current));
        }

        log::info!("FTP connecting to {}:{}", host, port);
        let (codec, banner) = connection::connect(host, port, &self.config).await?;
        if banner.code == 421 {
            log::warn!("FTP server {} refused the session: {}", host, banner.raw.trim_end());
            return Err(FtpError::from_reply(banner.code, &banner.raw));
        }

        self.codec = Some(codec);
        self.info.host = Some(host.to_string());
        self.info.port = port;
        self.info.status = SessionStatus::Connected;
        self.info.server_banner = Some(banner.text());
        self.info.connected_at = Some(Utc::now());
        self.touch();
        Ok(banner)
    }

    /// Close the control socket without saying goodbye.
    pub async fn disconnect(&mut self) {
        if let Some(mut codec) = self.codec.take() {
            codec.shutdown().await;
            log::info!(
                "FTP session to {} closed",
                self.info.host.as_deref().unwrap_or("?")
            );
        }
        self.info.status = SessionStatus::Disconnected;
    }

    /// Tear the session down after a timeout / `421` / EOF.
    fn drop_connection(&mut self, reason: &FtpError) {
        if self.codec.take().is_some() {
            log::warn!(
                "FTP session to {} lost: {}",
                self.info.host.as_deref().unwrap_or("?"),
                reason
            );
        }
        self.info.status = SessionStatus::Disconnected;
    }

    /// Apply session side effects of a control-channel result.
    pub(crate) fn settle<T>(&mut self, result: FtpResult<T>) -> FtpResult<T> {
        match &result {
            Ok(_) => self.touch(),
            Err(e) if e.is_fatal() => self.drop_connection(e),
            Err(_) => {}
        }
        result
    }

    /// Same as `settle` for an error that is already in hand.
    pub(crate) fn note_error(&mut self, err: FtpError) -> FtpError {
        if err.is_fatal() {
            self.drop_connection(&err);
        }
        err
    }

    // ─── Control channel ─────────────────────────────────────────

    pub(crate) fn codec_mut(&mut self) -> FtpResult<&mut FtpCodec> {
        self.codec
            .as_mut()
            .ok_or_else(|| FtpError::not_connected("Not connected."))
    }

    /// Send `VERB arg1 arg2` and return the server's reply uninterpreted.
    ///
    /// A `421` reply or a socket timeout disconnects the session and fails
    /// with a timeout error.
    pub async fn send_command(&mut self, verb: &str, args: &[&str]) -> FtpResult<FtpResponse> {
        let line = command_line(verb, args);
        let result = self.codec_mut()?.command(&line).await;
        self.settle(result)
    }

    /// Read one more reply from the control channel (e.g. the `226`
    /// following a transfer).
    pub async fn read_reply(&mut self) -> FtpResult<FtpResponse> {
        let result = self.codec_mut()?.read_reply().await;
        self.settle(result)
    }

    // ─── Authentication ──────────────────────────────────────────

    /// `USER` + `PASS`. Credentials are cached only when this succeeds.
    pub async fn login(&mut self, username: &str, password: &str) -> FtpResult<FtpResponse> {
        let user_resp = self.send_command("USER", &[username]).await?;
        // A 2xx to USER means no password is needed.
        let final_resp = if user_resp.is_completion() {
            user_resp
        } else if user_resp.is_failure() {
            return Err(FtpError::from_reply(user_resp.code, &user_resp.raw));
        } else {
            let pass_resp = self.send_command("PASS", &[password]).await?;
            if pass_resp.is_failure() {
                log::info!("FTP login as {} rejected", username);
                return Err(FtpError::from_reply(pass_resp.code, &pass_resp.raw));
            }
            pass_resp
        };

        self.credentials = Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });
        self.info.username = Some(username.to_string());
        self.info.status = SessionStatus::Authenticated;
        log::info!("FTP logged in as {}", username);
        Ok(final_resp)
    }

    /// Drop the current connection (if any) and log in again with the
    /// cached host, port and credentials.
    pub async fn reconnect(&mut self) -> FtpResult<FtpResponse> {
        let creds = self
            .credentials
            .clone()
            .ok_or_else(|| FtpError::not_connected("No previous login to reconnect with."))?;
        let host = self
            .info
            .host
            .clone()
            .ok_or_else(|| FtpError::not_connected("No previous host to reconnect to."))?;
        let port = self.info.port;

        self.disconnect().await;
        let banner = self.connect(&host, port).await?;
        log::info!("{}", banner.raw.trim_end());
        self.login(&creds.username, &creds.password).await
    }

    // ─── Termination ─────────────────────────────────────────────

    /// `QUIT` and drop the connection. `None` when there was nothing to close.
    pub async fn close(&mut self) -> FtpResult<Option<FtpResponse>> {
        if self.codec.is_none() {
            return Ok(None);
        }
        let result = self.send_command("QUIT", &[]).await;
        self.disconnect().await;
        result.map(Some)
    }

    /// Close if connected and mark the client as done, even on failure.
    pub async fn exit(&mut self) -> FtpResult<Option<FtpResponse>> {
        let result = self.close().await;
        self.exit_requested = true;
        result
    }

    /// Best-effort shutdown for an interactive interrupt.
    pub async fn interrupt(&mut self) {
        if let Err(e) = self.exit().await {
            log::debug!("QUIT during interrupt failed: {}", e);
        }
        self.disconnect().await;
    }

    // ─── Data channel helper ─────────────────────────────────────

    /// Negotiate a data channel, send the transfer command and return the
    /// connected data socket.
    ///
    /// In active mode the listener exists before `PORT` is sent and the
    /// accept happens after the command's preliminary reply.
    pub async fn prepare_data_transfer(&mut self, verb: &str, args: &[&str]) -> FtpResult<TcpStream> {
        let line = command_line(verb, args);
        let mode = self.config.data_channel_mode();
        let codec = self
            .codec
            .as_mut()
            .ok_or_else(|| FtpError::not_connected("Not connected."))?;

        let result: FtpResult<(TcpStream, FtpResponse)> = async {
            let channel = transfer::open_data_channel(codec, mode).await?;
            let resp = codec.command(&line).await?;
            if resp.is_failure() {
                return Err(FtpError::from_reply(resp.code, &resp.raw));
            }
            let stream = channel.into_stream(codec.idle_timeout()).await?;
            Ok((stream, resp))
        }
        .await;

        let (stream, resp) = self.settle(result)?;
        if self.config.debug {
            log::info!("{}", resp.raw.trim_end());
        } else {
            log::debug!("{}", resp.raw.trim_end());
        }
        if resp.is_preliminary() {
            self.last_preliminary = Some(resp);
        }
        Ok(stream)
    }

    // ─── Utility ─────────────────────────────────────────────────

    pub(crate) fn touch(&mut self) {
        self.info.last_activity = Some(Utc::now());
    }

    pub(crate) fn record_download(&mut self, bytes: u64) {
        self.info.bytes_downloaded += bytes;
    }

    pub(crate) fn record_upload(&mut self, bytes: u64) {
        self.info.bytes_uploaded += bytes;
    }
}

/// `VERB arg1 arg2`; empty arguments are left out.
fn command_line(verb: &str, args: &[&str]) -> String {
    std::iter::once(verb)
        .chain(args.iter().copied().filter(|a| !a.is_empty()))
        .collect::<Vec<_>>()
        .join(" ")
}
