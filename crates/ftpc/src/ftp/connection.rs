//! TCP transport — establishes the FTP control connection.
//!
//! Applies the idle timeout from `FtpConfig` to the connect itself and to
//! the welcome banner read.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::FtpCodec;
use crate::ftp::types::{FtpConfig, FtpResponse};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Establish the control connection and return a ready-to-use codec
/// **plus** the server welcome banner.
pub async fn connect(host: &str, port: u16, config: &FtpConfig) -> FtpResult<(FtpCodec, FtpResponse)> {
    if host.is_empty() {
        return Err(FtpError::invalid_config("Host must not be empty"));
    }
    let addr = format!("{}:{}", host, port);
    let dur = config.idle_timeout();

    let tcp = timeout(dur, TcpStream::connect(&addr))
        .await
        .map_err(|_| FtpError::timeout(format!("TCP connect to {} timed out", addr)))?
        .map_err(|e| FtpError::connection_failed(format!("TCP connect to {}: {}", addr, e)))?;

    tcp.set_nodelay(true).ok();

    let mut codec = FtpCodec::from_tcp(tcp, config.encoding, dur)?;
    let banner = codec.read_response().await?;
    Ok((codec, banner))
}
