//! Data-channel negotiation for FTP transfers.
//!
//! Two modes (RFC 959 §4.1.2):
//! - **PASV** — server opens a port, client connects
//! - **PORT** — client listens, tells the server where, server connects
//!
//! A channel lives for exactly one transfer. In active mode the listener
//! must already be listening when `PORT` is sent, and the real data socket
//! only appears after the transfer command's preliminary reply.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::FtpCodec;
use crate::ftp::types::DataChannelMode;
use lazy_static::lazy_static;
use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::{timeout, Duration};

lazy_static! {
    static ref PASV_RE: Regex =
        Regex::new(r"\(((?:\d+,){5}\d+)\)").expect("PASV pattern is valid");
}

/// A negotiated data channel, before or after the server has connected.
pub enum DataChannel {
    /// Already connected to the server-advertised endpoint.
    Passive(TcpStream),
    /// Listening for the server; becomes a stream after `accept()`.
    Active(TcpListener),
}

impl DataChannel {
    /// Obtain the connected data socket. For active mode this accepts the
    /// server's connection and drops the listener.
    pub async fn into_stream(self, data_timeout: Duration) -> FtpResult<TcpStream> {
        match self {
            Self::Passive(tcp) => Ok(tcp),
            Self::Active(listener) => {
                let (tcp, peer) = timeout(data_timeout, listener.accept())
                    .await
                    .map_err(|_| FtpError::timeout("PORT accept timed out"))?
                    .map_err(|e| FtpError::connection_failed(format!("PORT accept: {}", e)))?;
                log::debug!("data connection accepted from {}", peer);
                Ok(tcp)
            }
        }
    }
}

/// Open a data channel according to the configured mode.
pub async fn open_data_channel(codec: &mut FtpCodec, mode: DataChannelMode) -> FtpResult<DataChannel> {
    match mode {
        DataChannelMode::Passive => open_pasv(codec).await.map(DataChannel::Passive),
        DataChannelMode::Active => open_port(codec).await.map(DataChannel::Active),
    }
}

// ─── PASV ────────────────────────────────────────────────────────────

/// Issue `PASV`, parse the response, connect to the returned address.
///
/// Response format: `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`
async fn open_pasv(codec: &mut FtpCodec) -> FtpResult<TcpStream> {
    let resp = codec.command("PASV").await?;
    if resp.is_failure() {
        return Err(FtpError::from_reply(resp.code, &resp.raw));
    }
    let addr = parse_pasv_response(&resp.raw)?;
    let tcp = timeout(codec.idle_timeout(), TcpStream::connect(addr))
        .await
        .map_err(|_| FtpError::timeout("PASV data connect timed out"))?
        .map_err(|e| FtpError::connection_failed(format!("PASV data connect to {}: {}", addr, e)))?;
    log::debug!("passive data connection to {}", addr);
    Ok(tcp)
}

/// Parse `(h1,h2,h3,h4,p1,p2)` from a 227 response.
pub fn parse_pasv_response(text: &str) -> FtpResult<SocketAddr> {
    let caps = PASV_RE
        .captures(text)
        .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse PASV: {}", text.trim_end())))?;

    let nums: Vec<u8> = caps[1]
        .split(',')
        .map(|n| {
            n.parse::<u8>()
                .map_err(|_| FtpError::protocol_error(format!("PASV number out of range: {}", n)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let ip = IpAddr::from([nums[0], nums[1], nums[2], nums[3]]);
    let port = (nums[4] as u16) * 256 + (nums[5] as u16);
    Ok(SocketAddr::new(ip, port))
}

// ─── PORT ────────────────────────────────────────────────────────────

/// Bind a local listener, then tell the server about it via `PORT`.
/// The accept happens later, in [`DataChannel::into_stream`].
async fn open_port(codec: &mut FtpCodec) -> FtpResult<TcpListener> {
    let control_local = codec
        .local_addr()
        .ok_or_else(|| FtpError::protocol_error("Active mode needs a TCP control connection"))?;
    let ip = match control_local.ip() {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => return Err(FtpError::protocol_error("PORT requires IPv4")),
    };

    let socket = TcpSocket::new_v4()
        .map_err(|e| FtpError::connection_failed(format!("PORT socket: {}", e)))?;
    socket
        .bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        .map_err(|e| FtpError::connection_failed(format!("PORT bind: {}", e)))?;
    let listener = socket
        .listen(1)
        .map_err(|e| FtpError::connection_failed(format!("PORT listen: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| FtpError::connection_failed(format!("PORT local_addr: {}", e)))?
        .port();

    let resp = codec
        .command(&format!("PORT {}", format_port_args(ip, port)))
        .await?;
    if resp.is_failure() {
        return Err(FtpError::from_reply(resp.code, &resp.raw));
    }
    Ok(listener)
}

/// `h1,h2,h3,h4,p1,p2` where port = `p1*256 + p2`.
pub fn format_port_args(ip: Ipv4Addr, port: u16) -> String {
    let o = ip.octets();
    format!(
        "{},{},{},{},{},{}",
        o[0],
        o[1],
        o[2],
        o[3],
        port / 256,
        port % 256
    )
}
