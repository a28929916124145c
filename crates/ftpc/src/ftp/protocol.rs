//! Low-level FTP command/response codec (RFC 959 §4).
//!
//! Handles:
//! - Sending FTP commands terminated with `\r\n`
//! - Framing single-line and multi-line replies out of a line buffer
//! - Parsing the 3-digit reply code

use crate::ftp::encoding::TextEncoding;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::types::FtpResponse;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Bytes requested from the control socket per read.
pub const READ_CHUNK: usize = 4096;

/// Read side of the control channel.
pub type ControlReader = Box<dyn AsyncRead + Unpin + Send>;
/// Write side of the control channel.
pub type ControlWriter = Box<dyn AsyncWrite + Unpin + Send>;

// ─── Reply framer ────────────────────────────────────────────────────

/// Accumulates control-channel bytes and cuts complete replies off the
/// front of the buffer.
///
/// A reply is complete once a line starting with its code followed by a
/// space has been buffered:
/// ```text
/// 220-Welcome to my FTP server
/// 220-This is line 2
/// 220 End of greeting
/// ```
/// Anything after the terminal line stays buffered for the next reply,
/// so TCP segmentation never affects where a reply ends.
#[derive(Debug, Default)]
pub struct ReplyFramer {
    buf: Vec<u8>,
}

impl ReplyFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes waiting for a complete reply.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Take the next complete reply, if the buffer holds one.
    pub fn next_reply(&mut self, encoding: TextEncoding) -> FtpResult<Option<FtpResponse>> {
        let mut start = 0;
        let mut open_code: Option<[u8; 3]> = None;

        while let Some(pos) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos + 1;
            let line = &self.buf[start..end];
            match open_code {
                None => {
                    let (code, multi) = parse_status_line(line, encoding)?;
                    if !multi {
                        return self.take(end, encoding).map(Some);
                    }
                    open_code = Some(code);
                }
                Some(code) => {
                    if is_terminal_line(line, &code) {
                        return self.take(end, encoding).map(Some);
                    }
                }
            }
            start = end;
        }
        Ok(None)
    }

    /// Called on EOF: a lone status line without its line terminator is
    /// still a usable reply, anything else is a truncated one.
    pub fn finish(&mut self, encoding: TextEncoding) -> FtpResult<Option<FtpResponse>> {
        if self.buf.is_empty() || self.buf.contains(&b'\n') {
            return Ok(None);
        }
        match parse_status_line(&self.buf, encoding) {
            Ok((_, false)) => {
                let end = self.buf.len();
                self.take(end, encoding).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn take(&mut self, end: usize, encoding: TextEncoding) -> FtpResult<FtpResponse> {
        let bytes: Vec<u8> = self.buf.drain(..end).collect();
        let raw = encoding.decode(&bytes)?;
        let code = parse_code(&raw)?;
        let lines = raw
            .split('\n')
            .map(|l| l.trim_end_matches('\r').to_string())
            .filter(|l| !l.is_empty())
            .collect();
        Ok(FtpResponse { code, lines, raw })
    }
}

/// Returns the code digits and whether the reply continues (`NNN-`).
fn parse_status_line(line: &[u8], encoding: TextEncoding) -> FtpResult<([u8; 3], bool)> {
    let invalid = || {
        let shown = encoding
            .decode(line)
            .unwrap_or_else(|_| String::from_utf8_lossy(line).into_owned());
        FtpError::protocol_error(format!("Invalid reply line: '{}'", shown.trim_end()))
    };
    if line.len() < 3 || !line[..3].iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    let code = [line[0], line[1], line[2]];
    match line.get(3) {
        Some(b'-') => Ok((code, true)),
        None | Some(b' ') | Some(b'\r') | Some(b'\n') => Ok((code, false)),
        Some(_) => Err(invalid()),
    }
}

fn is_terminal_line(line: &[u8], code: &[u8; 3]) -> bool {
    line.len() >= 4 && &line[..3] == code && line[3] == b' '
}

/// Parse the 3-digit reply code from the start of a line.
fn parse_code(line: &str) -> FtpResult<u16> {
    line.get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| FtpError::protocol_error(format!("Invalid reply code in: '{}'", line)))
}

// ─── Codec ───────────────────────────────────────────────────────────

/// The FTP command/response codec operating on split halves.
pub struct FtpCodec {
    reader: ControlReader,
    writer: ControlWriter,
    framer: ReplyFramer,
    encoding: TextEncoding,
    idle_timeout: Duration,
    local_addr: Option<SocketAddr>,
}

impl FtpCodec {
    /// Create a codec from a connected TCP stream.
    pub fn from_tcp(
        stream: TcpStream,
        encoding: TextEncoding,
        idle_timeout: Duration,
    ) -> FtpResult<Self> {
        let local_addr = stream.local_addr()?;
        let (rd, wr) = stream.into_split();
        let mut codec = Self::from_parts(Box::new(rd), Box::new(wr), encoding, idle_timeout);
        codec.local_addr = Some(local_addr);
        Ok(codec)
    }

    /// Create a codec over arbitrary halves (used with in-memory streams).
    pub fn from_parts(
        reader: ControlReader,
        writer: ControlWriter,
        encoding: TextEncoding,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            reader,
            writer,
            framer: ReplyFramer::new(),
            encoding,
            idle_timeout,
            local_addr: None,
        }
    }

    /// Local endpoint of the control socket; active mode advertises its IP.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Send a raw FTP command (without trailing CRLF — we add it).
    pub async fn send_command(&mut self, cmd: &str) -> FtpResult<()> {
        let mut bytes = self.encoding.encode(cmd)?;
        bytes.extend_from_slice(b"\r\n");
        timeout(self.idle_timeout, self.writer.write_all(&bytes))
            .await
            .map_err(|_| FtpError::timeout(format!("Sending '{}' timed out", verb_of(cmd))))?
            .map_err(control_io)?;
        timeout(self.idle_timeout, self.writer.flush())
            .await
            .map_err(|_| FtpError::timeout("Control channel flush timed out"))?
            .map_err(control_io)?;
        if cmd.starts_with("PASS ") {
            log::trace!(">>> PASS ****");
        } else {
            log::trace!(">>> {}", cmd);
        }
        Ok(())
    }

    /// Read a complete FTP response (possibly multi-line).
    pub async fn read_response(&mut self) -> FtpResult<FtpResponse> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(resp) = self.framer.next_reply(self.encoding)? {
                log::trace!("<<< {}", resp.raw.trim_end());
                return Ok(resp);
            }
            let n = timeout(self.idle_timeout, self.reader.read(&mut chunk))
                .await
                .map_err(|_| FtpError::timeout("Timed out waiting for server reply"))?
                .map_err(control_io)?;
            if n == 0 {
                return match self.framer.finish(self.encoding)? {
                    Some(resp) => {
                        log::trace!("<<< {}", resp.raw.trim_end());
                        Ok(resp)
                    }
                    None => Err(FtpError::disconnected("Server closed connection")),
                };
            }
            self.framer.push(&chunk[..n]);
        }
    }

    /// Send a command and read its reply, with a `421` (service closing)
    /// reply surfaced as a timeout.
    pub async fn command(&mut self, cmd: &str) -> FtpResult<FtpResponse> {
        self.send_command(cmd).await?;
        self.read_reply().await
    }

    /// `read_response`, with a `421` reply surfaced as a timeout.
    pub async fn read_reply(&mut self) -> FtpResult<FtpResponse> {
        let resp = self.read_response().await?;
        if resp.code == 421 {
            return Err(FtpError::from_reply(resp.code, &resp.raw));
        }
        Ok(resp)
    }

    /// Best-effort close of the write half so the server sees EOF.
    pub async fn shutdown(&mut self) {
        let _ = timeout(self.idle_timeout, self.writer.shutdown()).await;
    }
}

/// Any I/O failure on the control socket ends the session.
fn control_io(e: std::io::Error) -> FtpError {
    match e.kind() {
        std::io::ErrorKind::TimedOut => FtpError::timeout(format!("Control channel: {}", e)),
        _ => FtpError::disconnected(format!("Control connection lost: {}", e)),
    }
}

fn verb_of(cmd: &str) -> &str {
    cmd.split(' ').next().unwrap_or(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn frame_all(input: &[u8]) -> (Vec<FtpResponse>, usize) {
        let mut framer = ReplyFramer::new();
        framer.push(input);
        let mut out = Vec::new();
        while let Some(r) = framer.next_reply(TextEncoding::Utf8).unwrap() {
            out.push(r);
        }
        (out, framer.buffered())
    }

    fn codec_over(reads: &[&[u8]]) -> FtpCodec {
        let mut builder = Builder::new();
        for r in reads {
            builder.read(r);
        }
        FtpCodec::from_parts(
            Box::new(builder.build()),
            Box::new(Builder::new().build()),
            TextEncoding::Utf8,
            Duration::from_secs(1),
        )
    }

    // ── Framer ──────────────────────────────────────────────────────

    #[test]
    fn single_line_reply() {
        let (replies, rest) = frame_all(b"220 ready\r\n");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].code, 220);
        assert_eq!(replies[0].raw, "220 ready\r\n");
        assert_eq!(replies[0].line_count(), 1);
        assert_eq!(rest, 0);
    }

    #[test]
    fn multi_line_waits_for_terminal_line() {
        let mut framer = ReplyFramer::new();
        framer.push(b"150-first\r\n150-second\r\n");
        assert!(framer.next_reply(TextEncoding::Utf8).unwrap().is_none());
        framer.push(b"150 done\r\n");
        let resp = framer.next_reply(TextEncoding::Utf8).unwrap().unwrap();
        assert_eq!(resp.code, 150);
        assert_eq!(resp.lines, vec!["150-first", "150-second", "150 done"]);
    }

    #[test]
    fn continuation_free_text_and_other_codes_do_not_terminate() {
        let (replies, _) =
            frame_all(b"211-Features:\r\n MDTM\r\n 200 fake\r\n211 End\r\n");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].line_count(), 4);
        assert_eq!(replies[0].lines[3], "211 End");
    }

    #[test]
    fn trailing_bytes_stay_for_next_reply() {
        let (replies, rest) = frame_all(b"150 Opening\r\n226 Transfer complete.\r\n227 Ent");
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].code, 150);
        assert_eq!(replies[1].code, 226);
        assert_eq!(rest, b"227 Ent".len());
    }

    #[test]
    fn garbage_first_line_is_protocol_error() {
        let mut framer = ReplyFramer::new();
        framer.push(b"hello there\r\n");
        let err = framer.next_reply(TextEncoding::Utf8).unwrap_err();
        assert_eq!(err.kind, crate::ftp::error::FtpErrorKind::ProtocolError);
    }

    #[test]
    fn unterminated_line_is_only_used_at_eof() {
        let mut framer = ReplyFramer::new();
        framer.push(b"221 Goodbye.");
        assert!(framer.next_reply(TextEncoding::Utf8).unwrap().is_none());
        let resp = framer.finish(TextEncoding::Utf8).unwrap().unwrap();
        assert_eq!(resp.code, 221);
    }

    // ── Codec ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn codec_returns_single_line_without_extra_read() {
        let mut codec = codec_over(&[b"220 ready\r\n"]);
        let resp = codec.read_response().await.unwrap();
        assert_eq!(resp.raw, "220 ready\r\n");
    }

    #[tokio::test]
    async fn codec_joins_reply_split_across_segments() {
        let mut codec = codec_over(&[b"150-first\r\n150-sec", b"ond\r\n150 ", b"done\r\n"]);
        let resp = codec.read_response().await.unwrap();
        assert_eq!(resp.raw, "150-first\r\n150-second\r\n150 done\r\n");
    }

    #[tokio::test]
    async fn codec_reports_eof_as_disconnected() {
        let mut codec = codec_over(&[b"220-partial\r\n"]);
        let err = codec.read_response().await.unwrap_err();
        assert_eq!(err.kind, crate::ftp::error::FtpErrorKind::Disconnected);
    }

    #[tokio::test]
    async fn codec_treats_socket_errors_as_lost_connection() {
        let reader = Builder::new()
            .read(b"150-first\r\n")
            .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut codec = FtpCodec::from_parts(
            Box::new(reader),
            Box::new(Builder::new().build()),
            TextEncoding::Utf8,
            Duration::from_secs(1),
        );
        let err = codec.read_response().await.unwrap_err();
        assert_eq!(err.kind, crate::ftp::error::FtpErrorKind::Disconnected);
        assert!(err.is_fatal());

        let writer = Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"))
            .build();
        let mut codec = FtpCodec::from_parts(
            Box::new(Builder::new().build()),
            Box::new(writer),
            TextEncoding::Utf8,
            Duration::from_secs(1),
        );
        let err = codec.send_command("NOOP").await.unwrap_err();
        assert_eq!(err.kind, crate::ftp::error::FtpErrorKind::Disconnected);
    }

    #[tokio::test]
    async fn codec_appends_crlf() {
        let writer = Builder::new().write(b"CWD docs\r\n").build();
        let mut codec = FtpCodec::from_parts(
            Box::new(Builder::new().build()),
            Box::new(writer),
            TextEncoding::Utf8,
            Duration::from_secs(1),
        );
        codec.send_command("CWD docs").await.unwrap();
    }
}
