//! Directory operations — ls, cd, mkdir, size, name listing.

use crate::ftp::client::FtpClient;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::types::*;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{timeout, Duration};

impl FtpClient {
    // ─── CWD / MKD / SIZE ────────────────────────────────────────

    /// Change the remote working directory. The reply is returned as-is.
    pub async fn cd(&mut self, dir: &str) -> FtpResult<FtpResponse> {
        self.send_command("CWD", &[dir]).await
    }

    /// Create a directory on the remote server.
    pub async fn mkdir(&mut self, name: &str) -> FtpResult<FtpResponse> {
        self.send_command("MKD", &[name]).await
    }

    /// Raw `SIZE` reply (RFC 3659), e.g. `213 20`.
    pub async fn size(&mut self, name: &str) -> FtpResult<FtpResponse> {
        self.send_command("SIZE", &[name]).await
    }

    // ─── LIST ────────────────────────────────────────────────────

    /// `LIST [dir]`: every listing line is written to `out` followed by
    /// `\n`; returns the completion reply.
    pub async fn ls(
        &mut self,
        dir: Option<&str>,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<FtpResponse> {
        let stream = self
            .prepare_data_transfer("LIST", &[dir.unwrap_or("")])
            .await?;
        let data_timeout = self.data_timeout();
        let encoding = self.config().encoding;

        let copied: FtpResult<()> = async {
            let mut reader = BufReader::new(stream);
            let mut line = Vec::new();
            loop {
                line.clear();
                let n = timeout(data_timeout, reader.read_until(b'\n', &mut line))
                    .await
                    .map_err(|_| FtpError::timeout("Data channel read timed out"))??;
                if n == 0 {
                    break;
                }
                let text = encoding.decode(&line)?;
                out.write_all(text.trim_end_matches(&['\r', '\n'][..]).as_bytes()).await?;
                out.write_all(b"\n").await?;
            }
            out.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = copied {
            return Err(self.recover_from_data_error(e).await);
        }
        self.read_reply().await
    }

    // ─── NLST ────────────────────────────────────────────────────

    /// `NLST` of the current directory, one name per line, server order.
    ///
    /// Servers answer an empty directory either with an empty listing or
    /// with `450`/`550`; both come back as an empty list.
    pub async fn nlst(&mut self) -> FtpResult<Vec<String>> {
        let stream = match self.prepare_data_transfer("NLST", &[]).await {
            Ok(s) => s,
            Err(e) if matches!(e.code, Some(450) | Some(550)) => {
                log::debug!("NLST reported no entries: {}", e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let data = match read_all(stream, self.data_timeout()).await {
            Ok(d) => d,
            Err(e) => return Err(self.recover_from_data_error(e).await),
        };
        self.read_reply().await?.into_result()?;

        let text = self.config().encoding.decode(&data)?;
        Ok(text
            .lines()
            .map(|l| l.trim_end_matches('\r').to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    /// After a failure on the data channel: drop the session on fatal
    /// errors, otherwise read the pending completion reply so it does not
    /// answer the next command.
    pub(crate) async fn recover_from_data_error(&mut self, err: FtpError) -> FtpError {
        let err = self.note_error(err);
        if !err.is_fatal() && !err.is_command_rejected() && self.is_connected() {
            if let Err(drain) = self.read_reply().await {
                log::debug!("no pending reply after data error: {}", drain);
            }
        }
        err
    }
}

/// Drain a data stream to EOF, applying the idle timeout to each read.
pub(crate) async fn read_all<R: AsyncRead + Unpin>(mut stream: R, idle: Duration) -> FtpResult<Vec<u8>> {
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = timeout(idle, stream.read(&mut buf))
            .await
            .map_err(|_| FtpError::timeout("Data channel read timed out"))??;
        if n == 0 {
            return Ok(data);
        }
        data.extend_from_slice(&buf[..n]);
    }
}

/// Last path component of a name returned by `NLST`.
pub(crate) fn basename(entry: &str) -> &str {
    let trimmed = entry.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
