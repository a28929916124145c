//! File-level operations: `get` and `send` for single files and whole
//! directory trees. Every byte moved is reported to the client's
//! `TransferObserver`.

use crate::ftp::client::FtpClient;
use crate::ftp::directory::basename;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::progress::ProgressTracker;
use crate::ftp::types::*;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default chunk size for streaming transfers (64 KiB).
const DEFAULT_CHUNK: usize = 65_536;

type BoxedReply<'a> = Pin<Box<dyn Future<Output = FtpResult<FtpResponse>> + Send + 'a>>;

impl FtpClient {
    // ─── GET (RETR) ──────────────────────────────────────────────

    /// Download `remote` (a file or a whole directory) to `local`, which
    /// defaults to the remote name. Returns the last completion reply.
    pub async fn get(&mut self, remote: &str, local: Option<&Path>) -> FtpResult<FtpResponse> {
        let local = expand_home(local.unwrap_or_else(|| Path::new(remote)));
        let task = TransferTask {
            direction: TransferDirection::Get,
            remote_path: remote.to_string(),
            local_path: local,
            total_bytes: None,
            is_directory: false,
        };
        self.get_task(task).await
    }

    async fn get_task(&mut self, mut task: TransferTask) -> FtpResult<FtpResponse> {
        // A successful CWD means the target is a directory.
        let entered = self.cd(&task.remote_path).await?;
        if !entered.is_permanent_failure() {
            self.climb(&task.remote_path).await?;
            task.is_directory = true;
            return self.get_dir(task).await;
        }

        if task.local_path.is_dir() {
            return Err(FtpError::local_fs(format!(
                "Second argument must be file, not directory: {}",
                task.local_path.display()
            )));
        }

        task.total_bytes = self.remote_size(&task.remote_path).await?;
        self.type_binary().await?;
        let stream = self
            .prepare_data_transfer("RETR", &[&task.remote_path])
            .await?;

        let mut tracker = ProgressTracker::new(&task);
        let streamed = self.download_stream(stream, &task, &mut tracker).await;
        let bytes = match streamed {
            Ok(n) => n,
            Err(e) => {
                self.observer.on_progress(&tracker.fail());
                remove_partial(&task.local_path).await;
                return Err(self.recover_from_data_error(e).await);
            }
        };

        let done = match self.read_reply().await.and_then(FtpResponse::into_result) {
            Ok(done) => done,
            Err(e) => {
                self.observer.on_progress(&tracker.fail());
                remove_partial(&task.local_path).await;
                return Err(e);
            }
        };

        self.record_download(bytes);
        self.observer.on_progress(&tracker.finish());
        log::info!(
            "FTP downloaded {} -> {} ({} bytes)",
            task.remote_path,
            task.local_path.display(),
            bytes
        );
        Ok(done)
    }

    /// `CWD remote`, fetch every `NLST` entry, `CWD ..`.
    fn get_dir(&mut self, task: TransferTask) -> BoxedReply<'_> {
        Box::pin(async move {
            if !task.local_path.is_dir() {
                fs::create_dir_all(&task.local_path).await?;
            }

            let mut last = self.cd(&task.remote_path).await?.into_result()?;
            let entries = self.nlst().await?;
            for entry in &entries {
                let name = basename(entry);
                if name.is_empty() || name == "." || name == ".." {
                    continue;
                }
                last = self.get_task(task.child(name, name, false)).await?;
            }
            self.climb(&task.remote_path).await?;
            Ok(last)
        })
    }

    async fn download_stream(
        &mut self,
        mut stream: TcpStream,
        task: &TransferTask,
        tracker: &mut ProgressTracker,
    ) -> FtpResult<u64> {
        if let Some(parent) = task.local_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let mut file = fs::File::create(&task.local_path).await?;
        let data_timeout = self.data_timeout();
        let mut buf = vec![0u8; DEFAULT_CHUNK];

        loop {
            let n = timeout(data_timeout, stream.read(&mut buf))
                .await
                .map_err(|_| FtpError::timeout("Data channel read timed out"))??;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            self.observer.on_progress(&tracker.advance(n));
        }

        file.flush().await?;
        Ok(tracker.transferred())
    }

    /// `SIZE` for the progress total. A missing file fails here, before
    /// anything else is sent or created locally.
    ///
    /// Some servers refuse `SIZE` outside binary mode
    /// (`550 SIZE not allowed in ASCII mode`); that only means the size is
    /// unknown, and `RETR` reports a file that really is missing.
    async fn remote_size(&mut self, remote: &str) -> FtpResult<Option<u64>> {
        let resp = self.size(remote).await?;
        match resp.code {
            213 => Ok(resp
                .lines
                .last()
                .and_then(|l| l.split_whitespace().last())
                .and_then(|n| n.parse::<u64>().ok())),
            450 | 550 if refuses_size_in_ascii(&resp) => Ok(None),
            450 | 550 => Err(FtpError::from_reply(resp.code, &resp.raw)),
            _ => Ok(None),
        }
    }

    async fn type_binary(&mut self) -> FtpResult<FtpResponse> {
        self.send_command("TYPE", &["I"]).await?.into_result()
    }

    // ─── SEND (STOR) ─────────────────────────────────────────────

    /// Upload `local` (a file or a whole directory) as `remote`, which
    /// defaults to the local file name. Returns the last completion reply.
    pub async fn send(&mut self, local: &Path, remote: Option<&str>) -> FtpResult<FtpResponse> {
        let local = expand_home(local);
        let remote = match remote {
            Some(r) => r.to_string(),
            None => local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| local.display().to_string()),
        };
        let task = TransferTask {
            direction: TransferDirection::Send,
            remote_path: remote,
            is_directory: local.is_dir(),
            local_path: local,
            total_bytes: None,
        };
        self.send_task(task).await
    }

    async fn send_task(&mut self, mut task: TransferTask) -> FtpResult<FtpResponse> {
        if task.local_path.is_dir() {
            task.is_directory = true;
            return self.send_dir(task).await;
        }
        if !task.local_path.is_file() {
            return Err(FtpError::local_fs(format!(
                "Local file not found: {}",
                task.local_path.display()
            )));
        }

        let file = fs::File::open(&task.local_path).await?;
        task.total_bytes = Some(file.metadata().await?.len());

        self.type_binary().await?;
        let stream = self
            .prepare_data_transfer("STOR", &[&task.remote_path])
            .await?;

        let mut tracker = ProgressTracker::new(&task);
        let bytes = match self.upload_stream(stream, file, &mut tracker).await {
            Ok(n) => n,
            Err(e) => {
                self.observer.on_progress(&tracker.fail());
                return Err(self.recover_from_data_error(e).await);
            }
        };

        let done = match self.read_reply().await.and_then(FtpResponse::into_result) {
            Ok(done) => done,
            Err(e) => {
                self.observer.on_progress(&tracker.fail());
                return Err(e);
            }
        };

        self.record_upload(bytes);
        self.observer.on_progress(&tracker.finish());
        log::info!(
            "FTP uploaded {} -> {} ({} bytes)",
            task.local_path.display(),
            task.remote_path,
            bytes
        );
        Ok(done)
    }

    /// `CWD remote` (creating it when absent), send the immediate files,
    /// recurse into the immediate subdirectories, `CWD ..`.
    fn send_dir(&mut self, task: TransferTask) -> BoxedReply<'_> {
        Box::pin(async move {
            let remote = task.remote_path.clone();
            let mut last = self.cd(&remote).await?;
            if last.is_permanent_failure() {
                let existing = self.nlst().await?;
                if existing.iter().any(|e| basename(e) == remote) {
                    return Err(FtpError::failed("Could not create directory"));
                }
                self.mkdir(&remote).await?.into_result()?;
                last = self.cd(&remote).await?.into_result()?;
            }

            let (files, dirs) = local_entries(&task.local_path).await?;
            for name in &files {
                last = self.send_task(task.child(name, name, false)).await?;
            }
            for name in &dirs {
                last = self.send_dir(task.child(name, name, true)).await?;
            }

            self.climb(&remote).await?;
            Ok(last)
        })
    }

    /// Undo `CWD remote` with one `CWD ..` per path component.
    async fn climb(&mut self, remote: &str) -> FtpResult<()> {
        for _ in 0..remote_depth(remote) {
            self.cd("..").await?.into_result()?;
        }
        Ok(())
    }

    async fn upload_stream(
        &mut self,
        mut stream: TcpStream,
        mut file: fs::File,
        tracker: &mut ProgressTracker,
    ) -> FtpResult<u64> {
        let data_timeout = self.data_timeout();
        let mut buf = vec![0u8; DEFAULT_CHUNK];

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            timeout(data_timeout, stream.write_all(&buf[..n]))
                .await
                .map_err(|_| FtpError::timeout("Data channel write timed out"))??;
            self.observer.on_progress(&tracker.advance(n));
        }

        timeout(data_timeout, stream.flush())
            .await
            .map_err(|_| FtpError::timeout("Data channel flush timed out"))??;
        timeout(data_timeout, stream.shutdown())
            .await
            .map_err(|_| FtpError::timeout("Data channel shutdown timed out"))??;
        Ok(tracker.transferred())
    }
}

// ─── Local helpers ───────────────────────────────────────────────────

fn refuses_size_in_ascii(resp: &FtpResponse) -> bool {
    resp.raw.to_ascii_lowercase().contains("ascii")
}

/// Number of `CWD ..` needed to undo `CWD path`.
fn remote_depth(path: &str) -> usize {
    path.split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .count()
        .max(1)
}

/// Immediate regular files and subdirectories of `dir`, each sorted by name.
async fn local_entries(dir: &Path) -> FtpResult<(Vec<String>, Vec<String>)> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let meta = fs::metadata(entry.path()).await?;
        if meta.is_dir() {
            dirs.push(name);
        } else if meta.is_file() {
            files.push(name);
        } else {
            log::debug!("skipping {}: not a file or directory", entry.path().display());
        }
    }
    files.sort();
    dirs.sort();
    Ok((files, dirs))
}

/// Remove a partially written download; a file that never got created is fine.
async fn remove_partial(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => log::debug!("removed partial download {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("could not remove partial download {}: {}", path.display(), e),
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(std::path::Component::Normal(first)) if first == "~" => match dirs::home_dir() {
            Some(home) => home.join(components.as_path()),
            None => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}
