//! Verb dispatch for the interactive shell.
//!
//! Each verb maps to a static handler object. The shell only ever calls
//! [`dispatch`], which guards on session state, runs the handler and turns
//! a 4xx/5xx reply into an error.

use crate::ftp::client::FtpClient;
use crate::ftp::error::{FtpError, FtpErrorKind, FtpResult};
use crate::ftp::types::{FtpResponse, SessionStatus};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::io::AsyncWrite;

/// Default control port for `connect host` without a port.
pub const DEFAULT_PORT: u16 = 21;

/// Shell verbs understood by the dispatcher. `quit` parses as [`FtpCommand::Exit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FtpCommand {
    Connect,
    Login,
    Ls,
    Cd,
    Get,
    Send,
    Mkdir,
    Size,
    Close,
    Exit,
    Reconnect,
    Help,
}

impl FtpCommand {
    pub const ALL: [FtpCommand; 12] = [
        FtpCommand::Connect,
        FtpCommand::Login,
        FtpCommand::Ls,
        FtpCommand::Cd,
        FtpCommand::Get,
        FtpCommand::Send,
        FtpCommand::Mkdir,
        FtpCommand::Size,
        FtpCommand::Close,
        FtpCommand::Exit,
        FtpCommand::Reconnect,
        FtpCommand::Help,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FtpCommand::Connect => "connect",
            FtpCommand::Login => "login",
            FtpCommand::Ls => "ls",
            FtpCommand::Cd => "cd",
            FtpCommand::Get => "get",
            FtpCommand::Send => "send",
            FtpCommand::Mkdir => "mkdir",
            FtpCommand::Size => "size",
            FtpCommand::Close => "close",
            FtpCommand::Exit => "exit",
            FtpCommand::Reconnect => "reconnect",
            FtpCommand::Help => "help",
        }
    }

    pub fn handler(self) -> &'static dyn FtpCommandHandler {
        match self {
            FtpCommand::Connect => &ConnectHandler,
            FtpCommand::Login => &LoginHandler,
            FtpCommand::Ls => &LsHandler,
            FtpCommand::Cd => &CdHandler,
            FtpCommand::Get => &GetHandler,
            FtpCommand::Send => &SendHandler,
            FtpCommand::Mkdir => &MkdirHandler,
            FtpCommand::Size => &SizeHandler,
            FtpCommand::Close => &CloseHandler,
            FtpCommand::Exit => &ExitHandler,
            FtpCommand::Reconnect => &ReconnectHandler,
            FtpCommand::Help => &HelpHandler,
        }
    }

    /// Every verb the shell accepts, `quit` included, sorted.
    pub fn verbs() -> Vec<&'static str> {
        let mut verbs: Vec<&'static str> = Self::ALL.iter().map(|c| c.name()).collect();
        verbs.push("quit");
        verbs.sort_unstable();
        verbs
    }
}

impl fmt::Display for FtpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FtpCommand {
    type Err = FtpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "quit" {
            return Ok(FtpCommand::Exit);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| FtpError::invalid_command("?Invalid command"))
    }
}

/// One shell verb.
#[async_trait]
pub trait FtpCommandHandler: Send + Sync {
    /// One-line usage, e.g. `get remote-file [local-file]`.
    fn usage(&self) -> &'static str;

    /// Minimum session state; `None` means the verb is always allowed.
    fn required_status(&self) -> Option<SessionStatus>;

    /// Run the verb and return the server's raw reply (or local text for
    /// `help`). Listing output goes to `out`.
    async fn execute(
        &self,
        client: &mut FtpClient,
        args: &[String],
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<String>;
}

/// Parse and run one shell line's verb with its arguments.
pub async fn dispatch(
    client: &mut FtpClient,
    verb: &str,
    args: &[String],
    out: &mut (dyn AsyncWrite + Unpin + Send),
) -> FtpResult<String> {
    let command: FtpCommand = verb.parse()?;
    let handler = command.handler();

    if let Some(required) = handler.required_status() {
        if client.status() < required {
            let msg = if client.is_connected() {
                "Not logged in."
            } else {
                "Not connected."
            };
            return Err(FtpError::not_connected(msg));
        }
    }

    let reply = handler.execute(client, args, out).await?;
    match failure_code(&reply) {
        Some(code) => Err(FtpError::from_reply(code, &reply)),
        None => Ok(reply),
    }
}

/// Reply code of a 4xx/5xx reply text.
fn failure_code(reply: &str) -> Option<u16> {
    let code: u16 = reply.get(..3)?.parse().ok()?;
    (400..600).contains(&code).then_some(code)
}

fn arg<'a>(args: &'a [String], idx: usize, usage: &str) -> FtpResult<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| FtpError::invalid_command(format!("usage: {}", usage)))
}

fn opt_arg(args: &[String], idx: usize) -> Option<&str> {
    args.get(idx).map(String::as_str)
}

fn raw(resp: FtpResponse) -> String {
    resp.raw
}

// ─── Handlers ────────────────────────────────────────────────────────

struct ConnectHandler;

#[async_trait]
impl FtpCommandHandler for ConnectHandler {
    fn usage(&self) -> &'static str {
        "connect host [port]"
    }

    fn required_status(&self) -> Option<SessionStatus> {
        None
    }

    async fn execute(
        &self,
        client: &mut FtpClient,
        args: &[String],
        _out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<String> {
        let host = arg(args, 0, self.usage())?;
        let port = match opt_arg(args, 1) {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| FtpError::invalid_command(format!("Invalid port: {}", p)))?,
            None => DEFAULT_PORT,
        };
        client.connect(host, port).await.map(raw)
    }
}

struct LoginHandler;

#[async_trait]
impl FtpCommandHandler for LoginHandler {
    fn usage(&self) -> &'static str {
        "login user password"
    }

    fn required_status(&self) -> Option<SessionStatus> {
        Some(SessionStatus::Connected)
    }

    async fn execute(
        &self,
        client: &mut FtpClient,
        args: &[String],
        _out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<String> {
        let user = arg(args, 0, self.usage())?;
        let pass = arg(args, 1, self.usage())?;
        client.login(user, pass).await.map(raw)
    }
}

struct LsHandler;

#[async_trait]
impl FtpCommandHandler for LsHandler {
    fn usage(&self) -> &'static str {
        "ls [remote-directory]"
    }

    fn required_status(&self) -> Option<SessionStatus> {
        Some(SessionStatus::Authenticated)
    }

    async fn execute(
        &self,
        client: &mut FtpClient,
        args: &[String],
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<String> {
        client.ls(opt_arg(args, 0), out).await.map(raw)
    }
}

struct CdHandler;

#[async_trait]
impl FtpCommandHandler for CdHandler {
    fn usage(&self) -> &'static str {
        "cd remote-directory"
    }

    fn required_status(&self) -> Option<SessionStatus> {
        Some(SessionStatus::Authenticated)
    }

    async fn execute(
        &self,
        client: &mut FtpClient,
        args: &[String],
        _out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<String> {
        let dir = arg(args, 0, self.usage())?;
        client.cd(dir).await.map(raw)
    }
}

struct GetHandler;

#[async_trait]
impl FtpCommandHandler for GetHandler {
    fn usage(&self) -> &'static str {
        "get remote-file [local-file]"
    }

    fn required_status(&self) -> Option<SessionStatus> {
        Some(SessionStatus::Authenticated)
    }

    async fn execute(
        &self,
        client: &mut FtpClient,
        args: &[String],
        _out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<String> {
        let remote = arg(args, 0, self.usage())?;
        let local = opt_arg(args, 1).map(Path::new);
        client.get(remote, local).await.map(raw)
    }
}

struct SendHandler;

#[async_trait]
impl FtpCommandHandler for SendHandler {
    fn usage(&self) -> &'static str {
        "send local-file [remote-file]"
    }

    fn required_status(&self) -> Option<SessionStatus> {
        Some(SessionStatus::Authenticated)
    }

    async fn execute(
        &self,
        client: &mut FtpClient,
        args: &[String],
        _out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<String> {
        let local = arg(args, 0, self.usage())?;
        client.send(Path::new(local), opt_arg(args, 1)).await.map(raw)
    }
}

struct MkdirHandler;

#[async_trait]
impl FtpCommandHandler for MkdirHandler {
    fn usage(&self) -> &'static str {
        "mkdir directory-name"
    }

    fn required_status(&self) -> Option<SessionStatus> {
        Some(SessionStatus::Authenticated)
    }

    async fn execute(
        &self,
        client: &mut FtpClient,
        args: &[String],
        _out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<String> {
        let name = arg(args, 0, self.usage())?;
        client.mkdir(name).await.map(raw)
    }
}

struct SizeHandler;

#[async_trait]
impl FtpCommandHandler for SizeHandler {
    fn usage(&self) -> &'static str {
        "size remote-file"
    }

    fn required_status(&self) -> Option<SessionStatus> {
        Some(SessionStatus::Authenticated)
    }

    async fn execute(
        &self,
        client: &mut FtpClient,
        args: &[String],
        _out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<String> {
        let name = arg(args, 0, self.usage())?;
        client.size(name).await.map(raw)
    }
}

struct CloseHandler;

#[async_trait]
impl FtpCommandHandler for CloseHandler {
    fn usage(&self) -> &'static str {
        "close"
    }

    fn required_status(&self) -> Option<SessionStatus> {
        None
    }

    async fn execute(
        &self,
        client: &mut FtpClient,
        _args: &[String],
        _out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<String> {
        Ok(client.close().await?.map(raw).unwrap_or_default())
    }
}

struct ExitHandler;

#[async_trait]
impl FtpCommandHandler for ExitHandler {
    fn usage(&self) -> &'static str {
        "exit"
    }

    fn required_status(&self) -> Option<SessionStatus> {
        None
    }

    async fn execute(
        &self,
        client: &mut FtpClient,
        _args: &[String],
        _out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<String> {
        Ok(client.exit().await?.map(raw).unwrap_or_default())
    }
}

struct ReconnectHandler;

#[async_trait]
impl FtpCommandHandler for ReconnectHandler {
    fn usage(&self) -> &'static str {
        "reconnect"
    }

    fn required_status(&self) -> Option<SessionStatus> {
        None
    }

    async fn execute(
        &self,
        client: &mut FtpClient,
        _args: &[String],
        _out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<String> {
        client.reconnect().await.map(raw)
    }
}

struct HelpHandler;

#[async_trait]
impl FtpCommandHandler for HelpHandler {
    fn usage(&self) -> &'static str {
        "help [command]"
    }

    fn required_status(&self) -> Option<SessionStatus> {
        None
    }

    async fn execute(
        &self,
        _client: &mut FtpClient,
        args: &[String],
        _out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> FtpResult<String> {
        help_text(opt_arg(args, 0))
    }
}

/// `help` with no verb lists every verb; `help verb` prints its usage.
pub fn help_text(verb: Option<&str>) -> FtpResult<String> {
    match verb {
        None | Some("") => Ok(FtpCommand::verbs().join("  ")),
        Some(v) => v
            .parse::<FtpCommand>()
            .map(|c| c.handler().usage().to_string())
            .map_err(|e| match e.kind {
                FtpErrorKind::InvalidCommand => {
                    FtpError::invalid_command(format!("?Invalid help command {}", v))
                }
                _ => e,
            }),
    }
}
