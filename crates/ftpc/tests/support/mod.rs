//! Loopback stub FTP server for the integration tests.
//!
//! Serves an in-memory tree over real sockets on 127.0.0.1, supports both
//! PASV and PORT data channels, and records every command line it receives.

#![allow(dead_code)]

use ftpc::FtpConfig;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const USER: &str = "me";
pub const PASSWORD: &str = "qwerty";

#[derive(Debug, Clone)]
pub enum Node {
    File(Vec<u8>),
    Dir(BTreeMap<String, Node>),
}

struct State {
    root: BTreeMap<String, Node>,
    users: HashMap<String, String>,
    log: Vec<String>,
    stall_on: Option<String>,
    canned: HashMap<String, String>,
    data_fault: Option<(String, DataFault)>,
}

/// How the data connection of a transfer goes wrong.
#[derive(Debug, Clone, Copy)]
pub enum DataFault {
    /// Send a few bytes, then go silent with the connection open.
    Stall,
    /// Send a few bytes, reset the connection and answer `426`.
    Reset,
}

pub struct StubServer {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    handle: JoinHandle<()>,
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn default_tree() -> BTreeMap<String, Node> {
    let mut mydir = BTreeMap::new();
    mydir.insert("myfile1".to_string(), Node::File(b"myfile1data".to_vec()));
    mydir.insert("myfile2".to_string(), Node::File(b"myfile2data".to_vec()));

    let mut root = BTreeMap::new();
    root.insert("file1".to_string(), Node::File(b"file1data".to_vec()));
    root.insert("file2".to_string(), Node::File(b"file2data".to_vec()));
    root.insert("file3".to_string(), Node::File(b"file3data".to_vec()));
    root.insert("mydir".to_string(), Node::Dir(mydir));
    root
}

impl StubServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut users = HashMap::new();
        users.insert(USER.to_string(), PASSWORD.to_string());
        let state = Arc::new(Mutex::new(State {
            root: default_tree(),
            users,
            log: Vec::new(),
            stall_on: None,
            canned: HashMap::new(),
            data_fault: None,
        }));

        let shared = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let st = shared.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, st).await;
                });
            }
        });

        Self { addr, state, handle }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every command line received so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Command lines starting with `verb`.
    pub fn commands_named(&self, verb: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.split(' ').next() == Some(verb))
            .collect()
    }

    /// Swallow the next `verb` without replying.
    pub fn stall_on(&self, verb: &str) {
        self.state.lock().unwrap().stall_on = Some(verb.to_string());
    }

    /// Answer the next `verb` with `reply` instead of the normal handling.
    pub fn reply_once(&self, verb: &str, reply: &str) {
        self.state
            .lock()
            .unwrap()
            .canned
            .insert(verb.to_string(), reply.to_string());
    }

    /// Break the data connection of the next `verb` transfer.
    pub fn break_data_on(&self, verb: &str, fault: DataFault) {
        self.state.lock().unwrap().data_fault = Some((verb.to_string(), fault));
    }

    /// Put a file at a `/`-separated path, creating missing directories.
    pub fn add_file(&self, path: &str, data: &[u8]) {
        let mut st = self.state.lock().unwrap();
        let parts: Vec<&str> = path.split('/').collect();
        let (name, dirs) = parts.split_last().unwrap();
        let mut dir = &mut st.root;
        for part in dirs {
            let node = dir
                .entry(part.to_string())
                .or_insert_with(|| Node::Dir(BTreeMap::new()));
            dir = match node {
                Node::Dir(children) => children,
                Node::File(_) => panic!("{} is a file", part),
            };
        }
        dir.insert(name.to_string(), Node::File(data.to_vec()));
    }

    /// Contents of a remote file, by `/`-separated path from the root.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        let st = self.state.lock().unwrap();
        let parts: Vec<String> = path.split('/').map(str::to_string).collect();
        let (name, dirs) = parts.split_last()?;
        match lookup_dir(&st.root, dirs)?.get(name)? {
            Node::File(data) => Some(data.clone()),
            Node::Dir(_) => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        let st = self.state.lock().unwrap();
        let parts: Vec<String> = path.split('/').map(str::to_string).collect();
        lookup_dir(&st.root, &parts).is_some()
    }
}

/// Config tuned for loopback tests.
pub fn test_config(idle_ms: u64) -> FtpConfig {
    FtpConfig {
        idle_timeout_ms: idle_ms,
        ..FtpConfig::default()
    }
}

fn lookup_dir<'a>(root: &'a BTreeMap<String, Node>, path: &[String]) -> Option<&'a BTreeMap<String, Node>> {
    let mut dir = root;
    for part in path {
        match dir.get(part)? {
            Node::Dir(children) => dir = children,
            Node::File(_) => return None,
        }
    }
    Some(dir)
}

fn lookup_dir_mut<'a>(
    root: &'a mut BTreeMap<String, Node>,
    path: &[String],
) -> Option<&'a mut BTreeMap<String, Node>> {
    let mut dir = root;
    for part in path {
        match dir.get_mut(part)? {
            Node::Dir(children) => dir = children,
            Node::File(_) => return None,
        }
    }
    Some(dir)
}

// ─── Per-connection session ──────────────────────────────────────────

enum DataTarget {
    Passive(TcpListener),
    Active(SocketAddr),
}

#[derive(Default)]
struct Session {
    user: Option<String>,
    logged_in: bool,
    cwd: Vec<String>,
    data: Option<DataTarget>,
}

enum Action {
    Reply(String),
    Stall,
    Quit,
    SendData(Vec<u8>),
    ReceiveFile(String),
}

async fn reply(wr: &mut OwnedWriteHalf, text: &str) -> io::Result<()> {
    wr.write_all(text.as_bytes()).await
}

async fn open_data(session: &mut Session) -> io::Result<TcpStream> {
    match session.data.take() {
        Some(DataTarget::Passive(listener)) => Ok(listener.accept().await?.0),
        Some(DataTarget::Active(addr)) => TcpStream::connect(addr).await,
        None => Err(io::Error::new(io::ErrorKind::NotConnected, "no data channel")),
    }
}

fn take_data_fault(state: &Arc<Mutex<State>>, verb: &str) -> Option<DataFault> {
    let mut st = state.lock().unwrap();
    match &st.data_fault {
        Some((v, _)) if v == verb => st.data_fault.take().map(|(_, f)| f),
        _ => None,
    }
}

#[allow(deprecated)]
fn reset_on_close(stream: &TcpStream) -> io::Result<()> {
    stream.set_linger(Some(Duration::ZERO))
}

async fn serve(stream: TcpStream, state: Arc<Mutex<State>>) -> io::Result<()> {
    let (rd, mut wr) = stream.into_split();
    let mut rd = BufReader::new(rd);
    reply(&mut wr, "220-Welcome to the stub FTP server\r\n220 Ready.\r\n").await?;

    let mut session = Session::default();
    let mut line = String::new();
    loop {
        line.clear();
        if rd.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let cmd = line.trim_end_matches(&['\r', '\n'][..]).to_string();
        let (verb, arg) = match cmd.split_once(' ') {
            Some((v, a)) => (v.to_string(), a.to_string()),
            None => (cmd.clone(), String::new()),
        };

        if verb == "PASV" {
            let listener = TcpListener::bind("127.0.0.1:0").await?;
            let port = listener.local_addr()?.port();
            session.data = Some(DataTarget::Passive(listener));
            state.lock().unwrap().log.push(cmd.clone());
            let text = format!(
                "227 Entering Passive Mode (127,0,0,1,{},{}).\r\n",
                port / 256,
                port % 256
            );
            reply(&mut wr, &text).await?;
            continue;
        }

        let action = handle(&state, &mut session, &cmd, &verb, &arg);
        match action {
            Action::Reply(text) => reply(&mut wr, &text).await?,
            Action::Stall => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                return Ok(());
            }
            Action::Quit => {
                reply(&mut wr, "221 Goodbye.\r\n").await?;
                return Ok(());
            }
            Action::SendData(data) => {
                if session.data.is_none() {
                    reply(&mut wr, "425 Use PORT or PASV first.\r\n").await?;
                    continue;
                }
                reply(&mut wr, "150 Opening BINARY mode data connection.\r\n").await?;
                let mut data_stream = open_data(&mut session).await?;
                match take_data_fault(&state, &verb) {
                    Some(DataFault::Stall) => {
                        data_stream.write_all(&data[..data.len().min(5)]).await?;
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        return Ok(());
                    }
                    Some(DataFault::Reset) => {
                        data_stream.write_all(&data[..data.len().min(5)]).await?;
                        reset_on_close(&data_stream)?;
                        drop(data_stream);
                        reply(&mut wr, "426 Connection closed; transfer aborted.\r\n").await?;
                        continue;
                    }
                    None => {}
                }
                data_stream.write_all(&data).await?;
                data_stream.shutdown().await?;
                drop(data_stream);
                reply(&mut wr, "226 Transfer complete.\r\n").await?;
            }
            Action::ReceiveFile(name) => {
                if session.data.is_none() {
                    reply(&mut wr, "425 Use PORT or PASV first.\r\n").await?;
                    continue;
                }
                reply(&mut wr, "150 Ok to send data.\r\n").await?;
                let mut data_stream = open_data(&mut session).await?;
                let mut data = Vec::new();
                data_stream.read_to_end(&mut data).await?;
                {
                    let mut st = state.lock().unwrap();
                    if let Some(dir) = lookup_dir_mut(&mut st.root, &session.cwd) {
                        dir.insert(name, Node::File(data));
                    }
                }
                reply(&mut wr, "226 Transfer complete.\r\n").await?;
            }
        }
    }
}

/// Everything that does not need to await: bookkeeping and reply choice.
fn handle(state: &Arc<Mutex<State>>, session: &mut Session, cmd: &str, verb: &str, arg: &str) -> Action {
    let mut st = state.lock().unwrap();
    st.log.push(cmd.to_string());

    if st.stall_on.as_deref() == Some(verb) {
        st.stall_on = None;
        return Action::Stall;
    }
    if let Some(canned) = st.canned.remove(verb) {
        return Action::Reply(format!("{}\r\n", canned));
    }

    match verb {
        "USER" => {
            session.user = Some(arg.to_string());
            return Action::Reply("331 Please specify the password.\r\n".into());
        }
        "PASS" => {
            let ok = session
                .user
                .as_ref()
                .and_then(|u| st.users.get(u))
                .map(|p| p == arg)
                .unwrap_or(false);
            session.logged_in = ok;
            return Action::Reply(if ok {
                "230 Login successful.\r\n".into()
            } else {
                "530 Login incorrect.\r\n".into()
            });
        }
        "QUIT" => return Action::Quit,
        _ => {}
    }

    if !session.logged_in {
        return Action::Reply("530 Please login with USER and PASS.\r\n".into());
    }

    match verb {
        "PORT" => {
            let nums: Vec<u16> = arg.split(',').filter_map(|n| n.parse().ok()).collect();
            if nums.len() != 6 {
                return Action::Reply("501 Illegal PORT command.\r\n".into());
            }
            let ip = format!("{}.{}.{}.{}", nums[0], nums[1], nums[2], nums[3]);
            let port = nums[4] * 256 + nums[5];
            match format!("{}:{}", ip, port).parse() {
                Ok(addr) => {
                    session.data = Some(DataTarget::Active(addr));
                    Action::Reply("200 PORT command successful.\r\n".into())
                }
                Err(_) => Action::Reply("501 Illegal PORT command.\r\n".into()),
            }
        }
        "TYPE" => Action::Reply("200 Switching to Binary mode.\r\n".into()),
        "CWD" => {
            let mut target = if arg.starts_with('/') {
                Vec::new()
            } else {
                session.cwd.clone()
            };
            for part in arg.split('/').filter(|p| !p.is_empty() && *p != ".") {
                if part == ".." {
                    target.pop();
                } else {
                    target.push(part.to_string());
                }
            }
            if lookup_dir(&st.root, &target).is_some() {
                session.cwd = target;
                Action::Reply("250 Directory successfully changed.\r\n".into())
            } else {
                Action::Reply("550 Failed to change directory.\r\n".into())
            }
        }
        "MKD" => {
            let cwd = session.cwd.clone();
            match lookup_dir_mut(&mut st.root, &cwd) {
                Some(dir) if !dir.contains_key(arg) => {
                    dir.insert(arg.to_string(), Node::Dir(BTreeMap::new()));
                    Action::Reply(format!("257 \"{}\" created\r\n", arg))
                }
                _ => Action::Reply("550 Create directory operation failed.\r\n".into()),
            }
        }
        "SIZE" => match lookup_dir(&st.root, &session.cwd).and_then(|d| d.get(arg)) {
            Some(Node::File(data)) => Action::Reply(format!("213 {}\r\n", data.len())),
            _ => Action::Reply("550 Could not get file size.\r\n".into()),
        },
        "LIST" => {
            let mut path = session.cwd.clone();
            if !arg.is_empty() {
                path.push(arg.to_string());
            }
            match lookup_dir(&st.root, &path) {
                Some(dir) => {
                    let listing: String = dir
                        .iter()
                        .map(|(name, node)| match node {
                            Node::Dir(_) => format!("drwxr-xr-x 2 ftp ftp 0 Jan 01 00:00 {}\r\n", name),
                            Node::File(d) => {
                                format!("-rw-r--r-- 1 ftp ftp {} Jan 01 00:00 {}\r\n", d.len(), name)
                            }
                        })
                        .collect();
                    Action::SendData(listing.into_bytes())
                }
                None => Action::Reply("550 Failed to open directory.\r\n".into()),
            }
        }
        "NLST" => match lookup_dir(&st.root, &session.cwd) {
            Some(dir) => {
                let names: String = dir.keys().map(|n| format!("{}\r\n", n)).collect();
                Action::SendData(names.into_bytes())
            }
            None => Action::Reply("550 Failed to open directory.\r\n".into()),
        },
        "RETR" => match lookup_dir(&st.root, &session.cwd).and_then(|d| d.get(arg)) {
            Some(Node::File(data)) => Action::SendData(data.clone()),
            _ => Action::Reply("550 Failed to open file.\r\n".into()),
        },
        "STOR" => Action::ReceiveFile(arg.to_string()),
        _ => Action::Reply("502 Command not implemented.\r\n".into()),
    }
}
