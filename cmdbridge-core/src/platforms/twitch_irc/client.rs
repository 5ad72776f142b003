//! src/platforms/twitch_irc/client.rs

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, split};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub const CAP_REQ_TAGS: &str = "CAP REQ :twitch.tv/tags";
pub const USER_MESSAGE_CODE: &str = "PRIVMSG";
pub const USER_JOIN_CODE: &str = "JOIN";
pub const PING_PREFIX: &str = "PING ";

/// Minimal split of an IRC line, used to classify what the server sent.
#[derive(Debug, Clone, PartialEq)]
pub struct IrcLine {
    pub tags: Option<String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl IrcLine {
    pub fn parse(line: &str) -> Self {
        let mut rest = line.trim();
        let mut tags = None;
        let mut prefix = None;
        let mut params = Vec::new();
        let mut trailing = None;

        // 1) extract tags
        if rest.starts_with('@') {
            match rest.split_once(' ') {
                Some((t, r)) => {
                    tags = Some(t.to_string());
                    rest = r.trim_start();
                }
                None => {
                    return Self {
                        tags: Some(rest.to_string()),
                        prefix: None,
                        command: String::new(),
                        params,
                        trailing,
                    };
                }
            }
        }

        // 2) extract prefix
        if let Some(stripped) = rest.strip_prefix(':') {
            match stripped.split_once(' ') {
                Some((p, r)) => {
                    prefix = Some(p.to_string());
                    rest = r.trim_start();
                }
                None => {
                    return Self {
                        tags,
                        prefix: Some(stripped.to_string()),
                        command: String::new(),
                        params,
                        trailing,
                    };
                }
            }
        }

        // 3) command
        let (command, after) = rest.split_once(' ').unwrap_or((rest, ""));
        let command = command.to_uppercase();

        // 4) middle params, then trailing after " :"
        let after = after.trim_start();
        if let Some(t) = after.strip_prefix(':') {
            trailing = Some(t.to_string());
        } else if let Some((before, t)) = after.split_once(" :") {
            trailing = Some(t.to_string());
            params.extend(before.split_whitespace().map(String::from));
        } else {
            params.extend(after.split_whitespace().map(String::from));
        }

        Self { tags, prefix, command, params, trailing }
    }

    /// Nick portion of `nick!user@host`.
    pub fn nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|p| p.split_once('!').map_or(p, |(nick, _)| nick))
    }
}

pub fn pass_line(token: &str) -> String {
    let bare = token.strip_prefix("oauth:").unwrap_or(token);
    format!("PASS oauth:{}", bare)
}

pub fn nick_line(username: &str) -> String {
    format!("NICK {}", username.to_lowercase())
}

pub fn join_line(channel: &str) -> String {
    format!("JOIN #{}", channel.to_lowercase())
}

pub fn privmsg_line(channel: &str, text: &str) -> String {
    format!("PRIVMSG #{} :{}", channel.to_lowercase(), text)
}

/// `PING <payload>` -> `PONG <payload>`. None if the line is not a keepalive.
pub fn pong_for(line: &str) -> Option<String> {
    line.strip_prefix(PING_PREFIX)
        .map(|payload| format!("PONG {}", payload))
}

/// What the reader task hands back to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Line(String),
    Closed,
}

/// One open chat socket: a reader task feeding `incoming` and a writer task
/// draining the outgoing queue. Dropping the link aborts both tasks, which
/// drops the stream halves and closes the socket.
pub struct IrcLink {
    raw_outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<LinkEvent>,
    read_task: JoinHandle<()>,
    write_task: JoinHandle<()>,
}

impl IrcLink {
    pub fn open<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = split(stream);

        let (tx_outgoing, rx_outgoing) = mpsc::unbounded_channel::<String>();
        let (tx_incoming, rx_incoming) = mpsc::unbounded_channel::<LinkEvent>();

        let write_task = tokio::spawn(Self::writer_loop(write_half, rx_outgoing));
        let read_task = tokio::spawn(Self::reader_loop(read_half, tx_incoming));

        Self {
            raw_outgoing: tx_outgoing,
            incoming: rx_incoming,
            read_task,
            write_task,
        }
    }

    async fn reader_loop<R>(read_half: R, tx_incoming: mpsc::UnboundedSender<LinkEvent>)
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(read_half);
        let mut line_buffer = Vec::new();

        loop {
            line_buffer.clear();
            match reader.read_until(b'\n', &mut line_buffer).await {
                Ok(0) => {
                    info!("(IrcLink) read_loop => EOF");
                    break;
                }
                Ok(_) => {
                    // invalid UTF-8 becomes U+FFFD rather than killing the link
                    let decoded = String::from_utf8_lossy(&line_buffer);
                    let line = decoded.trim_end_matches(['\r', '\n']);
                    if line.is_empty() {
                        continue;
                    }
                    debug!("<< {}", line);
                    if tx_incoming.send(LinkEvent::Line(line.to_string())).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!("(IrcLink) read error => {:?}", e);
                    break;
                }
            }
        }

        let _ = tx_incoming.send(LinkEvent::Closed);
        info!("(IrcLink) reader_loop ended.");
    }

    async fn writer_loop<W>(write_half: W, mut rx_outgoing: mpsc::UnboundedReceiver<String>)
    where
        W: AsyncWrite + Unpin,
    {
        let mut writer = BufWriter::new(write_half);

        while let Some(line) = rx_outgoing.recv().await {
            debug!(">> {}", redact(&line));
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                error!("writer error => {:?}", e);
                break;
            }
            if let Err(e) = writer.write_all(b"\r\n").await {
                error!("writer error => {:?}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                error!("writer flush error => {:?}", e);
                break;
            }
        }

        let _ = writer.shutdown().await;
        info!("(IrcLink) writer_loop ended.");
    }

    /// Queues a line; false once the writer has stopped.
    pub fn send_raw_line(&self, line: &str) -> bool {
        self.raw_outgoing.send(line.to_string()).is_ok()
    }

    pub fn is_open(&self) -> bool {
        !self.raw_outgoing.is_closed()
    }

    /// Aborts the read/write tasks.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for IrcLink {
    fn drop(&mut self) {
        self.read_task.abort();
        self.write_task.abort();
    }
}

fn redact(line: &str) -> &str {
    if line.starts_with("PASS ") {
        "PASS oauth:***"
    } else {
        line
    }
}
