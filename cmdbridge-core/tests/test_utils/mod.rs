// File: cmdbridge-core/tests/test_utils/mod.rs
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, ReadHalf, WriteHalf, duplex, split};
use tokio::sync::mpsc;

use cmdbridge_core::Error;
use cmdbridge_core::eventbus::{ChatEvent, EventBus};
use cmdbridge_core::models::{CommandDeclaration, CommandInvocation, CommandMode, ParamKind};
use cmdbridge_core::platforms::twitch_irc::{ChatCredentials, SessionConfig};
use cmdbridge_core::platforms::{ChatStream, Connector};
use cmdbridge_core::services::{CommandRegistry, Dispatcher};
use cmdbridge_core::traits::CommandHandler;

pub const JOIN_LINE: &str = ":danqzq!danqzq@danqzq.tmi.twitch.tv JOIN #danqzq";

/// A chat line from `danqzq` carrying `body`.
pub fn privmsg(body: &str) -> String {
    format!(
        "@badge-info=;badges=broadcaster/1;color=#1E90FF;display-name=danqzq;emotes=;id=abc;mod=0;room-id=1;subscriber=0;turbo=0;user-id=1;user-type= :danqzq!danqzq@danqzq.tmi.twitch.tv PRIVMSG #danqzq :{}",
        body
    )
}

/// Records every invocation it receives.
#[derive(Default)]
pub struct Recorder {
    pub calls: Mutex<Vec<CommandInvocation>>,
}

impl Recorder {
    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<CommandInvocation> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CommandHandler for Recorder {
    async fn handle(&self, invocation: &CommandInvocation) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(invocation.clone());
        Ok(())
    }
}

pub struct Failing;

#[async_trait]
impl CommandHandler for Failing {
    async fn handle(&self, _invocation: &CommandInvocation) -> anyhow::Result<()> {
        Err(anyhow!("boom"))
    }
}

pub struct Panicking;

#[async_trait]
impl CommandHandler for Panicking {
    async fn handle(&self, _invocation: &CommandInvocation) -> anyhow::Result<()> {
        panic!("handler exploded");
    }
}

/// `join`/`j` and `give` on the Player host, `say` on the Chat host.
pub fn declarations() -> Vec<CommandDeclaration> {
    vec![
        CommandDeclaration::new("Player", "join")
            .alias("j")
            .param(ParamKind::User)
            .cooldown(5.0),
        CommandDeclaration::new("Player", "give")
            .param(ParamKind::User)
            .param(ParamKind::Int),
        CommandDeclaration::new("Chat", "say").param(ParamKind::String),
    ]
}

pub fn dispatcher(mode: CommandMode, bus: &EventBus) -> Dispatcher {
    let registry = CommandRegistry::build(declarations()).unwrap();
    Dispatcher::new(registry, mode, "!", bus.clone())
}

pub fn credentials() -> ChatCredentials {
    ChatCredentials {
        username: "DanQZQ".into(),
        channel: "DanQZQ".into(),
        token: "abc".into(),
    }
}

pub fn session_config(connect_timeout: Duration) -> SessionConfig {
    SessionConfig {
        server_addr: "irc.test:6667".into(),
        credentials: credentials(),
        connect_timeout,
        tick_interval: Duration::from_millis(5),
    }
}

/// Every connect hands the test the server end of a fresh in-memory pipe.
pub struct DuplexConnector {
    servers: mpsc::UnboundedSender<DuplexStream>,
}

impl DuplexConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { servers: tx }), rx)
    }
}

#[async_trait]
impl Connector for DuplexConnector {
    async fn connect(&self, _addr: &str) -> Result<Box<dyn ChatStream>, Error> {
        let (client, server) = duplex(8 * 1024);
        self.servers.send(server).map_err(|_| Error::NotConnected)?;
        Ok(Box::new(client))
    }
}

pub struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    async fn connect(&self, _addr: &str) -> Result<Box<dyn ChatStream>, Error> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        )))
    }
}

/// Accepts every connect, then hangs up before saying anything.
#[derive(Default)]
pub struct HangupConnector {
    attempts: AtomicUsize,
}

impl HangupConnector {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for HangupConnector {
    async fn connect(&self, _addr: &str) -> Result<Box<dyn ChatStream>, Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let (client, server) = duplex(1024);
        drop(server);
        Ok(Box::new(client))
    }
}

/// The server's view of one connection.
pub struct FakeServer {
    pub reader: BufReader<ReadHalf<DuplexStream>>,
    pub writer: WriteHalf<DuplexStream>,
}

impl FakeServer {
    pub fn new(stream: DuplexStream) -> Self {
        let (r, w) = split(stream);
        Self {
            reader: BufReader::new(r),
            writer: w,
        }
    }

    /// Next line the client wrote, without the line ending.
    pub async fn read_line(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
            .await
            .expect("client did not write in time")
            .expect("read failed");
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    pub async fn read_lines(&mut self, n: usize) -> Vec<String> {
        let mut lines = Vec::with_capacity(n);
        for _ in 0..n {
            lines.push(self.read_line().await);
        }
        lines
    }

    pub async fn send(&mut self, line: &str) {
        use tokio::io::AsyncWriteExt;
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }
}

/// Drains whatever is already queued on a bus subscription.
pub fn drain(rx: &mut mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut out = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        out.push(evt);
    }
    out
}
