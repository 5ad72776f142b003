// File: src/platforms/mod.rs

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::Error;

/// Where the chat session is in its connect/join cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// Socket requested; no framing sent yet, or the connect failed and the
    /// attempt is waiting for its timeout.
    Connecting,
    /// Framing sent, waiting for the server's JOIN.
    Joining,
    Joined,
}

/// A byte stream the session can speak IRC over.
pub trait ChatStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> ChatStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Opens the transport for one connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, addr: &str) -> Result<Box<dyn ChatStream>, Error>;
}

/// Plain TCP. TLS, if any, is the network's business.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: &str) -> Result<Box<dyn ChatStream>, Error> {
        debug!("(TcpConnector) connecting to {}", addr);
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

pub mod twitch_irc;
