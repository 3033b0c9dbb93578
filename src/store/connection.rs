//! Store connection capability and its RESP client implementation.
//!
//! The sampling engine only depends on [`StoreConnection`]. Timeouts are
//! applied here, around each round trip, never inside the sampler.

use super::commands::Command;
use super::resp::{parse_reply, FrameScanner, RespValue};
use crate::error::StoreError;
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Request/response access to a key-value store.
#[async_trait]
pub trait StoreConnection: Send {
    /// Send one command and wait for its reply.
    ///
    /// An error reply from the store is returned as [`StoreError::Server`].
    async fn execute(&mut self, command: Command) -> Result<RespValue, StoreError>;

    /// Send every command in one batch and read their replies in order.
    ///
    /// All replies are drained before any error reply is surfaced.
    async fn pipeline(&mut self, commands: Vec<Command>) -> Result<Vec<RespValue>, StoreError>;
}

/// Connection timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Limit on establishing the TCP connection.
    pub connect_timeout: Option<Duration>,
    /// Limit on each request/response round trip.
    pub command_timeout: Option<Duration>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            command_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// A RESP2 client over any async byte stream.
pub struct RespConnection<S> {
    stream: S,
    read_buf: BytesMut,
    write_buf: BytesMut,
    scanner: FrameScanner,
    command_timeout: Option<Duration>,
}

impl RespConnection<TcpStream> {
    /// Dial `address` (`host:port`).
    pub async fn connect(address: &str, settings: &ConnectionSettings) -> Result<Self, StoreError> {
        debug!("Connecting to {}", address);

        let stream = with_timeout(settings.connect_timeout, async {
            TcpStream::connect(address)
                .await
                .map_err(|source| StoreError::Connect {
                    address: address.to_string(),
                    source,
                })
        })
        .await?;
        stream.set_nodelay(true)?;

        Ok(Self::new(stream, settings.command_timeout))
    }
}

impl<S> RespConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, command_timeout: Option<Duration>) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(16 * 1024),
            write_buf: BytesMut::with_capacity(1024),
            scanner: FrameScanner::new(),
            command_timeout,
        }
    }

    async fn round_trip(&mut self, commands: &[Command]) -> Result<Vec<RespValue>, StoreError> {
        self.write_buf.clear();
        for command in commands {
            command.encode(&mut self.write_buf);
        }
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;

        let mut replies = Vec::with_capacity(commands.len());
        for _ in commands {
            replies.push(self.read_reply().await?);
        }
        Ok(replies)
    }

    /// Read until one whole reply is buffered, then parse it once.
    async fn read_reply(&mut self) -> Result<RespValue, StoreError> {
        loop {
            if let Some(len) = self.scanner.scan(&self.read_buf)? {
                let (value, used) = parse_reply(&self.read_buf[..len])?.ok_or_else(|| {
                    StoreError::Protocol("reply shorter than its framing".to_string())
                })?;
                self.read_buf.advance(used);
                return Ok(value);
            }
            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(StoreError::Closed);
            }
        }
    }
}

#[async_trait]
impl<S> StoreConnection for RespConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn execute(&mut self, command: Command) -> Result<RespValue, StoreError> {
        let timeout = self.command_timeout;
        let mut replies = with_timeout(timeout, self.round_trip(std::slice::from_ref(&command))).await?;
        match replies.pop() {
            Some(RespValue::Error(message)) => Err(StoreError::Server(message)),
            Some(reply) => Ok(reply),
            None => Err(StoreError::Closed),
        }
    }

    async fn pipeline(&mut self, commands: Vec<Command>) -> Result<Vec<RespValue>, StoreError> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let timeout = self.command_timeout;
        let replies = with_timeout(timeout, self.round_trip(&commands)).await?;
        if let Some(RespValue::Error(message)) =
            replies.iter().find(|r| matches!(r, RespValue::Error(_)))
        {
            return Err(StoreError::Server(message.clone()));
        }
        Ok(replies)
    }
}

async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StoreError::Timeout(limit))?,
        None => fut.await,
    }
}
