//! In-memory store used by the sampler tests.
//!
//! `RANDOMKEY` walks a scripted key sequence so runs are reproducible, and
//! every round trip is logged so tests can assert on pipelining.

use super::commands::Command;
use super::connection::StoreConnection;
use super::resp::{parse_reply, RespValue};
use crate::error::StoreError;
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Command names the test server understands.
const KNOWN_COMMANDS: [&str; 13] = [
    "RANDOMKEY", "TYPE", "DBSIZE", "GET", "LLEN", "LRANGE", "SCARD", "SRANDMEMBER", "ZCARD",
    "ZRANGE", "HLEN", "HKEYS", "HGET",
];

#[derive(Debug, Clone)]
pub enum MemValue {
    Str(Vec<u8>),
    List(Vec<Vec<u8>>),
    Set(Vec<Vec<u8>>),
    /// Members in rank order.
    ZSet(Vec<Vec<u8>>),
    Hash(Vec<(Vec<u8>, Vec<u8>)>),
    /// A type the sampler does not understand, e.g. `stream`.
    Other(&'static str),
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    data: HashMap<String, MemValue>,
    script: Vec<String>,
    cursor: usize,
    fail_on: Option<&'static str>,
    /// Command names of each round trip, in order.
    pub round_trips: Vec<Vec<&'static str>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: MemValue) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn string(self, key: &str, value: &str) -> Self {
        self.with(key, MemValue::Str(value.as_bytes().to_vec()))
    }

    pub fn list(self, key: &str, items: &[&str]) -> Self {
        self.with(key, MemValue::List(to_bytes(items)))
    }

    pub fn set(self, key: &str, members: &[&str]) -> Self {
        self.with(key, MemValue::Set(to_bytes(members)))
    }

    pub fn zset(self, key: &str, members: &[&str]) -> Self {
        self.with(key, MemValue::ZSet(to_bytes(members)))
    }

    pub fn hash(self, key: &str, fields: &[(&str, &str)]) -> Self {
        let pairs = fields
            .iter()
            .map(|(f, v)| (f.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect();
        self.with(key, MemValue::Hash(pairs))
    }

    /// Keys returned by successive `RANDOMKEY` calls, cycling.
    pub fn script(mut self, keys: &[&str]) -> Self {
        self.script = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Answer every `name` command with an error reply.
    pub fn fail_on(mut self, name: &'static str) -> Self {
        self.fail_on = Some(name);
        self
    }

    pub fn commands_issued(&self, name: &str) -> usize {
        self.round_trips.iter().flatten().filter(|c| **c == name).count()
    }

    fn reply(&mut self, command: &Command) -> RespValue {
        if self.fail_on == Some(command.name()) {
            return RespValue::Error(format!("ERR injected failure for {}", command.name()));
        }

        let key = command
            .args()
            .first()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default();

        match (command.name(), self.data.get(&key)) {
            ("RANDOMKEY", _) => {
                if self.script.is_empty() {
                    return RespValue::Bulk(None);
                }
                let next = self.script[self.cursor % self.script.len()].clone();
                self.cursor += 1;
                bulk(next.as_bytes())
            }
            ("DBSIZE", _) => RespValue::Integer(self.data.len() as i64),
            ("TYPE", value) => RespValue::Simple(
                match value {
                    None => "none",
                    Some(MemValue::Str(_)) => "string",
                    Some(MemValue::List(_)) => "list",
                    Some(MemValue::Set(_)) => "set",
                    Some(MemValue::ZSet(_)) => "zset",
                    Some(MemValue::Hash(_)) => "hash",
                    Some(MemValue::Other(name)) => *name,
                }
                .to_string(),
            ),
            ("GET", Some(MemValue::Str(v))) => bulk(v),
            ("GET", None) => RespValue::Bulk(None),
            ("LLEN", Some(MemValue::List(items)))
            | ("SCARD", Some(MemValue::Set(items)))
            | ("ZCARD", Some(MemValue::ZSet(items))) => RespValue::Integer(items.len() as i64),
            ("LRANGE", Some(MemValue::List(items))) | ("ZRANGE", Some(MemValue::ZSet(items))) => {
                array(items.iter().take(1).map(|i| i.as_slice()))
            }
            ("SRANDMEMBER", Some(MemValue::Set(items))) => match items.first() {
                Some(m) => bulk(m),
                None => RespValue::Bulk(None),
            },
            ("HLEN", Some(MemValue::Hash(pairs))) => RespValue::Integer(pairs.len() as i64),
            ("HKEYS", Some(MemValue::Hash(pairs))) => array(pairs.iter().map(|(f, _)| f.as_slice())),
            ("HGET", Some(MemValue::Hash(pairs))) => {
                let field = command.args().get(1).cloned().unwrap_or_default();
                match pairs.iter().find(|(f, _)| f.as_slice() == &field[..]) {
                    Some((_, v)) => bulk(v),
                    None => RespValue::Bulk(None),
                }
            }
            (name, _) => RespValue::Error(format!(
                "WRONGTYPE or unsupported command {} for key {}",
                name, key
            )),
        }
    }
}

#[async_trait]
impl StoreConnection for MemoryStore {
    async fn execute(&mut self, command: Command) -> Result<RespValue, StoreError> {
        self.round_trips.push(vec![command.name()]);
        match self.reply(&command) {
            RespValue::Error(e) => Err(StoreError::Server(e)),
            reply => Ok(reply),
        }
    }

    async fn pipeline(&mut self, commands: Vec<Command>) -> Result<Vec<RespValue>, StoreError> {
        self.round_trips
            .push(commands.iter().map(|c| c.name()).collect());
        let replies: Vec<RespValue> = commands.iter().map(|c| self.reply(c)).collect();
        if let Some(RespValue::Error(e)) = replies.iter().find(|r| matches!(r, RespValue::Error(_))) {
            return Err(StoreError::Server(e.clone()));
        }
        Ok(replies)
    }
}

fn to_bytes(items: &[&str]) -> Vec<Vec<u8>> {
    items.iter().map(|i| i.as_bytes().to_vec()).collect()
}

fn bulk(data: &[u8]) -> RespValue {
    RespValue::Bulk(Some(Bytes::copy_from_slice(data)))
}

fn array<'a>(items: impl Iterator<Item = &'a [u8]>) -> RespValue {
    RespValue::Array(Some(items.map(bulk).collect()))
}

/// Serve `store` over RESP on `listener` until the listener fails.
pub async fn serve(listener: TcpListener, store: MemoryStore) {
    let store = Arc::new(Mutex::new(store));
    while let Ok((mut socket, _)) = listener.accept().await {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut buf = BytesMut::new();
            loop {
                while let Ok(Some((request, used))) = parse_reply(&buf) {
                    buf.advance(used);
                    let reply = match to_command(request) {
                        Some(command) => store.lock().await.reply(&command),
                        None => RespValue::Error("ERR unknown command".to_string()),
                    };
                    let mut out = BytesMut::new();
                    encode_value(&reply, &mut out);
                    if socket.write_all(&out).await.is_err() {
                        return;
                    }
                }
                match socket.read_buf(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        });
    }
}

fn to_command(request: RespValue) -> Option<Command> {
    let RespValue::Array(Some(parts)) = request else {
        return None;
    };
    let mut parts = parts.into_iter().map(|p| match p {
        RespValue::Bulk(Some(b)) => Some(b),
        _ => None,
    });
    let name = parts.next()??;
    let name = String::from_utf8_lossy(&name).to_ascii_uppercase();
    let name = KNOWN_COMMANDS.iter().copied().find(|k| *k == name)?;
    let mut command = Command::new(name);
    for arg in parts {
        command = command.arg(arg?);
    }
    Some(command)
}

fn encode_value(value: &RespValue, out: &mut BytesMut) {
    match value {
        RespValue::Simple(s) => out.put_slice(format!("+{}\r\n", s).as_bytes()),
        RespValue::Error(e) => out.put_slice(format!("-{}\r\n", e).as_bytes()),
        RespValue::Integer(n) => out.put_slice(format!(":{}\r\n", n).as_bytes()),
        RespValue::Bulk(None) => out.put_slice(b"$-1\r\n"),
        RespValue::Bulk(Some(b)) => {
            out.put_slice(format!("${}\r\n", b.len()).as_bytes());
            out.put_slice(b);
            out.put_slice(b"\r\n");
        }
        RespValue::Array(None) => out.put_slice(b"*-1\r\n"),
        RespValue::Array(Some(items)) => {
            out.put_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                encode_value(item, out);
            }
        }
    }
}
