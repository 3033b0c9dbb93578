//! The commands the sampler issues, and typed views of their replies.

use super::resp::{encode_command, RespValue};
use crate::error::StoreError;
use bytes::{Bytes, BytesMut};

/// A command name plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: &'static str,
    args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Append the wire encoding of this command to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.name.as_bytes());
        parts.extend(self.args.iter().map(|a| a.as_ref()));
        encode_command(&parts, buf);
    }
}

pub fn random_key() -> Command {
    Command::new("RANDOMKEY")
}

pub fn type_of(key: impl AsRef<[u8]>) -> Command {
    Command::new("TYPE").arg(key)
}

pub fn db_size() -> Command {
    Command::new("DBSIZE")
}

pub fn get(key: impl AsRef<[u8]>) -> Command {
    Command::new("GET").arg(key)
}

pub fn llen(key: impl AsRef<[u8]>) -> Command {
    Command::new("LLEN").arg(key)
}

pub fn lrange(key: impl AsRef<[u8]>, start: i64, stop: i64) -> Command {
    Command::new("LRANGE")
        .arg(key)
        .arg(start.to_string())
        .arg(stop.to_string())
}

pub fn scard(key: impl AsRef<[u8]>) -> Command {
    Command::new("SCARD").arg(key)
}

pub fn srandmember(key: impl AsRef<[u8]>) -> Command {
    Command::new("SRANDMEMBER").arg(key)
}

pub fn zcard(key: impl AsRef<[u8]>) -> Command {
    Command::new("ZCARD").arg(key)
}

pub fn zrange(key: impl AsRef<[u8]>, start: i64, stop: i64) -> Command {
    Command::new("ZRANGE")
        .arg(key)
        .arg(start.to_string())
        .arg(stop.to_string())
}

pub fn hlen(key: impl AsRef<[u8]>) -> Command {
    Command::new("HLEN").arg(key)
}

pub fn hkeys(key: impl AsRef<[u8]>) -> Command {
    Command::new("HKEYS").arg(key)
}

pub fn hget(key: impl AsRef<[u8]>, field: impl AsRef<[u8]>) -> Command {
    Command::new("HGET").arg(key).arg(field)
}

fn unexpected(command: &str, expected: &'static str, got: &RespValue) -> StoreError {
    match got {
        RespValue::Error(e) => StoreError::Server(e.clone()),
        other => StoreError::UnexpectedReply {
            command: command.to_string(),
            expected,
            got: other.describe(),
        },
    }
}

/// A non-negative integer reply (lengths, cardinalities, DBSIZE).
pub fn into_count(command: &str, reply: RespValue) -> Result<u64, StoreError> {
    match reply {
        RespValue::Integer(n) if n >= 0 => Ok(n as u64),
        other => Err(unexpected(command, "non-negative integer", &other)),
    }
}

/// A non-nil bulk string reply.
pub fn into_bulk(command: &str, reply: RespValue) -> Result<Bytes, StoreError> {
    match reply {
        RespValue::Bulk(Some(data)) => Ok(data),
        other => Err(unexpected(command, "bulk string", &other)),
    }
}

/// A bulk string reply that may be nil.
pub fn into_optional_bulk(command: &str, reply: RespValue) -> Result<Option<Bytes>, StoreError> {
    match reply {
        RespValue::Bulk(data) => Ok(data),
        other => Err(unexpected(command, "bulk string or nil", &other)),
    }
}

/// An array of non-nil bulk strings.
pub fn into_bulk_list(command: &str, reply: RespValue) -> Result<Vec<Bytes>, StoreError> {
    match reply {
        RespValue::Array(Some(items)) => items
            .into_iter()
            .map(|item| into_bulk(command, item))
            .collect(),
        other => Err(unexpected(command, "array of bulk strings", &other)),
    }
}

/// A status reply such as the answer to `TYPE`.
pub fn into_status(command: &str, reply: RespValue) -> Result<String, StoreError> {
    match reply {
        RespValue::Simple(s) => Ok(s),
        RespValue::Bulk(Some(data)) => Ok(String::from_utf8_lossy(&data).into_owned()),
        other => Err(unexpected(command, "status", &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_encoding() {
        let mut buf = BytesMut::new();
        hget("user:1", b"email").encode(&mut buf);
        assert_eq!(
            &buf[..],
            b"*3\r\n$4\r\nHGET\r\n$6\r\nuser:1\r\n$5\r\nemail\r\n"
        );

        let cmd = lrange("q", 0, 0);
        assert_eq!(cmd.name(), "LRANGE");
        assert_eq!(cmd.args().len(), 3);
    }

    #[test]
    fn test_into_count() {
        assert_eq!(into_count("LLEN", RespValue::Integer(3)).unwrap(), 3);
        assert!(matches!(
            into_count("LLEN", RespValue::Integer(-1)),
            Err(StoreError::UnexpectedReply { .. })
        ));
        assert!(matches!(
            into_count("LLEN", RespValue::Error("WRONGTYPE".to_string())),
            Err(StoreError::Server(_))
        ));
    }

    #[test]
    fn test_into_bulk_variants() {
        let bulk = RespValue::Bulk(Some(Bytes::from_static(b"v")));
        assert_eq!(into_bulk("GET", bulk.clone()).unwrap(), Bytes::from_static(b"v"));
        assert!(into_bulk("GET", RespValue::Bulk(None)).is_err());
        assert_eq!(into_optional_bulk("SRANDMEMBER", RespValue::Bulk(None)).unwrap(), None);

        let list = RespValue::Array(Some(vec![bulk]));
        assert_eq!(into_bulk_list("HKEYS", list).unwrap().len(), 1);
        assert!(into_bulk_list("HKEYS", RespValue::Array(None)).is_err());
    }

    #[test]
    fn test_into_status() {
        assert_eq!(into_status("TYPE", RespValue::Simple("zset".into())).unwrap(), "zset");
        assert!(into_status("TYPE", RespValue::Integer(1)).is_err());
    }
}
