//! RESP2 framing: reply values, command encoding and an incremental
//! reply parser.

use crate::error::StoreError;
use bytes::{BufMut, Bytes, BytesMut};

/// One reply from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    /// `None` is the nil bulk string.
    Bulk(Option<Bytes>),
    /// `None` is the nil array.
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            RespValue::Simple(s) => format!("status {:?}", s),
            RespValue::Error(e) => format!("error {:?}", e),
            RespValue::Integer(n) => format!("integer {}", n),
            RespValue::Bulk(None) => "nil".to_string(),
            RespValue::Bulk(Some(b)) => format!("bulk string ({} bytes)", b.len()),
            RespValue::Array(None) => "nil array".to_string(),
            RespValue::Array(Some(items)) => format!("array ({} items)", items.len()),
        }
    }
}

/// Encode one command as an array of bulk strings.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A], buf: &mut BytesMut) {
    buf.put_u8(b'*');
    buf.put_slice(args.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");
    for arg in args {
        let arg = arg.as_ref();
        buf.put_u8(b'$');
        buf.put_slice(arg.len().to_string().as_bytes());
        buf.put_slice(b"\r\n");
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }
}

/// Parse one complete reply from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the value and
/// the number of bytes it occupied.
pub fn parse_reply(buf: &[u8]) -> Result<Option<(RespValue, usize)>, StoreError> {
    parse_at(buf, 0)
}

fn parse_at(buf: &[u8], pos: usize) -> Result<Option<(RespValue, usize)>, StoreError> {
    let Some(&tag) = buf.get(pos) else {
        return Ok(None);
    };
    let Some((line, after_line)) = read_line(buf, pos + 1) else {
        return Ok(None);
    };

    match tag {
        b'+' => Ok(Some((RespValue::Simple(text(line)?), after_line))),
        b'-' => Ok(Some((RespValue::Error(text(line)?), after_line))),
        b':' => Ok(Some((RespValue::Integer(number(line)?), after_line))),
        b'$' => {
            let len = number(line)?;
            if len < 0 {
                return Ok(Some((RespValue::Bulk(None), after_line)));
            }
            let len = len as usize;
            let end = after_line + len;
            if buf.len() < end + 2 {
                return Ok(None);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(StoreError::Protocol("bulk string not terminated by CRLF".to_string()));
            }
            let data = Bytes::copy_from_slice(&buf[after_line..end]);
            Ok(Some((RespValue::Bulk(Some(data)), end + 2)))
        }
        b'*' => {
            let count = number(line)?;
            if count < 0 {
                return Ok(Some((RespValue::Array(None), after_line)));
            }
            let mut items = Vec::with_capacity((count as usize).min(1024));
            let mut cursor = after_line;
            for _ in 0..count {
                match parse_at(buf, cursor)? {
                    Some((item, next)) => {
                        items.push(item);
                        cursor = next;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((RespValue::Array(Some(items)), cursor)))
        }
        other => Err(StoreError::Protocol(format!(
            "unknown reply type byte 0x{:02x}",
            other
        ))),
    }
}

/// Finds where a reply ends without building it.
///
/// The scan position and the open arrays survive between calls, so a reply
/// arriving in many reads is walked once overall instead of once per read.
/// Feed it the same growing buffer until it reports a length, then parse
/// that many bytes with [`parse_reply`].
#[derive(Debug, Default)]
pub struct FrameScanner {
    pos: usize,
    /// Items still expected by each open array, innermost last.
    pending: Vec<i64>,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of `buf` already walked for the reply in progress.
    pub fn scanned(&self) -> usize {
        self.pos
    }

    /// Length of the complete reply at the front of `buf`, or `None` if
    /// more bytes are needed. The scanner resets after a complete reply or
    /// an error.
    pub fn scan(&mut self, buf: &[u8]) -> Result<Option<usize>, StoreError> {
        match self.advance(buf) {
            Ok(Some(len)) => {
                self.reset();
                Ok(Some(len))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    pub fn reset(&mut self) {
        self.pos = 0;
        self.pending.clear();
    }

    fn advance(&mut self, buf: &[u8]) -> Result<Option<usize>, StoreError> {
        loop {
            let Some(&tag) = buf.get(self.pos) else {
                return Ok(None);
            };
            let Some((line, after_line)) = read_line(buf, self.pos + 1) else {
                return Ok(None);
            };

            let next = match tag {
                b'+' | b'-' => after_line,
                b':' => {
                    number(line)?;
                    after_line
                }
                b'$' => {
                    let len = number(line)?;
                    if len < 0 {
                        after_line
                    } else {
                        let end = after_line + len as usize;
                        if buf.len() < end + 2 {
                            return Ok(None);
                        }
                        if &buf[end..end + 2] != b"\r\n" {
                            return Err(StoreError::Protocol(
                                "bulk string not terminated by CRLF".to_string(),
                            ));
                        }
                        end + 2
                    }
                }
                b'*' => {
                    let count = number(line)?;
                    if count > 0 {
                        self.pending.push(count);
                        self.pos = after_line;
                        continue;
                    }
                    after_line
                }
                other => {
                    return Err(StoreError::Protocol(format!(
                        "unknown reply type byte 0x{:02x}",
                        other
                    )))
                }
            };
            self.pos = next;

            // One element finished; close every array it completes.
            loop {
                match self.pending.last_mut() {
                    None => return Ok(Some(self.pos)),
                    Some(remaining) => {
                        *remaining -= 1;
                        if *remaining > 0 {
                            break;
                        }
                        self.pending.pop();
                    }
                }
            }
        }
    }
}

/// The line starting at `start` (without CRLF) and the offset after it.
fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(start..)?;
    let idx = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((&rest[..idx], start + idx + 2))
}

fn text(line: &[u8]) -> Result<String, StoreError> {
    std::str::from_utf8(line)
        .map(str::to_string)
        .map_err(|_| StoreError::Protocol("status line is not valid UTF-8".to_string()))
}

fn number(line: &[u8]) -> Result<i64, StoreError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            StoreError::Protocol(format!(
                "invalid integer {:?}",
                String::from_utf8_lossy(line)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &[u8]) -> RespValue {
        let (value, used) = parse_reply(input).unwrap().expect("complete reply");
        assert_eq!(used, input.len());
        value
    }

    #[test]
    fn test_encode_command() {
        let mut buf = BytesMut::new();
        encode_command(&["LRANGE", "queue", "0", "0"], &mut buf);
        assert_eq!(
            &buf[..],
            b"*4\r\n$6\r\nLRANGE\r\n$5\r\nqueue\r\n$1\r\n0\r\n$1\r\n0\r\n"
        );
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse_all(b"+hash\r\n"), RespValue::Simple("hash".to_string()));
        assert_eq!(parse_all(b":42\r\n"), RespValue::Integer(42));
        assert_eq!(
            parse_all(b"-WRONGTYPE bad\r\n"),
            RespValue::Error("WRONGTYPE bad".to_string())
        );
        assert_eq!(parse_all(b"$-1\r\n"), RespValue::Bulk(None));
        assert_eq!(
            parse_all(b"$5\r\nhe\r\no\r\n"),
            RespValue::Bulk(Some(Bytes::from_static(b"he\r\no")))
        );
    }

    #[test]
    fn test_parse_nested_array() {
        let value = parse_all(b"*3\r\n$1\r\na\r\n:7\r\n*0\r\n");
        assert_eq!(
            value,
            RespValue::Array(Some(vec![
                RespValue::Bulk(Some(Bytes::from_static(b"a"))),
                RespValue::Integer(7),
                RespValue::Array(Some(vec![])),
            ]))
        );
        assert_eq!(parse_all(b"*-1\r\n"), RespValue::Array(None));
    }

    #[test]
    fn test_parse_incomplete() {
        assert_eq!(parse_reply(b"").unwrap(), None);
        assert_eq!(parse_reply(b":12").unwrap(), None);
        assert_eq!(parse_reply(b"$5\r\nhel").unwrap(), None);
        assert_eq!(parse_reply(b"*2\r\n$1\r\na\r\n").unwrap(), None);
    }

    #[test]
    fn test_parse_leaves_trailing_bytes() {
        let (value, used) = parse_reply(b":1\r\n:2\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Integer(1));
        assert_eq!(used, 4);
    }

    #[test]
    fn test_frame_scanner_agrees_with_parser() {
        let inputs: [&[u8]; 6] = [
            b"+OK\r\n",
            b"$-1\r\n",
            b"$5\r\nhe\r\no\r\n",
            b"*0\r\n",
            b"*3\r\n$1\r\na\r\n:7\r\n*2\r\n*0\r\n*-1\r\n",
            b"*2\r\n*1\r\n+x\r\n$2\r\nyz\r\n",
        ];
        for input in inputs {
            let mut scanner = FrameScanner::new();
            let mut trailing = input.to_vec();
            trailing.extend_from_slice(b":9\r\n");
            assert_eq!(scanner.scan(&trailing).unwrap(), Some(input.len()));
            assert_eq!(parse_reply(input).unwrap().unwrap().1, input.len());
        }
    }

    #[test]
    fn test_frame_scanner_resumes_across_chunks() {
        let mut frame = BytesMut::new();
        let fields: Vec<String> = (0..500).map(|i| format!("field:{}", i)).collect();
        encode_command(&fields, &mut frame);

        let mut scanner = FrameScanner::new();
        let mut received = Vec::new();
        let mut last_scanned = 0;
        for chunk in frame.chunks(7) {
            assert!(scanner.scanned() >= last_scanned);
            last_scanned = scanner.scanned();
            received.extend_from_slice(chunk);
            if received.len() < frame.len() {
                assert_eq!(scanner.scan(&received).unwrap(), None);
            }
        }
        // Everything before the last item was already walked.
        assert!(scanner.scanned() > frame.len() - 20);
        assert_eq!(scanner.scan(&received).unwrap(), Some(frame.len()));
        assert_eq!(scanner.scanned(), 0);

        let (value, _) = parse_reply(&received).unwrap().unwrap();
        assert!(matches!(value, RespValue::Array(Some(ref items)) if items.len() == 500));
    }

    #[test]
    fn test_frame_scanner_errors_reset() {
        let mut scanner = FrameScanner::new();
        assert!(matches!(scanner.scan(b"*2\r\n?x\r\n"), Err(StoreError::Protocol(_))));
        assert_eq!(scanner.scanned(), 0);
        assert_eq!(scanner.scan(b":1\r\n").unwrap(), Some(4));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_reply(b"?x\r\n"), Err(StoreError::Protocol(_))));
        assert!(matches!(parse_reply(b":abc\r\n"), Err(StoreError::Protocol(_))));
        assert!(matches!(parse_reply(b"$1\r\nab\r\n"), Err(StoreError::Protocol(_))));
    }
}
