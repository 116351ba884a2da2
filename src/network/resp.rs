use bytes::{Buf, BufMut, BytesMut};
use crate::types::DatabaseError;

/// RESP type markers
pub mod marker {
    pub const STATUS: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

const CRLF: &[u8] = b"\r\n";

/// One command: a name followed by binary-safe arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            args: vec![name.as_bytes().to_vec()],
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    #[must_use]
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_vec()));
        self
    }

    /// Upper-cased command name
    #[must_use]
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.args[0]).to_ascii_uppercase()
    }

    #[must_use]
    pub fn argv(&self) -> &[Vec<u8>] {
        &self.args
    }

    /// Argument `i` (0 is the name) as text
    #[must_use]
    pub fn arg_str(&self, i: usize) -> Option<String> {
        self.args.get(i).map(|a| String::from_utf8_lossy(a).into_owned())
    }

    /// Writes the command as a RESP array of bulk strings
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(marker::ARRAY);
        buf.put_slice(self.args.len().to_string().as_bytes());
        buf.put_slice(CRLF);
        for arg in &self.args {
            buf.put_u8(marker::BULK);
            buf.put_slice(arg.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            buf.put_slice(arg);
            buf.put_slice(CRLF);
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .args
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// A reply from the server. Null bulk strings and null arrays both decode
/// to `Nil`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(String),
    Nil,
    Array(Vec<Reply>),
}

impl Reply {
    #[must_use]
    pub fn is_status(&self, expected: &str) -> bool {
        matches!(self, Self::Status(s) if s.eq_ignore_ascii_case(expected))
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.is_status("OK")
    }

    #[must_use]
    pub fn is_queued(&self) -> bool {
        self.is_status("QUEUED")
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::Integer(_))
    }

    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Bulk(s) | Self::Status(s) => Some(s),
            _ => None,
        }
    }

    /// Turns an error reply into `DatabaseError::Server`, passing anything else through.
    pub fn into_result(self) -> Result<Self, DatabaseError> {
        match self {
            Self::Error(e) => Err(DatabaseError::Server(e)),
            other => Ok(other),
        }
    }

    /// Interprets an array of bulk strings, e.g. SMEMBERS or ZRANGE output.
    pub fn into_strings(self) -> Result<Vec<String>, DatabaseError> {
        match self.into_result()? {
            Self::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Self::Bulk(s) => Ok(s),
                    other => Err(DatabaseError::Protocol(format!(
                        "expected bulk string in array, got {other:?}"
                    ))),
                })
                .collect(),
            Self::Nil => Ok(Vec::new()),
            other => Err(DatabaseError::Protocol(format!("expected array, got {other:?}"))),
        }
    }

    /// Interprets an array of optional bulk strings, e.g. HMGET output.
    pub fn into_optional_strings(self) -> Result<Vec<Option<String>>, DatabaseError> {
        match self.into_result()? {
            Self::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Self::Bulk(s) => Ok(Some(s)),
                    Self::Nil => Ok(None),
                    other => Err(DatabaseError::Protocol(format!(
                        "expected bulk string or nil in array, got {other:?}"
                    ))),
                })
                .collect(),
            other => Err(DatabaseError::Protocol(format!("expected array, got {other:?}"))),
        }
    }

    pub fn into_integer(self) -> Result<i64, DatabaseError> {
        match self.into_result()? {
            Self::Integer(i) => Ok(i),
            other => Err(DatabaseError::Protocol(format!("expected integer, got {other:?}"))),
        }
    }
}

/// Decodes one reply from the front of `buf`.
///
/// Returns `Ok(None)` and leaves `buf` untouched when the reply is not yet
/// complete; on success the consumed bytes are removed.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Reply>, DatabaseError> {
    let mut pos = 0;
    match parse(buf, &mut pos)? {
        Some(reply) => {
            buf.advance(pos);
            Ok(Some(reply))
        }
        None => Ok(None),
    }
}

/// Shortest possible encoded reply, e.g. `+\r\n`
const MIN_REPLY_LEN: usize = 3;

fn read_line<'a>(src: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let start = *pos;
    let end = src[start..].windows(2).position(|w| w == CRLF)? + start;
    *pos = end + 2;
    Some(&src[start..end])
}

fn parse_int(line: &[u8]) -> Result<i64, DatabaseError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            DatabaseError::Protocol(format!("invalid integer '{}'", String::from_utf8_lossy(line)))
        })
}

fn parse(src: &[u8], pos: &mut usize) -> Result<Option<Reply>, DatabaseError> {
    if *pos >= src.len() {
        return Ok(None);
    }
    let kind = src[*pos];
    *pos += 1;

    let Some(line) = read_line(src, pos) else {
        return Ok(None);
    };

    match kind {
        marker::STATUS => Ok(Some(Reply::Status(String::from_utf8_lossy(line).into_owned()))),
        marker::ERROR => Ok(Some(Reply::Error(String::from_utf8_lossy(line).into_owned()))),
        marker::INTEGER => Ok(Some(Reply::Integer(parse_int(line)?))),
        marker::BULK => {
            let len = parse_int(line)?;
            if len < 0 {
                return Ok(Some(Reply::Nil));
            }
            let len = usize::try_from(len)
                .map_err(|_| DatabaseError::Protocol(format!("bulk length {len} out of range")))?;
            if src.len() - *pos < len.saturating_add(2) {
                return Ok(None);
            }
            let data = &src[*pos..*pos + len];
            if &src[*pos + len..*pos + len + 2] != CRLF {
                return Err(DatabaseError::Protocol("bulk string not terminated by CRLF".to_string()));
            }
            *pos += len + 2;
            Ok(Some(Reply::Bulk(String::from_utf8_lossy(data).into_owned())))
        }
        marker::ARRAY => {
            let count = parse_int(line)?;
            if count < 0 {
                return Ok(Some(Reply::Nil));
            }
            let count = usize::try_from(count)
                .map_err(|_| DatabaseError::Protocol(format!("array length {count} out of range")))?;
            // every element takes at least MIN_REPLY_LEN bytes, so never reserve past the buffer
            let mut items = Vec::with_capacity(count.min((src.len() - *pos) / MIN_REPLY_LEN));
            for _ in 0..count {
                match parse(src, pos)? {
                    Some(item) => items.push(item),
                    None => return Ok(None),
                }
            }
            Ok(Some(Reply::Array(items)))
        }
        other => Err(DatabaseError::Protocol(format!("unknown reply type byte 0x{other:02x}"))),
    }
}
