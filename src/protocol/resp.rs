//! RESP2 parser and encoder
//!
//! The parser walks the buffer with a cursor and only consumes bytes once a
//! whole value is available, so a partially received request is left intact
//! for the next read.

use super::types::{RespError, RespValue};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// Longest accepted bulk string
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Largest accepted array element count
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// Longest accepted inline command or type header line
const MAX_LINE_LEN: usize = 64 * 1024;

/// Deepest accepted array nesting
const MAX_NESTING_DEPTH: usize = 32;

/// RESP2 Parser
pub struct RespParser;

impl RespParser {
    /// Parse one RESP value from the front of `buf`.
    ///
    /// Returns Ok(Some(value)) and consumes its bytes if a complete value was
    /// available, Ok(None) if more data is needed, Err(e) on malformed input.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        let mut cursor = 0;
        match Self::parse_at(buf, &mut cursor, 0)? {
            Some(value) => {
                buf.advance(cursor);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Parse one client request into its argument vector.
    ///
    /// Requests are normally RESP arrays; a line not starting with `*` is an
    /// inline command split on whitespace. An empty inline line yields an
    /// empty vector.
    pub fn parse_request(buf: &mut BytesMut) -> Result<Option<Vec<Bytes>>, RespError> {
        match buf.first() {
            None => Ok(None),
            Some(b'*') => match Self::parse(buf)? {
                Some(value) => value.into_args().map(Some),
                None => Ok(None),
            },
            Some(_) => Self::parse_inline(buf),
        }
    }

    fn parse_inline(buf: &mut BytesMut) -> Result<Option<Vec<Bytes>>, RespError> {
        let newline = match buf.iter().position(|&b| b == b'\n') {
            Some(i) => i,
            None if buf.len() > MAX_LINE_LEN => {
                return Err(RespError::InvalidProtocol("too big inline request".to_string()))
            }
            None => return Ok(None),
        };

        let line = buf.split_to(newline + 1);
        let args = line[..newline]
            .split(|b| b.is_ascii_whitespace())
            .filter(|word| !word.is_empty())
            .map(Bytes::copy_from_slice)
            .collect();
        Ok(Some(args))
    }

    fn parse_at(
        buf: &[u8],
        pos: &mut usize,
        depth: usize,
    ) -> Result<Option<RespValue>, RespError> {
        let prefix = match buf.get(*pos) {
            Some(&b) => b,
            None => return Ok(None),
        };

        match prefix {
            b'+' => Ok(Self::read_line(buf, pos)?
                .map(|line| Self::utf8(line).map(RespValue::SimpleString))
                .transpose()?),
            b'-' => Ok(Self::read_line(buf, pos)?
                .map(|line| Self::utf8(line).map(RespValue::Error))
                .transpose()?),
            b':' => Ok(Self::read_line(buf, pos)?
                .map(|line| Self::integer(line).map(RespValue::Integer))
                .transpose()?),
            b'$' => Self::parse_bulk_string(buf, pos),
            b'*' => Self::parse_array(buf, pos, depth + 1),
            other => Err(RespError::InvalidProtocol(format!(
                "unknown type prefix '{}'",
                other as char
            ))),
        }
    }

    /// Bulk string: $6\r\nfoobar\r\n or $-1\r\n (null)
    fn parse_bulk_string(buf: &[u8], pos: &mut usize) -> Result<Option<RespValue>, RespError> {
        let mut cursor = *pos;
        let len = match Self::read_line(buf, &mut cursor)? {
            Some(line) => Self::integer(line)?,
            None => return Ok(None),
        };

        if len == -1 {
            *pos = cursor;
            return Ok(Some(RespValue::Null));
        }
        if !(0..=MAX_BULK_LEN).contains(&len) {
            return Err(RespError::InvalidLength("bulk"));
        }

        let start = cursor;
        let end = start + len as usize;
        if buf.len() < end + 2 {
            return Ok(None);
        }
        if &buf[end..end + 2] != CRLF {
            return Err(RespError::InvalidProtocol(
                "missing CRLF after bulk string data".to_string(),
            ));
        }

        *pos = end + 2;
        Ok(Some(RespValue::BulkString(Bytes::copy_from_slice(&buf[start..end]))))
    }

    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n or *-1\r\n (null)
    fn parse_array(
        buf: &[u8],
        pos: &mut usize,
        depth: usize,
    ) -> Result<Option<RespValue>, RespError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(RespError::InvalidProtocol(
                "arrays nested too deeply".to_string(),
            ));
        }

        let mut cursor = *pos;
        let count = match Self::read_line(buf, &mut cursor)? {
            Some(line) => Self::integer(line)?,
            None => return Ok(None),
        };

        if count == -1 {
            *pos = cursor;
            return Ok(Some(RespValue::NullArray));
        }
        if !(0..=MAX_ARRAY_LEN).contains(&count) {
            return Err(RespError::InvalidLength("multibulk"));
        }

        let mut elements = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            match Self::parse_at(buf, &mut cursor, depth)? {
                Some(value) => elements.push(value),
                None => return Ok(None),
            }
        }

        *pos = cursor;
        Ok(Some(RespValue::Array(elements)))
    }

    /// Line body after the type prefix, advancing past its CRLF.
    ///
    /// Only the first `MAX_LINE_LEN` bytes are searched; a header with no
    /// CRLF within them is an error rather than a reason to keep reading.
    fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> Result<Option<&'a [u8]>, RespError> {
        let start = *pos + 1;
        let rest = match buf.get(start..) {
            Some(rest) => rest,
            None => return Ok(None),
        };
        let window = &rest[..rest.len().min(MAX_LINE_LEN + 2)];
        match window.windows(2).position(|w| w == CRLF) {
            Some(len) => {
                *pos = start + len + 2;
                Ok(Some(&rest[..len]))
            }
            None if rest.len() > MAX_LINE_LEN + 1 => Err(RespError::InvalidProtocol(
                "too big header line".to_string(),
            )),
            None => Ok(None),
        }
    }

    fn utf8(line: &[u8]) -> Result<String, RespError> {
        String::from_utf8(line.to_vec()).map_err(|_| RespError::InvalidUtf8)
    }

    fn integer(line: &[u8]) -> Result<i64, RespError> {
        std::str::from_utf8(line)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| RespError::InvalidProtocol("invalid integer".to_string()))
    }
}

/// RESP2 Encoder
pub struct RespEncoder;

impl RespEncoder {
    /// Encode a RESP value to bytes
    pub fn encode(value: &RespValue) -> Bytes {
        let mut buf = BytesMut::new();
        Self::encode_to(&mut buf, value);
        buf.freeze()
    }

    /// Encode a RESP value into an existing buffer
    pub fn encode_to(buf: &mut BytesMut, value: &RespValue) {
        match value {
            RespValue::SimpleString(s) => {
                buf.put_u8(b'+');
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Error(e) => {
                buf.put_u8(b'-');
                buf.put_slice(e.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Integer(i) => {
                buf.put_u8(b':');
                buf.put_slice(i.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::BulkString(bytes) => {
                buf.put_u8(b'$');
                buf.put_slice(bytes.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(bytes);
                buf.put_slice(CRLF);
            }
            RespValue::Null => buf.put_slice(b"$-1\r\n"),
            RespValue::NullArray => buf.put_slice(b"*-1\r\n"),
            RespValue::Array(arr) => {
                buf.put_u8(b'*');
                buf.put_slice(arr.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for elem in arr {
                    Self::encode_to(buf, elem);
                }
            }
        }
    }
}
