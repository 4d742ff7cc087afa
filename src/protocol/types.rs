//! RESP2 value types

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// RESP2 value types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple strings: +OK\r\n
    SimpleString(String),

    /// Errors: -ERR message\r\n
    Error(String),

    /// Integers: :1000\r\n
    Integer(i64),

    /// Bulk strings: $6\r\nfoobar\r\n
    BulkString(Bytes),

    /// Null bulk string: $-1\r\n
    Null,

    /// Null array: *-1\r\n, the reply of a timed out blocking pop
    NullArray,

    /// Arrays: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(i: i64) -> Self {
        RespValue::Integer(i)
    }

    /// Integer reply from a count or a flag
    pub fn from_usize(n: usize) -> Self {
        RespValue::Integer(n as i64)
    }

    pub fn from_bool(b: bool) -> Self {
        RespValue::Integer(b as i64)
    }

    pub fn bulk_string(b: impl Into<Bytes>) -> Self {
        RespValue::BulkString(b.into())
    }

    /// Bulk string, or a null bulk string for `None`
    pub fn optional_bulk(b: Option<Bytes>) -> Self {
        match b {
            Some(b) => RespValue::BulkString(b),
            None => RespValue::Null,
        }
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(v: Vec<RespValue>) -> Self {
        RespValue::Array(v)
    }

    /// Array of bulk strings
    pub fn bulk_array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        RespValue::Array(items.into_iter().map(RespValue::BulkString).collect())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    pub fn as_array(&self) -> Option<&Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_bulk_string(&self) -> Option<&Bytes> {
        match self {
            RespValue::BulkString(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Turn a request into its argument vector.
    ///
    /// A request is an array whose elements are bulk strings (simple strings
    /// and integers are tolerated). Anything else is a protocol error.
    pub fn into_args(self) -> Result<Vec<Bytes>, RespError> {
        let items = match self {
            RespValue::Array(items) => items,
            other => {
                return Err(RespError::InvalidProtocol(format!(
                    "expected array request, got {}",
                    other
                )))
            }
        };
        items
            .into_iter()
            .map(|item| match item {
                RespValue::BulkString(b) => Ok(b),
                RespValue::SimpleString(s) => Ok(Bytes::from(s)),
                RespValue::Integer(i) => Ok(Bytes::from(i.to_string())),
                other => Err(RespError::InvalidProtocol(format!(
                    "unexpected {} in request",
                    other
                ))),
            })
            .collect()
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "SimpleString({})", s),
            RespValue::Error(e) => write!(f, "Error({})", e),
            RespValue::Integer(i) => write!(f, "Integer({})", i),
            RespValue::BulkString(b) => write!(f, "BulkString({} bytes)", b.len()),
            RespValue::Null => write!(f, "Null"),
            RespValue::NullArray => write!(f, "NullArray"),
            RespValue::Array(arr) => write!(f, "Array({} elements)", arr.len()),
        }
    }
}

/// RESP parsing errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RespError {
    /// Malformed input; the connection cannot be resynchronized
    #[error("Protocol error: {0}")]
    InvalidProtocol(String),

    #[error("Protocol error: invalid UTF-8")]
    InvalidUtf8,

    #[error("Protocol error: invalid {0} length")]
    InvalidLength(&'static str),
}
