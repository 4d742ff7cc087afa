//! Command execution module
//!
//! Every command implements the [`Command`] trait and lives in the file of
//! its value family. The [`CommandRegistry`] maps names to implementations.

mod context;
mod registry;

mod admin;
mod counter;
mod hash;
mod key;
mod list;
mod search;
mod set;
mod string;
mod ttl;
mod zset;

pub use context::{BlockRequest, ClientState, CommandContext, ServerState};
pub use registry::CommandRegistry;

use crate::protocol::RespValue;
use crate::store::{parse_canonical_i64, parse_f64, StoreError};
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Command execution trait
///
/// `args` never contains the command name itself. The dispatcher checks the
/// argument count against `min_args`/`max_args` before calling `execute`.
pub trait Command: Send + Sync {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError>;

    /// Command name, upper case
    fn name(&self) -> &'static str;

    /// Minimum number of arguments
    fn min_args(&self) -> usize {
        0
    }

    /// Maximum number of arguments (None = unlimited)
    fn max_args(&self) -> Option<usize> {
        None
    }

    /// Whether the command can park the client
    fn may_block(&self) -> bool {
        false
    }
}

/// Errors turned into an error reply
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("ERR unknown command '{0}'")]
    Unknown(String),

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR DB index is out of range")]
    DbIndexOutOfRange,

    #[error("ERR timeout is negative")]
    NegativeTimeout,

    #[error("ERR timeout is not a float or out of range")]
    InvalidTimeout,

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpire(&'static str),

    #[error("ERR min or max is not a float")]
    InvalidScoreRange,

    #[error("ERR {0}")]
    Other(String),
}

impl CommandError {
    pub fn wrong_arity(name: &str) -> Self {
        CommandError::WrongArity(name.to_lowercase())
    }
}

/// Parse an integer argument, accepting only the canonical decimal form
/// that stored integers use
pub(crate) fn parse_integer(arg: &[u8]) -> Result<i64, CommandError> {
    parse_canonical_i64(arg).ok_or(CommandError::Store(StoreError::NotInteger))
}

/// Parse a float argument
pub(crate) fn parse_float(arg: &[u8]) -> Result<f64, CommandError> {
    Ok(parse_f64(arg)?)
}

/// Case-insensitive comparison with an ASCII keyword
pub(crate) fn is_keyword(arg: &[u8], keyword: &str) -> bool {
    arg.eq_ignore_ascii_case(keyword.as_bytes())
}

/// Blocking timeout in seconds; zero waits forever
pub(crate) fn parse_timeout(arg: &[u8]) -> Result<Option<Duration>, CommandError> {
    let seconds = std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|s| s.is_finite())
        .ok_or(CommandError::InvalidTimeout)?;
    if seconds < 0.0 {
        return Err(CommandError::NegativeTimeout);
    }
    if seconds == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(seconds)
        .map(Some)
        .map_err(|_| CommandError::InvalidTimeout)
}

/// Resolve a possibly negative index against `len`, clamping a range the
/// way LRANGE and ZRANGE do. Returns `None` for an empty range.
pub(crate) fn clamp_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout(b"0").unwrap(), None);
        assert_eq!(parse_timeout(b"1.5").unwrap(), Some(Duration::from_millis(1500)));
        assert_eq!(parse_timeout(b"-1"), Err(CommandError::NegativeTimeout));
        assert_eq!(parse_timeout(b"soon"), Err(CommandError::InvalidTimeout));
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer(b"42").unwrap(), 42);
        assert_eq!(parse_integer(b"-7").unwrap(), -7);
        assert_eq!(parse_integer(b"0").unwrap(), 0);
        for bad in [&b"+5"[..], b"05", b"-0", b" 1", b"1.0", b"", b"9223372036854775808"] {
            assert_eq!(
                parse_integer(bad),
                Err(CommandError::Store(StoreError::NotInteger)),
                "{:?}",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn test_clamp_range() {
        assert_eq!(clamp_range(0, -1, 3), Some((0, 2)));
        assert_eq!(clamp_range(-2, 10, 3), Some((1, 2)));
        assert_eq!(clamp_range(-10, 0, 3), Some((0, 0)));
        assert_eq!(clamp_range(2, 1, 3), None);
        assert_eq!(clamp_range(5, 10, 3), None);
        assert_eq!(clamp_range(0, -1, 0), None);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CommandError::wrong_arity("GET").to_string(),
            "ERR wrong number of arguments for 'get' command"
        );
        assert_eq!(
            CommandError::from(StoreError::WrongType).to_string(),
            "WRONGTYPE Operation against a key holding the wrong kind of value"
        );
    }
}
