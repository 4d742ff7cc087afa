//! Errors surfaced by value-type operations

use thiserror::Error;

/// Recoverable errors raised by the keyspace and its value types.
///
/// Absence is never an error: lookups return `Option`. Broken internal
/// invariants panic instead of producing one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The key holds a value of another kind than the operation expects
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR value is not a valid float")]
    NotFloat,

    /// An arithmetic result on a score would be NaN
    #[error("ERR resulting score is not a number (NaN)")]
    NanResult,

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("ERR no such key")]
    NoSuchKey,
}
