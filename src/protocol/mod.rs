//! RESP2 protocol implementation
//!
//! Parsing and encoding of the Redis Serialization Protocol. Independent of
//! the store and of command handling.

mod resp;
mod types;

pub use resp::{RespEncoder, RespParser, MAX_ARRAY_LEN, MAX_BULK_LEN};
pub use types::{RespError, RespValue};
