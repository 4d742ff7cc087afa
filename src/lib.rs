//! cinderkv - an in-memory key/value server speaking RESP
//!
//! Layering, bottom up:
//! - `store`: value types and the per-database keyspace with lazy expiry
//! - `blocking`: wait queues for BLPOP/BRPOP/BRPOPLPUSH
//! - `commands` and `dispatch`: the command table and its driver
//! - `server` and `web`: the TCP and HTTP surfaces

pub mod blocking;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod notify;
pub mod protocol;
pub mod server;
pub mod store;
pub mod web;

/// Re-export commonly used types
pub use commands::{Command, CommandContext, CommandError};
pub use config::Config;
pub use dispatch::{Dispatched, Dispatcher};
pub use protocol::{RespError, RespValue};
pub use store::{KeySpace, StoreError, Value};
