//! TTL commands (EXPIRE, PEXPIRE, TTL, PTTL, PERSIST)

use super::{parse_integer, Command, CommandContext, CommandError};
use crate::notify::EventClass;
use crate::protocol::RespValue;
use bytes::Bytes;
use std::time::{Duration, Instant};

/// Set a relative expiration of `millis` on `key`.
///
/// A non-positive amount deletes the key right away.
fn expire(
    ctx: &mut CommandContext<'_>,
    command: &'static str,
    key: &Bytes,
    millis: i64,
) -> Result<RespValue, CommandError> {
    if millis <= 0 {
        let deleted = ctx.db().delete(key);
        if deleted {
            ctx.notify(EventClass::Generic, "del", key);
        }
        return Ok(RespValue::from_bool(deleted));
    }

    let when = Instant::now()
        .checked_add(Duration::from_millis(millis as u64))
        .ok_or(CommandError::InvalidExpire(command))?;
    if ctx.db().set_expire(key, when) {
        ctx.notify(EventClass::Generic, "expire", key);
        Ok(RespValue::integer(1))
    } else {
        Ok(RespValue::integer(0))
    }
}

/// Remaining time to live of `key` in milliseconds; -2 when missing and -1
/// when it does not expire
fn ttl_millis(ctx: &mut CommandContext<'_>, key: &[u8]) -> i64 {
    let db = ctx.db();
    if !db.exists(key) {
        return -2;
    }
    match db.get_expire(key) {
        Some(when) => when.saturating_duration_since(Instant::now()).as_millis() as i64,
        None => -1,
    }
}

/// EXPIRE command - Set a timeout on a key
///
/// Syntax: EXPIRE key seconds
pub struct ExpireCommand;

impl Command for ExpireCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let seconds = parse_integer(&args[1])?;
        let millis = seconds.checked_mul(1000).ok_or(CommandError::InvalidExpire("expire"))?;
        expire(ctx, "expire", &args[0], millis)
    }

    fn name(&self) -> &'static str {
        "EXPIRE"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// PEXPIRE command - Set a timeout on a key in milliseconds
///
/// Syntax: PEXPIRE key milliseconds
pub struct PExpireCommand;

impl Command for PExpireCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let millis = parse_integer(&args[1])?;
        expire(ctx, "pexpire", &args[0], millis)
    }

    fn name(&self) -> &'static str {
        "PEXPIRE"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// TTL command - Get the time to live for a key in seconds
///
/// Syntax: TTL key
pub struct TtlCommand;

impl Command for TtlCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let millis = ttl_millis(ctx, &args[0]);
        let seconds = if millis < 0 { millis } else { (millis + 500) / 1000 };
        Ok(RespValue::integer(seconds))
    }

    fn name(&self) -> &'static str {
        "TTL"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// PTTL command - Get the time to live for a key in milliseconds
///
/// Syntax: PTTL key
pub struct PTtlCommand;

impl Command for PTtlCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        Ok(RespValue::integer(ttl_millis(ctx, &args[0])))
    }

    fn name(&self) -> &'static str {
        "PTTL"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// PERSIST command - Remove the expiration from a key
///
/// Syntax: PERSIST key
pub struct PersistCommand;

impl Command for PersistCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let removed = ctx.db().remove_expire(key);
        if removed {
            ctx.notify(EventClass::Generic, "persist", key);
        }
        Ok(RespValue::from_bool(removed))
    }

    fn name(&self) -> &'static str {
        "PERSIST"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}
