//! Counter commands (INCR, DECR, INCRBY, DECRBY)

use super::{parse_integer, Command, CommandContext, CommandError};
use crate::notify::EventClass;
use crate::protocol::RespValue;
use crate::store::{StoreError, Value};
use bytes::Bytes;

/// Add `delta` to the integer stored at `key`, creating it at 0
fn incr_by(ctx: &mut CommandContext<'_>, key: &Bytes, delta: i64) -> Result<RespValue, CommandError> {
    let db = ctx.db();
    let (current, exists) = match db.lookup_write(key) {
        Some(value) => (value.as_string()?.as_i64()?, true),
        None => (0, false),
    };

    let next = current.checked_add(delta).ok_or(StoreError::Overflow)?;
    if exists {
        // keeps the expiration
        db.update(key, Value::integer(next));
    } else {
        db.add(key.clone(), Value::integer(next));
    }

    ctx.notify(EventClass::String, "incrby", key);
    Ok(RespValue::integer(next))
}

/// INCR command - Increment the integer value of a key by one
///
/// Syntax: INCR key
pub struct IncrCommand;

impl Command for IncrCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        incr_by(ctx, &args[0], 1)
    }

    fn name(&self) -> &'static str {
        "INCR"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// DECR command - Decrement the integer value of a key by one
///
/// Syntax: DECR key
pub struct DecrCommand;

impl Command for DecrCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        incr_by(ctx, &args[0], -1)
    }

    fn name(&self) -> &'static str {
        "DECR"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// INCRBY command - Increment the integer value of a key by the given amount
///
/// Syntax: INCRBY key increment
pub struct IncrByCommand;

impl Command for IncrByCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let delta = parse_integer(&args[1])?;
        incr_by(ctx, &args[0], delta)
    }

    fn name(&self) -> &'static str {
        "INCRBY"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// DECRBY command - Decrement the integer value of a key by the given amount
///
/// Syntax: DECRBY key decrement
pub struct DecrByCommand;

impl Command for DecrByCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let delta = parse_integer(&args[1])?;
        let delta = delta.checked_neg().ok_or(StoreError::Overflow)?;
        incr_by(ctx, &args[0], delta)
    }

    fn name(&self) -> &'static str {
        "DECRBY"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}
