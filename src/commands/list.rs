//! List commands (LPUSH, RPUSH, LPOP, RPOP, LLEN, LRANGE, LINDEX, LSET,
//! LINSERT, LREM, RPOPLPUSH) and their blocking variants (BLPOP, BRPOP,
//! BRPOPLPUSH)

use super::{clamp_range, is_keyword, parse_integer, parse_timeout, Command, CommandContext, CommandError};
use crate::blocking::BlockOp;
use crate::notify::EventClass;
use crate::protocol::RespValue;
use crate::store::{StoreError, Value, ValueKind};
use bytes::Bytes;

#[derive(Clone, Copy, PartialEq, Eq)]
enum End {
    Front,
    Back,
}

fn push(ctx: &mut CommandContext<'_>, args: &[Bytes], end: End) -> Result<RespValue, CommandError> {
    let key = &args[0];
    let len = {
        let list = ctx
            .db()
            .lookup_write_or_insert(key, Value::empty_list)
            .as_list_mut()?;
        for value in &args[1..] {
            match end {
                End::Front => list.push_front(value.clone()),
                End::Back => list.push_back(value.clone()),
            }
        }
        list.len()
    };

    let event = if end == End::Front { "lpush" } else { "rpush" };
    ctx.modified(EventClass::List, event, key);
    Ok(RespValue::from_usize(len))
}

/// Pop one element; `None` when the key is missing
fn pop(ctx: &mut CommandContext<'_>, key: &Bytes, end: End) -> Result<Option<Bytes>, CommandError> {
    let value = match ctx.db().lookup_write(key) {
        Some(value) => {
            let list = value.as_list_mut()?;
            match end {
                End::Front => list.pop_front(),
                End::Back => list.pop_back(),
            }
        }
        None => return Ok(None),
    };

    if value.is_some() {
        let event = if end == End::Front { "lpop" } else { "rpop" };
        ctx.modified(EventClass::List, event, key);
        ctx.remove_if_empty(key);
    }
    Ok(value)
}

/// Fail with WRONGTYPE if `key` holds something other than a list
fn ensure_list_or_missing(ctx: &mut CommandContext<'_>, key: &Bytes) -> Result<(), CommandError> {
    match ctx.db().lookup_write(key) {
        Some(value) if value.kind() != ValueKind::List => Err(StoreError::WrongType.into()),
        _ => Ok(()),
    }
}

/// Pop the back of `source` and push it on the front of `destination`
fn pop_push(ctx: &mut CommandContext<'_>, source: &Bytes, destination: &Bytes) -> Result<Option<Bytes>, CommandError> {
    ensure_list_or_missing(ctx, source)?;
    ensure_list_or_missing(ctx, destination)?;

    let value = match pop(ctx, source, End::Back)? {
        Some(value) => value,
        None => return Ok(None),
    };
    ctx.db()
        .lookup_write_or_insert(destination, Value::empty_list)
        .as_list_mut()?
        .push_front(value.clone());
    ctx.modified(EventClass::List, "lpush", destination);
    Ok(Some(value))
}

/// LPUSH command - Prepend one or multiple values to a list
///
/// Syntax: LPUSH key value [value ...]
pub struct LPushCommand;

impl Command for LPushCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        push(ctx, args, End::Front)
    }

    fn name(&self) -> &'static str {
        "LPUSH"
    }

    fn min_args(&self) -> usize {
        2
    }
}

/// RPUSH command - Append one or multiple values to a list
///
/// Syntax: RPUSH key value [value ...]
pub struct RPushCommand;

impl Command for RPushCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        push(ctx, args, End::Back)
    }

    fn name(&self) -> &'static str {
        "RPUSH"
    }

    fn min_args(&self) -> usize {
        2
    }
}

/// LPOP command - Remove and get the first element in a list
///
/// Syntax: LPOP key
pub struct LPopCommand;

impl Command for LPopCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        Ok(RespValue::optional_bulk(pop(ctx, &args[0], End::Front)?))
    }

    fn name(&self) -> &'static str {
        "LPOP"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// RPOP command - Remove and get the last element in a list
///
/// Syntax: RPOP key
pub struct RPopCommand;

impl Command for RPopCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        Ok(RespValue::optional_bulk(pop(ctx, &args[0], End::Back)?))
    }

    fn name(&self) -> &'static str {
        "RPOP"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// LLEN command - Get the length of a list
///
/// Syntax: LLEN key
pub struct LLenCommand;

impl Command for LLenCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let len = match ctx.db().lookup_read(&args[0]) {
            Some(value) => value.as_list()?.len(),
            None => 0,
        };
        Ok(RespValue::from_usize(len))
    }

    fn name(&self) -> &'static str {
        "LLEN"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// LRANGE command - Get a range of elements from a list
///
/// Syntax: LRANGE key start stop
pub struct LRangeCommand;

impl Command for LRangeCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let start = parse_integer(&args[1])?;
        let stop = parse_integer(&args[2])?;

        let list = match ctx.db().lookup_read(&args[0]) {
            Some(value) => value.as_list()?,
            None => return Ok(RespValue::Array(Vec::new())),
        };

        let items = match clamp_range(start, stop, list.len()) {
            Some((start, stop)) => list.range(start..=stop).cloned().collect::<Vec<_>>(),
            None => Vec::new(),
        };
        Ok(RespValue::bulk_array(items))
    }

    fn name(&self) -> &'static str {
        "LRANGE"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
}

/// Resolve a possibly negative list index
fn list_index(index: i64, len: usize) -> Option<usize> {
    let index = if index < 0 { len as i64 + index } else { index };
    if index < 0 || index >= len as i64 {
        None
    } else {
        Some(index as usize)
    }
}

/// LINDEX command - Get an element from a list by its index
///
/// Syntax: LINDEX key index
pub struct LIndexCommand;

impl Command for LIndexCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let index = parse_integer(&args[1])?;
        let list = match ctx.db().lookup_read(&args[0]) {
            Some(value) => value.as_list()?,
            None => return Ok(RespValue::Null),
        };
        let item = list_index(index, list.len()).and_then(|i| list.get(i).cloned());
        Ok(RespValue::optional_bulk(item))
    }

    fn name(&self) -> &'static str {
        "LINDEX"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// LSET command - Set the value of an element in a list by its index
///
/// Syntax: LSET key index value
pub struct LSetCommand;

impl Command for LSetCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let index = parse_integer(&args[1])?;
        {
            let list = match ctx.db().lookup_write(key) {
                Some(value) => value.as_list_mut()?,
                None => return Err(StoreError::NoSuchKey.into()),
            };
            let i = list_index(index, list.len()).ok_or(StoreError::IndexOutOfRange)?;
            list[i] = args[2].clone();
        }
        ctx.modified(EventClass::List, "lset", key);
        Ok(RespValue::ok())
    }

    fn name(&self) -> &'static str {
        "LSET"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
}

/// LINSERT command - Insert an element before or after another element
///
/// Syntax: LINSERT key BEFORE|AFTER pivot value
pub struct LInsertCommand;

impl Command for LInsertCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let after = if is_keyword(&args[1], "AFTER") {
            true
        } else if is_keyword(&args[1], "BEFORE") {
            false
        } else {
            return Err(CommandError::Syntax);
        };

        let len = {
            let list = match ctx.db().lookup_write(key) {
                Some(value) => value.as_list_mut()?,
                None => return Ok(RespValue::integer(0)),
            };
            let pivot = match list.iter().position(|item| *item == args[2]) {
                Some(pos) => pos,
                None => return Ok(RespValue::integer(-1)),
            };
            list.insert(if after { pivot + 1 } else { pivot }, args[3].clone());
            list.len()
        };

        ctx.modified(EventClass::List, "linsert", key);
        Ok(RespValue::from_usize(len))
    }

    fn name(&self) -> &'static str {
        "LINSERT"
    }

    fn min_args(&self) -> usize {
        4
    }

    fn max_args(&self) -> Option<usize> {
        Some(4)
    }
}

/// LREM command - Remove elements from a list
///
/// Syntax: LREM key count value
///
/// count > 0 removes from head to tail, count < 0 from tail to head,
/// count = 0 removes every occurrence.
pub struct LRemCommand;

impl Command for LRemCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let count = parse_integer(&args[1])?;
        let target = &args[2];

        let removed = {
            let list = match ctx.db().lookup_write(key) {
                Some(value) => value.as_list_mut()?,
                None => return Ok(RespValue::integer(0)),
            };
            let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
            let mut removed = 0;
            if count >= 0 {
                let mut i = 0;
                while i < list.len() && removed < limit {
                    if list[i] == *target {
                        list.remove(i);
                        removed += 1;
                    } else {
                        i += 1;
                    }
                }
            } else {
                let mut i = list.len();
                while i > 0 && removed < limit {
                    i -= 1;
                    if list[i] == *target {
                        list.remove(i);
                        removed += 1;
                    }
                }
            }
            removed
        };

        if removed > 0 {
            ctx.modified(EventClass::List, "lrem", key);
            ctx.remove_if_empty(key);
        }
        Ok(RespValue::from_usize(removed))
    }

    fn name(&self) -> &'static str {
        "LREM"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
}

/// RPOPLPUSH command - Move the last element of a list to the front of another
///
/// Syntax: RPOPLPUSH source destination
pub struct RPopLPushCommand;

impl Command for RPopLPushCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        Ok(RespValue::optional_bulk(pop_push(ctx, &args[0], &args[1])?))
    }

    fn name(&self) -> &'static str {
        "RPOPLPUSH"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// Shared body of BLPOP and BRPOP
fn blocking_pop(ctx: &mut CommandContext<'_>, args: &[Bytes], end: End) -> Result<RespValue, CommandError> {
    let (timeout, keys) = match args.split_last() {
        Some((timeout, keys)) => (parse_timeout(timeout)?, keys),
        None => return Err(CommandError::Syntax),
    };

    for key in keys {
        ensure_list_or_missing(ctx, key)?;
        if let Some(value) = pop(ctx, key, end)? {
            return Ok(RespValue::bulk_array([key.clone(), value]));
        }
    }

    let op = if end == End::Front { BlockOp::PopFront } else { BlockOp::PopBack };
    ctx.block_on(keys.to_vec(), op, timeout);
    Ok(RespValue::NullArray)
}

/// BLPOP command - Remove and get the first element of the first non-empty
/// list, or block until one is available
///
/// Syntax: BLPOP key [key ...] timeout
pub struct BLPopCommand;

impl Command for BLPopCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        blocking_pop(ctx, args, End::Front)
    }

    fn name(&self) -> &'static str {
        "BLPOP"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn may_block(&self) -> bool {
        true
    }
}

/// BRPOP command - Remove and get the last element of the first non-empty
/// list, or block until one is available
///
/// Syntax: BRPOP key [key ...] timeout
pub struct BRPopCommand;

impl Command for BRPopCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        blocking_pop(ctx, args, End::Back)
    }

    fn name(&self) -> &'static str {
        "BRPOP"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn may_block(&self) -> bool {
        true
    }
}

/// BRPOPLPUSH command - RPOPLPUSH that blocks while the source is empty
///
/// Syntax: BRPOPLPUSH source destination timeout
pub struct BRPopLPushCommand;

impl Command for BRPopLPushCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let timeout = parse_timeout(&args[2])?;
        if let Some(value) = pop_push(ctx, &args[0], &args[1])? {
            return Ok(RespValue::BulkString(value));
        }

        let op = BlockOp::MoveTo {
            destination: args[1].clone(),
        };
        ctx.block_on(vec![args[0].clone()], op, timeout);
        Ok(RespValue::Null)
    }

    fn name(&self) -> &'static str {
        "BRPOPLPUSH"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn may_block(&self) -> bool {
        true
    }
}
