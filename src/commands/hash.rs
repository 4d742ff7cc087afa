//! Hash commands (HSET, HGET, HDEL, HEXISTS, HLEN, HGETALL, HKEYS, HVALS,
//! HINCRBY)

use super::{parse_integer, Command, CommandContext, CommandError};
use crate::notify::EventClass;
use crate::protocol::RespValue;
use crate::store::{parse_canonical_i64, StoreError, Value};
use bytes::Bytes;
use std::collections::HashMap;

/// Read-only view of the hash at `key`, `None` when missing
fn read_hash<'c>(ctx: &'c mut CommandContext<'_>, key: &[u8]) -> Result<Option<&'c HashMap<Bytes, Bytes>>, CommandError> {
    match ctx.db().lookup_read(key) {
        Some(value) => Ok(Some(value.as_hash()?)),
        None => Ok(None),
    }
}

/// HSET command - Set the value of one or more hash fields
///
/// Syntax: HSET key field value [field value ...]
///
/// Returns the number of fields that were added.
pub struct HSetCommand;

impl Command for HSetCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        if args.len() % 2 == 0 {
            return Err(CommandError::wrong_arity(self.name()));
        }
        let key = &args[0];

        let added = {
            let hash = ctx
                .db()
                .lookup_write_or_insert(key, Value::empty_hash)
                .as_hash_mut()?;
            args[1..]
                .chunks_exact(2)
                .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                .count()
        };

        ctx.modified(EventClass::Hash, "hset", key);
        Ok(RespValue::from_usize(added))
    }

    fn name(&self) -> &'static str {
        "HSET"
    }

    fn min_args(&self) -> usize {
        3
    }
}

/// HGET command - Get the value of a hash field
///
/// Syntax: HGET key field
pub struct HGetCommand;

impl Command for HGetCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let value = read_hash(ctx, &args[0])?.and_then(|hash| hash.get(&args[1]).cloned());
        Ok(RespValue::optional_bulk(value))
    }

    fn name(&self) -> &'static str {
        "HGET"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// HDEL command - Delete one or more hash fields
///
/// Syntax: HDEL key field [field ...]
pub struct HDelCommand;

impl Command for HDelCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let removed = match ctx.db().lookup_write(key) {
            Some(value) => {
                let hash = value.as_hash_mut()?;
                args[1..].iter().filter(|field| hash.remove(*field).is_some()).count()
            }
            None => 0,
        };

        if removed > 0 {
            ctx.modified(EventClass::Hash, "hdel", key);
            ctx.remove_if_empty(key);
        }
        Ok(RespValue::from_usize(removed))
    }

    fn name(&self) -> &'static str {
        "HDEL"
    }

    fn min_args(&self) -> usize {
        2
    }
}

/// HEXISTS command - Determine if a hash field exists
///
/// Syntax: HEXISTS key field
pub struct HExistsCommand;

impl Command for HExistsCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let exists = read_hash(ctx, &args[0])?.is_some_and(|hash| hash.contains_key(&args[1]));
        Ok(RespValue::from_bool(exists))
    }

    fn name(&self) -> &'static str {
        "HEXISTS"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// HLEN command - Get the number of fields in a hash
///
/// Syntax: HLEN key
pub struct HLenCommand;

impl Command for HLenCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let len = read_hash(ctx, &args[0])?.map_or(0, |hash| hash.len());
        Ok(RespValue::from_usize(len))
    }

    fn name(&self) -> &'static str {
        "HLEN"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// HGETALL command - Get all the fields and values in a hash
///
/// Syntax: HGETALL key
pub struct HGetAllCommand;

impl Command for HGetAllCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let items = match read_hash(ctx, &args[0])? {
            Some(hash) => hash
                .iter()
                .flat_map(|(field, value)| [field.clone(), value.clone()])
                .collect(),
            None => Vec::new(),
        };
        Ok(RespValue::bulk_array(items))
    }

    fn name(&self) -> &'static str {
        "HGETALL"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// HKEYS command - Get all the fields in a hash
///
/// Syntax: HKEYS key
pub struct HKeysCommand;

impl Command for HKeysCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let fields: Vec<Bytes> = read_hash(ctx, &args[0])?
            .map(|hash| hash.keys().cloned().collect())
            .unwrap_or_default();
        Ok(RespValue::bulk_array(fields))
    }

    fn name(&self) -> &'static str {
        "HKEYS"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// HVALS command - Get all the values in a hash
///
/// Syntax: HVALS key
pub struct HValsCommand;

impl Command for HValsCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let values: Vec<Bytes> = read_hash(ctx, &args[0])?
            .map(|hash| hash.values().cloned().collect())
            .unwrap_or_default();
        Ok(RespValue::bulk_array(values))
    }

    fn name(&self) -> &'static str {
        "HVALS"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// HINCRBY command - Increment the integer value of a hash field
///
/// Syntax: HINCRBY key field increment
pub struct HIncrByCommand;

impl Command for HIncrByCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let delta = parse_integer(&args[2])?;

        let next = {
            let hash = ctx
                .db()
                .lookup_write_or_insert(key, Value::empty_hash)
                .as_hash_mut()?;
            let current = match hash.get(&args[1]) {
                Some(raw) => parse_canonical_i64(raw)
                    .ok_or(CommandError::Other("hash value is not an integer".to_string()))?,
                None => 0,
            };
            let next = current.checked_add(delta).ok_or(StoreError::Overflow)?;
            hash.insert(args[1].clone(), Bytes::from(next.to_string()));
            next
        };

        ctx.modified(EventClass::Hash, "hincrby", key);
        Ok(RespValue::integer(next))
    }

    fn name(&self) -> &'static str {
        "HINCRBY"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
}
