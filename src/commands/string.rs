//! String commands (SET, GET, GETSET, APPEND, STRLEN, MGET)

use super::{is_keyword, parse_integer, Command, CommandContext, CommandError};
use crate::notify::EventClass;
use crate::protocol::RespValue;
use crate::store::{StringValue, Value};
use bytes::{Bytes, BytesMut};
use std::time::{Duration, Instant};

/// SET command - Set the string value of a key
///
/// Syntax: SET key value [EX seconds] [PX milliseconds] [NX|XX]
pub struct SetCommand;

#[derive(Default)]
struct SetOptions {
    deadline: Option<Instant>,
    only_if_absent: bool,
    only_if_present: bool,
}

fn parse_set_options(args: &[Bytes]) -> Result<SetOptions, CommandError> {
    let mut opts = SetOptions::default();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if is_keyword(arg, "NX") && !opts.only_if_present {
            opts.only_if_absent = true;
        } else if is_keyword(arg, "XX") && !opts.only_if_absent {
            opts.only_if_present = true;
        } else if (is_keyword(arg, "EX") || is_keyword(arg, "PX")) && opts.deadline.is_none() {
            let amount = args.get(i + 1).ok_or(CommandError::Syntax)?;
            let amount = parse_integer(amount)?;
            if amount <= 0 {
                return Err(CommandError::InvalidExpire("set"));
            }
            let ttl = if is_keyword(arg, "EX") {
                Duration::from_secs(amount as u64)
            } else {
                Duration::from_millis(amount as u64)
            };
            opts.deadline = Some(
                Instant::now()
                    .checked_add(ttl)
                    .ok_or(CommandError::InvalidExpire("set"))?,
            );
            i += 1;
        } else {
            return Err(CommandError::Syntax);
        }
        i += 1;
    }
    Ok(opts)
}

impl Command for SetCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let opts = parse_set_options(&args[2..])?;

        let exists = ctx.db().exists(key);
        if (opts.only_if_absent && exists) || (opts.only_if_present && !exists) {
            return Ok(RespValue::Null);
        }

        ctx.db().set_persist(key.clone(), Value::string(args[1].clone()));
        ctx.notify(EventClass::String, "set", key);
        if let Some(when) = opts.deadline {
            ctx.db().set_expire(key, when);
            ctx.notify(EventClass::Generic, "expire", key);
        }
        Ok(RespValue::ok())
    }

    fn name(&self) -> &'static str {
        "SET"
    }

    fn min_args(&self) -> usize {
        2
    }
}

/// GET command - Get the value of a key
///
/// Syntax: GET key
pub struct GetCommand;

impl Command for GetCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        match ctx.db().lookup_read(&args[0]) {
            Some(value) => Ok(RespValue::BulkString(value.as_string()?.to_bytes())),
            None => Ok(RespValue::Null),
        }
    }

    fn name(&self) -> &'static str {
        "GET"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// GETSET command - Set a key and return its old value
///
/// Syntax: GETSET key value
pub struct GetSetCommand;

impl Command for GetSetCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let old = match ctx.db().lookup_read(key) {
            Some(value) => Some(value.as_string()?.to_bytes()),
            None => None,
        };

        ctx.db().set_persist(key.clone(), Value::string(args[1].clone()));
        ctx.notify(EventClass::String, "set", key);
        Ok(RespValue::optional_bulk(old))
    }

    fn name(&self) -> &'static str {
        "GETSET"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// APPEND command - Append a value to a key
///
/// Syntax: APPEND key value
pub struct AppendCommand;

impl Command for AppendCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let suffix = &args[1];

        let len = match ctx.db().lookup_write(key) {
            Some(value) => {
                let current = value.as_string()?.to_bytes();
                let mut joined = BytesMut::with_capacity(current.len() + suffix.len());
                joined.extend_from_slice(&current);
                joined.extend_from_slice(suffix);
                let len = joined.len();
                *value = Value::String(StringValue::Raw(joined.freeze()));
                len
            }
            None => {
                ctx.db().add(key.clone(), Value::String(StringValue::Raw(suffix.clone())));
                suffix.len()
            }
        };

        ctx.modified(EventClass::String, "append", key);
        Ok(RespValue::from_usize(len))
    }

    fn name(&self) -> &'static str {
        "APPEND"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// STRLEN command - Get the length of the value stored in a key
///
/// Syntax: STRLEN key
pub struct StrLenCommand;

impl Command for StrLenCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let len = match ctx.db().lookup_read(&args[0]) {
            Some(value) => value.as_string()?.len(),
            None => 0,
        };
        Ok(RespValue::from_usize(len))
    }

    fn name(&self) -> &'static str {
        "STRLEN"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// MGET command - Get the values of all the given keys
///
/// Syntax: MGET key [key ...]
///
/// Keys that are missing or hold another type come back as nil.
pub struct MGetCommand;

impl Command for MGetCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let db = ctx.db();
        let values = args
            .iter()
            .map(|key| match db.lookup_read(key) {
                Some(Value::String(s)) => RespValue::BulkString(s.to_bytes()),
                _ => RespValue::Null,
            })
            .collect();
        Ok(RespValue::Array(values))
    }

    fn name(&self) -> &'static str {
        "MGET"
    }

    fn min_args(&self) -> usize {
        1
    }
}
