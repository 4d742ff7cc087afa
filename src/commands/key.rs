//! Key commands (DEL, EXISTS, TYPE, RANDOMKEY, DBSIZE)

use super::{Command, CommandContext, CommandError};
use crate::notify::EventClass;
use crate::protocol::RespValue;
use bytes::Bytes;

/// DEL command - Delete one or more keys
///
/// Syntax: DEL key [key ...]
pub struct DelCommand;

impl Command for DelCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let mut deleted = 0;
        for key in args {
            if ctx.db().delete(key) {
                ctx.notify(EventClass::Generic, "del", key);
                deleted += 1;
            }
        }
        Ok(RespValue::integer(deleted))
    }

    fn name(&self) -> &'static str {
        "DEL"
    }

    fn min_args(&self) -> usize {
        1
    }
}

/// EXISTS command - Count how many of the given keys exist
///
/// Syntax: EXISTS key [key ...]
pub struct ExistsCommand;

impl Command for ExistsCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let db = ctx.db();
        let count = args.iter().filter(|key| db.exists(key)).count();
        Ok(RespValue::from_usize(count))
    }

    fn name(&self) -> &'static str {
        "EXISTS"
    }

    fn min_args(&self) -> usize {
        1
    }
}

/// TYPE command - Determine the type stored at key
///
/// Syntax: TYPE key
pub struct TypeCommand;

impl Command for TypeCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let name = match ctx.db().lookup_read(&args[0]) {
            Some(value) => value.kind().name(),
            None => "none",
        };
        Ok(RespValue::simple_string(name))
    }

    fn name(&self) -> &'static str {
        "TYPE"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// RANDOMKEY command - Return a random key from the current database
///
/// Syntax: RANDOMKEY
pub struct RandomKeyCommand;

impl Command for RandomKeyCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, _args: &[Bytes]) -> Result<RespValue, CommandError> {
        Ok(RespValue::optional_bulk(ctx.db().random_key()))
    }

    fn name(&self) -> &'static str {
        "RANDOMKEY"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }
}

/// DBSIZE command - Number of keys in the current database
///
/// Syntax: DBSIZE
pub struct DbSizeCommand;

impl Command for DbSizeCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, _args: &[Bytes]) -> Result<RespValue, CommandError> {
        Ok(RespValue::from_usize(ctx.db().len()))
    }

    fn name(&self) -> &'static str {
        "DBSIZE"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }
}
