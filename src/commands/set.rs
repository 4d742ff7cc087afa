//! Set commands (SADD, SREM, SISMEMBER, SCARD, SMEMBERS, SRANDMEMBER, SPOP)

use super::{parse_integer, Command, CommandContext, CommandError};
use crate::notify::EventClass;
use crate::protocol::RespValue;
use crate::store::{Set, Value};
use bytes::Bytes;
use rand::seq::IteratorRandom;

fn read_set<'c>(ctx: &'c mut CommandContext<'_>, key: &[u8]) -> Result<Option<&'c Set>, CommandError> {
    match ctx.db().lookup_read(key) {
        Some(value) => Ok(Some(value.as_set()?)),
        None => Ok(None),
    }
}

/// SADD command - Add one or more members to a set
///
/// Syntax: SADD key member [member ...]
pub struct SAddCommand;

impl Command for SAddCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let limit = ctx.server.set_max_intset_entries;

        let added = {
            let set = ctx
                .db()
                .lookup_write_or_insert(key, || Value::Set(Set::for_member(&args[1], limit)))
                .as_set_mut()?;
            args[1..].iter().filter(|member| set.add((*member).clone())).count()
        };

        if added > 0 {
            ctx.modified(EventClass::Set, "sadd", key);
        }
        Ok(RespValue::from_usize(added))
    }

    fn name(&self) -> &'static str {
        "SADD"
    }

    fn min_args(&self) -> usize {
        2
    }
}

/// SREM command - Remove one or more members from a set
///
/// Syntax: SREM key member [member ...]
pub struct SRemCommand;

impl Command for SRemCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let removed = match ctx.db().lookup_write(key) {
            Some(value) => {
                let set = value.as_set_mut()?;
                args[1..].iter().filter(|member| set.remove(member)).count()
            }
            None => 0,
        };

        if removed > 0 {
            ctx.modified(EventClass::Set, "srem", key);
            ctx.remove_if_empty(key);
        }
        Ok(RespValue::from_usize(removed))
    }

    fn name(&self) -> &'static str {
        "SREM"
    }

    fn min_args(&self) -> usize {
        2
    }
}

/// SISMEMBER command - Determine if a value is a member of a set
///
/// Syntax: SISMEMBER key member
pub struct SIsMemberCommand;

impl Command for SIsMemberCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let member = read_set(ctx, &args[0])?.is_some_and(|set| set.is_member(&args[1]));
        Ok(RespValue::from_bool(member))
    }

    fn name(&self) -> &'static str {
        "SISMEMBER"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// SCARD command - Get the number of members in a set
///
/// Syntax: SCARD key
pub struct SCardCommand;

impl Command for SCardCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let size = read_set(ctx, &args[0])?.map_or(0, |set| set.size());
        Ok(RespValue::from_usize(size))
    }

    fn name(&self) -> &'static str {
        "SCARD"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// SMEMBERS command - Get all the members in a set
///
/// Syntax: SMEMBERS key
pub struct SMembersCommand;

impl Command for SMembersCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let members = read_set(ctx, &args[0])?.map(|set| set.members()).unwrap_or_default();
        Ok(RespValue::bulk_array(members))
    }

    fn name(&self) -> &'static str {
        "SMEMBERS"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// SRANDMEMBER command - Get one or multiple random members from a set
///
/// Syntax: SRANDMEMBER key [count]
///
/// A positive count returns distinct members, a negative count may repeat.
pub struct SRandMemberCommand;

impl Command for SRandMemberCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let count = args.get(1).map(|c| parse_integer(c)).transpose()?;
        let set = read_set(ctx, &args[0])?;

        let count = match count {
            None => return Ok(RespValue::optional_bulk(set.and_then(|s| s.random_element()))),
            Some(count) => count,
        };
        let set = match set {
            Some(set) => set,
            None => return Ok(RespValue::Array(Vec::new())),
        };

        let picked: Vec<Bytes> = if count >= 0 {
            set.members()
                .into_iter()
                .choose_multiple(&mut rand::thread_rng(), count as usize)
        } else {
            (0..count.unsigned_abs())
                .filter_map(|_| set.random_element())
                .collect()
        };
        Ok(RespValue::bulk_array(picked))
    }

    fn name(&self) -> &'static str {
        "SRANDMEMBER"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// SPOP command - Remove and return a random member from a set
///
/// Syntax: SPOP key
pub struct SPopCommand;

impl Command for SPopCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let popped = match ctx.db().lookup_write(key) {
            Some(value) => value.as_set_mut()?.pop(),
            None => None,
        };

        if popped.is_some() {
            ctx.modified(EventClass::Set, "spop", key);
            ctx.remove_if_empty(key);
        }
        Ok(RespValue::optional_bulk(popped))
    }

    fn name(&self) -> &'static str {
        "SPOP"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::exec;
    use crate::commands::{ClientState, ServerState};
    use crate::notify::Notifier;
    use crate::store::{SetEncoding, StoreError};

    fn setup() -> (ServerState, ClientState) {
        (ServerState::default(), ClientState::new(1))
    }

    fn encoding(server: &mut ServerState, key: &str) -> SetEncoding {
        server.dbs[0].lookup_read(key.as_bytes()).unwrap().as_set().unwrap().encoding()
    }

    #[test]
    fn test_sadd_keeps_integers_compact() {
        let (mut server, mut client) = setup();
        assert_eq!(
            exec(&SAddCommand, &mut server, &mut client, &["s", "1", "4", "3", "4"]).unwrap(),
            RespValue::Integer(3)
        );
        assert_eq!(encoding(&mut server, "s"), SetEncoding::Compact);
        assert_eq!(server.dbs[0].lookup_read(b"s").unwrap().encoding(), "intset");

        exec(&SAddCommand, &mut server, &mut client, &["s", "x"]).unwrap();
        assert_eq!(encoding(&mut server, "s"), SetEncoding::General);
        assert_eq!(
            exec(&SCardCommand, &mut server, &mut client, &["s"]).unwrap(),
            RespValue::Integer(4)
        );
    }

    #[test]
    fn test_sadd_respects_configured_limit() {
        let mut server = ServerState::new(1, 2, Notifier::disabled());
        let mut client = ClientState::new(1);
        exec(&SAddCommand, &mut server, &mut client, &["s", "1", "2"]).unwrap();
        assert_eq!(encoding(&mut server, "s"), SetEncoding::Compact);
        exec(&SAddCommand, &mut server, &mut client, &["s", "3"]).unwrap();
        assert_eq!(encoding(&mut server, "s"), SetEncoding::General);
    }

    #[test]
    fn test_members_and_membership() {
        let (mut server, mut client) = setup();
        exec(&SAddCommand, &mut server, &mut client, &["s", "b", "a"]).unwrap();
        assert_eq!(
            exec(&SIsMemberCommand, &mut server, &mut client, &["s", "a"]).unwrap(),
            RespValue::Integer(1)
        );
        assert_eq!(
            exec(&SIsMemberCommand, &mut server, &mut client, &["s", "c"]).unwrap(),
            RespValue::Integer(0)
        );

        let reply = exec(&SMembersCommand, &mut server, &mut client, &["s"]).unwrap();
        let mut members: Vec<Bytes> = reply
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m.as_bulk_string().unwrap().clone())
            .collect();
        members.sort();
        assert_eq!(members, vec![Bytes::from("a"), Bytes::from("b")]);
    }

    #[test]
    fn test_srem_and_spop_remove_empty_set() {
        let (mut server, mut client) = setup();
        exec(&SAddCommand, &mut server, &mut client, &["s", "1", "2"]).unwrap();
        assert_eq!(
            exec(&SRemCommand, &mut server, &mut client, &["s", "1", "9"]).unwrap(),
            RespValue::Integer(1)
        );
        assert_eq!(
            exec(&SPopCommand, &mut server, &mut client, &["s"]).unwrap(),
            RespValue::bulk_string("2")
        );
        assert!(!server.dbs[0].exists(b"s"));
        assert_eq!(exec(&SPopCommand, &mut server, &mut client, &["s"]).unwrap(), RespValue::Null);
    }

    #[test]
    fn test_srandmember() {
        let (mut server, mut client) = setup();
        exec(&SAddCommand, &mut server, &mut client, &["s", "a", "b", "c"]).unwrap();

        let one = exec(&SRandMemberCommand, &mut server, &mut client, &["s"]).unwrap();
        assert!(one.as_bulk_string().is_some());

        let distinct = exec(&SRandMemberCommand, &mut server, &mut client, &["s", "10"]).unwrap();
        assert_eq!(distinct.as_array().unwrap().len(), 3);

        let repeated = exec(&SRandMemberCommand, &mut server, &mut client, &["s", "-5"]).unwrap();
        assert_eq!(repeated.as_array().unwrap().len(), 5);

        assert_eq!(
            exec(&SRandMemberCommand, &mut server, &mut client, &["nope"]).unwrap(),
            RespValue::Null
        );
        assert_eq!(
            exec(&SCardCommand, &mut server, &mut client, &["s"]).unwrap(),
            RespValue::Integer(3)
        );
    }

    #[test]
    fn test_wrong_type() {
        let (mut server, mut client) = setup();
        server.dbs[0].add(Bytes::from("l"), Value::empty_list());
        assert_eq!(
            exec(&SAddCommand, &mut server, &mut client, &["l", "a"]).unwrap_err(),
            CommandError::Store(StoreError::WrongType)
        );
    }
}
