//! Sorted set commands

use super::{clamp_range, is_keyword, parse_float, parse_integer, Command, CommandContext, CommandError};
use crate::notify::EventClass;
use crate::protocol::RespValue;
use crate::store::{format_f64, parse_f64, ScoreRange, ScoredMember, SortedSet, Value};
use bytes::Bytes;

fn read_zset<'c>(ctx: &'c mut CommandContext<'_>, key: &[u8]) -> Result<Option<&'c SortedSet>, CommandError> {
    match ctx.db().lookup_read(key) {
        Some(value) => Ok(Some(value.as_zset()?)),
        None => Ok(None),
    }
}

/// Flatten members into a reply, with scores interleaved when asked
fn members_reply(items: Vec<ScoredMember>, with_scores: bool) -> RespValue {
    let mut out = Vec::with_capacity(if with_scores { items.len() * 2 } else { items.len() });
    for item in items {
        out.push(RespValue::BulkString(item.member));
        if with_scores {
            out.push(RespValue::bulk_string(format_f64(item.score)));
        }
    }
    RespValue::Array(out)
}

/// Parse one end of a score interval: `1.5`, `(1.5`, `-inf`, `+inf`
fn parse_bound(arg: &[u8]) -> Result<(f64, bool), CommandError> {
    let (raw, exclusive) = match arg.strip_prefix(b"(") {
        Some(rest) => (rest, true),
        None => (arg, false),
    };
    let value = parse_f64(raw).map_err(|_| CommandError::InvalidScoreRange)?;
    Ok((value, exclusive))
}

fn parse_score_range(min: &[u8], max: &[u8]) -> Result<ScoreRange, CommandError> {
    let (min, min_exclusive) = parse_bound(min)?;
    let (max, max_exclusive) = parse_bound(max)?;
    Ok(ScoreRange {
        min,
        max,
        min_exclusive,
        max_exclusive,
    })
}

/// ZADD command - Add members to a sorted set, or update their scores
///
/// Syntax: ZADD key score member [score member ...]
///
/// Pairs are applied left to right, so a repeated member keeps the last
/// score. Returns the number of members that were new.
pub struct ZAddCommand;

impl Command for ZAddCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let pairs = &args[1..];
        if pairs.len() % 2 != 0 {
            return Err(CommandError::Syntax);
        }

        // validate every score before touching the keyspace
        let scored = pairs
            .chunks_exact(2)
            .map(|pair| Ok((parse_float(&pair[0])?, pair[1].clone())))
            .collect::<Result<Vec<(f64, Bytes)>, CommandError>>()?;

        let added = {
            let zset = ctx.db().lookup_write_or_insert(key, Value::empty_zset).as_zset_mut()?;
            scored
                .into_iter()
                .filter(|(score, member)| zset.add(member.clone(), *score))
                .count()
        };

        ctx.modified(EventClass::SortedSet, "zadd", key);
        Ok(RespValue::from_usize(added))
    }

    fn name(&self) -> &'static str {
        "ZADD"
    }

    fn min_args(&self) -> usize {
        3
    }
}

/// ZINCRBY command - Increment the score of a member
///
/// Syntax: ZINCRBY key increment member
pub struct ZIncrByCommand;

impl Command for ZIncrByCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let delta = parse_float(&args[1])?;

        // check the type before creating anything
        if let Some(value) = ctx.db().lookup_write(key) {
            value.as_zset()?;
        }

        let result = ctx
            .db()
            .lookup_write_or_insert(key, Value::empty_zset)
            .as_zset_mut()?
            .incr_by(args[2].clone(), delta);

        match result {
            Ok(score) => {
                ctx.modified(EventClass::SortedSet, "zincr", key);
                Ok(RespValue::bulk_string(format_f64(score)))
            }
            Err(e) => {
                ctx.remove_if_empty(key);
                Err(e.into())
            }
        }
    }

    fn name(&self) -> &'static str {
        "ZINCRBY"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
}

/// ZREM command - Remove members from a sorted set
///
/// Syntax: ZREM key member [member ...]
pub struct ZRemCommand;

impl Command for ZRemCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let removed = match ctx.db().lookup_write(key) {
            Some(value) => {
                let zset = value.as_zset_mut()?;
                args[1..].iter().filter(|member| zset.delete(member)).count()
            }
            None => 0,
        };

        if removed > 0 {
            ctx.modified(EventClass::SortedSet, "zrem", key);
            ctx.remove_if_empty(key);
        }
        Ok(RespValue::from_usize(removed))
    }

    fn name(&self) -> &'static str {
        "ZREM"
    }

    fn min_args(&self) -> usize {
        2
    }
}

/// ZCARD command - Get the number of members in a sorted set
///
/// Syntax: ZCARD key
pub struct ZCardCommand;

impl Command for ZCardCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let len = read_zset(ctx, &args[0])?.map_or(0, |zset| zset.len());
        Ok(RespValue::from_usize(len))
    }

    fn name(&self) -> &'static str {
        "ZCARD"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// ZSCORE command - Get the score of a member
///
/// Syntax: ZSCORE key member
pub struct ZScoreCommand;

impl Command for ZScoreCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let score = read_zset(ctx, &args[0])?.and_then(|zset| zset.get_score(&args[1]));
        Ok(RespValue::optional_bulk(score.map(|s| Bytes::from(format_f64(s)))))
    }

    fn name(&self) -> &'static str {
        "ZSCORE"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

fn rank(ctx: &mut CommandContext<'_>, args: &[Bytes], reverse: bool) -> Result<RespValue, CommandError> {
    let rank = read_zset(ctx, &args[0])?.and_then(|zset| {
        zset.get_rank(&args[1])
            .map(|rank| if reverse { zset.len() - rank } else { rank - 1 })
    });
    Ok(rank.map_or(RespValue::Null, RespValue::from_usize))
}

/// ZRANK command - Get the 0-based rank of a member, lowest score first
///
/// Syntax: ZRANK key member
pub struct ZRankCommand;

impl Command for ZRankCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        rank(ctx, args, false)
    }

    fn name(&self) -> &'static str {
        "ZRANK"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// ZREVRANK command - Get the 0-based rank of a member, highest score first
///
/// Syntax: ZREVRANK key member
pub struct ZRevRankCommand;

impl Command for ZRevRankCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        rank(ctx, args, true)
    }

    fn name(&self) -> &'static str {
        "ZREVRANK"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

fn range(ctx: &mut CommandContext<'_>, args: &[Bytes], reverse: bool) -> Result<RespValue, CommandError> {
    let start = parse_integer(&args[1])?;
    let stop = parse_integer(&args[2])?;
    let with_scores = match args.get(3) {
        Some(arg) if args.len() == 4 && is_keyword(arg, "WITHSCORES") => true,
        Some(_) => return Err(CommandError::Syntax),
        None => false,
    };

    let items = match read_zset(ctx, &args[0])? {
        Some(zset) => match clamp_range(start, stop, zset.len()) {
            Some((start, stop)) => zset.range_by_rank(start, stop, reverse),
            None => Vec::new(),
        },
        None => Vec::new(),
    };
    Ok(members_reply(items, with_scores))
}

/// ZRANGE command - Get members by rank, lowest score first
///
/// Syntax: ZRANGE key start stop [WITHSCORES]
pub struct ZRangeCommand;

impl Command for ZRangeCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        range(ctx, args, false)
    }

    fn name(&self) -> &'static str {
        "ZRANGE"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> Option<usize> {
        Some(4)
    }
}

/// ZREVRANGE command - Get members by rank, highest score first
///
/// Syntax: ZREVRANGE key start stop [WITHSCORES]
pub struct ZRevRangeCommand;

impl Command for ZRevRangeCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        range(ctx, args, true)
    }

    fn name(&self) -> &'static str {
        "ZREVRANGE"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> Option<usize> {
        Some(4)
    }
}

/// ZRANGEBYSCORE command - Get members with a score inside an interval
///
/// Syntax: ZRANGEBYSCORE key min max [WITHSCORES] [LIMIT offset count]
///
/// A bound prefixed with `(` is exclusive. A negative count means no limit.
pub struct ZRangeByScoreCommand;

impl Command for ZRangeByScoreCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let range = parse_score_range(&args[1], &args[2])?;

        let mut with_scores = false;
        let mut limit: Option<(i64, i64)> = None;
        let mut i = 3;
        while i < args.len() {
            if is_keyword(&args[i], "WITHSCORES") {
                with_scores = true;
                i += 1;
            } else if is_keyword(&args[i], "LIMIT") && i + 2 < args.len() {
                limit = Some((parse_integer(&args[i + 1])?, parse_integer(&args[i + 2])?));
                i += 3;
            } else {
                return Err(CommandError::Syntax);
            }
        }

        let items = match read_zset(ctx, &args[0])? {
            Some(zset) if !range.is_empty() => zset.range_by_score(&range, false),
            _ => Vec::new(),
        };

        let items = match limit {
            Some((offset, _)) if offset < 0 => Vec::new(),
            Some((offset, count)) => {
                let count = usize::try_from(count).unwrap_or(usize::MAX);
                items.into_iter().skip(offset as usize).take(count).collect()
            }
            None => items,
        };
        Ok(members_reply(items, with_scores))
    }

    fn name(&self) -> &'static str {
        "ZRANGEBYSCORE"
    }

    fn min_args(&self) -> usize {
        3
    }
}

/// ZCOUNT command - Count members with a score inside an interval
///
/// Syntax: ZCOUNT key min max
pub struct ZCountCommand;

impl Command for ZCountCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let range = parse_score_range(&args[1], &args[2])?;
        let count = match read_zset(ctx, &args[0])? {
            Some(zset) if !range.is_empty() => zset.count(&range),
            _ => 0,
        };
        Ok(RespValue::from_usize(count))
    }

    fn name(&self) -> &'static str {
        "ZCOUNT"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
}

/// ZREMRANGEBYRANK command - Remove members inside a rank interval
///
/// Syntax: ZREMRANGEBYRANK key start stop
pub struct ZRemRangeByRankCommand;

impl Command for ZRemRangeByRankCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let key = &args[0];
        let start = parse_integer(&args[1])?;
        let stop = parse_integer(&args[2])?;

        let removed = match ctx.db().lookup_write(key) {
            Some(value) => {
                let zset = value.as_zset_mut()?;
                match clamp_range(start, stop, zset.len()) {
                    Some((start, stop)) => zset.delete_range_by_rank(start, stop),
                    None => 0,
                }
            }
            None => 0,
        };

        if removed > 0 {
            ctx.modified(EventClass::SortedSet, "zremrangebyrank", key);
            ctx.remove_if_empty(key);
        }
        Ok(RespValue::from_usize(removed))
    }

    fn name(&self) -> &'static str {
        "ZREMRANGEBYRANK"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{bulk, bulks, exec};
    use crate::commands::{ClientState, ServerState};
    use crate::store::StoreError;

    fn setup() -> (ServerState, ClientState) {
        let mut server = ServerState::default();
        let mut client = ClientState::new(1);
        exec(
            &ZAddCommand,
            &mut server,
            &mut client,
            &["z", "1", "a", "2", "b", "3", "c", "4", "d"],
        )
        .unwrap();
        (server, client)
    }

    #[test]
    fn test_zadd_last_score_wins() {
        let mut server = ServerState::default();
        let mut client = ClientState::new(1);
        assert_eq!(
            exec(&ZAddCommand, &mut server, &mut client, &["z", "1", "m", "5", "m", "2", "n"]).unwrap(),
            RespValue::Integer(2)
        );
        assert_eq!(
            exec(&ZScoreCommand, &mut server, &mut client, &["z", "m"]).unwrap(),
            bulk("5")
        );
        assert_eq!(
            exec(&ZAddCommand, &mut server, &mut client, &["z", "7", "m"]).unwrap(),
            RespValue::Integer(0)
        );
        assert_eq!(
            exec(&ZCardCommand, &mut server, &mut client, &["z"]).unwrap(),
            RespValue::Integer(2)
        );
    }

    #[test]
    fn test_zadd_rejects_bad_input_without_creating_key() {
        let mut server = ServerState::default();
        let mut client = ClientState::new(1);
        assert_eq!(
            exec(&ZAddCommand, &mut server, &mut client, &["z", "1", "a", "nan", "b"]).unwrap_err(),
            CommandError::Store(StoreError::NotFloat)
        );
        assert_eq!(
            exec(&ZAddCommand, &mut server, &mut client, &["z", "1", "a", "2"]).unwrap_err(),
            CommandError::Syntax
        );
        assert!(!server.dbs[0].exists(b"z"));
    }

    #[test]
    fn test_ranks() {
        let (mut server, mut client) = setup();
        assert_eq!(
            exec(&ZRankCommand, &mut server, &mut client, &["z", "a"]).unwrap(),
            RespValue::Integer(0)
        );
        assert_eq!(
            exec(&ZRevRankCommand, &mut server, &mut client, &["z", "a"]).unwrap(),
            RespValue::Integer(3)
        );
        assert_eq!(
            exec(&ZRankCommand, &mut server, &mut client, &["z", "zz"]).unwrap(),
            RespValue::Null
        );
    }

    #[test]
    fn test_range_by_rank() {
        let (mut server, mut client) = setup();
        assert_eq!(
            exec(&ZRangeCommand, &mut server, &mut client, &["z", "0", "-1"]).unwrap(),
            bulks(&["a", "b", "c", "d"])
        );
        assert_eq!(
            exec(&ZRevRangeCommand, &mut server, &mut client, &["z", "0", "1", "WITHSCORES"]).unwrap(),
            bulks(&["d", "4", "c", "3"])
        );
        assert_eq!(
            exec(&ZRangeCommand, &mut server, &mut client, &["z", "5", "9"]).unwrap(),
            RespValue::Array(vec![])
        );
        assert_eq!(
            exec(&ZRangeCommand, &mut server, &mut client, &["z", "0", "1", "BOGUS"]).unwrap_err(),
            CommandError::Syntax
        );
    }

    #[test]
    fn test_range_by_score() {
        let (mut server, mut client) = setup();
        assert_eq!(
            exec(&ZRangeByScoreCommand, &mut server, &mut client, &["z", "(1", "3"]).unwrap(),
            bulks(&["b", "c"])
        );
        assert_eq!(
            exec(
                &ZRangeByScoreCommand,
                &mut server,
                &mut client,
                &["z", "-inf", "+inf", "WITHSCORES", "LIMIT", "1", "2"]
            )
            .unwrap(),
            bulks(&["b", "2", "c", "3"])
        );
        assert_eq!(
            exec(&ZRangeByScoreCommand, &mut server, &mut client, &["z", "3", "1"]).unwrap(),
            RespValue::Array(vec![])
        );
        assert_eq!(
            exec(&ZRangeByScoreCommand, &mut server, &mut client, &["z", "x", "1"]).unwrap_err(),
            CommandError::InvalidScoreRange
        );
    }

    #[test]
    fn test_zcount() {
        let (mut server, mut client) = setup();
        assert_eq!(
            exec(&ZCountCommand, &mut server, &mut client, &["z", "2", "(4"]).unwrap(),
            RespValue::Integer(2)
        );
        assert_eq!(
            exec(&ZCountCommand, &mut server, &mut client, &["missing", "-inf", "inf"]).unwrap(),
            RespValue::Integer(0)
        );
    }

    #[test]
    fn test_zincrby_and_zrem() {
        let (mut server, mut client) = setup();
        assert_eq!(
            exec(&ZIncrByCommand, &mut server, &mut client, &["z", "2.5", "a"]).unwrap(),
            bulk("3.5")
        );
        assert_eq!(
            exec(&ZRangeCommand, &mut server, &mut client, &["z", "0", "-1"]).unwrap(),
            bulks(&["b", "c", "a", "d"])
        );
        assert_eq!(
            exec(&ZRemCommand, &mut server, &mut client, &["z", "a", "b", "nope"]).unwrap(),
            RespValue::Integer(2)
        );
    }

    #[test]
    fn test_zincrby_nan_leaves_no_key() {
        let mut server = ServerState::default();
        let mut client = ClientState::new(1);
        exec(&ZAddCommand, &mut server, &mut client, &["z", "inf", "m"]).unwrap();
        assert_eq!(
            exec(&ZIncrByCommand, &mut server, &mut client, &["z", "-inf", "m"]).unwrap_err(),
            CommandError::Store(StoreError::NanResult)
        );
        assert_eq!(
            exec(&ZScoreCommand, &mut server, &mut client, &["z", "m"]).unwrap(),
            bulk("inf")
        );
    }

    #[test]
    fn test_zremrangebyrank_deletes_empty_key() {
        let (mut server, mut client) = setup();
        assert_eq!(
            exec(&ZRemRangeByRankCommand, &mut server, &mut client, &["z", "0", "1"]).unwrap(),
            RespValue::Integer(2)
        );
        assert_eq!(
            exec(&ZRangeCommand, &mut server, &mut client, &["z", "0", "-1"]).unwrap(),
            bulks(&["c", "d"])
        );
        exec(&ZRemRangeByRankCommand, &mut server, &mut client, &["z", "0", "-1"]).unwrap();
        assert!(!server.dbs[0].exists(b"z"));
    }
}
