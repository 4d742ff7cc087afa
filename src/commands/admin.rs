//! Server and connection commands (PING, ECHO, INFO, CLIENT, SELECT,
//! FLUSHDB, FLUSHALL, OBJECT)

use super::{is_keyword, parse_integer, Command, CommandContext, CommandError};
use crate::protocol::RespValue;
use bytes::Bytes;
use std::fmt::Write;

/// PING command - Test the connection
///
/// Syntax: PING [message]
pub struct PingCommand;

impl Command for PingCommand {
    fn execute(&self, _ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        Ok(match args.first() {
            Some(message) => RespValue::BulkString(message.clone()),
            None => RespValue::simple_string("PONG"),
        })
    }

    fn name(&self) -> &'static str {
        "PING"
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// ECHO command - Return the given message
///
/// Syntax: ECHO message
pub struct EchoCommand;

impl Command for EchoCommand {
    fn execute(&self, _ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        Ok(RespValue::BulkString(args[0].clone()))
    }

    fn name(&self) -> &'static str {
        "ECHO"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// INFO command - Get information and statistics about the server
///
/// Syntax: INFO [section]
///
/// Sections: server, clients, stats, keyspace.
pub struct InfoCommand;

impl InfoCommand {
    fn render(ctx: &CommandContext<'_>, section: Option<&str>) -> String {
        let wanted = |name: &str| section.map_or(true, |s| s == "all" || s == name);
        let server = &*ctx.server;
        let stats = server.keyspace_stats();
        let mut out = String::new();

        // writing to a String cannot fail
        if wanted("server") {
            let _ = write!(
                out,
                "# Server\r\n\
                 cinderkv_version:{}\r\n\
                 os:{}\r\n\
                 arch:{}\r\n\
                 process_id:{}\r\n\
                 uptime_in_seconds:{}\r\n\
                 databases:{}\r\n\r\n",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS,
                std::env::consts::ARCH,
                std::process::id(),
                server.started.elapsed().as_secs(),
                server.dbs.len(),
            );
        }

        if wanted("clients") {
            let _ = write!(
                out,
                "# Clients\r\n\
                 connected_clients:{}\r\n\
                 blocked_clients:{}\r\n\r\n",
                server.connected_clients,
                server.blocking.blocked_clients(),
            );
        }

        if wanted("stats") {
            let hits: u64 = stats.iter().map(|s| s.hits).sum();
            let misses: u64 = stats.iter().map(|s| s.misses).sum();
            let expired: u64 = stats.iter().map(|s| s.expired_keys).sum();
            let _ = write!(
                out,
                "# Stats\r\n\
                 total_commands_processed:{}\r\n\
                 keyspace_hits:{}\r\n\
                 keyspace_misses:{}\r\n\
                 expired_keys:{}\r\n\r\n",
                server.commands_processed, hits, misses, expired,
            );
        }

        if wanted("keyspace") {
            out.push_str("# Keyspace\r\n");
            for db in stats.iter().filter(|s| s.keys > 0) {
                let _ = write!(out, "db{}:keys={},expires={}\r\n", db.db, db.keys, db.expires);
            }
        }

        out
    }
}

impl Command for InfoCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let section = args
            .first()
            .map(|s| String::from_utf8_lossy(s).to_lowercase());
        Ok(RespValue::bulk_string(Self::render(ctx, section.as_deref())))
    }

    fn name(&self) -> &'static str {
        "INFO"
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// CLIENT command - Client connection commands
///
/// Syntax: CLIENT <subcommand> [args...]
/// Subcommands:
/// - ID: Id of the current connection
/// - SETNAME <name>: Set client name
/// - GETNAME: Get client name
pub struct ClientCommand;

impl Command for ClientCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let subcommand = String::from_utf8_lossy(&args[0]).to_uppercase();

        match (subcommand.as_str(), args.len()) {
            ("ID", 1) => Ok(RespValue::integer(ctx.client.id as i64)),
            ("GETNAME", 1) => Ok(RespValue::optional_bulk(ctx.client.name.clone())),
            ("SETNAME", 2) => {
                let name = &args[1];
                if name.iter().any(|b| *b <= b' ' || *b > b'~') {
                    return Err(CommandError::Other(
                        "Client names cannot contain spaces, newlines or special characters.".to_string(),
                    ));
                }
                ctx.client.name = if name.is_empty() { None } else { Some(name.clone()) };
                Ok(RespValue::ok())
            }
            ("ID" | "GETNAME" | "SETNAME", _) => {
                Err(CommandError::wrong_arity(&format!("client|{}", subcommand)))
            }
            _ => Err(CommandError::Other(format!(
                "unknown subcommand '{}'",
                String::from_utf8_lossy(&args[0])
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "CLIENT"
    }

    fn min_args(&self) -> usize {
        1
    }
}

/// SELECT command - Change the selected database
///
/// Syntax: SELECT index
pub struct SelectCommand;

impl Command for SelectCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let index = parse_integer(&args[0]).map_err(|_| CommandError::Other("invalid DB index".to_string()))?;
        let index = usize::try_from(index)
            .ok()
            .filter(|i| *i < ctx.server.dbs.len())
            .ok_or(CommandError::DbIndexOutOfRange)?;
        ctx.client.db = index;
        Ok(RespValue::ok())
    }

    fn name(&self) -> &'static str {
        "SELECT"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// FLUSHDB command - Remove all keys from the current database
///
/// Syntax: FLUSHDB
pub struct FlushDbCommand;

impl Command for FlushDbCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, _args: &[Bytes]) -> Result<RespValue, CommandError> {
        ctx.db().flush();
        Ok(RespValue::ok())
    }

    fn name(&self) -> &'static str {
        "FLUSHDB"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }
}

/// FLUSHALL command - Remove all keys from every database
///
/// Syntax: FLUSHALL
pub struct FlushAllCommand;

impl Command for FlushAllCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, _args: &[Bytes]) -> Result<RespValue, CommandError> {
        for db in ctx.server.dbs.iter_mut() {
            db.flush();
        }
        Ok(RespValue::ok())
    }

    fn name(&self) -> &'static str {
        "FLUSHALL"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }
}

/// OBJECT command - Inspect the internal representation of a value
///
/// Syntax: OBJECT ENCODING key
pub struct ObjectCommand;

impl Command for ObjectCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> Result<RespValue, CommandError> {
        if !is_keyword(&args[0], "ENCODING") {
            return Err(CommandError::Other(format!(
                "unknown subcommand '{}'",
                String::from_utf8_lossy(&args[0])
            )));
        }
        if args.len() != 2 {
            return Err(CommandError::wrong_arity("object|encoding"));
        }
        let encoding = ctx.db().lookup_write(&args[1]).map(|value| value.encoding());
        Ok(match encoding {
            Some(name) => RespValue::bulk_string(name),
            None => RespValue::Null,
        })
    }

    fn name(&self) -> &'static str {
        "OBJECT"
    }

    fn min_args(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{bulk, exec};
    use crate::commands::{ClientState, ServerState};
    use crate::store::Value;

    fn info_text(reply: RespValue) -> String {
        String::from_utf8(reply.as_bulk_string().unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_ping_and_echo() {
        let mut server = ServerState::default();
        let mut client = ClientState::new(1);
        assert_eq!(
            exec(&PingCommand, &mut server, &mut client, &[]).unwrap(),
            RespValue::simple_string("PONG")
        );
        assert_eq!(exec(&PingCommand, &mut server, &mut client, &["hi"]).unwrap(), bulk("hi"));
        assert_eq!(exec(&EchoCommand, &mut server, &mut client, &["yo"]).unwrap(), bulk("yo"));
    }

    #[test]
    fn test_info() {
        let mut server = ServerState::default();
        let mut client = ClientState::new(1);
        server.dbs[0].add(Bytes::from("key1"), Value::string("value1"));
        server.dbs[3].add(Bytes::from("key2"), Value::string("value2"));

        let info = info_text(exec(&InfoCommand, &mut server, &mut client, &[]).unwrap());
        assert!(info.contains("cinderkv_version"));
        assert!(info.contains("blocked_clients:0"));
        assert!(info.contains("db0:keys=1,expires=0"));
        assert!(info.contains("db3:keys=1,expires=0"));
        assert!(!info.contains("db1:"));

        let keyspace = info_text(exec(&InfoCommand, &mut server, &mut client, &["KEYSPACE"]).unwrap());
        assert!(keyspace.starts_with("# Keyspace"));
        assert!(!keyspace.contains("# Server"));
    }

    #[test]
    fn test_client_name() {
        let mut server = ServerState::default();
        let mut client = ClientState::new(7);
        assert_eq!(
            exec(&ClientCommand, &mut server, &mut client, &["id"]).unwrap(),
            RespValue::Integer(7)
        );
        assert_eq!(
            exec(&ClientCommand, &mut server, &mut client, &["GETNAME"]).unwrap(),
            RespValue::Null
        );
        exec(&ClientCommand, &mut server, &mut client, &["SETNAME", "worker"]).unwrap();
        assert_eq!(
            exec(&ClientCommand, &mut server, &mut client, &["GETNAME"]).unwrap(),
            bulk("worker")
        );
        assert!(exec(&ClientCommand, &mut server, &mut client, &["SETNAME", "a b"]).is_err());
        assert!(exec(&ClientCommand, &mut server, &mut client, &["KILL"]).is_err());
    }

    #[test]
    fn test_select() {
        let mut server = ServerState::default();
        let mut client = ClientState::new(1);
        exec(&SelectCommand, &mut server, &mut client, &["2"]).unwrap();
        assert_eq!(client.db, 2);
        assert_eq!(
            exec(&SelectCommand, &mut server, &mut client, &["16"]).unwrap_err(),
            CommandError::DbIndexOutOfRange
        );
        assert_eq!(
            exec(&SelectCommand, &mut server, &mut client, &["-1"]).unwrap_err(),
            CommandError::DbIndexOutOfRange
        );
        assert_eq!(client.db, 2);
    }

    #[test]
    fn test_flushdb_and_flushall() {
        let mut server = ServerState::default();
        let mut client = ClientState::new(1);
        server.dbs[0].add(Bytes::from("key1"), Value::string("value1"));
        server.dbs[1].add(Bytes::from("key2"), Value::string("value2"));

        exec(&FlushDbCommand, &mut server, &mut client, &[]).unwrap();
        assert_eq!(server.dbs[0].len(), 0);
        assert_eq!(server.dbs[1].len(), 1);

        exec(&FlushAllCommand, &mut server, &mut client, &[]).unwrap();
        assert_eq!(server.dbs[1].len(), 0);
    }

    #[test]
    fn test_object_encoding() {
        let mut server = ServerState::default();
        let mut client = ClientState::new(1);
        server.dbs[0].add(Bytes::from("n"), Value::string("12"));
        assert_eq!(
            exec(&ObjectCommand, &mut server, &mut client, &["encoding", "n"]).unwrap(),
            bulk("int")
        );
        assert_eq!(
            exec(&ObjectCommand, &mut server, &mut client, &["ENCODING", "none"]).unwrap(),
            RespValue::Null
        );
        assert!(exec(&ObjectCommand, &mut server, &mut client, &["FREQ", "n"]).is_err());
    }
}
