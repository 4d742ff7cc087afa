//! Command dispatcher
//!
//! Routes incoming commands to their handler, registers blocking pops with
//! the coordinator and runs the wake pass after every command. The server
//! keeps one dispatcher behind a mutex; everything here runs under it.

use crate::blocking::{BlockHandle, BlockOp, BlockResult, ClientId};
use crate::commands::{ClientState, CommandContext, CommandError, CommandRegistry, ServerState};
use crate::config::Config;
use crate::notify::{BroadcastSink, KeyspaceEvent};
use crate::protocol::RespValue;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Keyspace events buffered per subscriber before it starts lagging
const EVENT_CAPACITY: usize = 1024;

/// A client parked by a blocking pop
#[derive(Debug)]
pub struct BlockedWait {
    pub handle: BlockHandle,
    pub op: BlockOp,
}

impl BlockedWait {
    /// Reply for the outcome of the wait
    pub fn reply(&self, result: BlockResult) -> RespValue {
        block_reply(&self.op, result)
    }
}

/// Outcome of dispatching one command
#[derive(Debug)]
pub enum Dispatched {
    Reply(RespValue),
    Blocked(BlockedWait),
}

/// Map the result of a blocking pop to its wire reply
pub fn block_reply(op: &BlockOp, result: BlockResult) -> RespValue {
    match result {
        BlockResult::Popped { key, value } => RespValue::bulk_array([key, value]),
        BlockResult::Moved { value } => RespValue::BulkString(value),
        BlockResult::TimedOut => match op {
            BlockOp::MoveTo { .. } => RespValue::Null,
            BlockOp::PopFront | BlockOp::PopBack => RespValue::NullArray,
        },
        BlockResult::Error(e) => RespValue::error(e.to_string()),
    }
}

/// Command dispatcher
///
/// Receives parsed requests, validates them, and routes to appropriate handlers
pub struct Dispatcher {
    registry: CommandRegistry,
    state: ServerState,
    events: Arc<BroadcastSink>,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Self {
        let events = Arc::new(BroadcastSink::new(EVENT_CAPACITY));
        let state = ServerState::new(
            config.databases,
            config.set_max_intset_entries,
            config.notifier(events.clone()),
        );
        Dispatcher {
            registry: CommandRegistry::new(),
            state,
            events,
        }
    }

    /// Wrap prebuilt state. Its notifier decides where events go, so
    /// [`Dispatcher::subscribe_events`] stays silent.
    pub fn with_state(state: ServerState) -> Self {
        Dispatcher {
            registry: CommandRegistry::new(),
            state,
            events: Arc::new(BroadcastSink::new(EVENT_CAPACITY)),
        }
    }

    /// Receive the keyspace events enabled by `notify_keyspace_events`
    pub fn subscribe_events(&self) -> broadcast::Receiver<KeyspaceEvent> {
        self.events.subscribe()
    }

    /// Register a new connection
    pub fn connect(&mut self) -> ClientState {
        self.state.connect()
    }

    /// Forget a connection, releasing it from any wait queue
    pub fn disconnect(&mut self, client: ClientId) {
        if self.state.disconnect(client) {
            debug!("client {} disconnected while blocked", client);
        }
    }

    /// Dispatch a command
    ///
    /// `args[0]` is the command name. A blocking pop that finds no data
    /// returns [`Dispatched::Blocked`]; the caller waits on the handle
    /// without holding the dispatcher.
    pub fn dispatch(&mut self, client: &mut ClientState, args: Vec<Bytes>) -> Dispatched {
        let dispatched = self.execute(client, &args, true);
        self.state.commands_processed += 1;
        self.state.blocking.handle_ready_keys(&mut self.state.dbs);
        dispatched
    }

    /// Dispatch a command that must answer immediately. Blocking commands
    /// are refused.
    pub fn dispatch_immediate(&mut self, client: &mut ClientState, args: Vec<Bytes>) -> RespValue {
        let dispatched = self.execute(client, &args, false);
        self.state.commands_processed += 1;
        self.state.blocking.handle_ready_keys(&mut self.state.dbs);
        match dispatched {
            Dispatched::Reply(reply) => reply,
            // execute never parks when blocking is not allowed
            Dispatched::Blocked(_) => RespValue::error("ERR blocking commands are not allowed here"),
        }
    }

    fn execute(&mut self, client: &mut ClientState, args: &[Bytes], allow_block: bool) -> Dispatched {
        let (name, cmd_args) = match args.split_first() {
            Some(split) => split,
            None => return Dispatched::Reply(RespValue::error("ERR empty command")),
        };

        let command = match std::str::from_utf8(name).ok().and_then(|n| self.registry.get(n)) {
            Some(command) => command,
            None => {
                warn!("unknown command (base64): {}", BASE64.encode(name));
                let err = CommandError::Unknown(String::from_utf8_lossy(name).into_owned());
                return Dispatched::Reply(RespValue::error(err.to_string()));
            }
        };

        debug!("client {} db {}: {}", client.id, client.db, command.name());

        if cmd_args.len() < command.min_args()
            || command.max_args().is_some_and(|max| cmd_args.len() > max)
        {
            let err = CommandError::wrong_arity(command.name());
            return Dispatched::Reply(RespValue::error(err.to_string()));
        }

        if !allow_block && command.may_block() {
            return Dispatched::Reply(RespValue::error(format!(
                "ERR {} is not allowed here",
                command.name()
            )));
        }

        let (result, pending) = {
            let mut ctx = CommandContext::new(&mut self.state, client);
            let result = command.execute(&mut ctx, cmd_args);
            (result, ctx.take_pending_block())
        };

        match (result, pending) {
            (Ok(_), Some(request)) => {
                let handle = self.state.blocking.block_for_keys(
                    client.id,
                    client.db,
                    request.keys,
                    request.op.clone(),
                    request.timeout,
                );
                Dispatched::Blocked(BlockedWait {
                    handle,
                    op: request.op,
                })
            }
            (Ok(reply), None) => Dispatched::Reply(reply),
            (Err(e), _) => Dispatched::Reply(RespValue::error(e.to_string())),
        }
    }

    /// Release a blocked client on timeout or disconnect.
    ///
    /// Returns false when the wake pass already handed it a result, which
    /// is then waiting in its receiver.
    pub fn unblock(&mut self, client: ClientId) -> bool {
        self.state.blocking.unblock(client)
    }

    /// Remove up to `limit` expired keys from each database and serve any
    /// waiter this affects
    pub fn expire_cycle(&mut self, limit: usize) -> usize {
        let purged = self
            .state
            .dbs
            .iter_mut()
            .map(|db| db.purge_expired(limit))
            .sum();
        self.state.blocking.handle_ready_keys(&mut self.state.dbs);
        purged
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ServerState {
        &mut self.state
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_state(ServerState::default())
    }
}
