//! Command execution context

use crate::blocking::{BlockOp, BlockingCoordinator, ClientId};
use crate::notify::{EventClass, Notifier};
use crate::store::{KeySpace, KeyspaceStats, DEFAULT_MAX_INTSET_ENTRIES};
use bytes::Bytes;
use std::time::{Duration, Instant};

/// Per-connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientState {
    pub id: ClientId,
    /// Selected database
    pub db: usize,
    pub name: Option<Bytes>,
}

impl ClientState {
    pub fn new(id: ClientId) -> Self {
        ClientState { id, db: 0, name: None }
    }
}

/// Everything commands operate on. Guarded by the dispatcher lock.
pub struct ServerState {
    pub dbs: Vec<KeySpace>,
    pub blocking: BlockingCoordinator,
    pub notifier: Notifier,
    /// Member count above which a compact set is converted
    pub set_max_intset_entries: usize,
    pub started: Instant,
    pub commands_processed: u64,
    pub connected_clients: usize,
    next_client_id: ClientId,
}

impl ServerState {
    pub fn new(databases: usize, set_max_intset_entries: usize, notifier: Notifier) -> Self {
        let blocking = BlockingCoordinator::new();
        let dbs = (0..databases)
            .map(|id| {
                let mut space = KeySpace::with_notifier(id, notifier.clone());
                space.set_modify_hook(blocking.modify_hook());
                space
            })
            .collect();

        ServerState {
            dbs,
            blocking,
            notifier,
            set_max_intset_entries,
            started: Instant::now(),
            commands_processed: 0,
            connected_clients: 0,
            next_client_id: 0,
        }
    }

    /// Register a new connection and hand out its state
    pub fn connect(&mut self) -> ClientState {
        self.next_client_id += 1;
        self.connected_clients += 1;
        ClientState::new(self.next_client_id)
    }

    /// Forget a connection; returns whether it was still blocked
    pub fn disconnect(&mut self, client: ClientId) -> bool {
        self.connected_clients = self.connected_clients.saturating_sub(1);
        self.blocking.unblock(client)
    }

    pub fn keyspace_stats(&self) -> Vec<KeyspaceStats> {
        self.dbs.iter().map(|db| db.stats()).collect()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(16, DEFAULT_MAX_INTSET_ENTRIES, Notifier::disabled())
    }
}

/// A blocking pop that found no data, waiting to be registered
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRequest {
    pub keys: Vec<Bytes>,
    pub op: BlockOp,
    pub timeout: Option<Duration>,
}

/// Context provided to commands during execution
pub struct CommandContext<'a> {
    pub server: &'a mut ServerState,
    pub client: &'a mut ClientState,
    pending_block: Option<BlockRequest>,
}

impl<'a> CommandContext<'a> {
    pub fn new(server: &'a mut ServerState, client: &'a mut ClientState) -> Self {
        CommandContext {
            server,
            client,
            pending_block: None,
        }
    }

    /// Index of the selected database
    pub fn db_index(&self) -> usize {
        self.client.db
    }

    /// The selected database
    pub fn db(&mut self) -> &mut KeySpace {
        &mut self.server.dbs[self.client.db]
    }

    /// Report a modification of `key` in the selected database: wakes
    /// blocked clients and emits a keyspace event
    pub fn modified(&mut self, class: EventClass, event: &'static str, key: &Bytes) {
        let db = self.client.db;
        self.server.dbs[db].signal_modify_key(key);
        self.server.notifier.notify(class, event, key, db);
    }

    /// Emit a keyspace event without signalling a modification
    pub fn notify(&self, class: EventClass, event: &'static str, key: &Bytes) {
        self.server.notifier.notify(class, event, key, self.client.db);
    }

    /// Delete `key` if it holds a collection with no elements left
    pub fn remove_if_empty(&mut self, key: &Bytes) -> bool {
        let empty = self
            .db()
            .lookup_write(key)
            .is_some_and(|value| value.is_empty_collection());
        if empty {
            self.db().delete(key);
            self.notify(EventClass::Generic, "del", key);
        }
        empty
    }

    /// Park the client once the command returns
    pub fn block_on(&mut self, keys: Vec<Bytes>, op: BlockOp, timeout: Option<Duration>) {
        self.pending_block = Some(BlockRequest { keys, op, timeout });
    }

    pub fn take_pending_block(&mut self) -> Option<BlockRequest> {
        self.pending_block.take()
    }
}
