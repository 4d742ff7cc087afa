//! Blocking list pops
//!
//! A client whose blocking pop finds no data is parked here under every key
//! it named. After each command the dispatcher runs [`BlockingCoordinator::handle_ready_keys`],
//! which serves waiters of keys that were modified, oldest first, one element
//! each, until the list runs dry or nobody is left waiting.
//!
//! Every method runs under the dispatcher lock. A parked client only holds the
//! receiving half of a oneshot channel; whichever of wake, timeout or
//! disconnect removes it from the coordinator first decides its outcome.

mod ready;

pub use ready::{DbKey, ReadyKeys};

use crate::notify::EventClass;
use crate::store::{KeySpace, ModifyHook, StoreError, Value, ValueKind};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// Connection identifier
pub type ClientId = u64;

/// What a blocked client does with the element it is handed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOp {
    /// BLPOP
    PopFront,
    /// BRPOP
    PopBack,
    /// BRPOPLPUSH: pop the back of the source, push it on the front of
    /// `destination`
    MoveTo { destination: Bytes },
}

/// Outcome delivered to a blocked client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockResult {
    Popped { key: Bytes, value: Bytes },
    Moved { value: Bytes },
    TimedOut,
    Error(StoreError),
}

/// Handle kept by a client while it is parked
#[derive(Debug)]
pub struct BlockHandle {
    pub receiver: oneshot::Receiver<BlockResult>,
    pub deadline: Option<Instant>,
}

#[derive(Debug)]
struct BlockedClient {
    db: usize,
    keys: Vec<Bytes>,
    op: BlockOp,
    deadline: Option<Instant>,
    reply: oneshot::Sender<BlockResult>,
}

/// Wait queues of clients parked on list keys
#[derive(Debug, Default)]
pub struct BlockingCoordinator {
    clients: HashMap<ClientId, BlockedClient>,
    waiting: HashMap<DbKey, VecDeque<ClientId>>,
    ready: ReadyKeys,
}

impl BlockingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook to install on every [`KeySpace`] so modifications reach the
    /// ready-key queue
    pub fn modify_hook(&self) -> ModifyHook {
        let ready = self.ready.clone();
        Box::new(move |db, key| ready.signal(db, key))
    }

    pub fn ready_keys(&self) -> &ReadyKeys {
        &self.ready
    }

    /// Park `client` on `keys` of database `db`.
    ///
    /// The client is appended to the wait queue of every distinct key. A
    /// timeout of `None` waits indefinitely.
    pub fn block_for_keys(
        &mut self,
        client: ClientId,
        db: usize,
        keys: Vec<Bytes>,
        op: BlockOp,
        timeout: Option<Duration>,
    ) -> BlockHandle {
        // a client blocks at most once at a time
        self.unblock(client);

        let mut distinct: Vec<Bytes> = Vec::with_capacity(keys.len());
        for key in keys {
            if !distinct.contains(&key) {
                distinct.push(key);
            }
        }

        for key in &distinct {
            let queue = self.waiting.entry((db, key.clone())).or_default();
            if queue.is_empty() {
                self.ready.watch(db, key.clone());
            }
            queue.push_back(client);
        }

        // a deadline too far out to represent means no deadline
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let (reply, receiver) = oneshot::channel();
        debug!("client {} blocked on {} key(s) in db {}", client, distinct.len(), db);

        self.clients.insert(
            client,
            BlockedClient {
                db,
                keys: distinct,
                op,
                deadline,
                reply,
            },
        );
        BlockHandle { receiver, deadline }
    }

    /// Remove `client` from every wait queue.
    ///
    /// Returns true if the client was still blocked. A false return means the
    /// wake path already handed it a result (or it never blocked).
    pub fn unblock(&mut self, client: ClientId) -> bool {
        self.take_client(client).is_some()
    }

    fn take_client(&mut self, client: ClientId) -> Option<BlockedClient> {
        let blocked = self.clients.remove(&client)?;
        for key in &blocked.keys {
            let entry = (blocked.db, key.clone());
            if let Some(queue) = self.waiting.get_mut(&entry) {
                queue.retain(|id| *id != client);
                if queue.is_empty() {
                    self.waiting.remove(&entry);
                    self.ready.unwatch(blocked.db, key);
                }
            }
        }
        Some(blocked)
    }

    pub fn blocked_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn is_blocked(&self, client: ClientId) -> bool {
        self.clients.contains_key(&client)
    }

    /// Deadline of a blocked client, `None` when it waits indefinitely
    pub fn deadline_of(&self, client: ClientId) -> Option<Instant> {
        self.clients.get(&client).and_then(|c| c.deadline)
    }

    /// Clients waiting on `key`, in arrival order
    pub fn waiters_on(&self, db: usize, key: &[u8]) -> Vec<ClientId> {
        let entry = (db, Bytes::copy_from_slice(key));
        self.waiting
            .get(&entry)
            .map(|queue| queue.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Serve waiters of every key modified since the last pass.
    ///
    /// Keys that become ready while the pass runs (for instance the
    /// destination of a BRPOPLPUSH) are served before it returns.
    pub fn handle_ready_keys(&mut self, dbs: &mut [KeySpace]) {
        while let Some((db, key)) = self.ready.pop() {
            if let Some(space) = dbs.get_mut(db) {
                self.serve_key(space, &key);
            }
        }
    }

    fn serve_key(&mut self, space: &mut KeySpace, key: &Bytes) {
        let db = space.id();
        loop {
            let client = match self.waiting.get(&(db, key.clone())).and_then(|q| q.front()) {
                Some(id) => *id,
                None => return,
            };
            let has_data = matches!(space.lookup_write(key), Some(Value::List(list)) if !list.is_empty());
            if !has_data {
                return;
            }

            let blocked = match self.take_client(client) {
                Some(blocked) => blocked,
                None => return,
            };
            if blocked.reply.is_closed() {
                debug!("skipping dead waiter {} on db {}", client, db);
                continue;
            }

            match serve_client(space, key, &blocked.op) {
                Ok(result) => {
                    debug!("woke client {} on db {}", client, db);
                    if let Err(BlockResult::Popped { value, .. }) = blocked.reply.send(result) {
                        // receiver went away after the check; give the element back
                        restore(space, key, &blocked.op, value);
                    }
                }
                Err(err) => {
                    let _ = blocked.reply.send(BlockResult::Error(err));
                }
            }
        }
    }
}

/// Pop one element of the list at `key` for a waiter doing `op`
fn serve_client(space: &mut KeySpace, key: &Bytes, op: &BlockOp) -> Result<BlockResult, StoreError> {
    let db = space.id();

    if let BlockOp::MoveTo { destination } = op {
        if let Some(value) = space.lookup_write(destination) {
            if value.kind() != ValueKind::List {
                return Err(StoreError::WrongType);
            }
        }
    }

    let (value, emptied) = {
        let list = match space.lookup_write(key) {
            Some(value) => value.as_list_mut()?,
            None => return Err(StoreError::NoSuchKey),
        };
        let value = match op {
            BlockOp::PopFront => list.pop_front(),
            BlockOp::PopBack | BlockOp::MoveTo { .. } => list.pop_back(),
        };
        (value.ok_or(StoreError::NoSuchKey)?, list.is_empty())
    };

    let event = if *op == BlockOp::PopFront { "lpop" } else { "rpop" };
    space.notifier().notify(EventClass::List, event, key, db);
    if emptied {
        space.delete(key);
        space.notifier().notify(EventClass::Generic, "del", key, db);
    } else {
        space.signal_modify_key(key);
    }

    match op {
        BlockOp::MoveTo { destination } => {
            space
                .lookup_write_or_insert(destination, Value::empty_list)
                .as_list_mut()?
                .push_front(value.clone());
            space.signal_modify_key(destination);
            space.notifier().notify(EventClass::List, "lpush", destination, db);
            Ok(BlockResult::Moved { value })
        }
        _ => Ok(BlockResult::Popped {
            key: key.clone(),
            value,
        }),
    }
}

/// Put an element that could not be delivered back where it came from
fn restore(space: &mut KeySpace, key: &Bytes, op: &BlockOp, value: Bytes) {
    if let Ok(list) = space.lookup_write_or_insert(key, Value::empty_list).as_list_mut() {
        match op {
            BlockOp::PopFront => list.push_front(value),
            _ => list.push_back(value),
        }
        space.signal_modify_key(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    fn key(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    fn setup() -> (BlockingCoordinator, Vec<KeySpace>) {
        let coordinator = BlockingCoordinator::new();
        let dbs = (0..2)
            .map(|id| {
                let mut space = KeySpace::new(id);
                space.set_modify_hook(coordinator.modify_hook());
                space
            })
            .collect();
        (coordinator, dbs)
    }

    fn push(space: &mut KeySpace, k: &str, values: &[&str]) {
        let k = key(k);
        let list = space
            .lookup_write_or_insert(&k, Value::empty_list)
            .as_list_mut()
            .unwrap();
        for v in values {
            list.push_back(key(v));
        }
        space.signal_modify_key(&k);
    }

    fn list(space: &mut KeySpace, k: &str) -> Vec<Bytes> {
        match space.lookup_read(k.as_bytes()) {
            Some(value) => value.as_list().unwrap().iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    #[test]
    fn test_wake_delivers_element() {
        let (mut co, mut dbs) = setup();
        let handle = co.block_for_keys(1, 0, vec![key("k")], BlockOp::PopFront, None);
        let mut rx = task::spawn(handle.receiver);
        assert_pending!(rx.poll());
        assert_eq!(co.waiters_on(0, b"k"), vec![1]);

        push(&mut dbs[0], "k", &["v"]);
        co.handle_ready_keys(&mut dbs);

        let result = assert_ready!(rx.poll()).unwrap();
        assert_eq!(
            result,
            BlockResult::Popped {
                key: key("k"),
                value: key("v")
            }
        );
        assert!(co.waiters_on(0, b"k").is_empty());
        assert_eq!(co.blocked_clients(), 0);
        assert!(!dbs[0].exists(b"k"));
    }

    #[test]
    fn test_fifo_one_element() {
        let (mut co, mut dbs) = setup();
        let first = co.block_for_keys(1, 0, vec![key("k")], BlockOp::PopFront, None);
        let second = co.block_for_keys(2, 0, vec![key("k")], BlockOp::PopFront, None);
        let mut first = task::spawn(first.receiver);
        let mut second = task::spawn(second.receiver);

        push(&mut dbs[0], "k", &["only"]);
        co.handle_ready_keys(&mut dbs);

        assert_ready!(first.poll()).unwrap();
        assert_pending!(second.poll());
        assert_eq!(co.waiters_on(0, b"k"), vec![2]);
    }

    #[test]
    fn test_all_elements_served_in_one_pass() {
        let (mut co, mut dbs) = setup();
        let a = co.block_for_keys(1, 0, vec![key("k")], BlockOp::PopFront, None);
        let b = co.block_for_keys(2, 0, vec![key("k")], BlockOp::PopBack, None);
        let c = co.block_for_keys(3, 0, vec![key("k")], BlockOp::PopFront, None);
        let (mut a, mut b, mut c) = (task::spawn(a.receiver), task::spawn(b.receiver), task::spawn(c.receiver));

        push(&mut dbs[0], "k", &["x", "y", "z"]);
        co.handle_ready_keys(&mut dbs);

        let value = |r: BlockResult| match r {
            BlockResult::Popped { value, .. } => value,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(value(assert_ready!(a.poll()).unwrap()), key("x"));
        assert_eq!(value(assert_ready!(b.poll()).unwrap()), key("z"));
        assert_eq!(value(assert_ready!(c.poll()).unwrap()), key("y"));
        assert_eq!(co.blocked_clients(), 0);
    }

    #[test]
    fn test_extra_elements_stay_in_list() {
        let (mut co, mut dbs) = setup();
        let handle = co.block_for_keys(1, 0, vec![key("k")], BlockOp::PopFront, None);
        push(&mut dbs[0], "k", &["a", "b"]);
        co.handle_ready_keys(&mut dbs);

        drop(handle);
        assert_eq!(list(&mut dbs[0], "k"), vec![key("b")]);
    }

    #[test]
    fn test_registered_under_every_key() {
        let (mut co, mut dbs) = setup();
        let handle = co.block_for_keys(7, 0, vec![key("a"), key("b"), key("a")], BlockOp::PopFront, None);
        let mut rx = task::spawn(handle.receiver);
        assert_eq!(co.waiters_on(0, b"a"), vec![7]);
        assert_eq!(co.waiters_on(0, b"b"), vec![7]);

        push(&mut dbs[0], "b", &["v"]);
        co.handle_ready_keys(&mut dbs);

        let result = assert_ready!(rx.poll()).unwrap();
        assert_eq!(
            result,
            BlockResult::Popped {
                key: key("b"),
                value: key("v")
            }
        );
        assert!(co.waiters_on(0, b"a").is_empty());
    }

    #[test]
    fn test_unblock_is_single_transition() {
        let (mut co, mut dbs) = setup();
        let handle = co.block_for_keys(1, 0, vec![key("k")], BlockOp::PopFront, None);
        assert!(co.unblock(1));
        assert!(!co.unblock(1));
        assert!(co.waiters_on(0, b"k").is_empty());

        // data arriving later is left alone
        push(&mut dbs[0], "k", &["v"]);
        co.handle_ready_keys(&mut dbs);
        assert_eq!(list(&mut dbs[0], "k"), vec![key("v")]);
        drop(handle);
    }

    #[test]
    fn test_unblock_after_wake_loses() {
        let (mut co, mut dbs) = setup();
        let handle = co.block_for_keys(1, 0, vec![key("k")], BlockOp::PopFront, None);
        push(&mut dbs[0], "k", &["v"]);
        co.handle_ready_keys(&mut dbs);

        assert!(!co.unblock(1));
        let mut rx = task::spawn(handle.receiver);
        assert!(matches!(assert_ready!(rx.poll()), Ok(BlockResult::Popped { .. })));
    }

    #[test]
    fn test_dead_waiter_is_skipped() {
        let (mut co, mut dbs) = setup();
        let gone = co.block_for_keys(1, 0, vec![key("k")], BlockOp::PopFront, None);
        let alive = co.block_for_keys(2, 0, vec![key("k")], BlockOp::PopFront, None);
        drop(gone);
        let mut alive = task::spawn(alive.receiver);

        push(&mut dbs[0], "k", &["v"]);
        co.handle_ready_keys(&mut dbs);

        assert!(matches!(assert_ready!(alive.poll()), Ok(BlockResult::Popped { .. })));
        assert_eq!(co.blocked_clients(), 0);
    }

    #[test]
    fn test_databases_are_separate() {
        let (mut co, mut dbs) = setup();
        let handle = co.block_for_keys(1, 1, vec![key("k")], BlockOp::PopFront, None);
        let mut rx = task::spawn(handle.receiver);

        push(&mut dbs[0], "k", &["v"]);
        co.handle_ready_keys(&mut dbs);
        assert_pending!(rx.poll());

        push(&mut dbs[1], "k", &["w"]);
        co.handle_ready_keys(&mut dbs);
        assert_ready!(rx.poll()).unwrap();
    }

    #[test]
    fn test_move_feeds_next_waiter() {
        let (mut co, mut dbs) = setup();
        let mover = co.block_for_keys(
            1,
            0,
            vec![key("src")],
            BlockOp::MoveTo {
                destination: key("dst"),
            },
            None,
        );
        let reader = co.block_for_keys(2, 0, vec![key("dst")], BlockOp::PopFront, None);
        let mut mover = task::spawn(mover.receiver);
        let mut reader = task::spawn(reader.receiver);

        push(&mut dbs[0], "src", &["v"]);
        co.handle_ready_keys(&mut dbs);

        assert_eq!(assert_ready!(mover.poll()).unwrap(), BlockResult::Moved { value: key("v") });
        assert_eq!(
            assert_ready!(reader.poll()).unwrap(),
            BlockResult::Popped {
                key: key("dst"),
                value: key("v")
            }
        );
        assert!(!dbs[0].exists(b"dst"));
    }

    #[test]
    fn test_move_to_wrong_type_errors() {
        let (mut co, mut dbs) = setup();
        dbs[0].add(key("dst"), Value::string("x"));
        let mover = co.block_for_keys(
            1,
            0,
            vec![key("src")],
            BlockOp::MoveTo {
                destination: key("dst"),
            },
            None,
        );
        let mut mover = task::spawn(mover.receiver);

        push(&mut dbs[0], "src", &["v"]);
        co.handle_ready_keys(&mut dbs);

        assert_eq!(
            assert_ready!(mover.poll()).unwrap(),
            BlockResult::Error(StoreError::WrongType)
        );
        assert_eq!(list(&mut dbs[0], "src"), vec![key("v")]);
    }

    #[test]
    fn test_non_list_value_does_not_wake() {
        let (mut co, mut dbs) = setup();
        let handle = co.block_for_keys(1, 0, vec![key("k")], BlockOp::PopFront, None);
        let mut rx = task::spawn(handle.receiver);

        dbs[0].set_persist(key("k"), Value::string("s"));
        co.handle_ready_keys(&mut dbs);
        assert_pending!(rx.poll());
        assert!(co.is_blocked(1));
    }

    #[tokio::test]
    async fn test_deadline_recorded() {
        let mut co = BlockingCoordinator::new();
        let handle = co.block_for_keys(1, 0, vec![key("k")], BlockOp::PopFront, Some(Duration::from_millis(50)));
        assert!(handle.deadline.is_some());
        assert_eq!(co.deadline_of(1), handle.deadline);

        let _ = co.block_for_keys(2, 0, vec![key("k")], BlockOp::PopFront, None);
        assert_eq!(co.deadline_of(2), None);
        assert_eq!(co.waiters_on(0, b"k"), vec![1, 2]);
    }
}
