//! Ready-key queue shared with the keyspace modify hook

use bytes::Bytes;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A key within a database
pub type DbKey = (usize, Bytes);

#[derive(Debug, Default)]
struct ReadyState {
    /// Keys with at least one waiter
    watched: HashSet<DbKey>,
    queue: VecDeque<DbKey>,
    queued: HashSet<DbKey>,
}

/// Queue of keys that were modified while clients waited on them.
///
/// Cloning gives another handle on the same queue. A key is queued at most
/// once until it is popped again.
#[derive(Debug, Clone, Default)]
pub struct ReadyKeys {
    inner: Arc<Mutex<ReadyState>>,
}

impl ReadyKeys {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ReadyState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn watch(&self, db: usize, key: Bytes) {
        self.lock().watched.insert((db, key));
    }

    pub(crate) fn unwatch(&self, db: usize, key: &Bytes) {
        let mut state = self.lock();
        let entry = (db, key.clone());
        state.watched.remove(&entry);
    }

    /// Record a modification of `key`; ignored unless someone waits on it
    pub fn signal(&self, db: usize, key: &Bytes) {
        let entry = (db, key.clone());
        let mut state = self.lock();
        if state.watched.contains(&entry) && state.queued.insert(entry.clone()) {
            state.queue.push_back(entry);
        }
    }

    pub fn pop(&self) -> Option<DbKey> {
        let mut state = self.lock();
        let entry = state.queue.pop_front()?;
        state.queued.remove(&entry);
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_watched_keys_are_queued() {
        let ready = ReadyKeys::new();
        ready.signal(0, &Bytes::from("k"));
        assert!(ready.is_empty());

        ready.watch(0, Bytes::from("k"));
        ready.signal(1, &Bytes::from("k"));
        ready.signal(0, &Bytes::from("k"));
        assert_eq!(ready.pop(), Some((0, Bytes::from("k"))));
        assert_eq!(ready.pop(), None);
    }

    #[test]
    fn test_no_duplicates_until_popped() {
        let ready = ReadyKeys::new();
        ready.watch(0, Bytes::from("a"));
        ready.watch(0, Bytes::from("b"));

        ready.signal(0, &Bytes::from("a"));
        ready.signal(0, &Bytes::from("b"));
        ready.signal(0, &Bytes::from("a"));
        assert_eq!(ready.len(), 2);

        assert_eq!(ready.pop(), Some((0, Bytes::from("a"))));
        ready.signal(0, &Bytes::from("a"));
        assert_eq!(ready.pop(), Some((0, Bytes::from("b"))));
        assert_eq!(ready.pop(), Some((0, Bytes::from("a"))));
    }

    #[test]
    fn test_unwatch() {
        let ready = ReadyKeys::new();
        ready.watch(2, Bytes::from("k"));
        ready.unwatch(2, &Bytes::from("k"));
        ready.signal(2, &Bytes::from("k"));
        assert!(ready.is_empty());
    }
}
