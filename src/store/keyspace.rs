//! Per-database key dictionary with lazy expiration

use super::value::Value;
use crate::notify::{EventClass, Notifier};
use bytes::Bytes;
use rand::seq::IteratorRandom;
use siphasher::sip::SipHasher13;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::time::Instant;

/// Hash map keyed by key bytes, hashed with SipHash-1-3
type KeyMap<V> = HashMap<Bytes, V, BuildHasherDefault<SipHasher13>>;

/// Callback invoked with (database id, key) after every mutation
pub type ModifyHook = Box<dyn FnMut(usize, &Bytes) + Send>;

/// One numbered database.
///
/// Owns every value reachable from its dictionary. Expiration instants are
/// kept in a separate map that only holds keys currently present. Expired
/// keys are removed lazily, on the first access that notices them.
pub struct KeySpace {
    id: usize,
    entries: KeyMap<Value>,
    expires: KeyMap<Instant>,
    hits: u64,
    misses: u64,
    expired_keys: u64,
    hook: Option<ModifyHook>,
    notifier: Notifier,
}

impl KeySpace {
    /// Create an empty database with id `id`
    pub fn new(id: usize) -> Self {
        Self::with_notifier(id, Notifier::disabled())
    }

    pub fn with_notifier(id: usize, notifier: Notifier) -> Self {
        KeySpace {
            id,
            entries: KeyMap::default(),
            expires: KeyMap::default(),
            hits: 0,
            misses: 0,
            expired_keys: 0,
            hook: None,
            notifier,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Install the callback run by [`signal_modify_key`](Self::signal_modify_key)
    pub fn set_modify_hook(&mut self, hook: ModifyHook) {
        self.hook = Some(hook);
    }

    /// Report that `key` was modified
    pub fn signal_modify_key(&mut self, key: &Bytes) {
        if let Some(hook) = self.hook.as_mut() {
            hook(self.id, key);
        }
    }

    /// Remove `key` if its time to live has elapsed; returns whether it did
    fn expire_if_needed(&mut self, key: &[u8]) -> bool {
        let elapsed = match self.expires.get(key) {
            Some(when) => Instant::now() >= *when,
            None => false,
        };
        if !elapsed {
            return false;
        }

        self.expires.remove(key);
        if let Some((key, _)) = self.entries.remove_entry(key) {
            self.expired_keys += 1;
            self.notifier.notify(EventClass::Expired, "expired", &key, self.id);
            self.signal_modify_key(&key);
        }
        true
    }

    /// Look up `key` for reading, counting a hit or a miss
    pub fn lookup_read(&mut self, key: &[u8]) -> Option<&Value> {
        self.expire_if_needed(key);
        match self.entries.get(key) {
            Some(value) => {
                self.hits += 1;
                Some(value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Look up `key` before mutating it. Does not touch the counters.
    pub fn lookup_write(&mut self, key: &[u8]) -> Option<&mut Value> {
        self.expire_if_needed(key);
        self.entries.get_mut(key)
    }

    /// Look up `key` for writing, inserting `init()` when it is absent.
    ///
    /// The caller signals the modification once it is done with the value.
    pub fn lookup_write_or_insert(&mut self, key: &Bytes, init: impl FnOnce() -> Value) -> &mut Value {
        self.expire_if_needed(key);
        self.entries.entry(key.clone()).or_insert_with(init)
    }

    /// Insert a key that must not exist yet.
    ///
    /// # Panics
    ///
    /// Panics if `key` is present: callers check existence first.
    pub fn add(&mut self, key: Bytes, value: Value) {
        self.expire_if_needed(&key);
        if self.entries.contains_key(&key) {
            panic!(
                "keyspace add of existing key {:?} in db {}",
                String::from_utf8_lossy(&key),
                self.id
            );
        }
        self.entries.insert(key.clone(), value);
        self.signal_modify_key(&key);
    }

    /// Replace the value of a key that must exist, keeping its expiration.
    ///
    /// # Panics
    ///
    /// Panics if `key` is absent.
    pub fn update(&mut self, key: &Bytes, value: Value) {
        self.expire_if_needed(key);
        match self.entries.get_mut(key) {
            Some(slot) => *slot = value,
            None => panic!(
                "keyspace update of missing key {:?} in db {}",
                String::from_utf8_lossy(key),
                self.id
            ),
        }
        self.signal_modify_key(key);
    }

    /// Delete a key and its expiration, returns whether it existed
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.expire_if_needed(key);
        self.expires.remove(key);
        match self.entries.remove_entry(key) {
            Some((key, _)) => {
                self.signal_modify_key(&key);
                true
            }
            None => false,
        }
    }

    /// Upsert `value` under `key` and clear any expiration
    pub fn set_persist(&mut self, key: Bytes, value: Value) {
        self.expire_if_needed(&key);
        self.expires.remove(&key);
        self.entries.insert(key.clone(), value);
        self.signal_modify_key(&key);
    }

    pub fn exists(&mut self, key: &[u8]) -> bool {
        self.expire_if_needed(key);
        self.entries.contains_key(key)
    }

    /// A uniformly sampled live key, `None` when the database is empty
    pub fn random_key(&mut self) -> Option<Bytes> {
        let mut rng = rand::thread_rng();
        loop {
            let key = self.entries.keys().choose(&mut rng)?.clone();
            // sampled an expired key: it is gone now, try again
            if !self.expire_if_needed(&key) {
                return Some(key);
            }
        }
    }

    /// Set the absolute expiration of an existing key
    pub fn set_expire(&mut self, key: &[u8], when: Instant) -> bool {
        self.expire_if_needed(key);
        let key = match self.entries.get_key_value(key) {
            Some((key, _)) => key.clone(),
            None => return false,
        };
        self.expires.insert(key.clone(), when);
        self.signal_modify_key(&key);
        true
    }

    pub fn get_expire(&mut self, key: &[u8]) -> Option<Instant> {
        self.expire_if_needed(key);
        self.expires.get(key).copied()
    }

    /// Drop the expiration of `key`, returns whether there was one
    pub fn remove_expire(&mut self, key: &[u8]) -> bool {
        self.expire_if_needed(key);
        match self.expires.remove_entry(key) {
            Some((key, _)) => {
                self.signal_modify_key(&key);
                true
            }
            None => false,
        }
    }

    /// Remove every key, returns how many there were
    pub fn flush(&mut self) -> usize {
        let removed: Vec<Bytes> = self.entries.drain().map(|(key, _)| key).collect();
        self.expires.clear();
        for key in &removed {
            self.signal_modify_key(key);
        }
        removed.len()
    }

    /// Proactively remove up to `limit` expired keys, returns how many went
    pub fn purge_expired(&mut self, limit: usize) -> usize {
        let now = Instant::now();
        let due: Vec<Bytes> = self
            .expires
            .iter()
            .filter(|(_, when)| now >= **when)
            .map(|(key, _)| key.clone())
            .take(limit)
            .collect();
        due.iter().filter(|key| self.expire_if_needed(key)).count()
    }

    /// Number of keys, including expired keys not yet removed
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All keys whose time to live has not elapsed
    pub fn keys(&self) -> Vec<Bytes> {
        let now = Instant::now();
        self.entries
            .keys()
            .filter(|key| self.expires.get(*key).map_or(true, |when| now < *when))
            .cloned()
            .collect()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Approximate memory used by keys and values in bytes
    pub fn memory_usage(&self) -> usize {
        self.entries
            .iter()
            .map(|(key, value)| key.len() + value.memory_usage())
            .sum()
    }

    pub fn stats(&self) -> KeyspaceStats {
        KeyspaceStats {
            db: self.id,
            keys: self.entries.len(),
            expires: self.expires.len(),
            hits: self.hits,
            misses: self.misses,
            expired_keys: self.expired_keys,
        }
    }
}

/// Counters describing one database
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct KeyspaceStats {
    pub db: usize,
    pub keys: usize,
    pub expires: usize,
    pub hits: u64,
    pub misses: u64,
    pub expired_keys: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn key(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_lookup_counts_hits_and_misses() {
        let mut ks = KeySpace::new(0);
        assert!(ks.lookup_read(b"k").is_none());
        assert_eq!(ks.stats().misses, 1);

        ks.add(key("k"), Value::string("v"));
        let value = ks.lookup_read(b"k").unwrap();
        assert_eq!(value.as_string().unwrap().to_bytes(), key("v"));
        assert_eq!(ks.stats().hits, 1);

        // write lookups leave the counters alone
        ks.lookup_write(b"k");
        ks.lookup_write(b"nope");
        assert_eq!(ks.stats().hits, 1);
        assert_eq!(ks.stats().misses, 1);
    }

    #[test]
    #[should_panic(expected = "add of existing key")]
    fn test_add_existing_key_panics() {
        let mut ks = KeySpace::new(0);
        ks.add(key("x"), Value::string("1"));
        ks.add(key("x"), Value::string("2"));
    }

    #[test]
    #[should_panic(expected = "update of missing key")]
    fn test_update_missing_key_panics() {
        let mut ks = KeySpace::new(0);
        ks.update(&key("x"), Value::string("1"));
    }

    #[test]
    fn test_update_keeps_expiration() {
        let mut ks = KeySpace::new(0);
        let when = Instant::now() + Duration::from_secs(60);
        ks.add(key("x"), Value::string("1"));
        ks.set_expire(b"x", when);
        ks.update(&key("x"), Value::string("2"));
        assert_eq!(ks.get_expire(b"x"), Some(when));
    }

    #[test]
    fn test_delete() {
        let mut ks = KeySpace::new(0);
        ks.add(key("x"), Value::string("1"));
        ks.set_expire(b"x", Instant::now() + Duration::from_secs(60));
        assert!(ks.delete(b"x"));
        assert!(!ks.delete(b"x"));
        assert_eq!(ks.stats().expires, 0);
    }

    #[test]
    fn test_set_persist_clears_expiration() {
        let mut ks = KeySpace::new(0);
        ks.set_persist(key("x"), Value::string("1"));
        ks.set_expire(b"x", Instant::now() + Duration::from_secs(60));
        ks.set_persist(key("x"), Value::string("2"));
        assert_eq!(ks.get_expire(b"x"), None);
        assert_eq!(
            ks.lookup_read(b"x").unwrap().as_string().unwrap().to_bytes(),
            key("2")
        );
    }

    #[test]
    fn test_lazy_expiration() {
        let mut ks = KeySpace::new(0);
        ks.add(key("gone"), Value::string("1"));
        assert!(ks.set_expire(b"gone", Instant::now()));
        assert!(!ks.set_expire(b"missing", Instant::now()));

        assert!(!ks.exists(b"gone"));
        assert!(ks.lookup_read(b"gone").is_none());
        assert_eq!(ks.stats().expired_keys, 1);
        assert!(ks.is_empty());
    }

    #[test]
    fn test_remove_expire() {
        let mut ks = KeySpace::new(0);
        ks.add(key("x"), Value::string("1"));
        assert!(!ks.remove_expire(b"x"));
        ks.set_expire(b"x", Instant::now() + Duration::from_secs(60));
        assert!(ks.remove_expire(b"x"));
        assert_eq!(ks.get_expire(b"x"), None);
    }

    #[test]
    fn test_random_key_skips_expired() {
        let mut ks = KeySpace::new(0);
        assert!(ks.random_key().is_none());

        for i in 0..10 {
            let k = key(&format!("dead{}", i));
            ks.add(k.clone(), Value::string("x"));
            ks.set_expire(&k, Instant::now());
        }
        ks.add(key("alive"), Value::string("x"));

        assert_eq!(ks.random_key(), Some(key("alive")));
        assert_eq!(ks.len(), 1);
    }

    #[test]
    fn test_modify_hook_sees_mutations() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut ks = KeySpace::new(4);
        ks.set_modify_hook(Box::new(move |db, key| {
            sink.lock().unwrap().push((db, key.clone()));
        }));

        ks.add(key("a"), Value::string("1"));
        ks.set_persist(key("b"), Value::string("1"));
        ks.delete(b"a");
        ks.delete(b"never");

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(4, key("a")), (4, key("b")), (4, key("a"))]);
    }

    #[test]
    fn test_keys_and_flush() {
        let mut ks = KeySpace::new(0);
        ks.add(key("a"), Value::string("1"));
        ks.add(key("b"), Value::string("1"));
        ks.add(key("c"), Value::string("1"));
        ks.set_expire(b"c", Instant::now());

        let mut keys = ks.keys();
        keys.sort();
        assert_eq!(keys, vec![key("a"), key("b")]);

        assert_eq!(ks.purge_expired(10), 1);
        assert_eq!(ks.flush(), 2);
        assert!(ks.is_empty());
    }
}
