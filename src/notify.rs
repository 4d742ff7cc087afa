//! Keyspace change notifications
//!
//! Commands report what they did to a key through a [`Notifier`], which
//! filters events by class and hands them to the registered sinks. Sinks
//! must not block: delivery is fire-and-forget.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Category of a keyspace event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// Type-independent commands (DEL, EXPIRE, ...)
    Generic,
    String,
    List,
    Set,
    Hash,
    SortedSet,
    /// A key was removed because its time to live elapsed
    Expired,
}

impl EventClass {
    fn flag(self) -> u16 {
        match self {
            EventClass::Generic => 1 << 0,
            EventClass::String => 1 << 1,
            EventClass::List => 1 << 2,
            EventClass::Set => 1 << 3,
            EventClass::Hash => 1 << 4,
            EventClass::SortedSet => 1 << 5,
            EventClass::Expired => 1 << 6,
        }
    }
}

const ALL_CLASSES: u16 = (1 << 7) - 1;

/// Parse a class string such as `"Elg"` or `"A"` into a flag set.
///
/// `K` and `E` select the channel flavour in other servers and are accepted
/// without effect. Returns `None` on an unknown character.
pub fn parse_classes(classes: &str) -> Option<u16> {
    let mut flags = 0;
    for c in classes.chars() {
        flags |= match c {
            'A' => ALL_CLASSES,
            'g' => EventClass::Generic.flag(),
            '$' => EventClass::String.flag(),
            'l' => EventClass::List.flag(),
            's' => EventClass::Set.flag(),
            'h' => EventClass::Hash.flag(),
            'z' => EventClass::SortedSet.flag(),
            'x' => EventClass::Expired.flag(),
            'K' | 'E' => 0,
            _ => return None,
        };
    }
    Some(flags)
}

/// One notification: `event` happened to `key` in database `db`
#[derive(Debug, Clone, PartialEq)]
pub struct KeyspaceEvent {
    pub class: EventClass,
    pub event: &'static str,
    pub key: Bytes,
    pub db: usize,
}

impl fmt::Display for KeyspaceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "db{} {} {}",
            self.db,
            self.event,
            String::from_utf8_lossy(&self.key)
        )
    }
}

/// Receiver of keyspace events
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &KeyspaceEvent);
}

/// Sink publishing events on a tokio broadcast channel
pub struct BroadcastSink {
    tx: broadcast::Sender<KeyspaceEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        BroadcastSink { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KeyspaceEvent> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, event: &KeyspaceEvent) {
        // no subscribers is fine
        let _ = self.tx.send(event.clone());
    }
}

/// Sink writing every event to the trace log
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: &KeyspaceEvent) {
        trace!("keyspace event: {}", event);
    }
}

/// Class filter in front of a list of sinks
#[derive(Clone, Default)]
pub struct Notifier {
    flags: u16,
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl Notifier {
    /// A notifier that drops every event
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A notifier forwarding the classes in `flags` (see [`parse_classes`])
    pub fn new(flags: u16) -> Self {
        Notifier {
            flags,
            sinks: Vec::new(),
        }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn is_enabled(&self, class: EventClass) -> bool {
        self.flags & class.flag() != 0 && !self.sinks.is_empty()
    }

    pub fn notify(&self, class: EventClass, event: &'static str, key: &Bytes, db: usize) {
        if !self.is_enabled(class) {
            return;
        }
        let event = KeyspaceEvent {
            class,
            event,
            key: key.clone(),
            db,
        };
        for sink in &self.sinks {
            sink.notify(&event);
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("flags", &self.flags)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
