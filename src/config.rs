//! Server configuration
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! gives a working server.

use crate::notify::{parse_classes, BroadcastSink, Notifier, TracingSink};
use crate::store::DEFAULT_MAX_INTSET_ENTRIES;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// Environment variable naming the config file when no argument is given
pub const CONFIG_ENV: &str = "CINDERKV_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RESP listener address
    pub bind: String,
    /// HTTP stats listener; disabled when absent
    pub web_addr: Option<String>,
    pub databases: usize,
    /// Member count above which a compact integer set is converted
    pub set_max_intset_entries: usize,
    /// Keyspace event classes, e.g. "Elg" or "A"
    pub notify_keyspace_events: String,
    /// Fallback tracing directive when RUST_LOG is unset
    pub log_level: String,
    pub worker_threads: usize,
    /// Bytes of unparsed input a client may buffer before it is disconnected
    pub max_query_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1:6379".to_string(),
            web_addr: None,
            databases: 16,
            set_max_intset_entries: DEFAULT_MAX_INTSET_ENTRIES,
            notify_keyspace_events: String::new(),
            log_level: "info".to_string(),
            worker_threads: num_cpus::get(),
            max_query_buffer: 1024 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Parse a JSON document
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(text).context("invalid configuration JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse the file at `path`
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in config file {}", path.display()))
    }

    /// Load from the first command line argument, else from the file named
    /// by `CINDERKV_CONFIG`, else defaults
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::args()
            .nth(1)
            .or_else(|| std::env::var(CONFIG_ENV).ok());
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.databases == 0 {
            bail!("databases must be at least 1");
        }
        if self.worker_threads == 0 {
            bail!("worker_threads must be at least 1");
        }
        if self.max_query_buffer == 0 {
            bail!("max_query_buffer must be at least 1");
        }
        if parse_classes(&self.notify_keyspace_events).is_none() {
            bail!(
                "invalid notify_keyspace_events '{}'",
                self.notify_keyspace_events
            );
        }
        Ok(())
    }

    /// Notifier for the configured event classes, logging at trace level
    /// and publishing on `events`
    pub fn notifier(&self, events: Arc<BroadcastSink>) -> Notifier {
        let flags = parse_classes(&self.notify_keyspace_events).unwrap_or(0);
        if flags == 0 {
            return Notifier::disabled();
        }
        let mut notifier = Notifier::new(flags);
        notifier.add_sink(Arc::new(TracingSink));
        notifier.add_sink(events);
        notifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::EventClass;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.bind, "127.0.0.1:6379");
        assert_eq!(config.databases, 16);
        assert_eq!(config.set_max_intset_entries, 512);
        assert!(config.web_addr.is_none());
        assert!(config.worker_threads >= 1);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_json(
            r#"{"bind": "0.0.0.0:7000", "web_addr": "127.0.0.1:8080", "databases": 4}"#,
        )
        .unwrap();
        assert_eq!(config.bind, "0.0.0.0:7000");
        assert_eq!(config.web_addr.as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(config.databases, 4);
    }

    #[test]
    fn test_validation() {
        assert!(Config::from_json(r#"{"databases": 0}"#).is_err());
        assert!(Config::from_json(r#"{"notify_keyspace_events": "Q"}"#).is_err());
        assert!(Config::from_json("not json").is_err());
    }

    #[test]
    fn test_notifier() {
        let events = Arc::new(BroadcastSink::new(8));
        assert!(!Config::default()
            .notifier(events.clone())
            .is_enabled(EventClass::List));

        let config = Config {
            notify_keyspace_events: "El".to_string(),
            ..Config::default()
        };
        let mut rx = events.subscribe();
        let notifier = config.notifier(events);
        assert!(notifier.is_enabled(EventClass::List));
        assert!(!notifier.is_enabled(EventClass::Hash));

        notifier.notify(EventClass::List, "rpush", &bytes::Bytes::from("q"), 0);
        assert_eq!(rx.try_recv().unwrap().event, "rpush");
    }

    #[test]
    fn test_max_query_buffer() {
        let config = Config::from_json(r#"{"max_query_buffer": 4096}"#).unwrap();
        assert_eq!(config.max_query_buffer, 4096);
        assert_eq!(Config::default().max_query_buffer, 1024 * 1024 * 1024);
        assert!(Config::from_json(r#"{"max_query_buffer": 0}"#).is_err());
    }
}
