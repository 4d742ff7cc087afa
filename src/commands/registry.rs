//! Command registry
//!
//! Maps upper-case command names to their implementations. Owned by the
//! dispatcher; there is no global table.

use super::{admin, counter, hash, key, list, search, set, string, ttl, zset, Command};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of all available commands
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Create a new command registry and register all commands
    pub fn new() -> Self {
        let mut registry = CommandRegistry {
            commands: HashMap::new(),
        };

        // strings
        registry.register(Arc::new(string::SetCommand));
        registry.register(Arc::new(string::GetCommand));
        registry.register(Arc::new(string::GetSetCommand));
        registry.register(Arc::new(string::AppendCommand));
        registry.register(Arc::new(string::StrLenCommand));
        registry.register(Arc::new(string::MGetCommand));
        registry.register(Arc::new(counter::IncrCommand));
        registry.register(Arc::new(counter::DecrCommand));
        registry.register(Arc::new(counter::IncrByCommand));
        registry.register(Arc::new(counter::DecrByCommand));

        // keys
        registry.register(Arc::new(key::DelCommand));
        registry.register(Arc::new(key::ExistsCommand));
        registry.register(Arc::new(key::TypeCommand));
        registry.register(Arc::new(key::RandomKeyCommand));
        registry.register(Arc::new(key::DbSizeCommand));
        registry.register(Arc::new(search::KeysCommand));
        registry.register(Arc::new(ttl::ExpireCommand));
        registry.register(Arc::new(ttl::PExpireCommand));
        registry.register(Arc::new(ttl::TtlCommand));
        registry.register(Arc::new(ttl::PTtlCommand));
        registry.register(Arc::new(ttl::PersistCommand));

        // lists
        registry.register(Arc::new(list::LPushCommand));
        registry.register(Arc::new(list::RPushCommand));
        registry.register(Arc::new(list::LPopCommand));
        registry.register(Arc::new(list::RPopCommand));
        registry.register(Arc::new(list::LLenCommand));
        registry.register(Arc::new(list::LRangeCommand));
        registry.register(Arc::new(list::LIndexCommand));
        registry.register(Arc::new(list::LSetCommand));
        registry.register(Arc::new(list::LInsertCommand));
        registry.register(Arc::new(list::LRemCommand));
        registry.register(Arc::new(list::RPopLPushCommand));
        registry.register(Arc::new(list::BLPopCommand));
        registry.register(Arc::new(list::BRPopCommand));
        registry.register(Arc::new(list::BRPopLPushCommand));

        // hashes
        registry.register(Arc::new(hash::HSetCommand));
        registry.register(Arc::new(hash::HGetCommand));
        registry.register(Arc::new(hash::HDelCommand));
        registry.register(Arc::new(hash::HExistsCommand));
        registry.register(Arc::new(hash::HLenCommand));
        registry.register(Arc::new(hash::HGetAllCommand));
        registry.register(Arc::new(hash::HKeysCommand));
        registry.register(Arc::new(hash::HValsCommand));
        registry.register(Arc::new(hash::HIncrByCommand));

        // sets
        registry.register(Arc::new(set::SAddCommand));
        registry.register(Arc::new(set::SRemCommand));
        registry.register(Arc::new(set::SIsMemberCommand));
        registry.register(Arc::new(set::SCardCommand));
        registry.register(Arc::new(set::SMembersCommand));
        registry.register(Arc::new(set::SRandMemberCommand));
        registry.register(Arc::new(set::SPopCommand));

        // sorted sets
        registry.register(Arc::new(zset::ZAddCommand));
        registry.register(Arc::new(zset::ZIncrByCommand));
        registry.register(Arc::new(zset::ZRemCommand));
        registry.register(Arc::new(zset::ZCardCommand));
        registry.register(Arc::new(zset::ZScoreCommand));
        registry.register(Arc::new(zset::ZRankCommand));
        registry.register(Arc::new(zset::ZRevRankCommand));
        registry.register(Arc::new(zset::ZRangeCommand));
        registry.register(Arc::new(zset::ZRevRangeCommand));
        registry.register(Arc::new(zset::ZRangeByScoreCommand));
        registry.register(Arc::new(zset::ZCountCommand));
        registry.register(Arc::new(zset::ZRemRangeByRankCommand));

        // server
        registry.register(Arc::new(admin::PingCommand));
        registry.register(Arc::new(admin::EchoCommand));
        registry.register(Arc::new(admin::InfoCommand));
        registry.register(Arc::new(admin::ClientCommand));
        registry.register(Arc::new(admin::SelectCommand));
        registry.register(Arc::new(admin::FlushDbCommand));
        registry.register(Arc::new(admin::FlushAllCommand));
        registry.register(Arc::new(admin::ObjectCommand));

        registry
    }

    fn register(&mut self, command: Arc<dyn Command>) {
        let name = command.name().to_uppercase();
        self.commands.insert(name, command);
    }

    /// Get a command by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(&name.to_uppercase()).cloned()
    }

    /// Check if a command exists
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(&name.to_uppercase())
    }

    /// Get all command names
    pub fn command_names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
