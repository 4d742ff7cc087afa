//! In-memory storage module
//!
//! Value types, their encodings and the per-database keyspace. Nothing in
//! here knows about the wire protocol or commands.

mod error;
mod intset;
mod keyspace;
mod set;
mod skiplist;
mod value;
mod zset;

pub use error::StoreError;
pub use intset::{IntSet, LaneWidth};
pub use keyspace::{KeySpace, KeyspaceStats, ModifyHook};
pub use set::{Set, SetEncoding, DEFAULT_MAX_INTSET_ENTRIES};
pub use skiplist::{NodeId, ScoreRange, SkipList};
pub use value::{format_f64, parse_canonical_i64, parse_f64, StringValue, Value, ValueKind};
pub use zset::{ScoredMember, SortedSet};
