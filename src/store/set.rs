//! Set value with a compact integer encoding
//!
//! A set starts as an [`IntSet`] while every member is a canonical integer
//! and the member count stays under the configured limit. The first member
//! breaking either rule converts the whole set to a hash set, once. The
//! conversion is never undone.

use super::intset::IntSet;
use super::value::parse_canonical_i64;
use bytes::Bytes;
use rand::seq::IteratorRandom;
use std::collections::HashSet;

/// Default member count above which a compact set is converted
pub const DEFAULT_MAX_INTSET_ENTRIES: usize = 512;

/// Visible representation tag of a [`Set`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetEncoding {
    Compact,
    General,
}

#[derive(Debug, Clone, PartialEq)]
enum Repr {
    Compact(IntSet),
    General(HashSet<Bytes>),
}

/// Set of byte-string members
#[derive(Debug, Clone, PartialEq)]
pub struct Set {
    repr: Repr,
    max_compact: usize,
}

impl Set {
    /// Create an empty set with the default compact limit
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_INTSET_ENTRIES)
    }

    /// Create an empty set that stays compact up to `max_compact` members
    pub fn with_limit(max_compact: usize) -> Self {
        Set {
            repr: Repr::Compact(IntSet::new()),
            max_compact,
        }
    }

    /// Create an empty set suited to hold `first`: compact when it is an
    /// integer, general otherwise
    pub fn for_member(first: &[u8], max_compact: usize) -> Self {
        let mut set = Self::with_limit(max_compact);
        if parse_canonical_i64(first).is_none() {
            set.upgrade();
        }
        set
    }

    pub fn encoding(&self) -> SetEncoding {
        match self.repr {
            Repr::Compact(_) => SetEncoding::Compact,
            Repr::General(_) => SetEncoding::General,
        }
    }

    /// Convert to the general representation. Idempotent and one-way.
    pub fn upgrade(&mut self) {
        if let Repr::Compact(ints) = &self.repr {
            let general: HashSet<Bytes> = ints.iter().map(|v| Bytes::from(v.to_string())).collect();
            self.repr = Repr::General(general);
        }
    }

    /// Add `member`, returns false if it was already present
    pub fn add(&mut self, member: Bytes) -> bool {
        if let Repr::Compact(ints) = &mut self.repr {
            if let Some(value) = parse_canonical_i64(&member) {
                if !ints.insert(value) {
                    return false;
                }
                if ints.len() > self.max_compact {
                    self.upgrade();
                }
                return true;
            }
            self.upgrade();
        }

        match &mut self.repr {
            Repr::General(members) => members.insert(member),
            Repr::Compact(_) => unreachable!("set was just upgraded"),
        }
    }

    /// Remove `member`, returns whether it was present
    pub fn remove(&mut self, member: &[u8]) -> bool {
        match &mut self.repr {
            Repr::Compact(ints) => match parse_canonical_i64(member) {
                Some(value) => ints.remove(value),
                None => false,
            },
            Repr::General(members) => members.remove(member),
        }
    }

    pub fn is_member(&self, member: &[u8]) -> bool {
        match &self.repr {
            Repr::Compact(ints) => parse_canonical_i64(member).is_some_and(|v| ints.contains(v)),
            Repr::General(members) => members.contains(member),
        }
    }

    pub fn size(&self) -> usize {
        match &self.repr {
            Repr::Compact(ints) => ints.len(),
            Repr::General(members) => members.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Uniformly sampled member, `None` when empty
    pub fn random_element(&self) -> Option<Bytes> {
        match &self.repr {
            Repr::Compact(ints) => ints.random().map(|v| Bytes::from(v.to_string())),
            Repr::General(members) => members.iter().choose(&mut rand::thread_rng()).cloned(),
        }
    }

    /// Remove and return a uniformly sampled member
    pub fn pop(&mut self) -> Option<Bytes> {
        let member = self.random_element()?;
        self.remove(&member);
        Some(member)
    }

    /// All members; compact members come out in ascending numeric order
    pub fn members(&self) -> Vec<Bytes> {
        match &self.repr {
            Repr::Compact(ints) => ints.iter().map(|v| Bytes::from(v.to_string())).collect(),
            Repr::General(members) => members.iter().cloned().collect(),
        }
    }

    /// Approximate heap footprint in bytes
    pub fn memory_usage(&self) -> usize {
        match &self.repr {
            Repr::Compact(ints) => ints.blob_len(),
            Repr::General(members) => members.iter().map(|m| m.len()).sum::<usize>()
                + std::mem::size_of::<HashSet<Bytes>>(),
        }
    }
}

impl Default for Set {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_membership() {
        let mut set = Set::new();
        for v in [5, -3, 1000, 42] {
            assert!(set.add(Bytes::from(v.to_string())));
        }
        assert_eq!(set.encoding(), SetEncoding::Compact);

        for v in [5, -3, 1000, 42] {
            assert!(set.is_member(v.to_string().as_bytes()));
        }
        assert!(!set.is_member(b"6"));
        assert!(!set.is_member(b"hello"));
        assert_eq!(set.size(), 4);
    }

    #[test]
    fn test_compact_members_sorted() {
        let mut set = Set::new();
        for v in ["1", "4", "3"] {
            set.add(Bytes::from(v));
        }
        assert_eq!(
            set.members(),
            vec![Bytes::from("1"), Bytes::from("3"), Bytes::from("4")]
        );
    }

    #[test]
    fn test_non_integer_upgrades_once() {
        let mut set = Set::new();
        set.add(Bytes::from("1"));
        set.add(Bytes::from("2"));
        set.add(Bytes::from("apple"));
        assert_eq!(set.encoding(), SetEncoding::General);
        assert!(set.is_member(b"1"));
        assert!(set.is_member(b"apple"));

        // removing the string member does not make it compact again
        assert!(set.remove(b"apple"));
        assert_eq!(set.encoding(), SetEncoding::General);
        assert_eq!(set.size(), 2);
    }

    #[test]
    fn test_non_canonical_integer_is_a_string() {
        let mut set = Set::new();
        set.add(Bytes::from("007"));
        assert_eq!(set.encoding(), SetEncoding::General);
        assert!(set.is_member(b"007"));
        assert!(!set.is_member(b"7"));
    }

    #[test]
    fn test_limit_upgrades() {
        let mut set = Set::with_limit(3);
        for v in 0..3 {
            set.add(Bytes::from(v.to_string()));
        }
        assert_eq!(set.encoding(), SetEncoding::Compact);

        set.add(Bytes::from("3"));
        assert_eq!(set.encoding(), SetEncoding::General);
        assert_eq!(set.size(), 4);

        // duplicate in compact form never triggers the conversion
        let mut small = Set::with_limit(1);
        small.add(Bytes::from("9"));
        assert!(!small.add(Bytes::from("9")));
        assert_eq!(small.encoding(), SetEncoding::Compact);
    }

    #[test]
    fn test_for_member_picks_encoding() {
        assert_eq!(Set::for_member(b"12", 10).encoding(), SetEncoding::Compact);
        assert_eq!(Set::for_member(b"x", 10).encoding(), SetEncoding::General);
    }

    #[test]
    fn test_pop_drains() {
        let mut set = Set::new();
        for v in ["a", "b", "c"] {
            set.add(Bytes::from(v));
        }
        let mut seen = Vec::new();
        while let Some(m) = set.pop() {
            seen.push(m);
        }
        seen.sort();
        assert_eq!(seen, vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]);
        assert!(set.is_empty());
        assert!(set.random_element().is_none());
    }
}
