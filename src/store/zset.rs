//! Sorted set: member to score dictionary plus a skip list
//!
//! The dictionary answers existence and score lookups in O(1); the skip
//! list keeps (score, member) order for ranges and ranks.

use super::error::StoreError;
use super::skiplist::{Iter, NodeId, ScoreRange, SkipList};
use bytes::Bytes;
use std::collections::HashMap;

/// A member together with its score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: Bytes,
    pub score: f64,
}

/// Sorted set of unique members ordered by (score, member)
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    dict: HashMap<Bytes, f64>,
    list: SkipList,
}

impl SortedSet {
    pub fn new() -> Self {
        SortedSet {
            dict: HashMap::new(),
            list: SkipList::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    pub fn get_score(&self, member: &[u8]) -> Option<f64> {
        self.dict.get(member).copied()
    }

    /// Insert a member that is not present yet.
    ///
    /// # Panics
    ///
    /// Panics if `member` is already in the set; callers check first.
    pub fn insert(&mut self, score: f64, member: Bytes) -> NodeId {
        assert!(
            !self.dict.contains_key(&member),
            "sorted set insert of a member that is already present"
        );
        self.dict.insert(member.clone(), score);
        self.list.insert(score, member)
    }

    /// Change the score of an existing member.
    ///
    /// Returns the previous score, or `None` if the member is absent.
    pub fn update(&mut self, member: &[u8], new_score: f64) -> Option<f64> {
        let entry = self.dict.get_mut(member)?;
        let old = *entry;
        if old == new_score {
            return Some(old);
        }
        *entry = new_score;
        self.list.update_score(old, member, new_score);
        Some(old)
    }

    /// Insert or update `member`; returns true when it was new
    pub fn add(&mut self, member: Bytes, score: f64) -> bool {
        if self.update(&member, score).is_some() {
            false
        } else {
            self.insert(score, member);
            true
        }
    }

    /// Add `delta` to the score of `member` (starting from 0 when absent)
    pub fn incr_by(&mut self, member: Bytes, delta: f64) -> Result<f64, StoreError> {
        let score = self.get_score(&member).unwrap_or(0.0) + delta;
        if score.is_nan() {
            return Err(StoreError::NanResult);
        }
        self.add(member, score);
        Ok(score)
    }

    /// Remove `member`, returns whether it was present
    pub fn delete(&mut self, member: &[u8]) -> bool {
        match self.dict.remove(member) {
            Some(score) => {
                let removed = self.list.delete(score, member);
                assert!(removed.is_some(), "sorted set dictionary and skip list disagree");
                true
            }
            None => false,
        }
    }

    /// 1-based rank of `member` in ascending order
    pub fn get_rank(&self, member: &[u8]) -> Option<usize> {
        let score = self.get_score(member)?;
        self.list.get_rank(score, member)
    }

    /// Member at 1-based ascending `rank`
    pub fn get_by_rank(&self, rank: usize) -> Option<ScoredMember> {
        self.list.get_by_rank(rank).map(|node| self.scored(node))
    }

    pub fn head(&self) -> Option<ScoredMember> {
        self.list.head().map(|node| self.scored(node))
    }

    pub fn tail(&self) -> Option<ScoredMember> {
        self.list.tail().map(|node| self.scored(node))
    }

    fn scored(&self, node: NodeId) -> ScoredMember {
        ScoredMember {
            member: self.list.member(node).clone(),
            score: self.list.score(node),
        }
    }

    /// Ascending iteration over (member, score)
    pub fn iter(&self) -> Iter<'_> {
        self.list.iter()
    }

    /// Members with 0-based rank in `start..=stop`, both already clamped
    /// to the set bounds. `reverse` counts ranks from the highest score.
    pub fn range_by_rank(&self, start: usize, stop: usize, reverse: bool) -> Vec<ScoredMember> {
        if start > stop || start >= self.len() {
            return Vec::new();
        }
        let first = if reverse {
            self.list.get_by_rank(self.len() - start)
        } else {
            self.list.get_by_rank(start + 1)
        };
        self.list
            .iter_from(first, reverse)
            .take(stop - start + 1)
            .map(|(member, score)| ScoredMember {
                member: member.clone(),
                score,
            })
            .collect()
    }

    /// Members whose score lies in `range`, in ascending or descending order
    pub fn range_by_score(&self, range: &ScoreRange, reverse: bool) -> Vec<ScoredMember> {
        let first = if reverse {
            self.list.last_in_range(range)
        } else {
            self.list.first_in_range(range)
        };
        self.list
            .iter_from(first, reverse)
            .take_while(|(_, score)| {
                if reverse {
                    range.gte_min(*score)
                } else {
                    range.lte_max(*score)
                }
            })
            .map(|(member, score)| ScoredMember {
                member: member.clone(),
                score,
            })
            .collect()
    }

    /// Number of members whose score lies in `range`
    pub fn count(&self, range: &ScoreRange) -> usize {
        let (first, last) = match (self.list.first_in_range(range), self.list.last_in_range(range)) {
            (Some(first), Some(last)) => (first, last),
            _ => return 0,
        };
        let first_rank = self
            .list
            .get_rank(self.list.score(first), self.list.member(first))
            .unwrap_or(0);
        let last_rank = self
            .list
            .get_rank(self.list.score(last), self.list.member(last))
            .unwrap_or(0);
        last_rank + 1 - first_rank
    }

    /// Remove members with 0-based rank in `start..=stop`, returns how many
    pub fn delete_range_by_rank(&mut self, start: usize, stop: usize) -> usize {
        let removed = self.list.delete_range_by_rank(start + 1, stop + 1);
        for (member, _) in &removed {
            self.dict.remove(member);
        }
        removed.len()
    }

    /// Approximate heap footprint in bytes
    pub fn memory_usage(&self) -> usize {
        self.dict
            .keys()
            .map(|m| 2 * m.len() + 2 * std::mem::size_of::<f64>())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zset(pairs: &[(f64, &str)]) -> SortedSet {
        let mut z = SortedSet::new();
        for (score, member) in pairs {
            z.add(Bytes::from(member.to_string()), *score);
        }
        z
    }

    fn names(items: &[ScoredMember]) -> Vec<String> {
        items
            .iter()
            .map(|i| String::from_utf8(i.member.to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn test_rank_and_iteration() {
        let z = zset(&[(1.0, "a"), (1.0, "b"), (2.0, "c"), (1.5, "d")]);
        assert_eq!(z.get_rank(b"c"), Some(4));
        let order: Vec<_> = z.iter().map(|(m, _)| m.clone()).collect();
        assert_eq!(
            order,
            vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("d"), Bytes::from("c")]
        );
        assert_eq!(z.get_by_rank(4).unwrap().member, Bytes::from("c"));
        assert_eq!(z.head().unwrap().member, Bytes::from("a"));
        assert_eq!(z.tail().unwrap().score, 2.0);
    }

    #[test]
    fn test_update_moves_member() {
        let mut z = zset(&[(1.0, "a"), (2.0, "b"), (3.0, "c")]);
        assert_eq!(z.update(b"a", 5.0), Some(1.0));
        assert_eq!(z.get_rank(b"a"), Some(3));
        assert_eq!(z.get_score(b"a"), Some(5.0));
        assert_eq!(z.update(b"missing", 1.0), None);
    }

    #[test]
    fn test_add_last_write_wins() {
        let mut z = SortedSet::new();
        assert!(z.add(Bytes::from("m"), 1.0));
        assert!(!z.add(Bytes::from("m"), 7.0));
        assert_eq!(z.len(), 1);
        assert_eq!(z.get_score(b"m"), Some(7.0));
    }

    #[test]
    #[should_panic(expected = "already present")]
    fn test_insert_existing_member_panics() {
        let mut z = zset(&[(1.0, "a")]);
        z.insert(2.0, Bytes::from("a"));
    }

    #[test]
    fn test_delete() {
        let mut z = zset(&[(1.0, "a"), (2.0, "b")]);
        assert!(z.delete(b"a"));
        assert!(!z.delete(b"a"));
        assert_eq!(z.len(), 1);
        assert_eq!(z.get_rank(b"b"), Some(1));
    }

    #[test]
    fn test_incr_by() {
        let mut z = SortedSet::new();
        assert_eq!(z.incr_by(Bytes::from("x"), 2.5).unwrap(), 2.5);
        assert_eq!(z.incr_by(Bytes::from("x"), 1.0).unwrap(), 3.5);

        z.add(Bytes::from("inf"), f64::INFINITY);
        assert_eq!(
            z.incr_by(Bytes::from("inf"), f64::NEG_INFINITY),
            Err(StoreError::NanResult)
        );
    }

    #[test]
    fn test_range_by_rank() {
        let z = zset(&[(1.0, "a"), (2.0, "b"), (3.0, "c"), (4.0, "d")]);
        assert_eq!(names(&z.range_by_rank(1, 2, false)), vec!["b", "c"]);
        assert_eq!(names(&z.range_by_rank(0, 1, true)), vec!["d", "c"]);
        assert_eq!(names(&z.range_by_rank(0, 3, false)), vec!["a", "b", "c", "d"]);
        assert!(z.range_by_rank(4, 5, false).is_empty());
    }

    #[test]
    fn test_range_by_score_and_count() {
        let z = zset(&[(1.0, "a"), (2.0, "b"), (3.0, "c"), (4.0, "d")]);
        let range = ScoreRange::inclusive(2.0, 3.0);
        assert_eq!(names(&z.range_by_score(&range, false)), vec!["b", "c"]);
        assert_eq!(names(&z.range_by_score(&range, true)), vec!["c", "b"]);
        assert_eq!(z.count(&range), 2);

        let open = ScoreRange {
            min: 1.0,
            max: f64::INFINITY,
            min_exclusive: true,
            max_exclusive: false,
        };
        assert_eq!(z.count(&open), 3);
        assert_eq!(z.count(&ScoreRange::inclusive(10.0, 20.0)), 0);
    }

    #[test]
    fn test_delete_range_by_rank() {
        let mut z = zset(&[(1.0, "a"), (2.0, "b"), (3.0, "c"), (4.0, "d")]);
        assert_eq!(z.delete_range_by_rank(0, 1), 2);
        assert_eq!(z.len(), 2);
        assert_eq!(z.get_score(b"a"), None);
        assert_eq!(z.get_rank(b"c"), Some(1));
    }
}
