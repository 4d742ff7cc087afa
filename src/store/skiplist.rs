//! Order-statistics skip list over (score, member)
//!
//! Nodes are kept in an arena and linked by index. Every forward link
//! records its span: the number of level-0 steps it jumps. Summing spans
//! while descending gives the 1-based rank of a node in O(log n).
//!
//! Ordering is by score ascending, ties broken by member bytes ascending.
//! Callers guarantee that no (score, member) pair is inserted twice and
//! that scores are never NaN.

use bytes::Bytes;
use rand::Rng;

/// Maximum number of levels a node can have
pub const MAX_LEVEL: usize = 32;

/// Probability of promoting a node one more level
const LEVEL_P: f64 = 0.25;

/// Arena slot of the head sentinel
const HEAD: usize = 0;

/// Handle to a node of a [`SkipList`].
///
/// A handle stays valid until the node it points at is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, Default)]
struct Level {
    forward: Option<usize>,
    span: usize,
}

#[derive(Debug, Clone)]
struct Node {
    member: Bytes,
    score: f64,
    backward: Option<usize>,
    levels: Vec<Level>,
}

/// Score interval with optionally exclusive bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
    pub min_exclusive: bool,
    pub max_exclusive: bool,
}

impl ScoreRange {
    /// Inclusive range `[min, max]`
    pub fn inclusive(min: f64, max: f64) -> Self {
        ScoreRange {
            min,
            max,
            min_exclusive: false,
            max_exclusive: false,
        }
    }

    pub fn gte_min(&self, score: f64) -> bool {
        if self.min_exclusive {
            score > self.min
        } else {
            score >= self.min
        }
    }

    pub fn lte_max(&self, score: f64) -> bool {
        if self.max_exclusive {
            score < self.max
        } else {
            score <= self.max
        }
    }

    /// Whether no score can satisfy the range
    pub fn is_empty(&self) -> bool {
        self.min > self.max || (self.min == self.max && (self.min_exclusive || self.max_exclusive))
    }
}

/// Skip list maintaining rank under insert and delete
#[derive(Debug, Clone)]
pub struct SkipList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    tail: Option<usize>,
    length: usize,
    level: usize,
}

fn random_level() -> usize {
    let mut rng = rand::thread_rng();
    let mut level = 1;
    while level < MAX_LEVEL && rng.gen::<f64>() < LEVEL_P {
        level += 1;
    }
    level
}

impl SkipList {
    pub fn new() -> Self {
        let head = Node {
            member: Bytes::new(),
            score: 0.0,
            backward: None,
            levels: vec![Level::default(); MAX_LEVEL],
        };
        SkipList {
            nodes: vec![head],
            free: Vec::new(),
            tail: None,
            length: 0,
            level: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn forward(&self, x: usize, level: usize) -> Option<usize> {
        self.nodes[x].levels[level].forward
    }

    fn span(&self, x: usize, level: usize) -> usize {
        self.nodes[x].levels[level].span
    }

    /// Whether node `x` sorts strictly before (score, member)
    fn precedes(&self, x: usize, score: f64, member: &[u8]) -> bool {
        let node = &self.nodes[x];
        node.score < score || (node.score == score && node.member.as_ref() < member)
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, x: usize) -> Bytes {
        let node = &mut self.nodes[x];
        node.levels = Vec::new();
        node.backward = None;
        self.free.push(x);
        std::mem::take(&mut node.member)
    }

    /// Insert a new (score, member) pair and return its node
    pub fn insert(&mut self, score: f64, member: Bytes) -> NodeId {
        let mut update = [HEAD; MAX_LEVEL];
        let mut rank = [0usize; MAX_LEVEL];

        let mut x = HEAD;
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            while let Some(next) = self.forward(x, i) {
                if !self.precedes(next, score, &member) {
                    break;
                }
                rank[i] += self.span(x, i);
                x = next;
            }
            update[i] = x;
        }

        let level = random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = HEAD;
                self.nodes[HEAD].levels[i].span = self.length;
            }
            self.level = level;
        }

        let id = self.alloc(Node {
            member,
            score,
            backward: None,
            levels: vec![Level::default(); level],
        });

        for i in 0..level {
            let prev = update[i];
            let prev_level = self.nodes[prev].levels[i];
            self.nodes[id].levels[i] = Level {
                forward: prev_level.forward,
                span: prev_level.span - (rank[0] - rank[i]),
            };
            self.nodes[prev].levels[i] = Level {
                forward: Some(id),
                span: rank[0] - rank[i] + 1,
            };
        }

        // levels above the new node now bridge one more node
        for i in level..self.level {
            self.nodes[update[i]].levels[i].span += 1;
        }

        self.nodes[id].backward = if update[0] == HEAD { None } else { Some(update[0]) };
        match self.forward(id, 0) {
            Some(next) => self.nodes[next].backward = Some(id),
            None => self.tail = Some(id),
        }

        self.length += 1;
        NodeId(id)
    }

    /// Unlink `x` given the rightmost predecessor at every level
    fn unlink(&mut self, x: usize, update: &[usize; MAX_LEVEL]) {
        for i in 0..self.level {
            let prev = update[i];
            if self.forward(prev, i) == Some(x) {
                let removed = self.nodes[x].levels[i];
                let level = &mut self.nodes[prev].levels[i];
                level.span = level.span + removed.span - 1;
                level.forward = removed.forward;
            } else {
                self.nodes[prev].levels[i].span -= 1;
            }
        }

        match self.forward(x, 0) {
            Some(next) => self.nodes[next].backward = self.nodes[x].backward,
            None => self.tail = self.nodes[x].backward,
        }

        while self.level > 1 && self.forward(HEAD, self.level - 1).is_none() {
            self.level -= 1;
        }
        self.length -= 1;
    }

    /// Delete the node matching (score, member) exactly.
    ///
    /// Returns the member bytes when a node was removed.
    pub fn delete(&mut self, score: f64, member: &[u8]) -> Option<Bytes> {
        let mut update = [HEAD; MAX_LEVEL];
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if !self.precedes(next, score, member) {
                    break;
                }
                x = next;
            }
            update[i] = x;
        }

        let candidate = self.forward(x, 0)?;
        let node = &self.nodes[candidate];
        if node.score != score || node.member.as_ref() != member {
            return None;
        }

        self.unlink(candidate, &update);
        Some(self.release(candidate))
    }

    /// Move `member` from `cur_score` to `new_score`.
    ///
    /// A new score invalidates the node position, so this is a delete
    /// followed by an insert. Returns `None` if (cur_score, member) is absent.
    pub fn update_score(&mut self, cur_score: f64, member: &[u8], new_score: f64) -> Option<NodeId> {
        let member = self.delete(cur_score, member)?;
        Some(self.insert(new_score, member))
    }

    /// 1-based rank of (score, member), `None` if absent
    pub fn get_rank(&self, score: f64, member: &[u8]) -> Option<usize> {
        let mut rank = 0;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                let node = &self.nodes[next];
                let within = node.score < score
                    || (node.score == score && node.member.as_ref() <= member);
                if !within {
                    break;
                }
                rank += self.span(x, i);
                x = next;
            }
            if x != HEAD && self.nodes[x].score == score && self.nodes[x].member.as_ref() == member {
                return Some(rank);
            }
        }
        None
    }

    /// Node at 1-based `rank`, `None` when out of bounds
    pub fn get_by_rank(&self, rank: usize) -> Option<NodeId> {
        if rank == 0 || rank > self.length {
            return None;
        }
        let mut traversed = 0;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if traversed + self.span(x, i) > rank {
                    break;
                }
                traversed += self.span(x, i);
                x = next;
            }
            if traversed == rank {
                return Some(NodeId(x));
            }
        }
        None
    }

    /// First node (lowest score)
    pub fn head(&self) -> Option<NodeId> {
        self.forward(HEAD, 0).map(NodeId)
    }

    /// Last node (highest score)
    pub fn tail(&self) -> Option<NodeId> {
        self.tail.map(NodeId)
    }

    pub fn next(&self, node: NodeId) -> Option<NodeId> {
        self.forward(node.0, 0).map(NodeId)
    }

    pub fn prev(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].backward.map(NodeId)
    }

    pub fn score(&self, node: NodeId) -> f64 {
        self.nodes[node.0].score
    }

    pub fn member(&self, node: NodeId) -> &Bytes {
        &self.nodes[node.0].member
    }

    /// Whether any node falls inside `range`
    fn intersects(&self, range: &ScoreRange) -> bool {
        if range.is_empty() {
            return false;
        }
        match (self.tail, self.forward(HEAD, 0)) {
            (Some(tail), Some(first)) => {
                range.gte_min(self.nodes[tail].score) && range.lte_max(self.nodes[first].score)
            }
            _ => false,
        }
    }

    /// Lowest node whose score lies in `range`
    pub fn first_in_range(&self, range: &ScoreRange) -> Option<NodeId> {
        if !self.intersects(range) {
            return None;
        }
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if range.gte_min(self.nodes[next].score) {
                    break;
                }
                x = next;
            }
        }
        let x = self.forward(x, 0)?;
        range.lte_max(self.nodes[x].score).then_some(NodeId(x))
    }

    /// Highest node whose score lies in `range`
    pub fn last_in_range(&self, range: &ScoreRange) -> Option<NodeId> {
        if !self.intersects(range) {
            return None;
        }
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if !range.lte_max(self.nodes[next].score) {
                    break;
                }
                x = next;
            }
        }
        if x == HEAD {
            return None;
        }
        range.gte_min(self.nodes[x].score).then_some(NodeId(x))
    }

    /// Delete nodes with 1-based rank in `start..=end`, returning their members
    pub fn delete_range_by_rank(&mut self, start: usize, end: usize) -> Vec<(Bytes, f64)> {
        let mut removed = Vec::new();
        if start == 0 || start > end {
            return removed;
        }

        let mut update = [HEAD; MAX_LEVEL];
        let mut traversed = 0;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if traversed + self.span(x, i) >= start {
                    break;
                }
                traversed += self.span(x, i);
                x = next;
            }
            update[i] = x;
        }

        traversed += 1;
        let mut cursor = self.forward(x, 0);
        while let Some(node) = cursor {
            if traversed > end {
                break;
            }
            let next = self.forward(node, 0);
            self.unlink(node, &update);
            let score = self.nodes[node].score;
            removed.push((self.release(node), score));
            traversed += 1;
            cursor = next;
        }
        removed
    }

    /// Iterate (member, score) in ascending order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head(),
            reverse: false,
        }
    }

    /// Iterate starting at `node`, walking forward or backward
    pub fn iter_from(&self, node: Option<NodeId>, reverse: bool) -> Iter<'_> {
        Iter {
            list: self,
            cursor: node,
            reverse,
        }
    }
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over skip list nodes
pub struct Iter<'a> {
    list: &'a SkipList,
    cursor: Option<NodeId>,
    reverse: bool,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Bytes, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cursor?;
        self.cursor = if self.reverse {
            self.list.prev(node)
        } else {
            self.list.next(node)
        };
        Some((self.list.member(node), self.list.score(node)))
    }
}
