//! Sorted compact integer array
//!
//! Members live in a single sorted vector whose lane width is the narrowest
//! of 16, 32 or 64 bits able to hold every member. Inserting a value that
//! needs a wider lane rebuilds the vector at the new width first. Lanes are
//! never narrowed again, even when the wide members are removed.

use rand::Rng;

/// Lane width of an [`IntSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LaneWidth {
    W16,
    W32,
    W64,
}

impl LaneWidth {
    /// The narrowest lane able to store `value`
    pub fn for_value(value: i64) -> Self {
        if value >= i16::MIN as i64 && value <= i16::MAX as i64 {
            LaneWidth::W16
        } else if value >= i32::MIN as i64 && value <= i32::MAX as i64 {
            LaneWidth::W32
        } else {
            LaneWidth::W64
        }
    }

    /// Size of one lane in bytes
    pub fn bytes(self) -> usize {
        match self {
            LaneWidth::W16 => 2,
            LaneWidth::W32 => 4,
            LaneWidth::W64 => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Lanes {
    W16(Vec<i16>),
    W32(Vec<i32>),
    W64(Vec<i64>),
}

/// A set of integers stored as a sorted array of fixed-width lanes
#[derive(Debug, Clone, PartialEq)]
pub struct IntSet {
    lanes: Lanes,
}

// Binary search over any lane type, widened to i64 for the comparison.
macro_rules! search {
    ($vec:expr, $value:expr) => {
        $vec.binary_search_by(|lane| (*lane as i64).cmp(&$value))
    };
}

impl IntSet {
    /// Create an empty set using the narrowest lane width
    pub fn new() -> Self {
        IntSet {
            lanes: Lanes::W16(Vec::new()),
        }
    }

    /// Current lane width
    pub fn width(&self) -> LaneWidth {
        match &self.lanes {
            Lanes::W16(_) => LaneWidth::W16,
            Lanes::W32(_) => LaneWidth::W32,
            Lanes::W64(_) => LaneWidth::W64,
        }
    }

    pub fn len(&self) -> usize {
        match &self.lanes {
            Lanes::W16(v) => v.len(),
            Lanes::W32(v) => v.len(),
            Lanes::W64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes used by the lane array
    pub fn blob_len(&self) -> usize {
        self.len() * self.width().bytes()
    }

    /// Locate `value`: `Ok(pos)` when present, `Err(pos)` with the insertion
    /// point otherwise. A value wider than the current lanes is never present.
    fn search(&self, value: i64) -> Result<usize, usize> {
        match &self.lanes {
            Lanes::W16(v) => search!(v, value),
            Lanes::W32(v) => search!(v, value),
            Lanes::W64(v) => search!(v, value),
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        LaneWidth::for_value(value) <= self.width() && self.search(value).is_ok()
    }

    /// Insert `value`, returns false if it was already a member
    pub fn insert(&mut self, value: i64) -> bool {
        let needed = LaneWidth::for_value(value);
        if needed > self.width() {
            self.upgrade_and_insert(needed, value);
            return true;
        }

        let pos = match self.search(value) {
            Ok(_) => return false,
            Err(pos) => pos,
        };

        // The lane is wide enough, so the narrowing casts below are lossless.
        match &mut self.lanes {
            Lanes::W16(v) => v.insert(pos, value as i16),
            Lanes::W32(v) => v.insert(pos, value as i32),
            Lanes::W64(v) => v.insert(pos, value),
        }
        true
    }

    /// Rebuild the lanes at `width` and add `value`.
    ///
    /// A value that does not fit the old width is either below every member
    /// or above every member, so it is placed at one end.
    fn upgrade_and_insert(&mut self, width: LaneWidth, value: i64) {
        let mut widened: Vec<i64> = Vec::with_capacity(self.len() + 1);
        if value < 0 {
            widened.push(value);
            widened.extend(self.iter());
        } else {
            widened.extend(self.iter());
            widened.push(value);
        }

        self.lanes = match width {
            LaneWidth::W16 => Lanes::W16(widened.into_iter().map(|v| v as i16).collect()),
            LaneWidth::W32 => Lanes::W32(widened.into_iter().map(|v| v as i32).collect()),
            LaneWidth::W64 => Lanes::W64(widened),
        };
    }

    /// Remove `value`, returns whether it was a member
    pub fn remove(&mut self, value: i64) -> bool {
        if LaneWidth::for_value(value) > self.width() {
            return false;
        }
        let pos = match self.search(value) {
            Ok(pos) => pos,
            Err(_) => return false,
        };
        match &mut self.lanes {
            Lanes::W16(v) => {
                v.remove(pos);
            }
            Lanes::W32(v) => {
                v.remove(pos);
            }
            Lanes::W64(v) => {
                v.remove(pos);
            }
        }
        true
    }

    /// Member at sorted position `index`
    pub fn get(&self, index: usize) -> Option<i64> {
        match &self.lanes {
            Lanes::W16(v) => v.get(index).map(|x| *x as i64),
            Lanes::W32(v) => v.get(index).map(|x| *x as i64),
            Lanes::W64(v) => v.get(index).copied(),
        }
    }

    /// Uniformly sampled member
    pub fn random(&self) -> Option<i64> {
        if self.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..self.len());
        self.get(index)
    }

    /// Members in ascending order
    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

impl Default for IntSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order() {
        let mut set = IntSet::new();
        assert!(set.insert(1));
        assert!(set.insert(4));
        assert!(set.insert(3));
        assert!(!set.insert(3));

        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 3, 4]);
        assert_eq!(set.width(), LaneWidth::W16);
    }

    #[test]
    fn test_upgrade_preserves_members() {
        let mut set = IntSet::new();
        for v in [1, 4, 3] {
            set.insert(v);
        }

        set.insert(70_000);
        assert_eq!(set.width(), LaneWidth::W32);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 3, 4, 70_000]);

        set.insert(-5_000_000_000);
        assert_eq!(set.width(), LaneWidth::W64);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![-5_000_000_000, 1, 3, 4, 70_000]
        );
    }

    #[test]
    fn test_width_is_minimal() {
        let mut set = IntSet::new();
        set.insert(i16::MAX as i64);
        set.insert(i16::MIN as i64);
        assert_eq!(set.width(), LaneWidth::W16);

        set.insert(i16::MAX as i64 + 1);
        assert_eq!(set.width(), LaneWidth::W32);

        set.insert(i32::MIN as i64);
        assert_eq!(set.width(), LaneWidth::W32);

        set.insert(i32::MIN as i64 - 1);
        assert_eq!(set.width(), LaneWidth::W64);
    }

    #[test]
    fn test_contains_and_remove() {
        let mut set = IntSet::new();
        for v in [10, -20, 30] {
            set.insert(v);
        }

        assert!(set.contains(10));
        assert!(!set.contains(11));
        // wider than any lane in use
        assert!(!set.contains(1 << 40));

        assert!(set.remove(-20));
        assert!(!set.remove(-20));
        assert!(!set.remove(1 << 40));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![10, 30]);
    }

    #[test]
    fn test_remove_never_narrows() {
        let mut set = IntSet::new();
        set.insert(1);
        set.insert(1 << 40);
        set.remove(1 << 40);
        assert_eq!(set.width(), LaneWidth::W64);
        assert_eq!(set.blob_len(), 8);
    }

    #[test]
    fn test_random_member() {
        let mut set = IntSet::new();
        assert_eq!(set.random(), None);
        for v in 0..50 {
            set.insert(v * 3);
        }
        for _ in 0..100 {
            let v = set.random().unwrap();
            assert!(set.contains(v));
        }
    }
}
