//! Dense bit sets over small integer domains.
//!
//! Statement indices and block indices of a function body are dense, zero-based
//! integers, so most per-body sets in the optimizer (visited blocks, live-in blocks,
//! inconsistent statements) are stored as bit vectors rather than hash sets.
//!
//! # Types
//!
//! - [`BitSet`] - fixed-capacity bit vector with set operations and ordered iteration
//! - [`MinWorkSet`] - a worklist over a bounded domain that always yields its smallest
//!   element first and never holds duplicates
//!
//! # Example
//!
//! ```rust
//! use ssaopt::utils::{BitSet, MinWorkSet};
//!
//! let mut set = BitSet::new(100);
//! set.insert(7);
//! set.insert(3);
//! assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 7]);
//!
//! let mut work = MinWorkSet::new(100);
//! work.push(9);
//! work.push(2);
//! work.push(9);
//! assert_eq!(work.pop_first(), Some(2));
//! assert_eq!(work.pop_first(), Some(9));
//! assert_eq!(work.pop_first(), None);
//! ```

/// A bit vector for efficient set operations.
///
/// This is used for analyses that track sets of statements or blocks identified by
/// their index.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    /// The bits, stored as a vector of words.
    words: Vec<u64>,
    /// The number of bits in the set.
    len: usize,
}

impl BitSet {
    /// Creates a new empty bit set with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            len: capacity,
        }
    }

    /// Creates a bit set of the given capacity containing every index yielded by `items`.
    ///
    /// Indices outside the capacity are ignored.
    #[must_use]
    pub fn from_indices(capacity: usize, items: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::new(capacity);
        for item in items {
            if item < capacity {
                set.insert(item);
            }
        }
        set
    }

    /// Returns the capacity of this bit set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the bit set has no bits set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Sets the bit at the given index.
    ///
    /// Returns `true` if the bit was not set before.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn insert(&mut self, index: usize) -> bool {
        assert!(index < self.len, "index out of bounds");
        let mask = 1u64 << (index % 64);
        let word = &mut self.words[index / 64];
        let fresh = *word & mask == 0;
        *word |= mask;
        fresh
    }

    /// Clears the bit at the given index.
    ///
    /// Returns `true` if the bit was set before.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn remove(&mut self, index: usize) -> bool {
        assert!(index < self.len, "index out of bounds");
        let mask = 1u64 << (index % 64);
        let word = &mut self.words[index / 64];
        let present = *word & mask != 0;
        *word &= !mask;
        present
    }

    /// Returns `true` if the bit at the given index is set.
    ///
    /// Indices beyond the capacity are reported as absent.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        (self.words[index / 64] & (1u64 << (index % 64))) != 0
    }

    /// Returns the number of bits set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Clears all bits.
    pub fn clear(&mut self) {
        for word in &mut self.words {
            *word = 0;
        }
    }

    /// Computes the union with another bit set (in place).
    ///
    /// Returns `true` if `self` changed.
    pub fn union_with(&mut self, other: &Self) -> bool {
        assert_eq!(self.len, other.len, "bit sets must have same length");
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            let old = *a;
            *a |= *b;
            changed |= old != *a;
        }
        changed
    }

    /// Returns the smallest index that is set at or after `from`, if any.
    #[must_use]
    pub fn next_set(&self, from: usize) -> Option<usize> {
        if from >= self.len {
            return None;
        }
        let mut word_idx = from / 64;
        let mut word = self.words[word_idx] & (u64::MAX << (from % 64));
        loop {
            if word != 0 {
                let idx = word_idx * 64 + word.trailing_zeros() as usize;
                return (idx < self.len).then_some(idx);
            }
            word_idx += 1;
            if word_idx >= self.words.len() {
                return None;
            }
            word = self.words[word_idx];
        }
    }

    /// Returns an iterator over the indices of set bits, in increasing order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            set: self,
            next: 0,
        }
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Iterator over the set bits in a `BitSet`.
pub struct BitSetIter<'a> {
    set: &'a BitSet,
    next: usize,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.set.next_set(self.next)?;
        self.next = idx + 1;
        Some(idx)
    }
}

/// A duplicate-free worklist over `0..capacity` that pops its minimum element first.
///
/// Popping is amortised linear over the whole lifetime of the set as long as elements
/// are mostly pushed in increasing order, which is the access pattern of forward scans
/// over a function body.
#[derive(Clone, Debug)]
pub struct MinWorkSet {
    elems: BitSet,
    lower: usize,
}

impl MinWorkSet {
    /// Creates an empty work set over `0..capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            elems: BitSet::new(capacity),
            lower: 0,
        }
    }

    /// Adds `index` to the set. Returns `true` if it was not already queued.
    pub fn push(&mut self, index: usize) -> bool {
        if index < self.lower {
            self.lower = index;
        }
        self.elems.insert(index)
    }

    /// Adds every index yielded by `items`.
    pub fn extend(&mut self, items: impl IntoIterator<Item = usize>) {
        for item in items {
            self.push(item);
        }
    }

    /// Removes and returns the smallest queued index.
    pub fn pop_first(&mut self) -> Option<usize> {
        let idx = self.elems.next_set(self.lower)?;
        self.elems.remove(idx);
        self.lower = idx;
        Some(idx)
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elems.next_set(self.lower).is_none()
    }

    /// Returns `true` if `index` is currently queued.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.elems.contains(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = BitSet::new(100);
        assert!(bs.is_empty());
        assert_eq!(bs.count(), 0);

        assert!(bs.insert(0));
        assert!(bs.insert(50));
        assert!(bs.insert(99));
        assert!(!bs.insert(99));

        assert!(!bs.is_empty());
        assert_eq!(bs.count(), 3);
        assert!(bs.contains(0));
        assert!(bs.contains(50));
        assert!(bs.contains(99));
        assert!(!bs.contains(1));
        assert!(!bs.contains(1000));
    }

    #[test]
    fn test_bitset_remove() {
        let mut bs = BitSet::new(100);
        bs.insert(42);
        assert!(bs.remove(42));
        assert!(!bs.remove(42));
        assert!(!bs.contains(42));
    }

    #[test]
    fn test_bitset_union() {
        let mut a = BitSet::from_indices(100, [0, 1]);
        let b = BitSet::from_indices(100, [1, 2]);

        assert!(a.union_with(&b));
        assert!(!a.union_with(&b));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_bitset_iter_crosses_words() {
        let bs = BitSet::from_indices(200, [5, 63, 64, 130, 199]);
        assert_eq!(bs.iter().collect::<Vec<_>>(), vec![5, 63, 64, 130, 199]);
        assert_eq!(bs.next_set(65), Some(130));
        assert_eq!(bs.next_set(200), None);
    }

    #[test]
    fn test_min_work_set_order() {
        let mut ws = MinWorkSet::new(130);
        ws.extend([70, 3, 129, 3]);
        assert_eq!(ws.pop_first(), Some(3));
        ws.push(1);
        assert_eq!(ws.pop_first(), Some(1));
        assert_eq!(ws.pop_first(), Some(70));
        assert!(!ws.is_empty());
        assert_eq!(ws.pop_first(), Some(129));
        assert!(ws.is_empty());
        assert_eq!(ws.pop_first(), None);
    }
}
