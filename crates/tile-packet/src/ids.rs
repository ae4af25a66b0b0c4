//! Sparse id allocation with lowest-free-first reuse.
//!
//! Live ids are tracked in a sparse word bitmap so forward and backward
//! scans skip 64 dead ids per step and whole empty words for free. Released
//! ids below the high-water mark are kept as ordered runs; allocation always
//! takes the smallest one, which keeps the id space dense and iteration
//! cheap. Memory is proportional to live words and holes, never to the
//! magnitude of the largest id.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

const WORD_BITS: u32 = 64;

/// Allocator for the small integer ids used by packets and sub-directories.
///
/// Invariants:
/// - every id `>= high_water` is free
/// - `free` holds exactly the non-live ids below `high_water`, as disjoint,
///   non-adjacent `start..end` runs keyed by `start`
/// - `high_water - 1` is live whenever `high_water > 0`
/// - `live` holds no all-zero words
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdAllocator {
    live: BTreeMap<u32, u64>,
    free: BTreeMap<u32, u32>,
    high_water: u32,
    count: u32,
}

impl IdAllocator {
    /// Largest id this allocator hands out.
    pub const MAX_ID: u32 = u32::MAX - 1;

    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live ids.
    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// One past the largest live id.
    pub fn high_water(&self) -> u32 {
        self.high_water
    }

    /// Number of reusable ids below the high-water mark.
    pub fn free_count(&self) -> usize {
        (self.high_water - self.count) as usize
    }

    /// Number of disjoint runs of reusable ids.
    pub fn free_runs(&self) -> usize {
        self.free.len()
    }

    pub fn is_live(&self, id: u32) -> bool {
        if id >= self.high_water {
            return false;
        }
        let (word, bit) = split(id);
        self.live.get(&word).is_some_and(|bits| bits & (1u64 << bit) != 0)
    }

    /// Hand out the lowest free id, or `None` when the id space is exhausted.
    pub fn allocate(&mut self) -> Option<u32> {
        let id = match self.free.pop_first() {
            Some((start, end)) => {
                if start + 1 < end {
                    self.free.insert(start + 1, end);
                }
                start
            }
            None if self.high_water <= Self::MAX_ID => {
                let id = self.high_water;
                self.high_water += 1;
                id
            }
            None => return None,
        };
        self.mark(id);
        Some(id)
    }

    /// Mark a specific id live. Returns `false` if it already was.
    ///
    /// Claiming far past the high-water mark records the gap as one run.
    pub fn claim(&mut self, id: u32) -> bool {
        if id > Self::MAX_ID || self.is_live(id) {
            return false;
        }
        if id < self.high_water {
            let Some((&start, &end)) = self.free.range(..=id).next_back() else {
                return false;
            };
            if id >= end {
                return false;
            }
            self.free.remove(&start);
            if start < id {
                self.free.insert(start, id);
            }
            if id + 1 < end {
                self.free.insert(id + 1, end);
            }
        } else {
            if id > self.high_water {
                self.free.insert(self.high_water, id);
            }
            self.high_water = id + 1;
        }
        self.mark(id);
        true
    }

    /// Return an id to the free list. Returns `false` if it was not live.
    pub fn release(&mut self, id: u32) -> bool {
        if !self.is_live(id) {
            return false;
        }
        self.unmark(id);

        if id + 1 == self.high_water {
            // Pull the high-water mark back over the trailing hole.
            self.high_water = id;
            if let Some((&start, &end)) = self.free.last_key_value() {
                if end == self.high_water {
                    self.free.remove(&start);
                    self.high_water = start;
                }
            }
            return true;
        }

        let mut start = id;
        let mut end = id + 1;
        if let Some((&prev_start, &prev_end)) = self.free.range(..id).next_back() {
            if prev_end == id {
                self.free.remove(&prev_start);
                start = prev_start;
            }
        }
        if let Some(next_end) = self.free.remove(&end) {
            end = next_end;
        }
        self.free.insert(start, end);
        true
    }

    /// Smallest live id `>= from`.
    pub fn next_live(&self, from: u32) -> Option<u32> {
        if from >= self.high_water {
            return None;
        }
        let (first, bit) = split(from);
        for (&word, &bits) in self.live.range(first..) {
            let bits = if word == first { bits & (!0u64 << bit) } else { bits };
            if bits != 0 {
                return Some(word * WORD_BITS + bits.trailing_zeros());
            }
        }
        None
    }

    /// Largest live id `< before`.
    pub fn prev_live(&self, before: u32) -> Option<u32> {
        let before = before.min(self.high_water);
        if before == 0 {
            return None;
        }
        let (last, bit) = split(before - 1);
        let mask = if bit == WORD_BITS - 1 {
            !0u64
        } else {
            (1u64 << (bit + 1)) - 1
        };
        for (&word, &bits) in self.live.range(..=last).rev() {
            let bits = if word == last { bits & mask } else { bits };
            if bits != 0 {
                return Some(word * WORD_BITS + (WORD_BITS - 1 - bits.leading_zeros()));
            }
        }
        None
    }

    pub fn first(&self) -> Option<u32> {
        self.next_live(0)
    }

    pub fn last(&self) -> Option<u32> {
        self.high_water.checked_sub(1)
    }

    /// Live ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        let mut next = self.first();
        std::iter::from_fn(move || {
            let id = next?;
            next = id.checked_add(1).and_then(|n| self.next_live(n));
            Some(id)
        })
    }

    fn mark(&mut self, id: u32) {
        let (word, bit) = split(id);
        *self.live.entry(word).or_insert(0) |= 1u64 << bit;
        self.count += 1;
    }

    fn unmark(&mut self, id: u32) {
        let (word, bit) = split(id);
        if let Entry::Occupied(mut bits) = self.live.entry(word) {
            *bits.get_mut() &= !(1u64 << bit);
            if *bits.get() == 0 {
                bits.remove();
            }
        }
        self.count -= 1;
    }
}

fn split(id: u32) -> (u32, u32) {
    (id / WORD_BITS, id % WORD_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // -----------------------------------------------------------------------
    // Allocation order
    // -----------------------------------------------------------------------

    #[test]
    fn allocates_sequentially_from_zero() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.allocate(), Some(0));
        assert_eq!(ids.allocate(), Some(1));
        assert_eq!(ids.allocate(), Some(2));
        assert_eq!(ids.len(), 3);
        assert_eq!(ids.high_water(), 3);
    }

    #[test]
    fn reuses_lowest_free_id_first() {
        let mut ids = IdAllocator::new();
        for _ in 0..5 {
            ids.allocate();
        }
        assert!(ids.release(3));
        assert!(ids.release(1));
        assert_eq!(ids.allocate(), Some(1));
        assert_eq!(ids.allocate(), Some(3));
        assert_eq!(ids.allocate(), Some(5));
    }

    #[test]
    fn extends_with_count_when_no_hole() {
        let mut ids = IdAllocator::new();
        ids.allocate();
        ids.allocate();
        ids.release(0);
        ids.allocate();
        assert_eq!(ids.free_count(), 0);
        // No hole left: the next id is the live count.
        assert_eq!(ids.allocate(), Some(2));
    }

    #[test]
    fn releasing_tail_pulls_high_water_back() {
        let mut ids = IdAllocator::new();
        for _ in 0..6 {
            ids.allocate();
        }
        ids.release(2);
        ids.release(4);
        ids.release(5);
        // 4 and 5 are trailing holes; 2 remains a real hole.
        assert_eq!(ids.high_water(), 4);
        assert_eq!(ids.free_count(), 1);
        ids.release(3);
        assert_eq!(ids.high_water(), 2);
        assert_eq!(ids.free_count(), 0);
    }

    #[test]
    fn double_release_is_rejected() {
        let mut ids = IdAllocator::new();
        let id = ids.allocate().unwrap();
        assert!(ids.release(id));
        assert!(!ids.release(id));
        assert!(!ids.release(99));
        assert!(ids.is_empty());
    }

    #[test]
    fn claim_beyond_high_water_opens_holes() {
        let mut ids = IdAllocator::new();
        assert!(ids.claim(4));
        assert_eq!(ids.high_water(), 5);
        assert_eq!(ids.free_count(), 4);
        assert!(!ids.claim(4));
        assert_eq!(ids.allocate(), Some(0));
        assert!(ids.claim(2));
        assert_eq!(ids.iter().collect::<Vec<_>>(), vec![0, 2, 4]);
    }

    #[test]
    fn claim_near_max_id_stays_small() {
        let mut ids = IdAllocator::new();
        assert!(ids.claim(IdAllocator::MAX_ID));
        assert_eq!(ids.len(), 1);
        assert_eq!(ids.free_count(), IdAllocator::MAX_ID as usize);
        assert_eq!(ids.free_runs(), 1);
        assert!(!ids.claim(IdAllocator::MAX_ID + 1));

        assert_eq!(ids.allocate(), Some(0));
        assert!(ids.claim(1_000_000));
        assert_eq!(ids.free_runs(), 2);
        assert_eq!(
            ids.iter().collect::<Vec<_>>(),
            vec![0, 1_000_000, IdAllocator::MAX_ID]
        );
        assert_eq!(ids.prev_live(IdAllocator::MAX_ID), Some(1_000_000));

        assert!(ids.release(IdAllocator::MAX_ID));
        assert_eq!(ids.high_water(), 1_000_001);
        assert!(ids.release(1_000_000));
        assert_eq!(ids.high_water(), 1);
        assert_eq!(ids.free_runs(), 0);
    }

    #[test]
    fn released_neighbours_merge_into_one_run() {
        let mut ids = IdAllocator::new();
        for _ in 0..6 {
            ids.allocate();
        }
        ids.release(1);
        ids.release(3);
        assert_eq!(ids.free_runs(), 2);
        ids.release(2);
        assert_eq!(ids.free_runs(), 1);
        assert_eq!(ids.free_count(), 3);
        assert_eq!(ids.allocate(), Some(1));
        assert_eq!(ids.allocate(), Some(2));
        assert_eq!(ids.allocate(), Some(3));
        assert_eq!(ids.allocate(), Some(6));
    }

    // -----------------------------------------------------------------------
    // Scanning
    // -----------------------------------------------------------------------

    #[test]
    fn next_and_prev_skip_across_words() {
        let mut ids = IdAllocator::new();
        ids.claim(3);
        ids.claim(200);
        ids.claim(64);
        assert_eq!(ids.next_live(0), Some(3));
        assert_eq!(ids.next_live(4), Some(64));
        assert_eq!(ids.next_live(65), Some(200));
        assert_eq!(ids.next_live(201), None);
        assert_eq!(ids.prev_live(200), Some(64));
        assert_eq!(ids.prev_live(64), Some(3));
        assert_eq!(ids.prev_live(3), None);
        assert_eq!(ids.prev_live(u32::MAX), Some(200));
    }

    #[test]
    fn first_and_last() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.first(), None);
        assert_eq!(ids.last(), None);
        ids.claim(10);
        ids.claim(70);
        assert_eq!(ids.first(), Some(10));
        assert_eq!(ids.last(), Some(70));
    }

    #[test]
    fn word_boundary_bits() {
        let mut ids = IdAllocator::new();
        ids.claim(63);
        ids.claim(127);
        assert_eq!(ids.prev_live(64), Some(63));
        assert_eq!(ids.prev_live(128), Some(127));
        assert_eq!(ids.next_live(64), Some(127));
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    #[derive(Clone, Debug)]
    enum Op {
        Allocate,
        Release(u32),
        Claim(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Allocate),
            2 => (0u32..300).prop_map(Op::Release),
            1 => (0u32..600).prop_map(Op::Claim),
        ]
    }

    proptest! {
        #[test]
        fn iteration_matches_live_set(ops in proptest::collection::vec(op(), 0..400)) {
            let mut ids = IdAllocator::new();
            let mut model = std::collections::BTreeSet::new();
            for op in ops {
                match op {
                    Op::Allocate => {
                        let id = ids.allocate().unwrap();
                        let expected = (0..).find(|i| !model.contains(i)).unwrap();
                        prop_assert_eq!(id, expected);
                        model.insert(id);
                    }
                    Op::Release(id) => {
                        prop_assert_eq!(ids.release(id), model.remove(&id));
                    }
                    Op::Claim(id) => {
                        prop_assert_eq!(ids.claim(id), model.insert(id));
                    }
                }
                prop_assert_eq!(ids.len(), model.len());
                let high_water = model.last().map_or(0, |&last| last + 1);
                prop_assert_eq!(ids.high_water(), high_water);
                prop_assert_eq!(ids.free_count(), high_water as usize - model.len());
            }
            let seen: Vec<u32> = ids.iter().collect();
            let expected: Vec<u32> = model.iter().copied().collect();
            prop_assert_eq!(seen, expected);
        }
    }
}
