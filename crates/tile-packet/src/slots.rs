//! Byte-range allocation inside the backing store.
//!
//! Packets live in slots: contiguous byte ranges handed out by an extent
//! allocator. Released slots are coalesced with their neighbours and reused;
//! the backend itself is never shrunk.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A contiguous byte range in the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub offset: u64,
    pub len: u64,
}

impl Slot {
    pub const EMPTY: Slot = Slot { offset: 0, len: 0 };

    pub fn end(&self) -> u64 {
        self.offset + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// How free extents are chosen for a new slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationPolicy {
    /// Lowest-offset extent that fits.
    #[default]
    FirstFit,
    /// Smallest extent that fits; ties go to the lowest offset.
    BestFit,
    /// Never reuse released space.
    AppendOnly,
}

/// Extent allocator over the backend's byte space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotAllocator {
    /// Free extents keyed by offset. Never adjacent to each other.
    free: BTreeMap<u64, u64>,
    /// First byte past the last allocated slot.
    end: u64,
    /// Bytes reserved at the front of the backend (superblock).
    base: u64,
    policy: AllocationPolicy,
}

impl SlotAllocator {
    pub fn new(base: u64, policy: AllocationPolicy) -> Self {
        Self {
            free: BTreeMap::new(),
            end: base,
            base,
            policy,
        }
    }

    /// Rebuild from a persisted high-water mark and free extents.
    pub fn restore(
        base: u64,
        end: u64,
        extents: impl IntoIterator<Item = Slot>,
        policy: AllocationPolicy,
    ) -> Self {
        let mut alloc = Self::new(base, policy);
        alloc.end = end.max(base);
        for slot in extents {
            alloc.release(slot);
        }
        alloc
    }

    pub fn policy(&self) -> AllocationPolicy {
        self.policy
    }

    /// First byte past the last allocated slot.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// Total bytes sitting in free extents.
    pub fn free_bytes(&self) -> u64 {
        self.free.values().sum()
    }

    /// Free extents in offset order.
    pub fn extents(&self) -> impl Iterator<Item = Slot> + '_ {
        self.free.iter().map(|(&offset, &len)| Slot { offset, len })
    }

    /// Reserve `len` bytes.
    pub fn allocate(&mut self, len: u64) -> Slot {
        if len == 0 {
            return Slot::EMPTY;
        }
        if let Some(offset) = self.pick(len) {
            let extent = self.free.remove(&offset).unwrap_or(0);
            if extent > len {
                self.free.insert(offset + len, extent - len);
            }
            return Slot { offset, len };
        }
        let offset = self.end;
        self.end += len;
        Slot { offset, len }
    }

    /// Return a slot's bytes to the free pool.
    pub fn release(&mut self, slot: Slot) {
        if slot.is_empty() || slot.offset < self.base {
            return;
        }
        let mut offset = slot.offset;
        let mut len = slot.len;

        if let Some((&prev_off, &prev_len)) = self.free.range(..offset).next_back() {
            if prev_off + prev_len == offset {
                self.free.remove(&prev_off);
                offset = prev_off;
                len += prev_len;
            }
        }
        if let Some(next_len) = self.free.remove(&(offset + len)) {
            len += next_len;
        }

        if offset + len >= self.end {
            self.end = offset;
        } else {
            self.free.insert(offset, len);
        }
    }

    fn pick(&self, len: u64) -> Option<u64> {
        match self.policy {
            AllocationPolicy::AppendOnly => None,
            AllocationPolicy::FirstFit => self
                .free
                .iter()
                .find(|(_, &l)| l >= len)
                .map(|(&off, _)| off),
            AllocationPolicy::BestFit => self
                .free
                .iter()
                .filter(|(_, &l)| l >= len)
                .min_by_key(|(&off, &l)| (l, off))
                .map(|(&off, _)| off),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_fit() -> SlotAllocator {
        SlotAllocator::new(64, AllocationPolicy::FirstFit)
    }

    #[test]
    fn allocations_start_after_base() {
        let mut slots = first_fit();
        let a = slots.allocate(10);
        let b = slots.allocate(5);
        assert_eq!(a, Slot { offset: 64, len: 10 });
        assert_eq!(b, Slot { offset: 74, len: 5 });
        assert_eq!(slots.end(), 79);
    }

    #[test]
    fn zero_length_is_the_empty_slot() {
        let mut slots = first_fit();
        assert_eq!(slots.allocate(0), Slot::EMPTY);
        slots.release(Slot::EMPTY);
        assert_eq!(slots.end(), 64);
    }

    #[test]
    fn released_space_is_reused_and_split() {
        let mut slots = first_fit();
        let a = slots.allocate(100);
        let _b = slots.allocate(10);
        slots.release(a);
        assert_eq!(slots.free_bytes(), 100);
        let c = slots.allocate(30);
        assert_eq!(c.offset, a.offset);
        assert_eq!(slots.free_bytes(), 70);
    }

    #[test]
    fn neighbours_coalesce() {
        let mut slots = first_fit();
        let a = slots.allocate(10);
        let b = slots.allocate(10);
        let c = slots.allocate(10);
        let _d = slots.allocate(10);
        slots.release(a);
        slots.release(c);
        assert_eq!(slots.extents().count(), 2);
        slots.release(b);
        let extents: Vec<_> = slots.extents().collect();
        assert_eq!(extents, vec![Slot { offset: 64, len: 30 }]);
    }

    #[test]
    fn releasing_the_tail_lowers_end() {
        let mut slots = first_fit();
        let _a = slots.allocate(10);
        let b = slots.allocate(10);
        let c = slots.allocate(10);
        slots.release(b);
        slots.release(c);
        assert_eq!(slots.end(), 74);
        assert_eq!(slots.free_bytes(), 0);
    }

    #[test]
    fn best_fit_prefers_tightest_extent() {
        let mut slots = SlotAllocator::new(0, AllocationPolicy::BestFit);
        let big = slots.allocate(100);
        let _sep1 = slots.allocate(1);
        let small = slots.allocate(20);
        let _sep2 = slots.allocate(1);
        slots.release(big);
        slots.release(small);
        assert_eq!(slots.allocate(15).offset, small.offset);
    }

    #[test]
    fn append_only_never_reuses() {
        let mut slots = SlotAllocator::new(0, AllocationPolicy::AppendOnly);
        let a = slots.allocate(10);
        let _b = slots.allocate(10);
        slots.release(a);
        let c = slots.allocate(5);
        assert_eq!(c.offset, 20);
    }

    #[test]
    fn restore_rebuilds_extents() {
        let extents = [Slot { offset: 10, len: 5 }, Slot { offset: 15, len: 5 }];
        let slots = SlotAllocator::restore(0, 40, extents, AllocationPolicy::FirstFit);
        assert_eq!(slots.end(), 40);
        assert_eq!(slots.extents().collect::<Vec<_>>(), vec![Slot { offset: 10, len: 10 }]);
    }
}
