use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tile_types::PacketId;

use crate::codec::Encoding;
use crate::ids::IdAllocator;
use crate::slots::Slot;

/// Location and size metadata of one stored packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketEntry {
    /// Reserved byte range. May be larger than `stored_size` after an
    /// in-place overwrite with a smaller payload.
    pub slot: Slot,
    /// Logical (decoded) size.
    pub size: u64,
    /// Bytes actually written at `slot.offset`.
    pub stored_size: u64,
    /// CRC32 of the stored bytes.
    pub crc32: u32,
    pub encoding: Encoding,
}

/// Sparse map from packet id to [`PacketEntry`], with running totals.
///
/// Entries are keyed by id in an ordered map, so a table holding a handful
/// of packets at very large ids stays small. The totals are adjusted on
/// every insert, replace, and remove so they always describe exactly the
/// live entries.
#[derive(Clone, Debug, Default)]
pub struct PacketTable {
    entries: BTreeMap<u32, PacketEntry>,
    ids: IdAllocator,
    total_size: u64,
    stored_size: u64,
    /// Multiset of live logical sizes, for `largest_size`.
    sizes: BTreeMap<u64, u32>,
}

impl PacketTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn stored_size(&self) -> u64 {
        self.stored_size
    }

    pub fn largest_size(&self) -> u64 {
        self.sizes.keys().next_back().copied().unwrap_or(0)
    }

    pub fn get(&self, id: PacketId) -> Option<&PacketEntry> {
        self.entries.get(&id.get())
    }

    pub fn contains(&self, id: PacketId) -> bool {
        self.ids.is_live(id.get())
    }

    /// Store `entry` under the lowest free id. `None` when ids are exhausted.
    pub fn insert_new(&mut self, entry: PacketEntry) -> Option<PacketId> {
        let id = PacketId::new(self.ids.allocate()?);
        self.put(id, entry);
        Some(id)
    }

    /// Store `entry` under `id`, returning the entry it displaced.
    pub fn insert_at(&mut self, id: PacketId, entry: PacketEntry) -> Option<PacketEntry> {
        if self.ids.claim(id.get()) {
            self.put(id, entry);
            None
        } else {
            self.replace(id, entry)
        }
    }

    /// Swap the entry of a live id. `None` (and no change) if `id` is absent.
    pub fn replace(&mut self, id: PacketId, entry: PacketEntry) -> Option<PacketEntry> {
        let slot = self.entries.get_mut(&id.get())?;
        let old = std::mem::replace(slot, entry);
        self.unaccount(&old);
        self.account(&entry);
        Some(old)
    }

    pub fn remove(&mut self, id: PacketId) -> Option<PacketEntry> {
        let old = self.entries.remove(&id.get())?;
        self.ids.release(id.get());
        self.unaccount(&old);
        Some(old)
    }

    /// Live entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (PacketId, &PacketEntry)> + '_ {
        self.entries
            .iter()
            .map(|(&raw, entry)| (PacketId::new(raw), entry))
    }

    fn put(&mut self, id: PacketId, entry: PacketEntry) {
        self.entries.insert(id.get(), entry);
        self.account(&entry);
    }

    fn account(&mut self, entry: &PacketEntry) {
        self.total_size += entry.size;
        self.stored_size += entry.stored_size;
        *self.sizes.entry(entry.size).or_insert(0) += 1;
    }

    fn unaccount(&mut self, entry: &PacketEntry) {
        self.total_size -= entry.size;
        self.stored_size -= entry.stored_size;
        if let Some(n) = self.sizes.get_mut(&entry.size) {
            *n -= 1;
            if *n == 0 {
                self.sizes.remove(&entry.size);
            }
        }
    }
}
