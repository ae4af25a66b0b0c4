//! Packet operations bound to one directory.
//!
//! [`PacketManager`] is the shared (read-only) surface and
//! [`PacketManagerMut`] the exclusive one. Both are thin borrows of a
//! [`Directory`] and the file's [`Storage`]; creating one is free.

use tile_store::BackendError;
use tile_types::{Compression, DataType, PacketId, TagId};
use tracing::{debug, warn};

use crate::codec::{self, Encoding};
use crate::cursor::{IdCursor, IdIter};
use crate::directory::Directory;
use crate::editor::PacketEditor;
use crate::error::{PacketError, PacketResult};
use crate::iter::{PacketIter, PacketIterMut};
use crate::packet::Packet;
use crate::slots::Slot;
use crate::storage::Storage;
use crate::table::PacketEntry;

/// Read-only packet operations on one directory.
#[derive(Clone, Copy)]
pub struct PacketManager<'a> {
    dir: &'a Directory,
    storage: &'a Storage,
}

impl<'a> PacketManager<'a> {
    pub fn new(dir: &'a Directory, storage: &'a Storage) -> Self {
        Self { dir, storage }
    }

    pub fn directory(&self) -> &'a Directory {
        self.dir
    }

    pub fn storage(&self) -> &'a Storage {
        self.storage
    }

    pub fn tag(&self) -> TagId {
        self.dir.tag()
    }

    pub fn count(&self) -> usize {
        self.dir.count()
    }

    pub fn total_size(&self) -> u64 {
        self.dir.total_size()
    }

    pub fn max_size(&self) -> u64 {
        self.dir.max_size()
    }

    pub fn data_type(&self) -> DataType {
        self.dir.data_type()
    }

    pub fn compression(&self) -> Compression {
        self.dir.compression()
    }

    pub fn compression_ratio(&self) -> f64 {
        self.dir.compression_ratio()
    }

    pub fn size(&self, id: PacketId) -> u64 {
        self.dir.size(id)
    }

    pub fn exist(&self, id: PacketId) -> bool {
        self.dir.exist(id)
    }

    /// Read and decode a packet.
    ///
    /// Pre-compressed packets come back exactly as they were stored. Any
    /// disagreement between the recorded metadata and the bytes on the
    /// backend is reported as [`PacketError::CorruptData`].
    pub fn get(&self, id: PacketId) -> PacketResult<Vec<u8>> {
        let entry = *self.dir.entry(id).ok_or(PacketError::NotFound {
            tag: self.tag(),
            id,
        })?;
        let stored = match self.storage.read(entry.slot.offset, entry.stored_size) {
            Ok(bytes) => bytes,
            Err(PacketError::Backend(BackendError::OutOfBounds { offset, len, size })) => {
                return Err(self.corrupt(
                    id,
                    format!("slot {offset}+{len} lies past the end of the backend ({size})"),
                ));
            }
            Err(e) => return Err(e),
        };

        let crc = crc32fast::hash(&stored);
        if crc != entry.crc32 {
            return Err(self.corrupt(
                id,
                format!("CRC mismatch: expected {:#010x}, got {crc:#010x}", entry.crc32),
            ));
        }

        let data = codec::decode(self.compression(), stored, entry.encoding)
            .map_err(|e| self.corrupt(id, e.to_string()))?;
        if entry.encoding != Encoding::Precompressed && data.len() as u64 != entry.size {
            return Err(self.corrupt(
                id,
                format!("decoded {} bytes, expected {}", data.len(), entry.size),
            ));
        }
        Ok(data)
    }

    /// Like [`get`](Self::get), reusing `out`'s allocation. Returns the
    /// number of bytes written.
    pub fn get_into(&self, id: PacketId, out: &mut Vec<u8>) -> PacketResult<usize> {
        let data = self.get(id)?;
        out.clear();
        out.extend_from_slice(&data);
        Ok(data.len())
    }

    // ---------------------------------------------------------------
    // Id sequence
    // ---------------------------------------------------------------

    /// Cursor on the lowest live id.
    pub fn begin_id(&self) -> IdCursor {
        IdCursor::begin(self.dir.table().ids())
    }

    pub fn end_id(&self) -> IdCursor {
        IdCursor::end()
    }

    /// Cursor on `id`, or end if `id` is not live.
    pub fn find_id(&self, id: PacketId) -> IdCursor {
        IdCursor::find(self.dir.table().ids(), id.get())
    }

    /// Live ids in ascending order.
    pub fn ids(&self) -> IdIter<'a, PacketId> {
        IdIter::new(self.dir.table().ids())
    }

    /// Live ids from `cursor` onwards.
    pub fn ids_from(&self, cursor: IdCursor) -> IdIter<'a, PacketId> {
        IdIter::starting_at(self.dir.table().ids(), cursor)
    }

    // ---------------------------------------------------------------
    // Typed iteration
    // ---------------------------------------------------------------

    pub fn iter<E: PacketEditor>(&self, editor: &'a E) -> PacketIter<'a, E> {
        PacketIter::new(*self, editor, self.begin_id())
    }

    /// Iterator positioned on `id` (at end if `id` is not live).
    pub fn find<E: PacketEditor>(&self, id: PacketId, editor: &'a E) -> PacketIter<'a, E> {
        PacketIter::new(*self, editor, self.find_id(id))
    }

    fn corrupt(&self, id: PacketId, reason: String) -> PacketError {
        warn!(tag = %self.tag(), %id, %reason, "corrupt packet");
        PacketError::CorruptData {
            tag: self.tag(),
            id,
            reason,
        }
    }
}

impl std::fmt::Debug for PacketManager<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketManager")
            .field("tag", &self.tag())
            .field("count", &self.count())
            .finish()
    }
}

/// Packet bytes ready to be written, plus the entry describing them.
struct Staged {
    bytes: Vec<u8>,
    size: u64,
    crc32: u32,
    encoding: Encoding,
}

impl Staged {
    fn entry(&self, slot: Slot) -> PacketEntry {
        PacketEntry {
            slot,
            size: self.size,
            stored_size: self.bytes.len() as u64,
            crc32: self.crc32,
            encoding: self.encoding,
        }
    }
}

/// Exclusive packet operations on one directory.
pub struct PacketManagerMut<'a> {
    dir: &'a mut Directory,
    storage: &'a mut Storage,
}

impl<'a> PacketManagerMut<'a> {
    pub fn new(dir: &'a mut Directory, storage: &'a mut Storage) -> Self {
        Self { dir, storage }
    }

    /// Shared view for queries and reads.
    pub fn reader(&self) -> PacketManager<'_> {
        PacketManager::new(&*self.dir, &*self.storage)
    }

    pub fn tag(&self) -> TagId {
        self.dir.tag()
    }

    pub fn get(&self, id: PacketId) -> PacketResult<Vec<u8>> {
        self.reader().get(id)
    }

    pub fn exist(&self, id: PacketId) -> bool {
        self.dir.exist(id)
    }

    /// Store a packet under the lowest free id.
    pub fn add(&mut self, packet: impl Into<Packet>) -> PacketResult<PacketId> {
        let packet = packet.into();
        self.check_capacity()?;
        let staged = self.stage(&packet)?;
        let slot = self.storage.write_new(&staged.bytes)?;
        match self.dir.table_mut().insert_new(staged.entry(slot)) {
            Some(id) => {
                debug!(tag = %self.tag(), %id, size = staged.size, stored = slot.len, "added packet");
                Ok(id)
            }
            None => {
                self.storage.release(slot);
                Err(self.full("packet id space exhausted"))
            }
        }
    }

    /// Overwrite a live packet.
    ///
    /// New bytes that fit the packet's current slot are written in place.
    /// Otherwise they go to a fresh slot, the table entry is swapped, and
    /// only then is the old slot released; a failed write leaves the old
    /// packet readable.
    pub fn set(&mut self, id: PacketId, packet: impl Into<Packet>) -> PacketResult<()> {
        let packet = packet.into();
        let old = *self.dir.entry(id).ok_or(PacketError::NotFound {
            tag: self.tag(),
            id,
        })?;
        let staged = self.stage(&packet)?;

        if staged.bytes.len() as u64 <= old.slot.len {
            self.storage.write_in_place(old.slot, &staged.bytes)?;
            self.dir.table_mut().replace(id, staged.entry(old.slot));
            debug!(tag = %self.tag(), %id, size = staged.size, "rewrote packet in place");
            return Ok(());
        }

        let slot = self.storage.write_new(&staged.bytes)?;
        self.dir.table_mut().replace(id, staged.entry(slot));
        self.storage.release(old.slot);
        debug!(
            tag = %self.tag(),
            %id,
            from = old.slot.offset,
            to = slot.offset,
            "relocated packet"
        );
        Ok(())
    }

    /// Store a packet under a caller-chosen id, creating it if absent.
    /// Returns `true` if the id was newly created.
    pub fn insert(&mut self, id: PacketId, packet: impl Into<Packet>) -> PacketResult<bool> {
        if self.dir.exist(id) {
            self.set(id, packet)?;
            return Ok(false);
        }
        if id.get() > crate::ids::IdAllocator::MAX_ID {
            return Err(PacketError::InvalidArgument(format!("packet id {id} is reserved")));
        }
        let packet = packet.into();
        self.check_capacity()?;
        let staged = self.stage(&packet)?;
        let slot = self.storage.write_new(&staged.bytes)?;
        self.dir.table_mut().insert_at(id, staged.entry(slot));
        debug!(tag = %self.tag(), %id, size = staged.size, "inserted packet");
        Ok(true)
    }

    /// Delete a packet and return its slot and id for reuse.
    pub fn remove(&mut self, id: PacketId) -> PacketResult<()> {
        let entry = self
            .dir
            .table_mut()
            .remove(id)
            .ok_or(PacketError::NotFound { tag: self.dir.tag(), id })?;
        self.storage.release(entry.slot);
        debug!(tag = %self.tag(), %id, freed = entry.slot.len, "removed packet");
        Ok(())
    }

    pub fn iter<'s, E: PacketEditor>(&'s self, editor: &'s E) -> PacketIter<'s, E> {
        PacketIter::new(self.reader(), editor, self.reader().begin_id())
    }

    /// Exclusive iterator from the lowest live id.
    pub fn iter_mut<'s, E: PacketEditor>(&'s mut self, editor: &'s E) -> PacketIterMut<'s, E> {
        let cursor = self.reader().begin_id();
        PacketIterMut::new(PacketManagerMut::new(&mut *self.dir, &mut *self.storage), editor, cursor)
    }

    /// Exclusive iterator positioned on `id` (at end if `id` is not live).
    pub fn find_mut<'s, E: PacketEditor>(
        &'s mut self,
        id: PacketId,
        editor: &'s E,
    ) -> PacketIterMut<'s, E> {
        let cursor = self.reader().find_id(id);
        PacketIterMut::new(PacketManagerMut::new(&mut *self.dir, &mut *self.storage), editor, cursor)
    }

    pub(crate) fn directory(&self) -> &Directory {
        &*self.dir
    }

    fn check_capacity(&self) -> PacketResult<()> {
        if self.dir.count() >= self.dir.config().max_packets as usize {
            return Err(self.full(&format!(
                "directory holds its maximum of {} packets",
                self.dir.config().max_packets
            )));
        }
        Ok(())
    }

    fn stage(&self, packet: &Packet) -> PacketResult<Staged> {
        let size = packet.logical_size();
        if size > self.dir.max_size() {
            return Err(self.full(&format!(
                "packet of {size} bytes exceeds the limit of {}",
                self.dir.max_size()
            )));
        }
        let (bytes, encoding) = if packet.is_precompressed() {
            (packet.data().to_vec(), Encoding::Precompressed)
        } else {
            codec::encode(self.dir.compression(), packet.data())?
        };
        Ok(Staged {
            crc32: crc32fast::hash(&bytes),
            bytes,
            size,
            encoding,
        })
    }

    fn full(&self, reason: &str) -> PacketError {
        PacketError::Full {
            tag: self.tag(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Debug for PacketManagerMut<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketManagerMut")
            .field("tag", &self.tag())
            .field("count", &self.dir.count())
            .finish()
    }
}
