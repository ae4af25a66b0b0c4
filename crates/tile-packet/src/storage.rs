use std::sync::Arc;

use tile_store::ByteBackend;
use tracing::debug;

use crate::error::PacketResult;
use crate::slots::{AllocationPolicy, Slot, SlotAllocator};

/// Shared context every manager and iterator of one tile file refers to.
///
/// Owns the open backend handle and the slot allocator (and with it the
/// allocation policy). Managers and iterators borrow it; it is never owned
/// by them.
pub struct Storage {
    backend: Arc<dyn ByteBackend>,
    slots: SlotAllocator,
}

impl Storage {
    pub(crate) fn new(backend: Arc<dyn ByteBackend>, slots: SlotAllocator) -> Self {
        Self { backend, slots }
    }

    pub fn backend(&self) -> &dyn ByteBackend {
        self.backend.as_ref()
    }

    pub fn policy(&self) -> AllocationPolicy {
        self.slots.policy()
    }

    pub fn slots(&self) -> &SlotAllocator {
        &self.slots
    }

    pub(crate) fn read(&self, offset: u64, len: u64) -> PacketResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        Ok(self.backend.read(offset, len as usize)?)
    }

    /// Allocate a fresh slot and fill it. The slot is released again if the
    /// write fails, so nothing leaks on error.
    pub(crate) fn write_new(&mut self, bytes: &[u8]) -> PacketResult<Slot> {
        let slot = self.slots.allocate(bytes.len() as u64);
        if slot.is_empty() {
            return Ok(slot);
        }
        if let Err(e) = self.backend.write(slot.offset, bytes) {
            self.slots.release(slot);
            return Err(e.into());
        }
        debug!(offset = slot.offset, len = slot.len, "wrote slot");
        Ok(slot)
    }

    /// Overwrite the head of an existing slot.
    pub(crate) fn write_in_place(&mut self, slot: Slot, bytes: &[u8]) -> PacketResult<()> {
        debug_assert!(bytes.len() as u64 <= slot.len);
        if bytes.is_empty() {
            return Ok(());
        }
        self.backend.write(slot.offset, bytes)?;
        Ok(())
    }

    pub(crate) fn write_at(&self, offset: u64, bytes: &[u8]) -> PacketResult<()> {
        self.backend.write(offset, bytes)?;
        Ok(())
    }

    pub(crate) fn release(&mut self, slot: Slot) {
        self.slots.release(slot);
    }

    pub(crate) fn flush_backend(&self) -> PacketResult<()> {
        self.backend.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("policy", &self.slots.policy())
            .field("end", &self.slots.end())
            .field("free_bytes", &self.slots.free_bytes())
            .finish()
    }
}
