use std::sync::RwLock;

use crate::error::{BackendError, BackendResult};
use crate::traits::ByteBackend;

/// In-memory, `Vec<u8>`-backed byte store.
///
/// Intended for tests and embedding. The buffer lives behind a `RwLock` so
/// concurrent readers do not block each other.
pub struct InMemoryBackend {
    bytes: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            bytes: RwLock::new(Vec::new()),
        }
    }

    /// Wrap an existing image, e.g. one produced by [`InMemoryBackend::snapshot`].
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
        }
    }

    /// Copy of the full contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.read().expect("lock poisoned").clone()
    }

    /// Flip every bit of the byte at `offset`. Test hook for corruption paths.
    pub fn corrupt_byte(&self, offset: u64) {
        let mut bytes = self.bytes.write().expect("lock poisoned");
        if let Some(b) = bytes.get_mut(offset as usize) {
            *b ^= 0xFF;
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteBackend for InMemoryBackend {
    fn read(&self, offset: u64, len: usize) -> BackendResult<Vec<u8>> {
        let bytes = self.bytes.read().expect("lock poisoned");
        let size = bytes.len() as u64;
        let end = offset
            .checked_add(len as u64)
            .filter(|&end| end <= size)
            .ok_or(BackendError::OutOfBounds { offset, len, size })?;
        Ok(bytes[offset as usize..end as usize].to_vec())
    }

    fn write(&self, offset: u64, data: &[u8]) -> BackendResult<()> {
        let mut bytes = self.bytes.write().expect("lock poisoned");
        let start = offset as usize;
        let end = start + data.len();
        if end > bytes.len() {
            bytes.resize(end, 0);
        }
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn size(&self) -> BackendResult<u64> {
        Ok(self.bytes.read().expect("lock poisoned").len() as u64)
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.bytes.read().expect("lock poisoned").len();
        f.debug_struct("InMemoryBackend").field("len", &len).finish()
    }
}
