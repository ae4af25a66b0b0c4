use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::debug;

use crate::error::{BackendError, BackendResult};
use crate::traits::ByteBackend;

/// Read-only, memory-mapped view of a finished tile file.
///
/// Suited to query engines that open a store, read tiles, and never write.
/// Every `write` fails with [`BackendError::ReadOnly`].
pub struct MappedBackend {
    path: PathBuf,
    map: Option<Mmap>,
}

impl MappedBackend {
    /// Map the file at `path`.
    pub fn open(path: &Path) -> BackendResult<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        // Zero-length mappings are rejected on some platforms.
        let map = if len == 0 {
            None
        } else {
            // SAFETY: the mapping is read-only and the store never writes
            // through this backend; callers must not truncate the file while
            // it is mapped.
            Some(unsafe { Mmap::map(&file)? })
        };
        debug!(path = %path.display(), len, "mapped read-only backend");
        Ok(Self {
            path: path.to_path_buf(),
            map,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}

impl ByteBackend for MappedBackend {
    fn read(&self, offset: u64, len: usize) -> BackendResult<Vec<u8>> {
        let bytes = self.bytes();
        let size = bytes.len() as u64;
        let end = offset
            .checked_add(len as u64)
            .filter(|&end| end <= size)
            .ok_or(BackendError::OutOfBounds { offset, len, size })?;
        Ok(bytes[offset as usize..end as usize].to_vec())
    }

    fn write(&self, _offset: u64, _bytes: &[u8]) -> BackendResult<()> {
        Err(BackendError::ReadOnly)
    }

    fn size(&self) -> BackendResult<u64> {
        Ok(self.bytes().len() as u64)
    }

    fn is_read_only(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for MappedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedBackend")
            .field("path", &self.path)
            .field("len", &self.bytes().len())
            .finish()
    }
}
