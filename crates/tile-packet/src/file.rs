//! The root object of an open tile file.

use std::sync::Arc;

use tile_store::{BackendError, ByteBackend};
use tile_types::TagId;
use tracing::{debug, info};

use crate::directory::{Directory, DirectoryConfig};
use crate::error::{PacketError, PacketResult};
use crate::format::{self, Superblock, SUPERBLOCK_SIZE};
use crate::manager::{PacketManager, PacketManagerMut};
use crate::slots::{AllocationPolicy, Slot, SlotAllocator};
use crate::storage::Storage;
use crate::subdir::{SubDirManager, SubDirManagerMut};

/// Options for [`TileFile::create`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileFileOptions {
    pub root: DirectoryConfig,
    pub policy: AllocationPolicy,
}

/// A directory tree persisted on a [`ByteBackend`].
///
/// Metadata lives in memory and is written out as a catalog on
/// [`flush`](Self::flush); packet bytes go to the backend immediately.
/// Once [`close`](Self::close) has run, every accessor fails with
/// [`PacketError::Closed`]. On a read-only backend the mutable managers are
/// refused and nothing is ever written.
pub struct TileFile {
    storage: Storage,
    root: Directory,
    generation: u64,
    catalog: Slot,
    dirty: bool,
    closed: bool,
}

impl TileFile {
    /// Initialise an empty backend and write the first catalog.
    pub fn create(backend: Arc<dyn ByteBackend>, options: TileFileOptions) -> PacketResult<Self> {
        if backend.size()? != 0 {
            return Err(PacketError::InvalidArgument(
                "cannot create a tile file on a non-empty backend".into(),
            ));
        }
        let root = Directory::new(TagId::ROOT, options.root.validate()?);
        let slots = SlotAllocator::new(SUPERBLOCK_SIZE as u64, options.policy);
        let mut file = Self {
            storage: Storage::new(backend, slots),
            root,
            generation: 0,
            catalog: Slot::EMPTY,
            dirty: true,
            closed: false,
        };
        file.flush()?;
        info!(policy = ?options.policy, "created tile file");
        Ok(file)
    }

    /// Open an existing tile file.
    ///
    /// The directory tree, id allocators, and statistics are rebuilt from the
    /// catalog; free space is recomputed from the gaps between live slots.
    pub fn open(backend: Arc<dyn ByteBackend>, policy: AllocationPolicy) -> PacketResult<Self> {
        let size = backend.size()?;
        if size < SUPERBLOCK_SIZE as u64 {
            return Err(PacketError::CatalogCorrupted(format!(
                "backend holds {size} bytes, smaller than a superblock"
            )));
        }
        let superblock = Superblock::from_bytes(&backend.read(0, SUPERBLOCK_SIZE)?)?;
        if superblock.catalog.end() > size {
            return Err(PacketError::CatalogCorrupted(format!(
                "catalog at {}+{} lies past the end of the backend ({size})",
                superblock.catalog.offset, superblock.catalog.len
            )));
        }
        let catalog_bytes = backend.read(superblock.catalog.offset, superblock.catalog.len as usize)?;
        let record = format::decode_catalog(&catalog_bytes, superblock.catalog_crc)?;
        let root = Directory::from_record(record)?;

        let mut live = vec![superblock.catalog];
        root.collect_slots(&mut live);
        let (gaps, end) = format::free_gaps(SUPERBLOCK_SIZE as u64, live)?;
        if end > size {
            return Err(PacketError::CatalogCorrupted(format!(
                "slots extend to {end}, past the end of the backend ({size})"
            )));
        }
        let slots = SlotAllocator::restore(SUPERBLOCK_SIZE as u64, end, gaps, policy);
        info!(
            generation = superblock.generation,
            packets = root.count(),
            children = root.child_count(),
            free_bytes = slots.free_bytes(),
            "opened tile file"
        );
        Ok(Self {
            storage: Storage::new(backend, slots),
            root,
            generation: superblock.generation,
            catalog: superblock.catalog,
            dirty: false,
            closed: false,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_read_only(&self) -> bool {
        self.storage.backend().is_read_only()
    }

    /// Number of completed flushes over the life of the file.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn storage(&self) -> PacketResult<&Storage> {
        self.ensure_open()?;
        Ok(&self.storage)
    }

    pub fn root(&self) -> PacketResult<&Directory> {
        self.ensure_open()?;
        Ok(&self.root)
    }

    /// Directory at `path` below the root. An empty path is the root.
    pub fn directory(&self, path: &[TagId]) -> PacketResult<&Directory> {
        self.ensure_open()?;
        self.root.descendant(path)
    }

    pub fn packets(&self, path: &[TagId]) -> PacketResult<PacketManager<'_>> {
        self.ensure_open()?;
        Ok(PacketManager::new(self.root.descendant(path)?, &self.storage))
    }

    pub fn packets_mut(&mut self, path: &[TagId]) -> PacketResult<PacketManagerMut<'_>> {
        self.ensure_writable()?;
        let dir = self.root.descendant_mut(path)?;
        self.dirty = true;
        Ok(PacketManagerMut::new(dir, &mut self.storage))
    }

    pub fn sub_dirs(&self, path: &[TagId]) -> PacketResult<SubDirManager<'_>> {
        self.ensure_open()?;
        Ok(SubDirManager::new(self.root.descendant(path)?, &self.storage))
    }

    pub fn sub_dirs_mut(&mut self, path: &[TagId]) -> PacketResult<SubDirManagerMut<'_>> {
        self.ensure_writable()?;
        let dir = self.root.descendant_mut(path)?;
        self.dirty = true;
        Ok(SubDirManagerMut::new(dir, &mut self.storage))
    }

    /// Persist the catalog.
    ///
    /// The new catalog goes to a fresh slot, then the superblock is rewritten
    /// to point at it, and only then is the previous catalog slot released.
    pub fn flush(&mut self) -> PacketResult<()> {
        self.ensure_writable()?;
        let bytes = format::encode_catalog(&self.root.to_record())?;
        let slot = self.storage.write_new(&bytes)?;
        let superblock = Superblock {
            generation: self.generation + 1,
            catalog: slot,
            catalog_crc: crc32fast::hash(&bytes),
            slot_end: self.storage.slots().end(),
        };
        if let Err(e) = self
            .storage
            .write_at(0, &superblock.to_bytes())
            .and_then(|()| self.storage.flush_backend())
        {
            self.storage.release(slot);
            return Err(e);
        }
        let previous = std::mem::replace(&mut self.catalog, slot);
        self.storage.release(previous);
        self.generation = superblock.generation;
        self.dirty = false;
        debug!(
            generation = self.generation,
            catalog_offset = slot.offset,
            catalog_len = slot.len,
            "flushed catalog"
        );
        Ok(())
    }

    /// Flush pending metadata and refuse further use. Closing twice is a
    /// no-op.
    pub fn close(&mut self) -> PacketResult<()> {
        if self.closed {
            return Ok(());
        }
        if self.dirty && !self.is_read_only() {
            self.flush()?;
        }
        self.closed = true;
        debug!(generation = self.generation, "closed tile file");
        Ok(())
    }

    fn ensure_open(&self) -> PacketResult<()> {
        if self.closed {
            return Err(PacketError::Closed);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> PacketResult<()> {
        self.ensure_open()?;
        if self.is_read_only() {
            return Err(BackendError::ReadOnly.into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for TileFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileFile")
            .field("generation", &self.generation)
            .field("catalog", &self.catalog)
            .field("closed", &self.closed)
            .field("storage", &self.storage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tile_store::InMemoryBackend;
    use tile_types::{Compression, DataType, PacketId};

    fn memory() -> Arc<InMemoryBackend> {
        Arc::new(InMemoryBackend::new())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn create_writes_superblock() {
        let backend = memory();
        let file = TileFile::create(backend.clone(), TileFileOptions::default()).unwrap();
        assert_eq!(file.generation(), 1);
        let snapshot = backend.snapshot();
        assert_eq!(&snapshot[0..4], b"TILE");
        assert!(snapshot.len() > SUPERBLOCK_SIZE);
    }

    #[test]
    fn create_refuses_non_empty_backend() {
        let backend = Arc::new(InMemoryBackend::from_bytes(vec![1, 2, 3]));
        assert!(matches!(
            TileFile::create(backend, TileFileOptions::default()),
            Err(PacketError::InvalidArgument(_))
        ));
    }

    #[test]
    fn reopen_restores_tree_and_packets() {
        let backend = memory();
        let (tag, id) = {
            let mut file = TileFile::create(backend.clone(), TileFileOptions::default()).unwrap();
            let tag = file
                .sub_dirs_mut(&[])
                .unwrap()
                .create_dir(DirectoryConfig::new(DataType::Point, Compression::deflate()))
                .unwrap();
            let id = file
                .packets_mut(&[tag])
                .unwrap()
                .add(vec![42u8; 500])
                .unwrap();
            file.close().unwrap();
            (tag, id)
        };

        let file = TileFile::open(backend, AllocationPolicy::FirstFit).unwrap();
        let mgr = file.packets(&[tag]).unwrap();
        assert_eq!(mgr.get(id).unwrap(), vec![42u8; 500]);
        assert_eq!(mgr.total_size(), 500);
        assert_eq!(mgr.compression(), Compression::deflate());
        assert!(mgr.compression_ratio() < 1.0);
    }

    #[test]
    fn flush_releases_previous_catalog() {
        let backend = memory();
        let mut file = TileFile::create(backend, TileFileOptions::default()).unwrap();
        let first = file.catalog;
        file.packets_mut(&[]).unwrap().add(vec![1u8; 4]).unwrap();
        file.flush().unwrap();
        assert_ne!(file.catalog, first);
        assert_eq!(file.generation(), 2);
        // The first catalog's bytes became free space.
        assert!(file.storage().unwrap().slots().free_bytes() > 0);
    }

    #[test]
    fn free_space_is_recomputed_on_open() {
        let backend = memory();
        let mut file = TileFile::create(backend.clone(), TileFileOptions::default()).unwrap();
        let (a, b) = {
            let mut mgr = file.packets_mut(&[]).unwrap();
            (mgr.add(vec![1u8; 100]).unwrap(), mgr.add(vec![2u8; 100]).unwrap())
        };
        file.packets_mut(&[]).unwrap().remove(a).unwrap();
        file.close().unwrap();

        let mut file = TileFile::open(backend, AllocationPolicy::FirstFit).unwrap();
        assert!(file.storage().unwrap().slots().free_bytes() > 0);
        let mut mgr = file.packets_mut(&[]).unwrap();
        assert_eq!(mgr.get(b).unwrap(), vec![2u8; 100]);
        // Lowest-free-first survives the reopen.
        assert_eq!(mgr.add(vec![3u8; 10]).unwrap(), a);
        assert_eq!(mgr.get(b).unwrap(), vec![2u8; 100]);
    }

    #[test]
    fn calls_after_close_fail() {
        let mut file = TileFile::create(memory(), TileFileOptions::default()).unwrap();
        file.close().unwrap();
        file.close().unwrap();
        assert!(file.is_closed());
        assert!(matches!(file.root(), Err(PacketError::Closed)));
        assert!(matches!(file.packets(&[]), Err(PacketError::Closed)));
        assert!(matches!(file.packets_mut(&[]), Err(PacketError::Closed)));
        assert!(matches!(file.sub_dirs(&[]), Err(PacketError::Closed)));
        assert!(matches!(file.flush(), Err(PacketError::Closed)));
    }

    #[test]
    fn path_addressing() {
        let mut file = TileFile::create(memory(), TileFileOptions::default()).unwrap();
        let a = file
            .sub_dirs_mut(&[])
            .unwrap()
            .create_dir(DirectoryConfig::default())
            .unwrap();
        let b = file
            .sub_dirs_mut(&[a])
            .unwrap()
            .create_dir(DirectoryConfig::new(DataType::Index, Compression::None))
            .unwrap();
        assert_eq!(file.directory(&[a, b]).unwrap().data_type(), DataType::Index);
        assert_eq!(file.directory(&[]).unwrap().tag(), TagId::ROOT);
        assert!(matches!(
            file.directory(&[b, a]),
            Err(PacketError::DirectoryNotFound(_))
        ));
        assert!(file.packets(&[a, b]).unwrap().ids().next().is_none());
        assert!(!file.packets(&[a]).unwrap().exist(PacketId::new(0)));
    }

    // -----------------------------------------------------------------------
    // Corruption
    // -----------------------------------------------------------------------

    #[test]
    fn open_rejects_bad_magic() {
        let backend = memory();
        TileFile::create(backend.clone(), TileFileOptions::default()).unwrap();
        backend.corrupt_byte(0);
        assert!(matches!(
            TileFile::open(backend, AllocationPolicy::FirstFit),
            Err(PacketError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn open_rejects_corrupt_catalog() {
        let backend = memory();
        let file = TileFile::create(backend.clone(), TileFileOptions::default()).unwrap();
        backend.corrupt_byte(file.catalog.offset);
        assert!(matches!(
            TileFile::open(backend, AllocationPolicy::FirstFit),
            Err(PacketError::CatalogCorrupted(_))
        ));
    }

    #[test]
    fn open_rejects_tiny_backend() {
        let backend = Arc::new(InMemoryBackend::from_bytes(vec![0; 10]));
        assert!(matches!(
            TileFile::open(backend, AllocationPolicy::FirstFit),
            Err(PacketError::CatalogCorrupted(_))
        ));
    }
}
