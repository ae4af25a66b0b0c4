use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tile_types::{Compression, DataType, PacketId, TagId};

use crate::error::{PacketError, PacketResult};
use crate::format::DirectoryRecord;
use crate::ids::IdAllocator;
use crate::slots::Slot;
use crate::table::{PacketEntry, PacketTable};

/// Declared shape of a directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub data_type: DataType,
    pub compression: Compression,
    /// Largest logical packet size accepted by `add`/`set`.
    pub max_packet_size: u64,
    /// Largest number of live packets.
    pub max_packets: u32,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            data_type: DataType::Raw,
            compression: Compression::None,
            max_packet_size: u32::MAX as u64,
            max_packets: IdAllocator::MAX_ID,
        }
    }
}

impl DirectoryConfig {
    pub fn new(data_type: DataType, compression: Compression) -> Self {
        Self {
            data_type,
            compression,
            ..Default::default()
        }
    }

    pub fn with_max_packet_size(mut self, max: u64) -> Self {
        self.max_packet_size = max;
        self
    }

    pub fn with_max_packets(mut self, max: u32) -> Self {
        self.max_packets = max;
        self
    }

    pub fn validate(self) -> PacketResult<Self> {
        self.compression.validate()?;
        if self.max_packets > IdAllocator::MAX_ID {
            return Err(PacketError::InvalidArgument(format!(
                "max_packets {} exceeds id space",
                self.max_packets
            )));
        }
        Ok(self)
    }
}

/// One level of the storage hierarchy.
///
/// A directory owns a packet table and a sparse set of child directories
/// keyed by tag. It holds metadata only; byte I/O goes through a
/// [`PacketManager`](crate::PacketManager) bound to the directory and the
/// file's [`Storage`](crate::Storage).
#[derive(Debug)]
pub struct Directory {
    tag: TagId,
    config: DirectoryConfig,
    packets: PacketTable,
    children: BTreeMap<u32, Directory>,
    child_ids: IdAllocator,
}

impl Directory {
    pub(crate) fn new(tag: TagId, config: DirectoryConfig) -> Self {
        Self {
            tag,
            config,
            packets: PacketTable::new(),
            children: BTreeMap::new(),
            child_ids: IdAllocator::new(),
        }
    }

    pub fn tag(&self) -> TagId {
        self.tag
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn data_type(&self) -> DataType {
        self.config.data_type
    }

    pub fn compression(&self) -> Compression {
        self.config.compression
    }

    // ---------------------------------------------------------------
    // Packet statistics
    // ---------------------------------------------------------------

    /// Number of live packets.
    pub fn count(&self) -> usize {
        self.packets.len()
    }

    /// Sum of the logical sizes of all live packets.
    pub fn total_size(&self) -> u64 {
        self.packets.total_size()
    }

    /// Sum of the stored sizes of all live packets.
    pub fn stored_size(&self) -> u64 {
        self.packets.stored_size()
    }

    /// Declared per-packet logical size limit.
    pub fn max_size(&self) -> u64 {
        self.config.max_packet_size
    }

    /// Logical size of the largest live packet.
    pub fn largest_packet_size(&self) -> u64 {
        self.packets.largest_size()
    }

    /// Stored bytes over logical bytes. 1.0 when there is nothing to measure.
    pub fn compression_ratio(&self) -> f64 {
        let total = self.packets.total_size();
        if total == 0 {
            return 1.0;
        }
        self.packets.stored_size() as f64 / total as f64
    }

    /// Logical size of a packet, 0 if absent.
    pub fn size(&self, id: PacketId) -> u64 {
        self.packets.get(id).map_or(0, |e| e.size)
    }

    pub fn exist(&self, id: PacketId) -> bool {
        self.packets.contains(id)
    }

    pub fn entry(&self, id: PacketId) -> Option<&PacketEntry> {
        self.packets.get(id)
    }

    pub fn table(&self) -> &PacketTable {
        &self.packets
    }

    pub(crate) fn table_mut(&mut self) -> &mut PacketTable {
        &mut self.packets
    }

    // ---------------------------------------------------------------
    // Children
    // ---------------------------------------------------------------

    pub fn child_count(&self) -> usize {
        self.child_ids.len()
    }

    pub fn has_child(&self, tag: TagId) -> bool {
        self.child_ids.is_live(tag.get())
    }

    pub fn child(&self, tag: TagId) -> Option<&Directory> {
        self.children.get(&tag.get())
    }

    pub fn child_mut(&mut self, tag: TagId) -> Option<&mut Directory> {
        self.children.get_mut(&tag.get())
    }

    pub fn child_ids(&self) -> &IdAllocator {
        &self.child_ids
    }

    /// Walk `path` downwards from this directory.
    pub fn descendant(&self, path: &[TagId]) -> PacketResult<&Directory> {
        path.iter().try_fold(self, |dir, &tag| {
            dir.child(tag).ok_or(PacketError::DirectoryNotFound(tag))
        })
    }

    pub fn descendant_mut(&mut self, path: &[TagId]) -> PacketResult<&mut Directory> {
        let mut dir = self;
        for &tag in path {
            dir = dir
                .child_mut(tag)
                .ok_or(PacketError::DirectoryNotFound(tag))?;
        }
        Ok(dir)
    }

    pub(crate) fn insert_child(&mut self, config: DirectoryConfig) -> PacketResult<TagId> {
        let config = config.validate()?;
        let raw = self.child_ids.allocate().ok_or_else(|| PacketError::Full {
            tag: self.tag,
            reason: "no free sub-directory tag".into(),
        })?;
        let tag = TagId::new(raw);
        self.place_child(Directory::new(tag, config));
        Ok(tag)
    }

    pub(crate) fn insert_child_at(&mut self, tag: TagId, config: DirectoryConfig) -> PacketResult<()> {
        let config = config.validate()?;
        if tag.get() > IdAllocator::MAX_ID {
            return Err(PacketError::InvalidArgument(format!("tag {tag} is reserved")));
        }
        if !self.child_ids.claim(tag.get()) {
            return Err(PacketError::InvalidArgument(format!(
                "sub-directory {tag} already exists in {}",
                self.tag
            )));
        }
        self.place_child(Directory::new(tag, config));
        Ok(())
    }

    pub(crate) fn take_child(&mut self, tag: TagId) -> Option<Directory> {
        let child = self.children.remove(&tag.get())?;
        self.child_ids.release(tag.get());
        Some(child)
    }

    fn place_child(&mut self, child: Directory) {
        self.children.insert(child.tag.get(), child);
    }

    /// Every non-empty slot owned by this directory and its descendants.
    pub(crate) fn collect_slots(&self, out: &mut Vec<Slot>) {
        out.extend(
            self.packets
                .iter()
                .map(|(_, entry)| entry.slot)
                .filter(|slot| !slot.is_empty()),
        );
        for child in self.children.values() {
            child.collect_slots(out);
        }
    }

    // ---------------------------------------------------------------
    // Catalog conversion
    // ---------------------------------------------------------------

    pub(crate) fn to_record(&self) -> DirectoryRecord {
        DirectoryRecord {
            tag: self.tag,
            data_type: self.config.data_type.code(),
            compression: self.config.compression.code(),
            level: self.config.compression.level(),
            max_packet_size: self.config.max_packet_size,
            max_packets: self.config.max_packets,
            packets: self.packets.iter().map(|(id, e)| (id, *e)).collect(),
            children: self.children.values().map(Directory::to_record).collect(),
        }
    }

    pub(crate) fn from_record(record: DirectoryRecord) -> PacketResult<Self> {
        let config = DirectoryConfig {
            data_type: DataType::from_code(record.data_type)?,
            compression: Compression::from_code(record.compression, record.level)?,
            max_packet_size: record.max_packet_size,
            max_packets: record.max_packets,
        };
        let mut dir = Directory::new(record.tag, config);
        for (id, entry) in record.packets {
            if id.get() > IdAllocator::MAX_ID {
                return Err(PacketError::CatalogCorrupted(format!(
                    "packet id {id} in directory {} is out of range",
                    record.tag
                )));
            }
            if dir.packets.insert_at(id, entry).is_some() {
                return Err(PacketError::CatalogCorrupted(format!(
                    "duplicate packet {id} in directory {}",
                    record.tag
                )));
            }
        }
        for child in record.children {
            let tag = child.tag;
            if !dir.child_ids.claim(tag.get()) {
                return Err(PacketError::CatalogCorrupted(format!(
                    "duplicate sub-directory {tag} in directory {}",
                    record.tag
                )));
            }
            dir.place_child(Directory::from_record(child)?);
        }
        Ok(dir)
    }
}
