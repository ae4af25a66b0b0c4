//! On-disk layout of a tile file.
//!
//! ```text
//! [0..64)   superblock (fixed size, little-endian, CRC-protected)
//! [64..)    packet slots and the catalog, interleaved
//! ```
//!
//! Superblock:
//! ```text
//! [0..4)    magic "TILE"
//! [4..8)    format version (u32)
//! [8..16)   generation (u64), bumped on every flush
//! [16..24)  catalog offset (u64)
//! [24..32)  catalog length (u64)
//! [32..36)  catalog CRC32 (u32)
//! [36..44)  slot high-water mark (u64)
//! [44..60)  reserved, zero
//! [60..64)  CRC32 of bytes [0..60)
//! ```
//!
//! The catalog is the bincode-encoded directory tree. Free space is not
//! persisted; it is recomputed on open as the gaps between live slots.

use serde::{Deserialize, Serialize};
use tile_types::{PacketId, TagId};

use crate::error::{PacketError, PacketResult};
use crate::slots::Slot;
use crate::table::PacketEntry;

pub const MAGIC: &[u8; 4] = b"TILE";
pub const VERSION: u32 = 1;
pub const SUPERBLOCK_SIZE: usize = 64;

/// Fixed-size header at offset 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Superblock {
    pub generation: u64,
    pub catalog: Slot,
    pub catalog_crc: u32,
    pub slot_end: u64,
}

impl Superblock {
    pub fn to_bytes(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..8].copy_from_slice(&VERSION.to_le_bytes());
        buf[8..16].copy_from_slice(&self.generation.to_le_bytes());
        buf[16..24].copy_from_slice(&self.catalog.offset.to_le_bytes());
        buf[24..32].copy_from_slice(&self.catalog.len.to_le_bytes());
        buf[32..36].copy_from_slice(&self.catalog_crc.to_le_bytes());
        buf[36..44].copy_from_slice(&self.slot_end.to_le_bytes());
        let crc = crc32fast::hash(&buf[..60]);
        buf[60..64].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> PacketResult<Self> {
        if buf.len() < SUPERBLOCK_SIZE {
            return Err(PacketError::CatalogCorrupted("superblock truncated".into()));
        }
        if &buf[0..4] != MAGIC {
            return Err(PacketError::InvalidMagic {
                expected: hex::encode(MAGIC),
                actual: hex::encode(&buf[0..4]),
            });
        }
        let version = read_u32(buf, 4);
        if version != VERSION {
            return Err(PacketError::UnsupportedVersion(version));
        }
        let expected = read_u32(buf, 60);
        let actual = crc32fast::hash(&buf[..60]);
        if expected != actual {
            return Err(PacketError::CatalogCorrupted(format!(
                "superblock CRC mismatch: expected {expected:#010x}, got {actual:#010x}"
            )));
        }
        Ok(Self {
            generation: read_u64(buf, 8),
            catalog: Slot {
                offset: read_u64(buf, 16),
                len: read_u64(buf, 24),
            },
            catalog_crc: read_u32(buf, 32),
            slot_end: read_u64(buf, 36),
        })
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(word)
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(word)
}

/// Serialized form of one directory and its subtree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DirectoryRecord {
    pub tag: TagId,
    pub data_type: u8,
    pub compression: u8,
    pub level: i32,
    pub max_packet_size: u64,
    pub max_packets: u32,
    pub packets: Vec<(PacketId, PacketEntry)>,
    pub children: Vec<DirectoryRecord>,
}

pub(crate) fn encode_catalog(root: &DirectoryRecord) -> PacketResult<Vec<u8>> {
    bincode::serialize(root).map_err(|e| PacketError::Serialization(e.to_string()))
}

pub(crate) fn decode_catalog(bytes: &[u8], expected_crc: u32) -> PacketResult<DirectoryRecord> {
    let actual = crc32fast::hash(bytes);
    if actual != expected_crc {
        return Err(PacketError::CatalogCorrupted(format!(
            "catalog CRC mismatch: expected {expected_crc:#010x}, got {actual:#010x}"
        )));
    }
    bincode::deserialize(bytes).map_err(|e| PacketError::CatalogCorrupted(e.to_string()))
}

/// Free extents between `base` and the end of the last live slot.
///
/// Fails if two live slots overlap.
pub(crate) fn free_gaps(base: u64, mut live: Vec<Slot>) -> PacketResult<(Vec<Slot>, u64)> {
    live.retain(|s| !s.is_empty());
    live.sort_by_key(|s| s.offset);
    let mut gaps = Vec::new();
    let mut cursor = base;
    for slot in live {
        if slot.offset < cursor {
            return Err(PacketError::CatalogCorrupted(format!(
                "slot at {} overlaps previous slot ending at {cursor}",
                slot.offset
            )));
        }
        if slot.offset > cursor {
            gaps.push(Slot {
                offset: cursor,
                len: slot.offset - cursor,
            });
        }
        cursor = slot.end();
    }
    Ok((gaps, cursor))
}
