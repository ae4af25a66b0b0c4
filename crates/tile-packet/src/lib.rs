//! Directory and packet storage engine for the tiled block store.
//!
//! A tile file is a tree of [`Directory`] nodes. Each directory holds a
//! sparse table of packets (byte blobs addressed by a small [`PacketId`])
//! and a sparse set of child directories (addressed by a [`TagId`]). The
//! directory declares one [`DataType`] and one [`Compression`] scheme for
//! all of its packets.
//!
//! # Operation Surfaces
//!
//! - [`PacketManager`] / [`PacketManagerMut`] -- get, add, set, insert,
//!   remove, size and ratio queries, id sequences
//! - [`PacketIter`] / [`PacketIterMut`] -- cursors decorated with a
//!   [`PacketEditor`] yielding typed views
//! - [`SubDirManager`] / [`SubDirManagerMut`] -- the same one level up,
//!   with [`SubDirIter`] / [`SubDirIterMut`] and a [`DirectoryEditor`]
//! - [`TileFile`] -- the persisted root: superblock, catalog, lifecycle
//!
//! # Design Rules
//!
//! 1. Ids are reused lowest-free-first; iteration skips holes a word at a
//!    time and always yields exactly the live ids in ascending order.
//! 2. Directory totals are maintained on every mutation, never recomputed
//!    on the hot path and never trusted from disk.
//! 3. A relocating `set` writes the new slot before the old one is freed.
//! 4. Stored bytes are CRC-checked on every read; a mismatch is
//!    [`PacketError::CorruptData`], never silently returned.
//! 5. No internal locking. Shared access uses `&`, mutation uses `&mut`.
//!
//! [`PacketId`]: tile_types::PacketId
//! [`TagId`]: tile_types::TagId
//! [`DataType`]: tile_types::DataType
//! [`Compression`]: tile_types::Compression

pub mod codec;
pub mod cursor;
pub mod directory;
pub mod editor;
pub mod error;
pub mod file;
pub mod format;
pub mod ids;
pub mod iter;
pub mod manager;
pub mod packet;
pub mod slots;
pub mod storage;
pub mod subdir;
pub mod table;

pub use codec::Encoding;
pub use cursor::{IdCursor, IdIter};
pub use directory::{Directory, DirectoryConfig};
pub use editor::{BincodeEditor, PacketEditor, PodEditor, RawEditor};
pub use error::{PacketError, PacketResult};
pub use file::{TileFile, TileFileOptions};
pub use ids::IdAllocator;
pub use iter::{PacketIter, PacketIterMut, Position};
pub use manager::{PacketManager, PacketManagerMut};
pub use packet::Packet;
pub use slots::{AllocationPolicy, Slot, SlotAllocator};
pub use storage::Storage;
pub use subdir::{
    DirectoryEditor, DirectoryInfo, InfoEditor, SubDirIter, SubDirIterMut, SubDirManager,
    SubDirManagerMut,
};
pub use table::{PacketEntry, PacketTable};
