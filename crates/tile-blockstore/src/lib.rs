//! Block store facade for mesh, terrain, and point-cloud engines.
//!
//! Engines persist three kinds of data per spatial index: one master
//! header, a node header per block, and a point payload per block. The
//! [`BlockStore`] trait is the only surface they see; blocks are named by
//! opaque [`BlockId`]s. [`DirectoryBlockStore`] implements it on top of a
//! [`tile_packet::TileFile`], one directory per role.
//!
//! # Capabilities
//!
//! - [`BlockStore`] -- master header, node headers, point blocks, close
//! - [`TextureBlockStore`] -- pre-compressed texture payloads (optional)
//! - [`HeaderSerializer`] -- portable header encoding (optional)
//!
//! Optional capabilities are separate traits. Code holding only a
//! `BlockStore` asks for textures through [`require_textures`], which
//! fails with [`BlockStoreError::NotImplemented`] when they are absent.
//!
//! # Design Rules
//!
//! 1. A failed `load_point_block` leaves the caller's buffer untouched.
//! 2. Missing and corrupt blocks are block-local errors; the store stays
//!    usable for every other block.
//! 3. Every call after `close` fails with [`BlockStoreError::Closed`].
//!
//! [`BlockId`]: tile_types::BlockId

pub mod config;
pub mod error;
pub mod header;
pub mod store;
pub mod traits;

pub use config::{DirectorySettings, StoreConfig};
pub use error::{BlockStoreError, BlockStoreResult};
pub use header::{Extent3d, MasterHeader, NodeHeader};
pub use store::DirectoryBlockStore;
pub use traits::{require_textures, BlockStore, HeaderSerializer, TextureBlockStore};
