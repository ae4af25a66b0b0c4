//! Foundation types for the tiled block store.
//!
//! Every other `tile-*` crate depends on `tile-types`.
//!
//! # Key Types
//!
//! - [`PacketId`] -- Small integer handle of a packet inside one directory
//! - [`TagId`] -- Small integer handle of a child directory inside its parent
//! - [`BlockId`] -- Opaque handle handed out by the block store facade
//! - [`DataType`] -- Declared payload type of a directory
//! - [`Compression`] -- Compression scheme applied to a directory's packets

pub mod error;
pub mod id;
pub mod kind;

pub use error::TypeError;
pub use id::{BlockId, PacketId, TagId};
pub use kind::{Compression, DataType};
