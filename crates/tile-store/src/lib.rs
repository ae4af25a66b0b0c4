//! Byte-range persistence backends for the tiled block store.
//!
//! The packet layer sees storage only through the narrow [`ByteBackend`]
//! contract: read a range, write a range, report the current length.
//!
//! # Backends
//!
//! - [`InMemoryBackend`] -- growable `Vec<u8>` for tests and embedding
//! - [`FileBackend`] -- a regular file with positional reads and writes
//! - [`MappedBackend`] -- read-only memory-mapped view of a finished file
//!
//! # Design Rules
//!
//! 1. Reads past the end are errors, never zero-filled.
//! 2. Writes past the end grow the backend; the gap is zero-filled.
//! 3. Backends never shrink. Reclaiming space is the allocator's job.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod mapped;
pub mod memory;
pub mod traits;

pub use error::{BackendError, BackendResult};
pub use file::{FileBackend, FileBackendConfig, SyncMode};
pub use mapped::MappedBackend;
pub use memory::InMemoryBackend;
pub use traits::ByteBackend;
