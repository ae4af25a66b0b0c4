use crate::error::BackendResult;

/// Random-access byte storage underneath a tile file.
///
/// All implementations must satisfy these invariants:
/// - `read(offset, len)` returns exactly `len` bytes or an error.
/// - `write(offset, bytes)` makes the bytes visible to every later `read`
///   on the same backend, growing it when `offset + bytes.len()` is past
///   the end.
/// - `size()` never decreases.
///
/// Methods take `&self`; implementations synchronize internally so a backend
/// can be shared behind an `Arc`.
pub trait ByteBackend: Send + Sync {
    /// Read `len` bytes starting at `offset`.
    fn read(&self, offset: u64, len: usize) -> BackendResult<Vec<u8>>;

    /// Write `bytes` starting at `offset`.
    fn write(&self, offset: u64, bytes: &[u8]) -> BackendResult<()>;

    /// Current length in bytes.
    fn size(&self) -> BackendResult<u64>;

    /// Push buffered writes to durable storage.
    ///
    /// Default is a no-op for backends without buffering.
    fn flush(&self) -> BackendResult<()> {
        Ok(())
    }

    /// Whether `write` is refused unconditionally.
    fn is_read_only(&self) -> bool {
        false
    }
}
