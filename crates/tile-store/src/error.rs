/// Errors from byte backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The requested range extends past the end of the backend.
    #[error("read of {len} bytes at offset {offset} exceeds backend size {size}")]
    OutOfBounds { offset: u64, len: usize, size: u64 },

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend is read-only.
    #[error("backend is read-only")]
    ReadOnly,
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
