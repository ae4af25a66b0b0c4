use thiserror::Error;
use tile_types::{PacketId, TagId, TypeError};

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("packet {id} not found in directory {tag}")]
    NotFound { tag: TagId, id: PacketId },

    #[error("directory {0} not found")]
    DirectoryNotFound(TagId),

    #[error("corrupt packet {id} in directory {tag}: {reason}")]
    CorruptData {
        tag: TagId,
        id: PacketId,
        reason: String,
    },

    #[error("directory {tag} is full: {reason}")]
    Full { tag: TagId, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("tile file is closed")]
    Closed,

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid file magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported file version: {0}")]
    UnsupportedVersion(u32),

    #[error("catalog corrupted: {0}")]
    CatalogCorrupted(String),

    #[error("type error: {0}")]
    Type(#[from] TypeError),

    #[error("backend error: {0}")]
    Backend(#[from] tile_store::BackendError),
}

impl PacketError {
    /// Whether a caller can reasonably skip the affected item and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::DirectoryNotFound(_) | Self::Full { .. }
        )
    }
}

pub type PacketResult<T> = Result<T, PacketError>;
