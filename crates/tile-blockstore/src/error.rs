use thiserror::Error;
use tile_packet::PacketError;
use tile_types::BlockId;

/// Errors surfaced to block store consumers.
#[derive(Debug, Error)]
pub enum BlockStoreError {
    #[error("block {0} not found")]
    NotFound(BlockId),

    #[error("block {id} is corrupt: {reason}")]
    CorruptData { id: BlockId, reason: String },

    #[error("store is full: {0}")]
    Full(String),

    /// An optional capability the backend does not provide.
    #[error("not implemented by this block store: {0}")]
    NotImplemented(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("block store is closed")]
    Closed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Packet(#[source] PacketError),
}

impl BlockStoreError {
    /// `NotFound` and `Full`: skip the tile and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Full(_))
    }

    /// Errors confined to one block. Corrupt blocks are treated like missing
    /// ones by importers; the rest of the store stays usable.
    pub fn is_block_local(&self) -> bool {
        self.is_recoverable() || matches!(self, Self::CorruptData { .. })
    }

    /// Translate a packet-level error raised while working on `id`.
    pub(crate) fn from_packet(id: BlockId, err: PacketError) -> Self {
        match err {
            PacketError::NotFound { .. } | PacketError::DirectoryNotFound(_) => Self::NotFound(id),
            PacketError::CorruptData { reason, .. } => {
                tracing::error!(block = %id, %reason, "corrupt block");
                Self::CorruptData { id, reason }
            }
            other => Self::from(other),
        }
    }
}

impl From<PacketError> for BlockStoreError {
    fn from(err: PacketError) -> Self {
        match err {
            PacketError::Full { reason, .. } => Self::Full(reason),
            PacketError::Closed => Self::Closed,
            PacketError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            PacketError::Serialization(msg) => Self::Serialization(msg),
            other => Self::Packet(other),
        }
    }
}

pub type BlockStoreResult<T> = Result<T, BlockStoreError>;
