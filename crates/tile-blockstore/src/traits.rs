use bytemuck::Pod;
use tile_types::BlockId;

use crate::error::{BlockStoreError, BlockStoreResult};

/// Storage surface consumed by mesh, terrain, and point-cloud engines.
///
/// Engines only ever see [`BlockId`]s; how blocks map onto directories and
/// packets is the implementation's business. Every call after
/// [`close`](Self::close) fails with [`BlockStoreError::Closed`].
pub trait BlockStore {
    /// Per-node structural metadata.
    type Header;
    /// Element of a point block.
    type Point: Pod;

    /// Replace the whole-store metadata blob.
    fn store_master_header(&mut self, bytes: &[u8]) -> BlockStoreResult<()>;

    /// Copy the master header into `buf`, truncating if `buf` is short.
    /// Returns the full stored size, so a result larger than `buf.len()`
    /// signals truncation. A store without a master header returns 0.
    fn load_master_header(&self, buf: &mut [u8]) -> BlockStoreResult<usize>;

    /// Store the header of an existing block.
    fn store_header(&mut self, header: &Self::Header, id: BlockId) -> BlockStoreResult<()>;

    fn load_header(&self, id: BlockId) -> BlockStoreResult<Self::Header>;

    /// Allocate a new block holding `points`.
    fn store_new_point_block(&mut self, points: &[Self::Point]) -> BlockStoreResult<BlockId>;

    /// Replace the points of an existing block.
    fn store_point_block(&mut self, points: &[Self::Point], id: BlockId) -> BlockStoreResult<()>;

    /// Number of points in a block, for sizing the buffer passed to
    /// [`load_point_block`](Self::load_point_block).
    fn point_block_data_count(&self, id: BlockId) -> BlockStoreResult<usize>;

    /// Copy a block's points into `buf` and return how many were written.
    ///
    /// Fails with [`BlockStoreError::InvalidArgument`], leaving `buf`
    /// untouched, when the block holds more than `max_count` points or more
    /// than `buf` can take.
    fn load_point_block(
        &self,
        buf: &mut [Self::Point],
        max_count: usize,
        id: BlockId,
    ) -> BlockStoreResult<usize>;

    /// Release a block and its id. Returns `false` if it did not exist.
    fn destroy_point_block(&mut self, id: BlockId) -> BlockStoreResult<bool>;

    /// Flush and release resources. Closing twice is a no-op.
    fn close(&mut self) -> BlockStoreResult<()>;

    /// The texture capability, for callers that only hold the base trait.
    fn texture_store(&mut self) -> Option<&mut dyn TextureBlockStore> {
        None
    }
}

/// Optional capability: blocks whose payload arrives already compressed
/// (JPEG and similar) and bypasses the store's own compression.
pub trait TextureBlockStore {
    /// Store the compressed texture of block `id`. `decoded_size` is the
    /// size the payload has once the caller decodes it.
    fn store_compressed_texture_block(
        &mut self,
        data: &[u8],
        decoded_size: u64,
        id: BlockId,
    ) -> BlockStoreResult<()>;

    /// The compressed bytes exactly as stored.
    fn load_compressed_texture_block(&self, id: BlockId) -> BlockStoreResult<Vec<u8>>;

    /// Decoded size recorded for a texture block.
    fn texture_decoded_size(&self, id: BlockId) -> BlockStoreResult<u64>;
}

/// Optional capability: portable header encoding for backends that stream
/// headers separately from bulk storage.
pub trait HeaderSerializer {
    type Header;

    /// Encode `header`, failing if the encoding exceeds `max_size` bytes.
    fn serialize_header_to_binary(
        &self,
        header: &Self::Header,
        max_size: usize,
    ) -> BlockStoreResult<Vec<u8>>;

    fn deserialize_header_from_binary(&self, bytes: &[u8]) -> BlockStoreResult<Self::Header>;
}

/// The texture capability of `store`, or `NotImplemented` if it has none.
///
/// Call this once at integration time rather than on every texture access.
pub fn require_textures<S>(store: &mut S) -> BlockStoreResult<&mut dyn TextureBlockStore>
where
    S: BlockStore + ?Sized,
{
    store
        .texture_store()
        .ok_or(BlockStoreError::NotImplemented("compressed texture blocks"))
}
