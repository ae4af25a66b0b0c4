//! Block store backed by a tile file directory tree.
//!
//! Layout under the root directory:
//!
//! | tag | directory | contents |
//! |-----|-----------|----------|
//! | 0   | master    | one packet (id 0) holding the master header |
//! | 1   | headers   | node header of block *n* at packet id *n* |
//! | 2   | points    | point payload of block *n* at packet id *n* |
//! | 3   | textures  | compressed texture of block *n* at packet id *n* (optional) |
//!
//! A [`BlockId`] packs the points tag and the packet id. The header and
//! texture of a block share its packet id, so all three are found from the
//! one handle.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use bytemuck::Pod;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tile_packet::{
    BincodeEditor, DirectoryInfo, InfoEditor, Packet, PacketEditor, PacketManager,
    PacketManagerMut, PodEditor, TileFile, TileFileOptions,
};
use tile_store::{ByteBackend, FileBackend, MappedBackend};
use tile_types::{BlockId, DataType, PacketId, TagId};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{BlockStoreError, BlockStoreResult};
use crate::traits::{BlockStore, HeaderSerializer, TextureBlockStore};

const MASTER: TagId = TagId::new(0);
const HEADERS: TagId = TagId::new(1);
const POINTS: TagId = TagId::new(2);
const TEXTURES: TagId = TagId::new(3);

const MASTER_PACKET: PacketId = PacketId::new(0);

/// [`BlockStore`] over a [`TileFile`], generic over the node header type
/// `H` and the point type `P`.
pub struct DirectoryBlockStore<H, P> {
    file: TileFile,
    textures: bool,
    _types: PhantomData<fn() -> (H, P)>,
}

impl<H, P> DirectoryBlockStore<H, P>
where
    H: Serialize + DeserializeOwned,
    P: Pod,
{
    /// Lay out a new store on an empty backend.
    pub fn create(backend: Arc<dyn ByteBackend>, config: &StoreConfig) -> BlockStoreResult<Self> {
        let config = config.clone().validate()?;
        let mut file = TileFile::create(
            backend,
            TileFileOptions {
                policy: config.policy,
                ..Default::default()
            },
        )?;
        {
            let mut root = file.sub_dirs_mut(&[])?;
            root.create_dir_with_tag(MASTER, config.master.directory_config(DataType::MasterHeader))?;
            root.create_dir_with_tag(HEADERS, config.headers.directory_config(DataType::NodeHeader))?;
            root.create_dir_with_tag(POINTS, config.points.directory_config(DataType::Point))?;
            if config.textures_enabled {
                root.create_dir_with_tag(
                    TEXTURES,
                    config.textures.directory_config(DataType::Texture),
                )?;
            }
        }
        file.flush()?;
        info!(textures = config.textures_enabled, "created block store");
        Ok(Self {
            file,
            textures: config.textures_enabled,
            _types: PhantomData,
        })
    }

    /// Open an existing store. Directory settings are read from the file;
    /// only the allocation policy is taken from `config`.
    pub fn open(backend: Arc<dyn ByteBackend>, config: &StoreConfig) -> BlockStoreResult<Self> {
        let file = TileFile::open(backend, config.policy)?;
        let root = file.root()?;
        for (tag, data_type) in [
            (MASTER, DataType::MasterHeader),
            (HEADERS, DataType::NodeHeader),
            (POINTS, DataType::Point),
        ] {
            match root.child(tag) {
                Some(dir) if dir.data_type() == data_type => {}
                _ => {
                    return Err(BlockStoreError::InvalidArgument(format!(
                        "tile file has no {data_type} directory at tag {tag}"
                    )))
                }
            }
        }
        let textures = root
            .child(TEXTURES)
            .is_some_and(|dir| dir.data_type() == DataType::Texture);
        info!(
            blocks = root.child(POINTS).map_or(0, |d| d.count()),
            textures,
            "opened block store"
        );
        Ok(Self {
            file,
            textures,
            _types: PhantomData,
        })
    }

    /// Create a store in a new file at `path`.
    pub fn create_file(path: &Path, config: &StoreConfig) -> BlockStoreResult<Self> {
        let backend = FileBackend::open(path, config.file_backend()).map_err(packet_io)?;
        Self::create(Arc::new(backend), config)
    }

    pub fn open_file(path: &Path, config: &StoreConfig) -> BlockStoreResult<Self> {
        let backend = FileBackend::open(path, config.file_backend()).map_err(packet_io)?;
        Self::open(Arc::new(backend), config)
    }

    /// Open a finished store read-only through a memory map.
    pub fn open_mapped(path: &Path, config: &StoreConfig) -> BlockStoreResult<Self> {
        let backend = MappedBackend::open(path).map_err(packet_io)?;
        Self::open(Arc::new(backend), config)
    }

    /// The underlying tile file, for statistics and direct packet access.
    pub fn tile_file(&self) -> &TileFile {
        &self.file
    }

    pub fn has_textures(&self) -> bool {
        self.textures
    }

    /// Number of live blocks.
    pub fn block_count(&self) -> BlockStoreResult<usize> {
        Ok(self.points()?.count())
    }

    /// Live block ids in ascending order.
    pub fn block_ids(&self) -> BlockStoreResult<impl Iterator<Item = BlockId> + '_> {
        Ok(self
            .points()?
            .ids()
            .map(|id| BlockId::from_parts(POINTS, id)))
    }

    /// Declaration and statistics of every directory in the layout.
    pub fn directory_info(&self) -> BlockStoreResult<Vec<DirectoryInfo>> {
        let infos = self
            .file
            .sub_dirs(&[])?
            .iter(&InfoEditor)
            .map(|item| item.map(|(_, info)| info))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(infos)
    }

    /// Persist pending metadata without closing.
    pub fn flush(&mut self) -> BlockStoreResult<()> {
        self.file.flush()?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------

    fn packets(&self, tag: TagId) -> BlockStoreResult<PacketManager<'_>> {
        Ok(self.file.packets(&[tag])?)
    }

    fn packets_mut(&mut self, tag: TagId) -> BlockStoreResult<PacketManagerMut<'_>> {
        Ok(self.file.packets_mut(&[tag])?)
    }

    fn points(&self) -> BlockStoreResult<PacketManager<'_>> {
        self.packets(POINTS)
    }

    /// Packet id of a block that exists in this store.
    fn live_block(&self, id: BlockId) -> BlockStoreResult<PacketId> {
        let packet = self.block_packet(id)?;
        if !self.points()?.exist(packet) {
            return Err(BlockStoreError::NotFound(id));
        }
        Ok(packet)
    }

    /// Packet id addressed by `id`, if `id` belongs to this store at all.
    fn block_packet(&self, id: BlockId) -> BlockStoreResult<PacketId> {
        if id.is_null() || id.tag() != POINTS {
            return Err(BlockStoreError::NotFound(id));
        }
        Ok(id.packet())
    }

    fn texture_tag(&self) -> BlockStoreResult<TagId> {
        if self.textures {
            Ok(TEXTURES)
        } else {
            Err(BlockStoreError::NotImplemented("compressed texture blocks"))
        }
    }
}

impl<H, P> BlockStore for DirectoryBlockStore<H, P>
where
    H: Serialize + DeserializeOwned,
    P: Pod,
{
    type Header = H;
    type Point = P;

    fn store_master_header(&mut self, bytes: &[u8]) -> BlockStoreResult<()> {
        self.packets_mut(MASTER)?
            .insert(MASTER_PACKET, bytes.to_vec())?;
        debug!(len = bytes.len(), "stored master header");
        Ok(())
    }

    fn load_master_header(&self, buf: &mut [u8]) -> BlockStoreResult<usize> {
        let master = self.packets(MASTER)?;
        if !master.exist(MASTER_PACKET) {
            return Ok(0);
        }
        let bytes = master.get(MASTER_PACKET)?;
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(bytes.len())
    }

    fn store_header(&mut self, header: &H, id: BlockId) -> BlockStoreResult<()> {
        let packet = self.live_block(id)?;
        let bytes = BincodeEditor::<H>::new().encode(header)?;
        self.packets_mut(HEADERS)?
            .insert(packet, bytes)
            .map_err(|e| BlockStoreError::from_packet(id, e))?;
        Ok(())
    }

    fn load_header(&self, id: BlockId) -> BlockStoreResult<H> {
        let packet = self.block_packet(id)?;
        let bytes = self
            .packets(HEADERS)?
            .get(packet)
            .map_err(|e| BlockStoreError::from_packet(id, e))?;
        BincodeEditor::<H>::new()
            .decode(bytes)
            .map_err(|e| BlockStoreError::from_packet(id, corrupt(id, e)))
    }

    fn store_new_point_block(&mut self, points: &[P]) -> BlockStoreResult<BlockId> {
        let bytes: Vec<u8> = bytemuck::cast_slice(points).to_vec();
        let packet = self.packets_mut(POINTS)?.add(bytes)?;
        let id = BlockId::from_parts(POINTS, packet);
        debug!(block = %id, points = points.len(), "created point block");
        Ok(id)
    }

    fn store_point_block(&mut self, points: &[P], id: BlockId) -> BlockStoreResult<()> {
        let packet = self.block_packet(id)?;
        let bytes: Vec<u8> = bytemuck::cast_slice(points).to_vec();
        self.packets_mut(POINTS)?
            .set(packet, bytes)
            .map_err(|e| BlockStoreError::from_packet(id, e))
    }

    fn point_block_data_count(&self, id: BlockId) -> BlockStoreResult<usize> {
        let packet = self.live_block(id)?;
        let size = self.points()?.size(packet);
        let count = usize::try_from(size)
            .map_err(|_| BlockStoreError::InvalidArgument(format!("block {id} is too large")))
            .and_then(|len| {
                PodEditor::<P>::element_count(len)
                    .map_err(|e| BlockStoreError::from_packet(id, corrupt(id, e)))
            })?;
        Ok(count)
    }

    fn load_point_block(&self, buf: &mut [P], max_count: usize, id: BlockId) -> BlockStoreResult<usize> {
        let count = self.point_block_data_count(id)?;
        if count > max_count || count > buf.len() {
            return Err(BlockStoreError::InvalidArgument(format!(
                "block {id} holds {count} points; room for {}",
                max_count.min(buf.len())
            )));
        }
        let bytes = self
            .points()?
            .get(id.packet())
            .map_err(|e| BlockStoreError::from_packet(id, e))?;
        let points = PodEditor::<P>::new()
            .decode(bytes)
            .map_err(|e| BlockStoreError::from_packet(id, corrupt(id, e)))?;
        if points.len() != count {
            return Err(BlockStoreError::CorruptData {
                id,
                reason: format!("decoded {} points, expected {count}", points.len()),
            });
        }
        buf[..count].copy_from_slice(&points);
        Ok(count)
    }

    fn destroy_point_block(&mut self, id: BlockId) -> BlockStoreResult<bool> {
        let packet = match self.live_block(id) {
            Ok(packet) => packet,
            Err(BlockStoreError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        // Points go last: while the points packet is live the id cannot be
        // handed out again, so a failure part way leaves no orphan behind.
        let mut headers = self.packets_mut(HEADERS)?;
        if headers.exist(packet) {
            headers.remove(packet)?;
        }
        if self.textures {
            let mut textures = self.packets_mut(TEXTURES)?;
            if textures.exist(packet) {
                textures.remove(packet)?;
            }
        }
        self.packets_mut(POINTS)?.remove(packet)?;
        debug!(block = %id, "destroyed point block");
        Ok(true)
    }

    fn close(&mut self) -> BlockStoreResult<()> {
        self.file.close()?;
        Ok(())
    }

    fn texture_store(&mut self) -> Option<&mut dyn TextureBlockStore> {
        if self.textures {
            Some(self)
        } else {
            None
        }
    }
}

impl<H, P> TextureBlockStore for DirectoryBlockStore<H, P>
where
    H: Serialize + DeserializeOwned,
    P: Pod,
{
    fn store_compressed_texture_block(
        &mut self,
        data: &[u8],
        decoded_size: u64,
        id: BlockId,
    ) -> BlockStoreResult<()> {
        let tag = self.texture_tag()?;
        let packet = self.live_block(id)?;
        self.packets_mut(tag)?
            .insert(packet, Packet::precompressed(data.to_vec(), decoded_size))
            .map_err(|e| BlockStoreError::from_packet(id, e))?;
        debug!(block = %id, len = data.len(), decoded_size, "stored compressed texture");
        Ok(())
    }

    fn load_compressed_texture_block(&self, id: BlockId) -> BlockStoreResult<Vec<u8>> {
        let tag = self.texture_tag()?;
        let packet = self.block_packet(id)?;
        self.packets(tag)?
            .get(packet)
            .map_err(|e| BlockStoreError::from_packet(id, e))
    }

    fn texture_decoded_size(&self, id: BlockId) -> BlockStoreResult<u64> {
        let tag = self.texture_tag()?;
        let packet = self.block_packet(id)?;
        let textures = self.packets(tag)?;
        if !textures.exist(packet) {
            return Err(BlockStoreError::NotFound(id));
        }
        Ok(textures.size(packet))
    }
}

impl<H, P> HeaderSerializer for DirectoryBlockStore<H, P>
where
    H: Serialize + DeserializeOwned,
{
    type Header = H;

    fn serialize_header_to_binary(&self, header: &H, max_size: usize) -> BlockStoreResult<Vec<u8>> {
        let bytes = BincodeEditor::<H>::new().encode(header)?;
        if bytes.len() > max_size {
            return Err(BlockStoreError::InvalidArgument(format!(
                "header encodes to {} bytes, limit is {max_size}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    fn deserialize_header_from_binary(&self, bytes: &[u8]) -> BlockStoreResult<H> {
        Ok(BincodeEditor::<H>::new().decode(bytes.to_vec())?)
    }
}

impl<H, P> std::fmt::Debug for DirectoryBlockStore<H, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryBlockStore")
            .field("file", &self.file)
            .field("textures", &self.textures)
            .finish()
    }
}

fn packet_io(err: tile_store::BackendError) -> BlockStoreError {
    BlockStoreError::from(tile_packet::PacketError::from(err))
}

fn corrupt(id: BlockId, err: tile_packet::PacketError) -> tile_packet::PacketError {
    tile_packet::PacketError::CorruptData {
        tag: id.tag(),
        id: id.packet(),
        reason: err.to_string(),
    }
}
