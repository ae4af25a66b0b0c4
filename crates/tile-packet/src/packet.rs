/// A payload handed to `add`/`set`/`insert`.
///
/// By default the owning directory's compression scheme is applied on write
/// and reversed on read. A pre-compressed packet skips both steps: its bytes
/// are stored and returned unchanged, and `logical_size` records the size
/// the payload has once the caller decodes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    data: Vec<u8>,
    logical_size: u64,
    precompressed: bool,
}

impl Packet {
    pub fn new(data: Vec<u8>) -> Self {
        let logical_size = data.len() as u64;
        Self {
            data,
            logical_size,
            precompressed: false,
        }
    }

    /// Bytes that are already compressed by an external codec (JPEG, ...).
    pub fn precompressed(data: Vec<u8>, logical_size: u64) -> Self {
        Self {
            data,
            logical_size,
            precompressed: true,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Size accounted against the directory's `total_size`.
    pub fn logical_size(&self) -> u64 {
        self.logical_size
    }

    pub fn is_precompressed(&self) -> bool {
        self.precompressed
    }
}

impl From<Vec<u8>> for Packet {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for Packet {
    fn from(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }
}
