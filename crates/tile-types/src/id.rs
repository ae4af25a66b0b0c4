use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle of a packet inside one directory.
///
/// Packet ids are small non-negative integers. An id is unique among the
/// live packets of its directory and is handed back out (lowest first) once
/// the packet is removed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PacketId(u32);

impl PacketId {
    /// Largest representable packet id.
    pub const MAX: PacketId = PacketId(u32::MAX - 1);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// The id as a table index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketId({})", self.0)
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PacketId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Handle of a child directory inside its parent.
///
/// Tags follow the same allocation rules as packet ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagId(u32);

impl TagId {
    /// Tag carried by the root directory, which has no parent.
    pub const ROOT: TagId = TagId(u32::MAX);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Debug for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "TagId(root)")
        } else {
            write!(f, "TagId({})", self.0)
        }
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "root")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u32> for TagId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Opaque block handle used by the block store facade.
///
/// Consumers treat a `BlockId` as a token: they receive it from a "new
/// block" operation and hand it back on later calls. Backends pack the
/// directory tag into the high 32 bits and the packet id into the low 32.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(u64);

impl BlockId {
    /// The null block id. Represents "no block".
    pub const NULL: BlockId = BlockId(u64::MAX);

    /// Address a packet of a given directory.
    pub const fn from_parts(tag: TagId, packet: PacketId) -> Self {
        Self(((tag.get() as u64) << 32) | packet.get() as u64)
    }

    /// Reconstruct from the raw value previously obtained from [`BlockId::to_raw`].
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    /// Directory half of the address.
    pub const fn tag(self) -> TagId {
        TagId::new((self.0 >> 32) as u32)
    }

    /// Packet half of the address.
    pub const fn packet(self) -> PacketId {
        PacketId::new(self.0 as u32)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "BlockId(null)")
        } else {
            write!(f, "BlockId({:016x})", self.0)
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
