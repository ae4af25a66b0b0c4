use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Declared payload type of a directory.
///
/// The store never interprets packet contents; the data type is a label that
/// lets readers pick the right editor when they reopen a file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Untyped bytes.
    #[default]
    Raw,
    /// Whole-store metadata blob.
    MasterHeader,
    /// Per-block structural metadata.
    NodeHeader,
    /// Homogeneous point records.
    Point,
    /// Triangle or polyline indices.
    Index,
    /// Texture coordinates.
    UvCoords,
    /// Texture images, usually arriving pre-compressed.
    Texture,
}

impl DataType {
    /// Single-byte code used by the on-disk catalog.
    pub fn code(self) -> u8 {
        match self {
            Self::Raw => 0,
            Self::MasterHeader => 1,
            Self::NodeHeader => 2,
            Self::Point => 3,
            Self::Index => 4,
            Self::UvCoords => 5,
            Self::Texture => 6,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, TypeError> {
        match code {
            0 => Ok(Self::Raw),
            1 => Ok(Self::MasterHeader),
            2 => Ok(Self::NodeHeader),
            3 => Ok(Self::Point),
            4 => Ok(Self::Index),
            5 => Ok(Self::UvCoords),
            6 => Ok(Self::Texture),
            other => Err(TypeError::UnknownDataType(other)),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::MasterHeader => write!(f, "master-header"),
            Self::NodeHeader => write!(f, "node-header"),
            Self::Point => write!(f, "point"),
            Self::Index => write!(f, "index"),
            Self::UvCoords => write!(f, "uv"),
            Self::Texture => write!(f, "texture"),
        }
    }
}

/// Compression scheme applied to every packet of a directory unless the
/// packet is marked pre-compressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Zstd { level: i32 },
    Deflate { level: u32 },
}

impl Compression {
    pub const ZSTD_DEFAULT_LEVEL: i32 = 3;
    pub const DEFLATE_DEFAULT_LEVEL: u32 = 6;

    /// zstd at the default level.
    pub const fn zstd() -> Self {
        Self::Zstd {
            level: Self::ZSTD_DEFAULT_LEVEL,
        }
    }

    /// Deflate at the default level.
    pub const fn deflate() -> Self {
        Self::Deflate {
            level: Self::DEFLATE_DEFAULT_LEVEL,
        }
    }

    /// Whether packets are stored byte-for-byte.
    pub fn is_identity(self) -> bool {
        matches!(self, Self::None)
    }

    /// Reject levels the codec would refuse at write time.
    pub fn validate(self) -> Result<Self, TypeError> {
        match self {
            Self::Zstd { level } if !(1..=22).contains(&level) => Err(TypeError::InvalidLevel {
                scheme: "zstd",
                level,
            }),
            Self::Deflate { level } if level > 9 => Err(TypeError::InvalidLevel {
                scheme: "deflate",
                level: level as i32,
            }),
            ok => Ok(ok),
        }
    }

    /// Single-byte code used by the on-disk catalog (level stored separately).
    pub fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Zstd { .. } => 1,
            Self::Deflate { .. } => 2,
        }
    }

    pub fn from_code(code: u8, level: i32) -> Result<Self, TypeError> {
        let scheme = match code {
            0 => Self::None,
            1 => Self::Zstd { level },
            2 => Self::Deflate {
                level: level.max(0) as u32,
            },
            other => return Err(TypeError::UnknownCompression(other)),
        };
        scheme.validate()
    }

    pub fn level(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Zstd { level } => level,
            Self::Deflate { level } => level as i32,
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Zstd { level } => write!(f, "zstd:{level}"),
            Self::Deflate { level } => write!(f, "deflate:{level}"),
        }
    }
}
