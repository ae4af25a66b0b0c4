//! Reference header types for spatial indexes built on the block store.
//!
//! The store itself is generic over its node header type; these are the
//! shapes the bundled point and mesh indexes use.

use serde::{Deserialize, Serialize};
use tile_types::BlockId;

use crate::error::{BlockStoreError, BlockStoreResult};

/// Axis-aligned 3D bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extent3d {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Extent3d {
    /// An inverted box that any `include` call will overwrite.
    pub const EMPTY: Extent3d = Extent3d {
        min: [f64::INFINITY; 3],
        max: [f64::NEG_INFINITY; 3],
    };

    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.min[axis] > self.max[axis])
    }

    pub fn include(&mut self, point: [f64; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(point[axis]);
            self.max[axis] = self.max[axis].max(point[axis]);
        }
    }

    pub fn union(&self, other: &Extent3d) -> Extent3d {
        let mut out = *self;
        out.include(other.min);
        out.include(other.max);
        out
    }
}

impl Default for Extent3d {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Structural metadata of one index node, stored apart from its points so
/// the tree can be walked without loading bulk data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeHeader {
    pub extent: Extent3d,
    pub level: u32,
    pub is_leaf: bool,
    /// Points in this node and all of its descendants.
    pub total_count: u64,
    pub parent: Option<BlockId>,
    pub children: Vec<BlockId>,
}

/// Whole-index metadata, stored once per store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MasterHeader {
    pub version: u32,
    pub root: Option<BlockId>,
    pub extent: Extent3d,
    pub depth: u32,
    /// Node point count above which a leaf is split.
    pub split_threshold: u32,
    pub balanced: bool,
}

impl MasterHeader {
    pub const VERSION: u32 = 1;

    pub fn to_bytes(&self) -> BlockStoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| BlockStoreError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> BlockStoreResult<Self> {
        bincode::deserialize(bytes).map_err(|e| BlockStoreError::Serialization(e.to_string()))
    }
}

impl Default for MasterHeader {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            root: None,
            extent: Extent3d::EMPTY,
            depth: 0,
            split_threshold: 10_000,
            balanced: false,
        }
    }
}
