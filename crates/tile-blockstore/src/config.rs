//! Block store configuration, loadable from TOML.
//!
//! ```toml
//! policy = "best-fit"
//! sync_mode = "every-write"
//!
//! [points]
//! compression = { scheme = "zstd", level = 9 }
//! max_packet_size = 67108864
//!
//! [textures]
//! max_packets = 100000
//! ```
//!
//! Omitting a section keeps that directory's defaults. Set
//! `textures_enabled = false` at the top level to build a store without
//! texture support.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tile_packet::{AllocationPolicy, DirectoryConfig};
use tile_store::{FileBackendConfig, SyncMode};
use tile_types::{Compression, DataType};

use crate::error::{BlockStoreError, BlockStoreResult};

/// Per-directory settings. The data type is fixed by the directory's role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySettings {
    pub compression: Compression,
    pub max_packet_size: u64,
    pub max_packets: u32,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        let base = DirectoryConfig::default();
        Self {
            compression: base.compression,
            max_packet_size: base.max_packet_size,
            max_packets: base.max_packets,
        }
    }
}

impl DirectorySettings {
    pub fn compressed(compression: Compression) -> Self {
        Self {
            compression,
            ..Default::default()
        }
    }

    pub(crate) fn directory_config(&self, data_type: DataType) -> DirectoryConfig {
        DirectoryConfig::new(data_type, self.compression)
            .with_max_packet_size(self.max_packet_size)
            .with_max_packets(self.max_packets)
    }
}

/// Settings for a [`DirectoryBlockStore`](crate::DirectoryBlockStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub policy: AllocationPolicy,
    pub sync_mode: SyncMode,
    /// Whether the store supports pre-compressed texture blocks.
    pub textures_enabled: bool,
    pub master: DirectorySettings,
    pub headers: DirectorySettings,
    pub points: DirectorySettings,
    pub textures: DirectorySettings,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            policy: AllocationPolicy::FirstFit,
            sync_mode: SyncMode::OnFlush,
            textures_enabled: true,
            master: DirectorySettings::default(),
            headers: DirectorySettings::compressed(Compression::zstd()),
            points: DirectorySettings::compressed(Compression::zstd()),
            // Texture payloads usually arrive compressed already.
            textures: DirectorySettings::default(),
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(text: &str) -> BlockStoreResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| BlockStoreError::Config(e.to_string()))?;
        config.validate()
    }

    pub fn load(path: &Path) -> BlockStoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> BlockStoreResult<String> {
        toml::to_string(self).map_err(|e| BlockStoreError::Config(e.to_string()))
    }

    pub fn file_backend(&self) -> FileBackendConfig {
        FileBackendConfig {
            sync_mode: self.sync_mode,
        }
    }

    /// Reject settings that could never produce a usable store.
    pub fn validate(self) -> BlockStoreResult<Self> {
        for (name, settings, data_type) in [
            ("master", &self.master, DataType::MasterHeader),
            ("headers", &self.headers, DataType::NodeHeader),
            ("points", &self.points, DataType::Point),
            ("textures", &self.textures, DataType::Texture),
        ] {
            settings
                .directory_config(data_type)
                .validate()
                .map_err(|e| BlockStoreError::Config(format!("[{name}] {e}")))?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(StoreConfig::from_toml_str("").unwrap(), StoreConfig::default());
    }

    #[test]
    fn parses_overrides() {
        let config = StoreConfig::from_toml_str(
            r#"
            policy = "best-fit"
            sync_mode = "every-write"
            textures_enabled = false

            [points]
            compression = { scheme = "deflate", level = 9 }
            max_packet_size = 1024

            [headers]
            compression = { scheme = "none" }
            "#,
        )
        .unwrap();
        assert_eq!(config.policy, AllocationPolicy::BestFit);
        assert_eq!(config.sync_mode, SyncMode::EveryWrite);
        assert!(!config.textures_enabled);
        assert_eq!(config.points.compression, Compression::Deflate { level: 9 });
        assert_eq!(config.points.max_packet_size, 1024);
        assert_eq!(config.headers.compression, Compression::None);
        assert_eq!(config.master, DirectorySettings::default());
    }

    #[test]
    fn rejects_bad_levels_and_policies() {
        let err = StoreConfig::from_toml_str(
            r#"
            [points]
            compression = { scheme = "zstd", level = 40 }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, BlockStoreError::Config(ref msg) if msg.contains("[points]")));

        assert!(matches!(
            StoreConfig::from_toml_str(r#"policy = "worst-fit""#),
            Err(BlockStoreError::Config(_))
        ));
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = StoreConfig::default();
        config.policy = AllocationPolicy::AppendOnly;
        config.textures.max_packets = 10;
        let text = config.to_toml_string().unwrap();
        assert_eq!(StoreConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        std::fs::write(&path, "sync_mode = \"on-flush\"\n").unwrap();
        assert_eq!(StoreConfig::load(&path).unwrap().sync_mode, SyncMode::OnFlush);
        assert!(matches!(
            StoreConfig::load(&dir.path().join("missing.toml")),
            Err(BlockStoreError::Io(_))
        ));
    }
}
