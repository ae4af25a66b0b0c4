use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BackendError, BackendResult};
use crate::traits::ByteBackend;

/// When written bytes are forced to disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every write (safest, highest latency).
    EveryWrite,
    /// `fsync` only when [`ByteBackend::flush`] is called.
    #[default]
    OnFlush,
}

/// Configuration for [`FileBackend`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBackendConfig {
    pub sync_mode: SyncMode,
}

/// A regular file used as a byte backend.
///
/// The file handle sits behind a mutex because every access is a
/// seek followed by a read or write.
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    config: FileBackendConfig,
}

impl FileBackend {
    /// Open (or create) the file at `path`.
    pub fn open(path: &Path, config: FileBackendConfig) -> BackendResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        debug!(path = %path.display(), len = file.metadata()?.len(), "opened file backend");
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            config,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteBackend for FileBackend {
    fn read(&self, offset: u64, len: usize) -> BackendResult<Vec<u8>> {
        let mut file = self.file.lock().expect("lock poisoned");
        let size = file.metadata()?.len();
        if offset.checked_add(len as u64).map_or(true, |end| end > size) {
            return Err(BackendError::OutOfBounds { offset, len, size });
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write(&self, offset: u64, bytes: &[u8]) -> BackendResult<()> {
        let mut file = self.file.lock().expect("lock poisoned");
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            file.sync_data()?;
        }
        Ok(())
    }

    fn size(&self) -> BackendResult<u64> {
        let file = self.file.lock().expect("lock poisoned");
        Ok(file.metadata()?.len())
    }

    fn flush(&self) -> BackendResult<()> {
        let mut file = self.file.lock().expect("lock poisoned");
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("path", &self.path)
            .field("sync_mode", &self.config.sync_mode)
            .finish()
    }
}
