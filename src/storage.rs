//! Pluggable storage backends for durable indexer state.
//!
//! The operation log never touches the filesystem directly. It writes named
//! entries through the [`Storage`] trait, so the same code runs against
//! [`memory::MemoryStorage`] in tests and [`file::FileStorage`] in production.
//!
//! ```
//! use iris_indexer::storage::{StorageConfig, StorageFactory};
//! use iris_indexer::storage::memory::MemoryStorageConfig;
//!
//! let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default())).unwrap();
//! assert!(storage.list_files().unwrap().is_empty());
//! ```

pub mod file;
pub mod memory;
pub mod prefixed;

use std::fmt::Debug;
use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use self::file::{FileStorage, FileStorageConfig};
use self::memory::{MemoryStorage, MemoryStorageConfig};

/// A named-file store.
///
/// Names are flat strings; a `/` in a name is a namespace separator that
/// backends may map to directories.
pub trait Storage: Send + Sync + Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check whether a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// Atomically rename a file, replacing any existing target.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// List all file names in this storage.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Make completed renames and deletions durable.
    fn sync(&self) -> Result<()>;

    /// Like [`sync`](Self::sync), limited to names under `namespace/`.
    fn sync_namespace(&self, namespace: &str) -> Result<()> {
        let _ = namespace;
        self.sync()
    }
}

/// A readable file handle.
pub trait StorageInput: Read + Send + Debug {
    /// Total size of the file in bytes.
    fn size(&self) -> Result<u64>;
}

/// A writable file handle.
pub trait StorageOutput: Write + Send + Debug {
    /// Flush buffered bytes and force them to stable storage.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Flush and release the handle.
    fn close(&mut self) -> Result<()>;
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum StorageConfig {
    Memory(MemoryStorageConfig),
    File(FileStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(MemoryStorageConfig::default())
    }
}

/// Creates storage backends from configuration.
pub struct StorageFactory;

impl StorageFactory {
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(config) => Ok(Arc::new(MemoryStorage::new(config))),
            StorageConfig::File(config) => Ok(Arc::new(FileStorage::new(config)?)),
        }
    }
}

/// Read an entire file into memory.
pub fn read_all(storage: &dyn Storage, name: &str) -> Result<Vec<u8>> {
    let mut input = storage.open_input(name)?;
    let mut buffer = Vec::with_capacity(input.size()? as usize);
    input.read_to_end(&mut buffer)?;
    Ok(buffer)
}
