//! In-memory storage backend.
//!
//! Files live in a shared map and become visible when their output handle is
//! flushed or closed. An optional byte quota makes writes fail the way a full
//! disk would, which is how the write-failure path is exercised in tests.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Configuration for [`MemoryStorage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStorageConfig {
    /// Maximum total bytes across all files. `None` means unbounded.
    #[serde(default)]
    pub capacity_bytes: Option<usize>,
}

#[derive(Debug, Default)]
struct MemoryFiles {
    files: HashMap<String, Arc<Vec<u8>>>,
}

impl MemoryFiles {
    fn used_bytes(&self) -> usize {
        self.files.values().map(|f| f.len()).sum()
    }
}

/// Storage that keeps every file in memory.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryFiles>>,
    capacity: Arc<Mutex<Option<usize>>>,
}

impl MemoryStorage {
    pub fn new(config: MemoryStorageConfig) -> Self {
        MemoryStorage {
            inner: Arc::new(Mutex::new(MemoryFiles::default())),
            capacity: Arc::new(Mutex::new(config.capacity_bytes)),
        }
    }

    /// Change the byte quota. Existing files are kept even when over the new limit.
    pub fn set_capacity(&self, capacity_bytes: Option<usize>) {
        *self.capacity.lock() = capacity_bytes;
    }

    /// Total bytes stored.
    pub fn used_bytes(&self) -> usize {
        self.inner.lock().used_bytes()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(MemoryStorageConfig::default())
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let files = self.inner.lock();
        let data = files
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| IndexerError::not_found(format!("file not found: {name}")))?;
        Ok(Box::new(MemoryInput { data, pos: 0 }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let mut files = self.inner.lock();
        files.files.insert(name.to_string(), Arc::new(Vec::new()));
        Ok(Box::new(MemoryOutput {
            name: name.to_string(),
            buffer: Vec::new(),
            files: self.inner.clone(),
            capacity: self.capacity.clone(),
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.lock().files.contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.lock().files.remove(name);
        Ok(())
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut files = self.inner.lock();
        let data = files
            .files
            .remove(old_name)
            .ok_or_else(|| IndexerError::not_found(format!("file not found: {old_name}")))?;
        files.files.insert(new_name.to_string(), data);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.inner.lock().files.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryInput {
    data: Arc<Vec<u8>>,
    pos: usize,
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.data.len().saturating_sub(self.pos);
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

#[derive(Debug)]
struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    files: Arc<Mutex<MemoryFiles>>,
    capacity: Arc<Mutex<Option<usize>>>,
}

impl MemoryOutput {
    fn publish(&mut self) -> std::io::Result<()> {
        let mut files = self.files.lock();
        if let Some(limit) = *self.capacity.lock() {
            let current = files.files.get(&self.name).map(|f| f.len()).unwrap_or(0);
            let projected = files.used_bytes() - current + self.buffer.len();
            if projected > limit {
                return Err(std::io::Error::other(format!(
                    "memory storage capacity of {limit} bytes exceeded"
                )));
            }
        }
        files
            .files
            .insert(self.name.clone(), Arc::new(self.buffer.clone()));
        Ok(())
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.publish()
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.publish()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.publish()?;
        Ok(())
    }
}
