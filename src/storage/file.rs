//! Filesystem storage backend.
//!
//! Every name maps to a path under the configured root directory. Names that
//! contain `/` create the intermediate directories on write. Directory
//! entries are fsynced in [`Storage::sync`] so that renames of freshly
//! written files survive a crash. [`Storage::sync_namespace`] only touches
//! one subdirectory and its parents.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Root directory.
    pub path: PathBuf,
    /// Fsync files and directories. Disable only for throwaway indexes.
    #[serde(default = "default_sync")]
    pub sync_writes: bool,
}

fn default_sync() -> bool {
    true
}

impl FileStorageConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorageConfig {
            path: path.as_ref().to_path_buf(),
            sync_writes: true,
        }
    }
}

/// Storage rooted at a directory on disk.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
    sync_writes: bool,
}

impl FileStorage {
    pub fn new(config: FileStorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.path).map_err(|e| {
            IndexerError::storage(format!(
                "failed to create storage directory {}: {e}",
                config.path.display()
            ))
        })?;
        Ok(FileStorage {
            root: config.path,
            sync_writes: config.sync_writes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn collect(&self, dir: &Path, prefix: &str, names: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let name = if prefix.is_empty() {
                file_name
            } else {
                format!("{prefix}/{file_name}")
            };
            if entry.file_type()?.is_dir() {
                self.collect(&entry.path(), &name, names)?;
            } else {
                names.push(name);
            }
        }
        Ok(())
    }

    fn sync_dir(path: &Path) -> Result<()> {
        // Directory handles cannot be opened for sync on every platform.
        #[cfg(unix)]
        {
            File::open(path)?.sync_all()?;
        }
        #[cfg(not(unix))]
        {
            let _ = path;
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let path = self.resolve(name);
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                IndexerError::not_found(format!("file not found: {name}"))
            }
            _ => IndexerError::Io(e),
        })?;
        Ok(Box::new(FileInput { file }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let path = self.resolve(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Box::new(FileOutput {
            writer: Some(BufWriter::new(file)),
            sync_writes: self.sync_writes,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.resolve(name).is_file()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.resolve(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        let target = self.resolve(new_name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(self.resolve(old_name), target)?;
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        self.collect(&self.root, "", &mut names)?;
        names.sort();
        Ok(names)
    }

    fn sync(&self) -> Result<()> {
        if !self.sync_writes {
            return Ok(());
        }
        let mut dirs = vec![self.root.clone()];
        while let Some(dir) = dirs.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    dirs.push(entry.path());
                }
            }
            Self::sync_dir(&dir)?;
        }
        Ok(())
    }

    fn sync_namespace(&self, namespace: &str) -> Result<()> {
        if !self.sync_writes {
            return Ok(());
        }
        // The namespace directory, then each parent up to the root.
        let mut dir = self.resolve(namespace);
        loop {
            Self::sync_dir(&dir)?;
            if dir == self.root {
                return Ok(());
            }
            match dir.parent() {
                Some(parent) if parent.starts_with(&self.root) => dir = parent.to_path_buf(),
                _ => return Ok(()),
            }
        }
    }
}

#[derive(Debug)]
struct FileInput {
    file: File,
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

#[derive(Debug)]
struct FileOutput {
    writer: Option<BufWriter<File>>,
    sync_writes: bool,
}

impl FileOutput {
    fn writer(&mut self) -> std::io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("output already closed"))
    }
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer()?.flush()
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        let sync_writes = self.sync_writes;
        let writer = self.writer()?;
        writer.flush()?;
        if sync_writes {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}
