use std::sync::Arc;

use crate::error::Result;
use crate::storage::{Storage, StorageInput, StorageOutput};

/// A view of another storage restricted to names under `prefix/`.
#[derive(Debug, Clone)]
pub struct PrefixedStorage {
    prefix: String,
    inner: Arc<dyn Storage>,
}

impl PrefixedStorage {
    pub fn new(prefix: impl Into<String>, inner: Arc<dyn Storage>) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        PrefixedStorage { prefix, inner }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_name(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }
}

impl Storage for PrefixedStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.inner.open_input(&self.full_name(name))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.inner.create_output(&self.full_name(name))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(&self.full_name(name))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.delete_file(&self.full_name(name))
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.inner
            .rename_file(&self.full_name(old_name), &self.full_name(new_name))
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let marker = format!("{}/", self.prefix);
        Ok(self
            .inner
            .list_files()?
            .into_iter()
            .filter_map(|name| name.strip_prefix(&marker).map(str::to_string))
            .collect())
    }

    fn sync(&self) -> Result<()> {
        self.inner.sync_namespace(&self.prefix)
    }

    fn sync_namespace(&self, namespace: &str) -> Result<()> {
        self.inner.sync_namespace(&self.full_name(namespace))
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::storage::memory::MemoryStorage;

    /// Records which syncs reach the shared root.
    #[derive(Debug, Default)]
    struct SyncRecorder {
        files: MemoryStorage,
        calls: Mutex<Vec<Option<String>>>,
    }

    impl Storage for SyncRecorder {
        fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
            self.files.open_input(name)
        }

        fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
            self.files.create_output(name)
        }

        fn file_exists(&self, name: &str) -> bool {
            self.files.file_exists(name)
        }

        fn delete_file(&self, name: &str) -> Result<()> {
            self.files.delete_file(name)
        }

        fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
            self.files.rename_file(old_name, new_name)
        }

        fn list_files(&self) -> Result<Vec<String>> {
            self.files.list_files()
        }

        fn sync(&self) -> Result<()> {
            self.calls.lock().push(None);
            Ok(())
        }

        fn sync_namespace(&self, namespace: &str) -> Result<()> {
            self.calls.lock().push(Some(namespace.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_sync_stays_inside_prefix() {
        let root = Arc::new(SyncRecorder::default());
        let queue = PrefixedStorage::new("queue", root.clone());
        queue.sync().unwrap();
        PrefixedStorage::new("shard", Arc::new(queue)).sync().unwrap();

        assert_eq!(
            *root.calls.lock(),
            vec![Some("queue".to_string()), Some("queue/shard".to_string())]
        );
    }

    #[test]
    fn test_prefix_isolation() {
        let root: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let queue = PrefixedStorage::new("queue/", root.clone());

        queue.create_output("1.op").unwrap().close().unwrap();
        root.create_output("other.bin").unwrap().close().unwrap();

        assert_eq!(queue.prefix(), "queue");
        assert_eq!(queue.list_files().unwrap(), vec!["1.op"]);
        assert!(root.file_exists("queue/1.op"));
    }
}
