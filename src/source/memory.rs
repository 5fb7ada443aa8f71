use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::data::ItemIdentity;
use crate::error::{IndexerError, Result};
use crate::source::{DataSource, PathFilter, SourceItem};

/// An in-memory content repository.
///
/// Clones share the same items. [`set_available`](Self::set_available)
/// simulates an outage: every read fails with a data source error until the
/// repository is made available again.
#[derive(Debug, Clone)]
pub struct MemoryDataSource {
    items: Arc<RwLock<BTreeMap<ItemIdentity, SourceItem>>>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryDataSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDataSource {
    pub fn new() -> Self {
        MemoryDataSource {
            items: Arc::new(RwLock::new(BTreeMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Insert or replace an item.
    pub fn upsert(&self, item: SourceItem) {
        self.items.write().insert(item.identity.clone(), item);
    }

    pub fn remove(&self, identity: &ItemIdentity) -> Option<SourceItem> {
        self.items.write().remove(identity)
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(IndexerError::data_source("content repository is unavailable"))
        }
    }
}

impl DataSource for MemoryDataSource {
    fn get_item(&self, identity: &ItemIdentity) -> Result<Option<SourceItem>> {
        self.check_available()?;
        Ok(self.items.read().get(identity).cloned())
    }

    fn items(&self, item_type: &str, filter: Option<&PathFilter>) -> Result<Vec<SourceItem>> {
        self.check_available()?;
        Ok(self
            .items
            .read()
            .values()
            .filter(|item| item.identity.item_type == item_type)
            .filter(|item| filter.is_none_or(|f| f.matches(&item.path)))
            .cloned()
            .collect())
    }
}
