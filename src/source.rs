//! Content repository boundary.
//!
//! The indexer pulls item data from a [`DataSource`] when it builds index
//! documents. Reindexing looks up one item; a rebuild enumerates every item
//! of the configured types.

pub mod filter;
pub mod memory;

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::data::{DataValue, ItemIdentity};
use crate::error::Result;

pub use self::filter::PathFilter;

/// An item as the content repository reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    pub identity: ItemIdentity,
    /// Slash-separated ancestry, e.g. `/1111/2222`.
    pub path: String,
    /// Document type name.
    pub alias: String,
    /// Field values in repository order.
    pub fields: Vec<(String, DataValue)>,
}

impl SourceItem {
    pub fn new(identity: ItemIdentity, path: impl Into<String>, alias: impl Into<String>) -> Self {
        SourceItem {
            identity,
            path: path.into(),
            alias: alias.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// First value stored under `name`.
    pub fn field(&self, name: &str) -> Option<&DataValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// A read-only content repository.
pub trait DataSource: Send + Sync + Debug {
    /// Look up one item. `Ok(None)` means the item no longer exists.
    fn get_item(&self, identity: &ItemIdentity) -> Result<Option<SourceItem>>;

    /// Every item of `item_type`, optionally restricted to paths matching `filter`.
    fn items(&self, item_type: &str, filter: Option<&PathFilter>) -> Result<Vec<SourceItem>>;
}
