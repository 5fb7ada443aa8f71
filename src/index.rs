//! The index engine boundary.
//!
//! The indexer does not own a storage format. It drives any engine that
//! implements [`IndexEngine`], and only the apply loop calls the mutating
//! methods. Searches may run from any thread at any time.

pub mod memory;

use std::collections::BTreeSet;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::data::{Document, ID_FIELD, ItemIdentity, TYPE_FIELD};
use crate::error::Result;

/// Operations the indexer needs from an inverted-index engine.
pub trait IndexEngine: Send + Sync + Debug {
    /// Store `document` as the only live document for `identity`.
    fn add_or_replace_document(&self, identity: &ItemIdentity, document: Document) -> Result<()>;

    /// Remove every live document for `identity`. Returns how many were removed.
    fn delete_by_identity(&self, identity: &ItemIdentity) -> Result<u64>;

    /// Remove every document.
    fn delete_all(&self) -> Result<()>;

    /// Merge segments and purge deleted documents.
    fn compact(&self) -> Result<()>;

    /// Every field name known to the index.
    fn read_all_field_names(&self) -> Result<BTreeSet<String>>;

    /// Number of live documents.
    fn count_documents(&self) -> Result<u64>;

    /// Run a query.
    fn search(&self, criteria: &SearchCriteria) -> Result<Vec<SearchHit>>;
}

/// A conjunction of field terms.
///
/// ```
/// use iris_indexer::SearchCriteria;
///
/// let criteria = SearchCriteria::new().id(1051).item_type("content").limit(10);
/// assert_eq!(criteria.terms.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// `(field, term)` pairs; a document must match all of them.
    pub terms: Vec<(String, String)>,
    /// Maximum number of hits. `None` returns everything.
    pub limit: Option<usize>,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match the reserved id field.
    pub fn id(self, id: impl ToString) -> Self {
        self.term(ID_FIELD, id.to_string())
    }

    /// Match the reserved type field.
    pub fn item_type(self, item_type: impl Into<String>) -> Self {
        self.term(TYPE_FIELD, item_type)
    }

    /// Match a term in any field. Terms against text fields are compared lowercased.
    pub fn term(mut self, field: impl Into<String>, term: impl Into<String>) -> Self {
        self.terms.push((field.into(), term.into()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub identity: Option<ItemIdentity>,
    pub score: f32,
    /// Stored fields of the matching document.
    pub document: Document,
}
