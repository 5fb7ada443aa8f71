//! In-memory segmented index engine.
//!
//! Documents are appended to an open segment that is sealed once it holds
//! `max_segment_docs` documents. Deletes only mark tombstones, so deleted
//! documents keep occupying segments (and contributing field names) until
//! [`IndexEngine::compact`] merges everything into one segment.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::data::{DataValue, Document, ItemIdentity};
use crate::error::Result;
use crate::index::{IndexEngine, SearchCriteria, SearchHit};

/// Configuration for [`MemoryIndex`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryIndexConfig {
    /// Documents per segment before a new one is opened.
    pub max_segment_docs: usize,
}

impl Default for MemoryIndexConfig {
    fn default() -> Self {
        MemoryIndexConfig {
            max_segment_docs: 16,
        }
    }
}

#[derive(Debug, Clone)]
struct IndexedDoc {
    identity: ItemIdentity,
    document: Document,
    deleted: bool,
}

#[derive(Debug, Default)]
struct Segment {
    docs: Vec<IndexedDoc>,
}

#[derive(Debug, Default)]
struct IndexState {
    segments: Vec<Segment>,
}

impl IndexState {
    fn live_docs(&self) -> impl Iterator<Item = &IndexedDoc> {
        self.segments
            .iter()
            .flat_map(|s| s.docs.iter())
            .filter(|d| !d.deleted)
    }

    fn tombstone(&mut self, identity: &ItemIdentity) -> u64 {
        let mut removed = 0;
        for segment in &mut self.segments {
            for doc in &mut segment.docs {
                if !doc.deleted && doc.identity == *identity {
                    doc.deleted = true;
                    removed += 1;
                }
            }
        }
        removed
    }
}

/// Segment-level statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryIndexStats {
    pub segments: usize,
    pub live_documents: u64,
    pub deleted_documents: u64,
    pub compactions: u64,
}

/// A small, fully in-memory [`IndexEngine`].
#[derive(Debug, Default)]
pub struct MemoryIndex {
    config: MemoryIndexConfig,
    state: RwLock<IndexState>,
    compactions: AtomicU64,
}

impl MemoryIndex {
    pub fn new(config: MemoryIndexConfig) -> Self {
        MemoryIndex {
            config,
            state: RwLock::new(IndexState::default()),
            compactions: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> MemoryIndexStats {
        let state = self.state.read();
        let mut stats = MemoryIndexStats {
            segments: state.segments.len(),
            compactions: self.compactions.load(Ordering::SeqCst),
            ..Default::default()
        };
        for doc in state.segments.iter().flat_map(|s| s.docs.iter()) {
            if doc.deleted {
                stats.deleted_documents += 1;
            } else {
                stats.live_documents += 1;
            }
        }
        stats
    }

    fn score(document: &Document, criteria: &SearchCriteria) -> Option<f32> {
        let mut score = 0.0;
        for (field, term) in &criteria.terms {
            let matches: usize = document
                .fields
                .iter()
                .filter(|f| f.name == *field && f.option.indexed)
                .map(|f| match &f.value {
                    DataValue::Text(_) => {
                        let needle = term.to_lowercase();
                        f.value.terms().iter().filter(|t| **t == needle).count()
                    }
                    other => other.terms().iter().filter(|t| *t == term).count(),
                })
                .sum();
            if matches == 0 {
                return None;
            }
            score += matches as f32;
        }
        Some(score)
    }
}

impl IndexEngine for MemoryIndex {
    fn add_or_replace_document(&self, identity: &ItemIdentity, document: Document) -> Result<()> {
        let mut state = self.state.write();
        state.tombstone(identity);

        let max = self.config.max_segment_docs.max(1);
        if state.segments.last().is_none_or(|s| s.docs.len() >= max) {
            state.segments.push(Segment::default());
        }
        if let Some(segment) = state.segments.last_mut() {
            segment.docs.push(IndexedDoc {
                identity: identity.clone(),
                document,
                deleted: false,
            });
        }
        Ok(())
    }

    fn delete_by_identity(&self, identity: &ItemIdentity) -> Result<u64> {
        Ok(self.state.write().tombstone(identity))
    }

    fn delete_all(&self) -> Result<()> {
        self.state.write().segments.clear();
        Ok(())
    }

    fn compact(&self) -> Result<()> {
        let mut state = self.state.write();
        let merged: Vec<IndexedDoc> = state
            .segments
            .drain(..)
            .flat_map(|s| s.docs.into_iter())
            .filter(|d| !d.deleted)
            .collect();
        if !merged.is_empty() {
            state.segments.push(Segment { docs: merged });
        }
        self.compactions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_all_field_names(&self) -> Result<BTreeSet<String>> {
        let state = self.state.read();
        Ok(state
            .segments
            .iter()
            .flat_map(|s| s.docs.iter())
            .flat_map(|d| d.document.fields.iter().map(|f| f.name.clone()))
            .collect())
    }

    fn count_documents(&self) -> Result<u64> {
        Ok(self.state.read().live_docs().count() as u64)
    }

    fn search(&self, criteria: &SearchCriteria) -> Result<Vec<SearchHit>> {
        let state = self.state.read();
        let mut hits: Vec<SearchHit> = state
            .live_docs()
            .filter_map(|doc| {
                Self::score(&doc.document, criteria).map(|score| SearchHit {
                    identity: Some(doc.identity.clone()),
                    score,
                    document: doc.document.stored_only(),
                })
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(limit) = criteria.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }
}
