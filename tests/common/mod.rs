#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use iris_indexer::{
    Document, EventKind, FieldDefinition, IndexEngine, IndexEvent, Indexer, IndexerConfig,
    IndexerError, ItemIdentity, MemoryDataSource, MemoryIndex, Result, SearchCriteria, SearchHit,
    SourceItem,
};

pub const CONTENT_COUNT: i64 = 10;
pub const MEDIA_ID: i64 = 2000;

/// Ten content items under `/1111` plus one media item.
pub fn sample_source() -> MemoryDataSource {
    let source = MemoryDataSource::new();
    for i in 0..CONTENT_COUNT {
        let id = 1051 + i;
        let alias = if i % 2 == 0 { "textPage" } else { "newsItem" };
        source.upsert(
            SourceItem::new(
                ItemIdentity::new(id, "content"),
                format!("/1111/{id}"),
                alias,
            )
            .with_field("title", format!("Page {id}"))
            .with_field("body", format!("Body text of page number {id}"))
            .with_field("author", "Shannon"),
        );
    }
    source.upsert(
        SourceItem::new(
            ItemIdentity::new(MEDIA_ID, "media"),
            format!("/-1/{MEDIA_ID}"),
            "image",
        )
        .with_field("title", "Logo")
        .with_field("umbracoFile", "/media/logo.png"),
    );
    source
}

pub fn sample_config() -> iris_indexer::indexer::config::IndexerConfigBuilder {
    IndexerConfig::builder()
        .add_field(FieldDefinition::new("title").sortable())
        .add_field(FieldDefinition::new("body"))
        .add_field(FieldDefinition::new("author"))
        .add_field(FieldDefinition::new("umbracoFile"))
}

/// An engine that delegates to a [`MemoryIndex`] but can be told to fail.
#[derive(Debug)]
pub struct FlakyIndex {
    pub inner: Arc<MemoryIndex>,
    fail_add_for: Mutex<Option<ItemIdentity>>,
    fail_compact: AtomicBool,
}

impl FlakyIndex {
    pub fn new(inner: Arc<MemoryIndex>) -> Self {
        FlakyIndex {
            inner,
            fail_add_for: Mutex::new(None),
            fail_compact: AtomicBool::new(false),
        }
    }

    pub fn fail_adds_for(&self, identity: Option<ItemIdentity>) {
        *self.fail_add_for.lock() = identity;
    }

    pub fn fail_compactions(&self, fail: bool) {
        self.fail_compact.store(fail, Ordering::SeqCst);
    }
}

impl IndexEngine for FlakyIndex {
    fn add_or_replace_document(&self, identity: &ItemIdentity, document: Document) -> Result<()> {
        if self.fail_add_for.lock().as_ref() == Some(identity) {
            return Err(IndexerError::storage(format!("refusing {identity}")));
        }
        self.inner.add_or_replace_document(identity, document)
    }

    fn delete_by_identity(&self, identity: &ItemIdentity) -> Result<u64> {
        self.inner.delete_by_identity(identity)
    }

    fn delete_all(&self) -> Result<()> {
        self.inner.delete_all()
    }

    fn compact(&self) -> Result<()> {
        if self.fail_compact.load(Ordering::SeqCst) {
            return Err(IndexerError::storage("segment merge failed"));
        }
        self.inner.compact()
    }

    fn read_all_field_names(&self) -> Result<BTreeSet<String>> {
        self.inner.read_all_field_names()
    }

    fn count_documents(&self) -> Result<u64> {
        self.inner.count_documents()
    }

    fn search(&self, criteria: &SearchCriteria) -> Result<Vec<SearchHit>> {
        self.inner.search(criteria)
    }
}

/// An engine whose add only appends and never replaces.
///
/// Every document left behind by an out-of-order or missing delete stays
/// visible, so counts reflect exactly what the apply loop did.
#[derive(Debug, Default)]
pub struct AppendOnlyIndex {
    documents: Mutex<Vec<(ItemIdentity, Document)>>,
}

impl AppendOnlyIndex {
    pub fn live_count(&self, identity: &ItemIdentity) -> usize {
        self.documents
            .lock()
            .iter()
            .filter(|(i, _)| i == identity)
            .count()
    }
}

impl IndexEngine for AppendOnlyIndex {
    fn add_or_replace_document(&self, identity: &ItemIdentity, document: Document) -> Result<()> {
        self.documents.lock().push((identity.clone(), document));
        Ok(())
    }

    fn delete_by_identity(&self, identity: &ItemIdentity) -> Result<u64> {
        let mut documents = self.documents.lock();
        let before = documents.len();
        documents.retain(|(i, _)| i != identity);
        Ok((before - documents.len()) as u64)
    }

    fn delete_all(&self) -> Result<()> {
        self.documents.lock().clear();
        Ok(())
    }

    fn compact(&self) -> Result<()> {
        Ok(())
    }

    fn read_all_field_names(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .documents
            .lock()
            .iter()
            .flat_map(|(_, d)| d.field_names().into_iter().map(str::to_string))
            .collect())
    }

    fn count_documents(&self) -> Result<u64> {
        Ok(self.documents.lock().len() as u64)
    }

    fn search(&self, criteria: &SearchCriteria) -> Result<Vec<SearchHit>> {
        let mut hits: Vec<SearchHit> = self
            .documents
            .lock()
            .iter()
            .filter(|(_, d)| {
                criteria
                    .terms
                    .iter()
                    .all(|(field, term)| d.get(field).is_some_and(|v| v.to_keyword() == *term))
            })
            .map(|(i, d)| SearchHit {
                identity: Some(i.clone()),
                score: 1.0,
                document: d.stored_only(),
            })
            .collect();
        if let Some(limit) = criteria.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }
}

/// Collects every event an indexer fires, in order.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<IndexEvent>>>,
}

impl EventRecorder {
    pub fn attach(indexer: &Indexer) -> Self {
        let recorder = EventRecorder::default();
        for kind in [
            EventKind::ItemDeleted,
            EventKind::ItemIndexed,
            EventKind::Optimized,
            EventKind::IndexingError,
            EventKind::OperationComplete,
        ] {
            let events = recorder.events.clone();
            indexer.subscribe(kind, move |e| events.lock().push(e.clone()));
        }
        recorder
    }

    pub fn events(&self) -> Vec<IndexEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Assert that each applied add came after the delete paired with it.
    pub fn assert_deletes_precede_adds(&self) {
        let events = self.events();
        let mut adds = 0;
        for (pos, event) in events.iter().enumerate() {
            let IndexEvent::ItemIndexed {
                identity, sequence, ..
            } = event
            else {
                continue;
            };
            adds += 1;
            let paired = events[..pos].iter().any(|e| {
                matches!(
                    e,
                    IndexEvent::ItemDeleted { identity: i, sequence: s, .. }
                        if i == identity && *s + 1 == *sequence
                )
            });
            assert!(paired, "add #{sequence} for {identity} applied before its delete");
        }
        assert!(adds > 0, "no add was applied");
    }
}
