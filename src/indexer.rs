//! The queued index writer.
//!
//! [`Indexer`] is the producer-facing surface. Every change is turned into
//! operation records, made durable in the [`OperationLog`], and then applied
//! by the [`ApplyLoop`](apply::ApplyLoop) under the configured [`RunMode`].
//!
//! ```
//! use std::sync::Arc;
//! use iris_indexer::{
//!     IndexEngine, Indexer, IndexerConfig, ItemIdentity, MemoryDataSource,
//!     MemoryIndex, SearchCriteria, SourceItem,
//! };
//! use iris_indexer::storage::memory::MemoryStorage;
//!
//! let source = MemoryDataSource::new();
//! source.upsert(
//!     SourceItem::new(ItemIdentity::new(1051, "content"), "/1051", "textPage")
//!         .with_field("title", "Home"),
//! );
//! let index = Arc::new(MemoryIndex::default());
//! let indexer = Indexer::open(
//!     Arc::new(MemoryStorage::default()),
//!     index.clone(),
//!     Arc::new(source),
//!     IndexerConfig::default(),
//! )
//! .unwrap();
//!
//! indexer.reindex_item(1051, "content").unwrap();
//! let hits = indexer.search(&SearchCriteria::new().id(1051)).unwrap();
//! assert_eq!(hits.len(), 1);
//! assert_eq!(index.count_documents().unwrap(), 1);
//! ```

pub mod apply;
pub mod config;
pub mod dedup;
pub mod document;
pub mod executor;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::data::{ItemId, ItemIdentity};
use crate::error::Result;
use crate::events::{EventBus, EventKind, IndexEvent, SubscriptionId};
use crate::index::{IndexEngine, SearchCriteria, SearchHit};
use crate::maintenance::optimize::{OptimizationScheduler, OptimizationStats};
use crate::source::{DataSource, SourceItem};
use crate::storage::Storage;
use crate::storage::prefixed::PrefixedStorage;
use crate::store::log::OperationLog;
use crate::store::record::{OperationRecord, SeqNumber};

use self::apply::{ApplyLoop, LoopState};
use self::config::{IndexerConfig, RunMode};
use self::document::DocumentBuilder;
use self::executor::{ExecutionStrategy, strategy_for};

/// A point-in-time view of the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerStats {
    pub run_mode: RunMode,
    pub state: LoopState,
    /// Records enqueued but not yet completed.
    pub pending: usize,
    pub applied: u64,
    pub skipped: u64,
    pub failed: u64,
    pub optimizations: u64,
    pub optimization: OptimizationStats,
    /// Live documents in the index.
    pub documents: u64,
}

/// Durable, queue-mediated writer in front of an [`IndexEngine`].
#[derive(Debug)]
pub struct Indexer {
    log: Arc<OperationLog>,
    engine: Arc<dyn IndexEngine>,
    source: Arc<dyn DataSource>,
    builder: DocumentBuilder,
    scheduler: Arc<OptimizationScheduler>,
    events: Arc<EventBus>,
    apply_loop: Arc<ApplyLoop>,
    strategy: RwLock<Arc<dyn ExecutionStrategy>>,
}

impl Indexer {
    /// Open an indexer over `storage`.
    ///
    /// The operation log lives under `config.queue_prefix`. Entries left by
    /// a previous process are applied before this returns, and before any
    /// background worker starts.
    pub fn open(
        storage: Arc<dyn Storage>,
        engine: Arc<dyn IndexEngine>,
        source: Arc<dyn DataSource>,
        config: IndexerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let queue_storage: Arc<dyn Storage> =
            Arc::new(PrefixedStorage::new(config.queue_prefix.clone(), storage));
        let log = Arc::new(OperationLog::open(queue_storage)?);
        let scheduler = Arc::new(OptimizationScheduler::new(config.optimization_threshold));
        let events = Arc::new(EventBus::new());
        let apply_loop = Arc::new(ApplyLoop::new(
            log.clone(),
            engine.clone(),
            scheduler.clone(),
            events.clone(),
        ));

        let recovered = log.peek_pending_count();
        if recovered > 0 {
            log::info!("replaying {recovered} operations recovered from the log");
            let report = apply_loop.drain();
            log::info!(
                "replay finished: {} applied, {} skipped, {} failed",
                report.applied,
                report.skipped,
                report.failed
            );
        }

        let strategy = strategy_for(config.run_mode, apply_loop.clone())?;
        Ok(Indexer {
            log,
            engine,
            source,
            builder: DocumentBuilder::new(&config)?,
            scheduler,
            events,
            apply_loop,
            strategy: RwLock::new(strategy),
        })
    }

    fn notify(&self) {
        let strategy = self.strategy.read().clone();
        strategy.notify();
    }

    fn enqueue_and_notify(&self, records: Vec<OperationRecord>) -> Result<Vec<SeqNumber>> {
        let seqs = self.log.enqueue_batch(records)?;
        self.notify();
        Ok(seqs)
    }

    /// Re-read an item from the content repository and replace its document.
    ///
    /// Enqueues a delete and an add as one atomic pair. When the item no
    /// longer exists or is filtered out, only the delete is enqueued. Items
    /// of a type this indexer does not handle are ignored.
    pub fn reindex_item(
        &self,
        id: impl Into<ItemId>,
        item_type: impl Into<String>,
    ) -> Result<Vec<SeqNumber>> {
        let identity = ItemIdentity::new(id, item_type);
        if !self.builder.accepts_type(&identity.item_type) {
            log::debug!("ignoring reindex of {identity}: type not indexed");
            return Ok(Vec::new());
        }
        let item = self.source.get_item(&identity)?;
        self.reindex(identity, item.as_ref())
    }

    /// Replace the document of `item` without consulting the repository.
    pub fn index_item(&self, item: &SourceItem) -> Result<Vec<SeqNumber>> {
        if !self.builder.accepts_type(&item.identity.item_type) {
            log::debug!("ignoring {}: type not indexed", item.identity);
            return Ok(Vec::new());
        }
        self.reindex(item.identity.clone(), Some(item))
    }

    fn reindex(&self, identity: ItemIdentity, item: Option<&SourceItem>) -> Result<Vec<SeqNumber>> {
        let mut records = vec![OperationRecord::delete(identity.clone())];
        match item {
            Some(item) if self.builder.accepts(item) => {
                records.push(OperationRecord::add(identity, self.builder.build(item)));
            }
            Some(_) => log::debug!("{identity} is filtered out; removing it"),
            None => log::debug!("{identity} no longer exists; removing it"),
        }
        self.enqueue_and_notify(records)
    }

    /// Remove an item's document.
    pub fn delete_item(&self, identity: &ItemIdentity) -> Result<SeqNumber> {
        let seq = self.log.enqueue(OperationRecord::delete(identity.clone()))?;
        self.notify();
        Ok(seq)
    }

    /// Clear the index and enqueue a fresh document for every item.
    ///
    /// All items are fetched and made durable first, so a repository or
    /// write failure aborts the rebuild before anything is cleared. Returns
    /// the number of documents enqueued.
    pub fn rebuild_index(&self) -> Result<usize> {
        let filter = self.builder.path_filter();
        let mut items = Vec::new();
        for item_type in self.builder.index_types() {
            items.extend(self.source.items(item_type, filter)?);
        }

        let records: Vec<OperationRecord> = items
            .iter()
            .filter(|item| self.builder.accepts(item))
            .map(|item| OperationRecord::add(item.identity.clone(), self.builder.build(item)))
            .collect();
        let count = records.len();

        log::info!("rebuilding index with {count} documents");
        let result = self.apply_loop.rebuild(|| self.log.enqueue_batch(records));
        // Adds that were queued are applied even if clearing the engine failed.
        self.notify();
        result.map(|_| count)
    }

    /// Request a compaction. It runs when the marker reaches the apply loop.
    pub fn optimize(&self) -> Result<SeqNumber> {
        let seq = self.log.enqueue(OperationRecord::optimize())?;
        self.notify();
        Ok(seq)
    }

    pub fn run_mode(&self) -> RunMode {
        self.strategy.read().mode()
    }

    /// Switch between inline and background application.
    ///
    /// The old strategy finishes its current record and stops; the new one
    /// then takes over whatever is still queued. Also restarts a stopped
    /// indexer.
    pub fn set_run_mode(&self, mode: RunMode) -> Result<()> {
        let next = {
            let mut strategy = self.strategy.write();
            if strategy.mode() == mode && !self.apply_loop.is_halted() {
                return Ok(());
            }
            self.apply_loop.halt();
            strategy.shutdown();
            self.apply_loop.resume();

            let next = strategy_for(mode, self.apply_loop.clone())?;
            *strategy = next.clone();
            next
        };
        log::info!("run mode set to {mode:?}");
        next.notify();
        Ok(())
    }

    /// Drain-and-stop: the record being applied is finished, everything else
    /// stays in the log until the indexer is restarted or reopened.
    pub fn stop(&self) {
        self.apply_loop.halt();
        let strategy = self.strategy.read().clone();
        strategy.shutdown();
    }

    pub fn is_stopped(&self) -> bool {
        self.apply_loop.is_halted()
    }

    pub fn set_optimization_threshold(&self, threshold: u64) -> Result<()> {
        self.scheduler.set_threshold(threshold)
    }

    pub fn optimization_threshold(&self) -> u64 {
        self.scheduler.threshold()
    }

    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&IndexEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Block until every queued record has been applied, or `timeout` passes.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        self.apply_loop.wait_for_idle(timeout)
    }

    pub fn pending_count(&self) -> usize {
        self.log.peek_pending_count()
    }

    pub fn search(&self, criteria: &SearchCriteria) -> Result<Vec<SearchHit>> {
        self.engine.search(criteria)
    }

    pub fn stats(&self) -> Result<IndexerStats> {
        let totals = self.apply_loop.totals();
        Ok(IndexerStats {
            run_mode: self.run_mode(),
            state: self.apply_loop.state(),
            pending: self.log.peek_pending_count(),
            applied: totals.applied,
            skipped: totals.skipped,
            failed: totals.failed,
            optimizations: totals.compactions,
            optimization: self.scheduler.stats(),
            documents: self.engine.count_documents()?,
        })
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        self.stop();
    }
}
