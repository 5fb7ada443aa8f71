//! The apply loop: the single consumer of the operation log.
//!
//! One drain runs at a time, guarded by the writer role. A drain takes
//! records in sequence order, applies them to the engine, removes their
//! entries and compacts whenever the scheduler says so. Compaction happens
//! inside the drain, so it never interleaves with an apply.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};
use crate::events::{EventBus, IndexEvent};
use crate::index::IndexEngine;
use crate::indexer::dedup::{DedupFilter, Verdict};
use crate::maintenance::optimize::OptimizationScheduler;
use crate::store::log::OperationLog;
use crate::store::record::{OperationKind, OperationRecord};

/// What the apply loop is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Idle,
    Applying,
    Optimizing,
}

/// Counts for one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: u64,
    pub skipped: u64,
    pub failed: u64,
    pub compactions: u64,
}

impl DrainReport {
    pub fn processed(&self) -> u64 {
        self.applied + self.skipped + self.failed + self.compactions
    }

    fn merge(&mut self, other: &DrainReport) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.compactions += other.compactions;
    }
}

#[derive(Debug, Default)]
struct Totals {
    applied: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    compactions: AtomicU64,
}

impl Totals {
    fn add(&self, report: &DrainReport) {
        self.applied.fetch_add(report.applied, Ordering::SeqCst);
        self.skipped.fetch_add(report.skipped, Ordering::SeqCst);
        self.failed.fetch_add(report.failed, Ordering::SeqCst);
        self.compactions
            .fetch_add(report.compactions, Ordering::SeqCst);
    }

    fn snapshot(&self) -> DrainReport {
        DrainReport {
            applied: self.applied.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            compactions: self.compactions.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug)]
pub struct ApplyLoop {
    log: Arc<OperationLog>,
    engine: Arc<dyn IndexEngine>,
    scheduler: Arc<OptimizationScheduler>,
    events: Arc<EventBus>,
    dedup: DedupFilter,
    writer: Mutex<()>,
    /// Thread currently holding the writer role.
    drainer: Mutex<Option<ThreadId>>,
    state: Mutex<LoopState>,
    idle: Condvar,
    halted: AtomicBool,
    totals: Totals,
}

impl ApplyLoop {
    pub fn new(
        log: Arc<OperationLog>,
        engine: Arc<dyn IndexEngine>,
        scheduler: Arc<OptimizationScheduler>,
        events: Arc<EventBus>,
    ) -> Self {
        ApplyLoop {
            log,
            engine,
            scheduler,
            events,
            dedup: DedupFilter::new(),
            writer: Mutex::new(()),
            drainer: Mutex::new(None),
            state: Mutex::new(LoopState::Idle),
            idle: Condvar::new(),
            halted: AtomicBool::new(false),
            totals: Totals::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        *self.state.lock()
    }

    fn set_state(&self, state: LoopState) {
        *self.state.lock() = state;
        if state == LoopState::Idle {
            self.idle.notify_all();
        }
    }

    /// Make running and future drains return after their current record.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.halted.store(false, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Lifetime counts across all drains.
    pub fn totals(&self) -> DrainReport {
        self.totals.snapshot()
    }

    /// Whether the calling thread is inside a drain or rebuild, which is
    /// the case for listeners fired by the apply loop.
    pub fn is_writer_thread(&self) -> bool {
        *self.drainer.lock() == Some(thread::current().id())
    }

    /// Apply pending records until the log is empty or the loop is halted.
    ///
    /// `OperationComplete` is fired once the log is observed empty and any
    /// compaction triggered by this drain has finished, and before the loop
    /// reports idle. A drain that found nothing to do fires nothing.
    ///
    /// Called from a listener of this loop, it returns immediately. The
    /// running drain picks up whatever the listener enqueued.
    pub fn drain(&self) -> DrainReport {
        if self.is_writer_thread() {
            return DrainReport::default();
        }
        let _writer = self.writer.lock();
        let _role = WriterRole::enter(&self.drainer);

        let mut report = DrainReport::default();
        loop {
            let pass = self.drain_pass();
            report.merge(&pass);
            // Listeners of OperationComplete may have enqueued more work.
            if pass.processed() == 0 || self.is_halted() || self.log.peek_pending_count() == 0 {
                break;
            }
        }
        self.set_state(LoopState::Idle);
        report
    }

    fn drain_pass(&self) -> DrainReport {
        let mut report = DrainReport::default();
        while !self.is_halted() {
            let Some(record) = self.log.dequeue_next() else {
                break;
            };
            if report.processed() == 0 {
                self.set_state(LoopState::Applying);
            }
            self.process(record, &mut report);
        }

        self.totals.add(&report);
        if report.processed() > 0 && self.log.peek_pending_count() == 0 {
            log::debug!(
                "drain complete: {} applied, {} skipped, {} failed",
                report.applied,
                report.skipped,
                report.failed
            );
            self.events.fire(&IndexEvent::OperationComplete {
                applied: report.applied,
                skipped: report.skipped,
                failed: report.failed,
            });
        }
        report
    }

    fn process(&self, record: OperationRecord, report: &mut DrainReport) {
        if record.kind == OperationKind::Optimize {
            self.complete(&record);
            self.compact(report);
            return;
        }

        match self.dedup.check(&record, &self.log) {
            Verdict::Apply => {}
            verdict => {
                log::debug!(
                    "skipping {} #{} for {:?}: {verdict:?}",
                    record.kind,
                    record.sequence,
                    record.identity
                );
                report.skipped += 1;
                self.complete(&record);
                return;
            }
        }

        match self.apply(&record) {
            Ok(event) => {
                self.dedup.mark_applied(record.sequence);
                self.complete(&record);
                report.applied += 1;
                self.scheduler.record_apply();
                self.events.fire(&event);

                if self.scheduler.is_due() {
                    self.compact(report);
                }
            }
            Err(e) => {
                log::warn!("{e}");
                self.complete(&record);
                report.failed += 1;
                self.events.fire(&IndexEvent::IndexingError {
                    identity: record.identity.clone(),
                    sequence: Some(record.sequence),
                    message: e.to_string(),
                });
            }
        }
    }

    fn apply(&self, record: &OperationRecord) -> Result<IndexEvent> {
        let identity = record.identity.clone().ok_or_else(|| {
            IndexerError::apply_failure(format!("{} #{} has no identity", record.kind, record.sequence))
        })?;
        let failure = |e: IndexerError| {
            IndexerError::apply_failure(format!(
                "{} #{} for {identity}: {e}",
                record.kind, record.sequence
            ))
        };

        match record.kind {
            OperationKind::Delete => {
                let removed = self.engine.delete_by_identity(&identity).map_err(failure)?;
                log::debug!("deleted {identity} (#{}, {removed} removed)", record.sequence);
                Ok(IndexEvent::ItemDeleted {
                    identity,
                    sequence: record.sequence,
                    removed,
                })
            }
            OperationKind::Add => {
                let field_count = record.payload.len();
                self.engine
                    .add_or_replace_document(&identity, record.payload.clone())
                    .map_err(failure)?;
                log::debug!("indexed {identity} (#{})", record.sequence);
                Ok(IndexEvent::ItemIndexed {
                    identity,
                    sequence: record.sequence,
                    field_count,
                })
            }
            OperationKind::Optimize => Err(IndexerError::internal(
                "optimize markers are not applied to the engine",
            )),
        }
    }

    fn complete(&self, record: &OperationRecord) {
        if let Err(e) = self.log.complete(record) {
            // The entry survives and is replayed on the next open; applies are idempotent.
            log::error!(
                "failed to remove log entry for {} #{}: {e}",
                record.kind,
                record.sequence
            );
        }
    }

    fn compact(&self, report: &mut DrainReport) {
        let Some(started_at) = self.scheduler.try_begin() else {
            log::debug!("compaction already in flight, deferring");
            return;
        };
        self.set_state(LoopState::Optimizing);

        let result = self
            .engine
            .compact()
            .and_then(|_| self.engine.count_documents());
        match result {
            Ok(documents) => {
                self.scheduler.finish(started_at, true);
                report.compactions += 1;
                log::info!("index compacted after {started_at} commits ({documents} documents)");
                self.events.fire(&IndexEvent::Optimized {
                    commits: started_at,
                    documents,
                });
            }
            Err(e) => {
                self.scheduler.finish(started_at, false);
                report.failed += 1;
                let err = IndexerError::optimization_failure(e.to_string());
                log::warn!("{err}");
                self.events.fire(&IndexEvent::IndexingError {
                    identity: None,
                    sequence: None,
                    message: err.to_string(),
                });
            }
        }
        self.set_state(LoopState::Applying);
    }

    /// Run `enqueue` under the writer role, then wipe the engine.
    ///
    /// Nothing is cleared unless `enqueue` succeeds, and no drain can apply
    /// the new records before the wipe. Fails when called from a listener of
    /// this loop.
    pub fn rebuild<T>(&self, enqueue: impl FnOnce() -> Result<T>) -> Result<T> {
        if self.is_writer_thread() {
            return Err(IndexerError::invalid_argument(
                "cannot rebuild the index from inside the apply loop",
            ));
        }
        let _writer = self.writer.lock();
        let _role = WriterRole::enter(&self.drainer);

        let queued = enqueue()?;
        self.engine
            .delete_all()
            .map_err(|e| IndexerError::apply_failure(format!("failed to clear index: {e}")))?;
        self.scheduler.reset();
        Ok(queued)
    }

    /// Block until the loop is idle with an empty log, or `timeout` passes.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if *state == LoopState::Idle && self.log.peek_pending_count() == 0 {
                return true;
            }
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return *state == LoopState::Idle && self.log.peek_pending_count() == 0;
            }
        }
    }
}

/// Marks the current thread as the writer until dropped.
struct WriterRole<'a> {
    drainer: &'a Mutex<Option<ThreadId>>,
}

impl<'a> WriterRole<'a> {
    fn enter(drainer: &'a Mutex<Option<ThreadId>>) -> Self {
        *drainer.lock() = Some(thread::current().id());
        WriterRole { drainer }
    }
}

impl Drop for WriterRole<'_> {
    fn drop(&mut self) {
        *self.drainer.lock() = None;
    }
}
