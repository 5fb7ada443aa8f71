//! Durable operation log.
//!
//! [`OperationLog`] is the queue between producers and the apply loop:
//!
//! - Assigns strictly increasing sequence numbers under a single writer slot
//! - Persists every record as its own entry before `enqueue` returns
//! - Hands records to the apply loop in sequence order
//! - Deletes an entry only after the apply loop reports it complete
//! - Replays surviving entries after a restart
//!
//! ## Crash safety
//!
//! An entry is written to `<name>.tmp`, synced, then renamed into place and
//! the directory synced. A crash mid-write therefore leaves at most one
//! `.tmp` file, which [`OperationLog::open`] discards. Committed entries are
//! never rewritten.
//!
//! The highest sequence handed out is also recorded in a small high-water
//! mark entry whenever the log drains empty, so numbering continues across
//! restarts even when no entries survive.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::data::ItemIdentity;
use crate::error::{IndexerError, Result};
use crate::storage::{Storage, read_all};
use crate::store::record::{
    OperationKind, OperationRecord, PARTIAL_EXTENSION, SeqNumber, parse_entry_name,
};

/// Name of the high-water mark entry.
pub const HIGH_WATER_MARK: &str = "sequence.hwm";

#[derive(Debug, Default)]
struct PendingQueue {
    /// Enqueued, not yet dequeued.
    records: BTreeMap<SeqNumber, OperationRecord>,
    /// Dequeued, not yet completed.
    in_flight: BTreeSet<SeqNumber>,
    /// Pending delete sequences per identity, for superseded-add lookups.
    deletes: AHashMap<ItemIdentity, BTreeSet<SeqNumber>>,
}

impl PendingQueue {
    fn insert(&mut self, record: OperationRecord) {
        if record.kind == OperationKind::Delete
            && let Some(identity) = &record.identity
        {
            self.deletes
                .entry(identity.clone())
                .or_default()
                .insert(record.sequence);
        }
        self.records.insert(record.sequence, record);
    }

    fn pop_first(&mut self) -> Option<OperationRecord> {
        let (seq, record) = self.records.pop_first()?;
        if record.kind == OperationKind::Delete
            && let Some(identity) = &record.identity
            && let Some(seqs) = self.deletes.get_mut(identity)
        {
            seqs.remove(&seq);
            if seqs.is_empty() {
                self.deletes.remove(identity);
            }
        }
        self.in_flight.insert(seq);
        Some(record)
    }

    fn is_drained(&self) -> bool {
        self.records.is_empty() && self.in_flight.is_empty()
    }
}

/// Append-only, crash-tolerant queue of index operations.
///
/// # Thread safety
///
/// Enqueues are serialized through the writer slot, which covers sequence
/// assignment, the durable write and publication to the pending queue, so
/// the pending queue always grows in sequence order. Dequeue and completion
/// only touch the pending queue lock.
#[derive(Debug)]
pub struct OperationLog {
    storage: Arc<dyn Storage>,
    writer: Mutex<()>,
    next_seq: AtomicU64,
    pending: Mutex<PendingQueue>,
}

impl OperationLog {
    /// Open the log, recovering any entries left by a previous process.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        let mut pending = PendingQueue::default();
        let mut max_seq = Self::read_high_water_mark(storage.as_ref())?;

        for name in storage.list_files()? {
            if name == HIGH_WATER_MARK {
                continue;
            }
            if name.ends_with(PARTIAL_EXTENSION) {
                log::warn!("discarding partially written log entry {name}");
                storage.delete_file(&name)?;
                continue;
            }
            let Some((seq, kind)) = parse_entry_name(&name) else {
                log::warn!("ignoring unrecognized file {name} in operation log");
                continue;
            };
            max_seq = max_seq.max(seq);

            let record = match read_all(storage.as_ref(), &name)
                .and_then(|bytes| OperationRecord::decode(&bytes))
            {
                Ok(record) if record.sequence == seq && record.kind == kind => record,
                Ok(record) => {
                    log::warn!(
                        "discarding log entry {name}: content is {} #{}",
                        record.kind,
                        record.sequence
                    );
                    storage.delete_file(&name)?;
                    continue;
                }
                Err(e) => {
                    log::warn!("discarding unreadable log entry {name}: {e}");
                    storage.delete_file(&name)?;
                    continue;
                }
            };
            pending.insert(record);
        }

        if !pending.records.is_empty() {
            log::info!(
                "operation log recovered {} pending entries (last sequence {max_seq})",
                pending.records.len()
            );
        }

        Ok(OperationLog {
            storage,
            writer: Mutex::new(()),
            next_seq: AtomicU64::new(max_seq + 1),
            pending: Mutex::new(pending),
        })
    }

    fn read_high_water_mark(storage: &dyn Storage) -> Result<SeqNumber> {
        if !storage.file_exists(HIGH_WATER_MARK) {
            return Ok(0);
        }
        let bytes = read_all(storage, HIGH_WATER_MARK)?;
        match <[u8; 8]>::try_from(bytes.as_slice()) {
            Ok(raw) => Ok(u64::from_le_bytes(raw)),
            Err(_) => {
                log::warn!("ignoring malformed sequence high-water mark");
                Ok(0)
            }
        }
    }

    fn write_high_water_mark(&self, seq: SeqNumber) -> Result<()> {
        let tmp = format!("{HIGH_WATER_MARK}{PARTIAL_EXTENSION}");
        let mut output = self.storage.create_output(&tmp)?;
        output.write_all(&seq.to_le_bytes())?;
        output.flush_and_sync()?;
        output.close()?;
        self.storage.rename_file(&tmp, HIGH_WATER_MARK)?;
        self.storage.sync()
    }

    /// Durably append a single record and return its sequence number.
    pub fn enqueue(&self, record: OperationRecord) -> Result<SeqNumber> {
        let seqs = self.enqueue_batch(vec![record])?;
        seqs.into_iter()
            .next()
            .ok_or_else(|| IndexerError::internal("enqueue produced no sequence"))
    }

    /// Durably append several records as one unit.
    ///
    /// The records receive consecutive sequence numbers in the given order.
    /// Either every record becomes visible to the apply loop or, on
    /// [`IndexerError::WriteFailure`], none does.
    pub fn enqueue_batch(&self, records: Vec<OperationRecord>) -> Result<Vec<SeqNumber>> {
        for record in &records {
            record.validate()?;
        }
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let _slot = self.writer.lock();
        let mut written: Vec<OperationRecord> = Vec::with_capacity(records.len());

        for mut record in records {
            record.sequence = self.next_seq.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = self.write_entry(&record) {
                for done in &written {
                    if let Err(cleanup) = self.storage.delete_file(&done.entry_name()) {
                        log::warn!(
                            "failed to roll back log entry {}: {cleanup}",
                            done.entry_name()
                        );
                    }
                }
                return Err(e);
            }
            written.push(record);
        }

        let seqs = written.iter().map(|r| r.sequence).collect();
        let mut pending = self.pending.lock();
        for record in written {
            pending.insert(record);
        }
        Ok(seqs)
    }

    fn write_entry(&self, record: &OperationRecord) -> Result<()> {
        let name = record.entry_name();
        let tmp = format!("{name}{PARTIAL_EXTENSION}");

        let result = (|| -> Result<()> {
            let bytes = record.encode()?;
            let mut output = self.storage.create_output(&tmp)?;
            output.write_all(&bytes)?;
            output.flush_and_sync()?;
            output.close()?;
            self.storage.rename_file(&tmp, &name)?;
            self.storage.sync()
        })();

        result.map_err(|e| {
            let _ = self.storage.delete_file(&tmp);
            IndexerError::write_failure(format!(
                "failed to persist {} #{}: {e}",
                record.kind, record.sequence
            ))
        })
    }

    /// Take the lowest pending record.
    ///
    /// The entry stays on disk until [`complete`](Self::complete) is called,
    /// so a crash between the two replays the record.
    pub fn dequeue_next(&self) -> Option<OperationRecord> {
        self.pending.lock().pop_first()
    }

    /// Remove the durable entry of a dequeued record.
    ///
    /// When this empties the log, the high-water mark is written first. A
    /// failure to write it is logged and does not keep the entry.
    pub fn complete(&self, record: &OperationRecord) -> Result<()> {
        let drained = {
            let mut pending = self.pending.lock();
            pending.in_flight.remove(&record.sequence);
            pending.is_drained()
        };
        if drained
            && let Err(e) = self.write_high_water_mark(self.last_seq())
        {
            let _ = self.storage.delete_file(&format!("{HIGH_WATER_MARK}{PARTIAL_EXTENSION}"));
            log::warn!("failed to record sequence high-water mark: {e}");
        }
        self.storage.delete_file(&record.entry_name())
    }

    /// Number of records enqueued but not yet completed.
    pub fn peek_pending_count(&self) -> usize {
        let pending = self.pending.lock();
        pending.records.len() + pending.in_flight.len()
    }

    /// Whether a delete for `identity` with a sequence above `after` is still waiting.
    pub fn has_pending_delete_after(&self, identity: &ItemIdentity, after: SeqNumber) -> bool {
        self.pending
            .lock()
            .deletes
            .get(identity)
            .is_some_and(|seqs| seqs.range(after + 1..).next().is_some())
    }

    /// Sequence and kind of every record not yet dequeued, in order.
    pub fn pending_entries(&self) -> Vec<(SeqNumber, OperationKind)> {
        self.pending
            .lock()
            .records
            .values()
            .map(|r| (r.sequence, r.kind))
            .collect()
    }

    /// Get the last assigned sequence number.
    pub fn last_seq(&self) -> SeqNumber {
        self.next_seq.load(Ordering::SeqCst).saturating_sub(1)
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Document, ItemIdentity};
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    fn make_storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(MemoryStorageConfig::default()))
    }

    fn identity(id: i64) -> ItemIdentity {
        ItemIdentity::new(id, "content")
    }

    #[test]
    fn test_enqueue_and_dequeue_in_order() {
        let log = OperationLog::open(make_storage()).unwrap();

        let s1 = log.enqueue(OperationRecord::delete(identity(1))).unwrap();
        let s2 = log
            .enqueue(OperationRecord::add(
                identity(1),
                Document::new().add_field("title", "one"),
            ))
            .unwrap();
        assert_eq!((s1, s2), (1, 2));
        assert_eq!(log.peek_pending_count(), 2);

        let first = log.dequeue_next().unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.kind, OperationKind::Delete);
        log.complete(&first).unwrap();

        let second = log.dequeue_next().unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(log.peek_pending_count(), 1);
        log.complete(&second).unwrap();

        assert!(log.dequeue_next().is_none());
        assert_eq!(log.peek_pending_count(), 0);
    }

    #[test]
    fn test_entries_named_by_sequence_and_kind() {
        let storage = make_storage();
        let log = OperationLog::open(storage.clone()).unwrap();
        log.enqueue_batch(vec![
            OperationRecord::delete(identity(7)),
            OperationRecord::add(identity(7), Document::new()),
        ])
        .unwrap();
        log.enqueue(OperationRecord::optimize()).unwrap();

        assert_eq!(
            storage.list_files().unwrap(),
            vec![
                "00000000000000000001-del.op",
                "00000000000000000002-add.op",
                "00000000000000000003-opt.op",
            ]
        );
    }

    #[test]
    fn test_recovery_replays_in_order_and_continues_numbering() {
        let storage = make_storage();
        {
            let log = OperationLog::open(storage.clone()).unwrap();
            log.enqueue(OperationRecord::delete(identity(1))).unwrap();
            log.enqueue(OperationRecord::add(identity(1), Document::new()))
                .unwrap();
            // Dequeued but never completed: must be replayed.
            let _ = log.dequeue_next().unwrap();
        }

        let log = OperationLog::open(storage.clone()).unwrap();
        assert_eq!(
            log.pending_entries(),
            vec![(1, OperationKind::Delete), (2, OperationKind::Add)]
        );
        let seq = log.enqueue(OperationRecord::delete(identity(2))).unwrap();
        assert_eq!(seq, 3);
    }

    #[test]
    fn test_numbering_survives_empty_restart() {
        let storage = make_storage();
        {
            let log = OperationLog::open(storage.clone()).unwrap();
            for _ in 0..3 {
                log.enqueue(OperationRecord::delete(identity(1))).unwrap();
            }
            while let Some(record) = log.dequeue_next() {
                log.complete(&record).unwrap();
            }
        }
        assert_eq!(storage.list_files().unwrap(), vec![HIGH_WATER_MARK]);

        let log = OperationLog::open(storage).unwrap();
        assert_eq!(log.enqueue(OperationRecord::optimize()).unwrap(), 4);
    }

    #[test]
    fn test_partial_and_corrupt_entries_discarded() {
        let storage = make_storage();
        {
            let log = OperationLog::open(storage.clone()).unwrap();
            log.enqueue(OperationRecord::delete(identity(1))).unwrap();
        }
        let mut out = storage
            .create_output("00000000000000000002-add.op.tmp")
            .unwrap();
        out.write_all(b"half").unwrap();
        out.close().unwrap();
        let mut out = storage.create_output("00000000000000000003-add.op").unwrap();
        out.write_all(b"garbage that is not a record").unwrap();
        out.close().unwrap();

        let log = OperationLog::open(storage.clone()).unwrap();
        assert_eq!(log.pending_entries(), vec![(1, OperationKind::Delete)]);
        assert_eq!(
            storage.list_files().unwrap(),
            vec!["00000000000000000001-del.op"]
        );
        // Sequence 3 was seen on disk, so numbering continues past it.
        assert_eq!(log.enqueue(OperationRecord::optimize()).unwrap(), 4);
    }

    #[test]
    fn test_write_failure_is_reported_and_batch_rolled_back() {
        let memory = MemoryStorage::new(MemoryStorageConfig::default());
        let storage: Arc<dyn Storage> = Arc::new(memory.clone());
        let log = OperationLog::open(storage.clone()).unwrap();

        let first = OperationRecord::delete(identity(1));
        let entry_size = {
            let mut probe = first.clone();
            probe.sequence = 1;
            probe.encode().unwrap().len()
        };
        // Room for exactly one entry (plus the partial of the second).
        memory.set_capacity(Some(entry_size + entry_size / 2));

        let err = log
            .enqueue_batch(vec![first, OperationRecord::delete(identity(2))])
            .unwrap_err();
        assert!(err.is_write_failure());
        assert_eq!(log.peek_pending_count(), 0);
        assert!(storage.list_files().unwrap().is_empty());

        memory.set_capacity(None);
        let seq = log.enqueue(OperationRecord::delete(identity(3))).unwrap();
        assert!(seq > 2, "sequence numbers are never reused");
    }

    #[test]
    fn test_pending_delete_lookup() {
        let log = OperationLog::open(make_storage()).unwrap();
        log.enqueue_batch(vec![
            OperationRecord::delete(identity(1)),
            OperationRecord::add(identity(1), Document::new()),
            OperationRecord::delete(identity(1)),
            OperationRecord::add(identity(1), Document::new()),
        ])
        .unwrap();

        assert!(log.has_pending_delete_after(&identity(1), 2));
        assert!(!log.has_pending_delete_after(&identity(1), 3));
        assert!(!log.has_pending_delete_after(&identity(2), 0));

        // Dequeued deletes no longer count as pending.
        let _ = log.dequeue_next();
        let _ = log.dequeue_next();
        let _ = log.dequeue_next();
        assert!(!log.has_pending_delete_after(&identity(1), 2));
    }

    #[test]
    fn test_invalid_record_rejected() {
        let log = OperationLog::open(make_storage()).unwrap();
        let mut record = OperationRecord::optimize();
        record.identity = Some(identity(1));
        assert!(matches!(
            log.enqueue(record),
            Err(IndexerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_complete_removes_entry_when_mark_cannot_be_written() {
        let memory = MemoryStorage::new(MemoryStorageConfig::default());
        let storage: Arc<dyn Storage> = Arc::new(memory.clone());
        let log = OperationLog::open(storage.clone()).unwrap();
        log.enqueue(OperationRecord::delete(identity(1))).unwrap();

        memory.set_capacity(Some(memory.used_bytes()));
        let record = log.dequeue_next().unwrap();
        log.complete(&record).unwrap();

        assert!(storage.list_files().unwrap().is_empty());
        assert_eq!(log.peek_pending_count(), 0);
    }
}
