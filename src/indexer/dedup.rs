//! Drops records whose effect would be redundant or out of order.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::store::log::OperationLog;
use crate::store::record::{OperationKind, OperationRecord, SeqNumber};

/// Outcome of checking one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Apply,
    /// A later delete for the same identity is still pending.
    Superseded,
    /// Not newer than what was already applied.
    Stale { last_applied: SeqNumber },
}

/// Apply-time dedup.
///
/// The log hands out records strictly in sequence order, so a single
/// watermark covers every identity: anything at or below the highest
/// applied sequence has already been overtaken.
#[derive(Debug, Default)]
pub struct DedupFilter {
    last_applied: AtomicU64,
}

impl DedupFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, record: &OperationRecord, log: &OperationLog) -> Verdict {
        let Some(identity) = &record.identity else {
            return Verdict::Apply;
        };
        let last_applied = self.last_applied();
        if record.sequence <= last_applied {
            return Verdict::Stale { last_applied };
        }
        if record.kind == OperationKind::Add
            && log.has_pending_delete_after(identity, record.sequence)
        {
            return Verdict::Superseded;
        }
        Verdict::Apply
    }

    pub fn mark_applied(&self, sequence: SeqNumber) {
        self.last_applied.fetch_max(sequence, Ordering::SeqCst);
    }

    pub fn last_applied(&self) -> SeqNumber {
        self.last_applied.load(Ordering::SeqCst)
    }
}
