//! Commit-count driven compaction policy.
//!
//! The scheduler is pure bookkeeping: the apply loop reports every
//! successful apply, asks whether a compaction is due, and reports how the
//! compaction ended. Crossing the threshold is the only trigger.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};

/// Applies between compactions when nothing else is configured.
pub const DEFAULT_OPTIMIZATION_THRESHOLD: u64 = 100;

/// Counters exposed for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationStats {
    /// Applies since the last successful compaction.
    pub commit_counter: u64,
    pub threshold: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: bool,
}

/// Decides when the index is compacted.
#[derive(Debug)]
pub struct OptimizationScheduler {
    commit_counter: AtomicU64,
    threshold: AtomicU64,
    in_flight: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl Default for OptimizationScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_OPTIMIZATION_THRESHOLD)
    }
}

impl OptimizationScheduler {
    /// Create a scheduler. A zero threshold is raised to 1.
    pub fn new(threshold: u64) -> Self {
        OptimizationScheduler {
            commit_counter: AtomicU64::new(0),
            threshold: AtomicU64::new(threshold.max(1)),
            in_flight: AtomicBool::new(false),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold.load(Ordering::SeqCst)
    }

    /// Change the threshold. Takes effect at the next check.
    pub fn set_threshold(&self, threshold: u64) -> Result<()> {
        if threshold == 0 {
            return Err(IndexerError::invalid_argument(
                "optimization threshold must be positive",
            ));
        }
        self.threshold.store(threshold, Ordering::SeqCst);
        Ok(())
    }

    /// Count one successfully applied record. Returns the new counter value.
    pub fn record_apply(&self) -> u64 {
        self.commit_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn commit_counter(&self) -> u64 {
        self.commit_counter.load(Ordering::SeqCst)
    }

    /// Whether the counter has reached the threshold.
    pub fn is_due(&self) -> bool {
        self.commit_counter() >= self.threshold()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Claim the single compaction slot.
    ///
    /// Returns the counter value at claim time, or `None` when a compaction
    /// is already running; the trigger is then deferred until that one
    /// finishes and the counter crosses the threshold again.
    pub fn try_begin(&self) -> Option<u64> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| self.commit_counter())
    }

    /// Release the slot. On success the counter drops by the value captured
    /// at [`try_begin`](Self::try_begin); on failure it is left alone so the
    /// next crossing retries.
    pub fn finish(&self, started_at: u64, success: bool) {
        if success {
            let _ = self
                .commit_counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                    Some(c.saturating_sub(started_at))
                });
            self.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Forget accumulated commits, e.g. after the index was wiped.
    pub fn reset(&self) {
        self.commit_counter.store(0, Ordering::SeqCst);
    }

    pub fn stats(&self) -> OptimizationStats {
        OptimizationStats {
            commit_counter: self.commit_counter(),
            threshold: self.threshold(),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            in_flight: self.is_in_flight(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_crossing() {
        let scheduler = OptimizationScheduler::new(5);
        for _ in 0..4 {
            scheduler.record_apply();
            assert!(!scheduler.is_due());
        }
        assert_eq!(scheduler.record_apply(), 5);
        assert!(scheduler.is_due());

        let started = scheduler.try_begin().unwrap();
        assert_eq!(started, 5);
        scheduler.finish(started, true);
        assert_eq!(scheduler.commit_counter(), 0);
        assert_eq!(scheduler.stats().completed, 1);
    }

    #[test]
    fn test_single_in_flight() {
        let scheduler = OptimizationScheduler::new(1);
        scheduler.record_apply();
        let started = scheduler.try_begin().unwrap();
        assert!(scheduler.try_begin().is_none());

        // Applies that land while compacting are kept for the next round.
        scheduler.record_apply();
        scheduler.record_apply();
        scheduler.finish(started, true);
        assert_eq!(scheduler.commit_counter(), 2);
        assert!(scheduler.try_begin().is_some());
    }

    #[test]
    fn test_failure_keeps_counter() {
        let scheduler = OptimizationScheduler::new(2);
        scheduler.record_apply();
        scheduler.record_apply();
        let started = scheduler.try_begin().unwrap();
        scheduler.finish(started, false);

        let stats = scheduler.stats();
        assert_eq!(stats.commit_counter, 2);
        assert_eq!(stats.failed, 1);
        assert!(!stats.in_flight);
        assert!(scheduler.is_due());
    }

    #[test]
    fn test_invalid_threshold() {
        let scheduler = OptimizationScheduler::default();
        assert_eq!(scheduler.threshold(), DEFAULT_OPTIMIZATION_THRESHOLD);
        assert!(scheduler.set_threshold(0).is_err());
        scheduler.set_threshold(5).unwrap();
        assert_eq!(scheduler.threshold(), 5);
        assert_eq!(OptimizationScheduler::new(0).threshold(), 1);
    }
}
