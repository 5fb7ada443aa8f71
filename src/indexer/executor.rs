//! Where the apply loop runs.
//!
//! [`InlineStrategy`] drains on the producer's thread. [`BackgroundWorker`]
//! owns one thread that drains whenever it is woken; wakes that pile up
//! while a drain is running collapse into one.

use std::fmt::Debug;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{IndexerError, Result};
use crate::indexer::apply::ApplyLoop;
use crate::indexer::config::RunMode;

/// Drives an [`ApplyLoop`] after producers enqueue.
pub trait ExecutionStrategy: Send + Sync + Debug {
    fn mode(&self) -> RunMode;

    /// Called after records were made durable.
    fn notify(&self);

    /// Stop driving the loop. The current record is finished first.
    fn shutdown(&self);
}

/// Build the strategy for `mode`.
pub fn strategy_for(
    mode: RunMode,
    apply_loop: Arc<ApplyLoop>,
) -> Result<Arc<dyn ExecutionStrategy>> {
    Ok(match mode {
        RunMode::Sync => Arc::new(InlineStrategy::new(apply_loop)),
        RunMode::Async => Arc::new(BackgroundWorker::spawn(apply_loop)?),
    })
}

#[derive(Debug)]
pub struct InlineStrategy {
    apply_loop: Arc<ApplyLoop>,
}

impl InlineStrategy {
    pub fn new(apply_loop: Arc<ApplyLoop>) -> Self {
        InlineStrategy { apply_loop }
    }
}

impl ExecutionStrategy for InlineStrategy {
    fn mode(&self) -> RunMode {
        RunMode::Sync
    }

    fn notify(&self) {
        self.apply_loop.drain();
    }

    fn shutdown(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Wake,
    Stop,
}

/// A single background thread draining the log.
#[derive(Debug)]
pub struct BackgroundWorker {
    sender: Sender<Signal>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundWorker {
    pub fn spawn(apply_loop: Arc<ApplyLoop>) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("iris-indexer-apply".to_string())
            .spawn(move || run_worker(apply_loop, receiver))
            .map_err(|e| IndexerError::internal(format!("failed to spawn apply worker: {e}")))?;

        // Pick up anything enqueued before the worker existed.
        let _ = sender.send(Signal::Wake);
        Ok(BackgroundWorker {
            sender,
            handle: Mutex::new(Some(handle)),
        })
    }
}

fn run_worker(apply_loop: Arc<ApplyLoop>, receiver: Receiver<Signal>) {
    log::info!("apply worker started");
    while let Ok(signal) = receiver.recv() {
        let stop = signal == Signal::Stop || receiver.try_iter().any(|s| s == Signal::Stop);
        if stop {
            break;
        }
        apply_loop.drain();
    }
    log::info!("apply worker stopped");
}

impl ExecutionStrategy for BackgroundWorker {
    fn mode(&self) -> RunMode {
        RunMode::Async
    }

    fn notify(&self) {
        if self.sender.send(Signal::Wake).is_err() {
            log::warn!("apply worker is not running; records stay queued");
        }
    }

    fn shutdown(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        let _ = self.sender.send(Signal::Stop);
        if handle.thread().id() == thread::current().id() {
            // Called from a listener on the worker itself; it exits after this drain.
            return;
        }
        if handle.join().is_err() {
            log::error!("apply worker panicked");
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
