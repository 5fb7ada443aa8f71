//! Lifecycle notifications for the indexer.
//!
//! [`EventBus`] is a typed publish/subscribe registry: each [`EventKind`]
//! maps to an ordered list of listener closures. Events are delivered
//! synchronously, in subscription order, on the thread that performed the
//! state transition. Listeners may subscribe or unsubscribe from inside a
//! callback; the change applies to the next event fired.
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use iris_indexer::{EventBus, EventKind, IndexEvent};
//!
//! let bus = EventBus::new();
//! let count = Arc::new(AtomicUsize::new(0));
//! let seen = count.clone();
//! let id = bus.subscribe(EventKind::OperationComplete, move |_| {
//!     seen.fetch_add(1, Ordering::SeqCst);
//! });
//! bus.fire(&IndexEvent::OperationComplete { applied: 1, skipped: 0, failed: 0 });
//! assert!(bus.unsubscribe(id));
//! bus.fire(&IndexEvent::OperationComplete { applied: 1, skipped: 0, failed: 0 });
//! assert_eq!(count.load(Ordering::SeqCst), 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::data::ItemIdentity;
use crate::store::record::SeqNumber;

/// The kinds of event a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ItemDeleted,
    ItemIndexed,
    Optimized,
    IndexingError,
    OperationComplete,
}

/// A lifecycle notification.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexEvent {
    /// A delete record was applied.
    ItemDeleted {
        identity: ItemIdentity,
        sequence: SeqNumber,
        /// Live documents removed by the delete.
        removed: u64,
    },
    /// An add record was applied.
    ItemIndexed {
        identity: ItemIdentity,
        sequence: SeqNumber,
        field_count: usize,
    },
    /// A compaction finished successfully.
    Optimized {
        /// Commit counter value at the time compaction started.
        commits: u64,
        /// Live documents after compaction.
        documents: u64,
    },
    /// A record failed to apply or a compaction failed.
    IndexingError {
        identity: Option<ItemIdentity>,
        sequence: Option<SeqNumber>,
        message: String,
    },
    /// The apply loop drained the log and returned to idle.
    OperationComplete {
        applied: u64,
        skipped: u64,
        failed: u64,
    },
}

impl IndexEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            IndexEvent::ItemDeleted { .. } => EventKind::ItemDeleted,
            IndexEvent::ItemIndexed { .. } => EventKind::ItemIndexed,
            IndexEvent::Optimized { .. } => EventKind::Optimized,
            IndexEvent::IndexingError { .. } => EventKind::IndexingError,
            IndexEvent::OperationComplete { .. } => EventKind::OperationComplete,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&IndexEvent) + Send + Sync>;

/// Registry of lifecycle listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<EventKind, Vec<(SubscriptionId, Listener)>>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        let counts: HashMap<&EventKind, usize> =
            listeners.iter().map(|(k, v)| (k, v.len())).collect();
        f.debug_struct("EventBus")
            .field("listeners", &counts)
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&IndexEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        for entries in listeners.values_mut() {
            if let Some(pos) = entries.iter().position(|(sid, _)| *sid == id) {
                entries.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver an event to every listener of its kind.
    pub fn fire(&self, event: &IndexEvent) {
        // Snapshot so callbacks can (un)subscribe without deadlocking.
        let snapshot: Vec<Listener> = match self.listeners.read().get(&event.kind()) {
            Some(entries) => entries.iter().map(|(_, l)| l.clone()).collect(),
            None => return,
        };
        for listener in snapshot {
            listener(event);
        }
    }
}
