//! # Iris Indexer
//!
//! A durable, queue-mediated writer in front of an inverted index.
//!
//! ## Features
//!
//! - Crash-tolerant operation log with strictly increasing sequence numbers
//! - Delete-before-add ordering for every reindex
//! - No duplicate documents, however often an item is reindexed
//! - Commit-count driven compaction
//! - Synchronous or background application
//! - Typed lifecycle events

pub mod data;
pub mod error;
pub mod events;
pub mod index;
pub mod indexer;
pub mod maintenance;
pub mod source;
pub mod storage;
pub mod store;

// Re-exports for the public API
pub use data::{DataValue, Document, Field, FieldOption, ItemId, ItemIdentity};
pub use error::{IndexerError, Result};
pub use events::{EventBus, EventKind, IndexEvent, SubscriptionId};
pub use index::memory::{MemoryIndex, MemoryIndexConfig};
pub use index::{IndexEngine, SearchCriteria, SearchHit};
pub use indexer::apply::LoopState;
pub use indexer::config::{FieldDefinition, IndexerConfig, RunMode};
pub use indexer::{Indexer, IndexerStats};
pub use maintenance::optimize::{OptimizationScheduler, OptimizationStats};
pub use source::memory::MemoryDataSource;
pub use source::{DataSource, PathFilter, SourceItem};
pub use storage::{Storage, StorageConfig, StorageFactory};
pub use store::record::{OperationKind, OperationRecord, SeqNumber};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
