mod common;

use std::sync::Arc;

use tempfile::TempDir;

use common::{sample_config, sample_source};
use iris_indexer::storage::file::FileStorageConfig;
use iris_indexer::storage::memory::MemoryStorage;
use iris_indexer::storage::{Storage, StorageConfig, StorageFactory};
use iris_indexer::{IndexEngine, Indexer, MemoryIndex, SearchCriteria};

#[test]
fn test_pending_operations_replayed_after_restart() -> iris_indexer::Result<()> {
    // 1. Setup Storage
    let temp_dir = TempDir::new().unwrap();
    let storage_config = StorageConfig::File(FileStorageConfig::new(temp_dir.path()));
    let storage = StorageFactory::create(storage_config)?;
    let index = Arc::new(MemoryIndex::default());
    let source = Arc::new(sample_source());

    // 2. Round 1: enqueue while the apply loop is stopped
    let last_seq = {
        let indexer = Indexer::open(
            storage.clone(),
            index.clone(),
            source.clone(),
            sample_config().build()?,
        )?;
        indexer.reindex_item(1051, "content")?;
        indexer.stop();

        indexer.reindex_item(1052, "content")?;
        let seqs = indexer.reindex_item(1051, "content")?;
        assert_eq!(indexer.pending_count(), 4);
        assert_eq!(index.count_documents()?, 1);
        *seqs.last().unwrap()
    };

    // Entries are on disk, named so that sorting gives apply order.
    let mut names: Vec<String> = storage
        .list_files()?
        .into_iter()
        .filter(|n| n.ends_with(".op"))
        .collect();
    assert_eq!(names.len(), 4);
    let sorted = {
        let mut s = names.clone();
        s.sort();
        s
    };
    assert_eq!(names, sorted);
    assert!(names.remove(0).ends_with("-del.op"));

    // 3. Round 2: reopen on the same storage
    {
        let indexer = Indexer::open(
            storage.clone(),
            index.clone(),
            source.clone(),
            sample_config().build()?,
        )?;
        assert_eq!(indexer.pending_count(), 0);
        assert_eq!(index.count_documents()?, 2);
        for id in [1051, 1052] {
            let hits = indexer.search(&SearchCriteria::new().id(id).item_type("content"))?;
            assert_eq!(hits.len(), 1);
        }

        // Numbering continues past everything handed out before.
        let seqs = indexer.reindex_item(1053, "content")?;
        assert!(seqs[0] > last_seq);
    }

    // 4. Round 3: an empty log still remembers the sequence
    {
        let indexer = Indexer::open(storage.clone(), index.clone(), source, sample_config().build()?)?;
        let seqs = indexer.reindex_item(1054, "content")?;
        assert!(seqs[0] > last_seq + 2);
    }
    Ok(())
}

#[test]
fn test_write_failure_is_returned_to_producer() -> iris_indexer::Result<()> {
    let memory = MemoryStorage::default();
    let storage: Arc<dyn Storage> = Arc::new(memory.clone());
    let index = Arc::new(MemoryIndex::default());
    let indexer = Indexer::open(
        storage.clone(),
        index.clone(),
        Arc::new(sample_source()),
        sample_config().build()?,
    )?;

    indexer.reindex_item(1051, "content")?;
    memory.set_capacity(Some(memory.used_bytes()));

    let err = indexer.reindex_item(1052, "content").unwrap_err();
    assert!(err.is_write_failure(), "unexpected error {err}");
    assert_eq!(indexer.pending_count(), 0);
    assert_eq!(index.count_documents()?, 1);
    assert!(indexer.optimize().unwrap_err().is_write_failure());

    memory.set_capacity(None);
    indexer.reindex_item(1052, "content")?;
    assert_eq!(index.count_documents()?, 2);
    Ok(())
}

#[test]
fn test_write_failure_during_rebuild_keeps_index() -> iris_indexer::Result<()> {
    let memory = MemoryStorage::default();
    let index = Arc::new(MemoryIndex::default());
    let indexer = Indexer::open(
        Arc::new(memory.clone()),
        index.clone(),
        Arc::new(sample_source()),
        sample_config().build()?,
    )?;

    let queued = indexer.rebuild_index()?;
    assert_eq!(index.count_documents()?, queued as u64);

    memory.set_capacity(Some(memory.used_bytes()));
    let err = indexer.rebuild_index().unwrap_err();
    assert!(err.is_write_failure(), "unexpected error {err}");
    assert_eq!(index.count_documents()?, queued as u64);
    assert_eq!(indexer.pending_count(), 0);

    memory.set_capacity(None);
    assert_eq!(indexer.rebuild_index()?, queued);
    assert_eq!(index.count_documents()?, queued as u64);
    Ok(())
}
