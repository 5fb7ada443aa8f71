use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use iris_indexer::storage::memory::MemoryStorageConfig;
use iris_indexer::storage::{StorageConfig, StorageFactory};
use iris_indexer::{
    Indexer, IndexerConfig, ItemIdentity, MemoryDataSource, MemoryIndex, SourceItem,
};

fn make_source(count: i64) -> MemoryDataSource {
    let source = MemoryDataSource::new();
    for id in 0..count {
        source.upsert(
            SourceItem::new(ItemIdentity::new(id, "content"), format!("/{id}"), "textPage")
                .with_field("title", format!("Benchmark item {id}"))
                .with_field("body", "Lorem ipsum dolor sit amet"),
        );
    }
    source
}

fn bench_reindex(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reindex");
    group.sample_size(10);
    let counts = [100, 1000];

    for count in counts.iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let source = make_source(count);
            b.iter(|| {
                let storage = StorageFactory::create(StorageConfig::Memory(
                    MemoryStorageConfig::default(),
                ))
                .unwrap();
                let indexer = Indexer::open(
                    storage,
                    Arc::new(MemoryIndex::default()),
                    Arc::new(source.clone()),
                    IndexerConfig::default(),
                )
                .unwrap();
                for id in 0..count {
                    indexer.reindex_item(id, "content").unwrap();
                }
            })
        });
    }
    group.finish();
}

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("Rebuild");
    group.sample_size(10);
    let count = 1000;
    let source = make_source(count);

    group.throughput(Throughput::Elements(count as u64));
    group.bench_function("rebuild_1000", |b| {
        b.iter(|| {
            let storage =
                StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))
                    .unwrap();
            let indexer = Indexer::open(
                storage,
                Arc::new(MemoryIndex::default()),
                Arc::new(source.clone()),
                IndexerConfig::default(),
            )
            .unwrap();
            indexer.rebuild_index().unwrap();
        })
    });
    group.finish();
}

criterion_group!(benches, bench_reindex, bench_rebuild);
criterion_main!(benches);
