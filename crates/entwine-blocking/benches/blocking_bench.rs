use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use entwine_blocking::{
    BlockBuilder, BlockingConfig, CardinalityEdgePruner, PruneConfig, Record, RecordCollection,
    TokenizerStrategy, TopKAggregator, WeightedEdge,
};
use std::sync::Arc;

fn generate_records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            Record::new(
                format!("r{i}"),
                vec![format!(
                    "user {} lives in city{} likes color{} and drives model{}",
                    i,
                    i % 50,
                    i % 7,
                    i % 31
                )],
            )
        })
        .collect()
}

fn generate_collection(count: usize) -> Arc<RecordCollection> {
    let collection =
        RecordCollection::dirty(vec!["profile".to_owned()], generate_records(count)).unwrap();
    Arc::new(collection)
}

fn bench_tokenizers(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenizer");

    let text = "The quick brown fox jumps over the lazy dog near the riverbank in autumn";
    let strategies = [
        ("standard", TokenizerStrategy::Standard),
        ("qgrams", TokenizerStrategy::qgrams()),
        ("suffix_arrays", TokenizerStrategy::suffix_arrays()),
        ("extended_suffix_arrays", TokenizerStrategy::extended_suffix_arrays()),
        ("extended_qgrams", TokenizerStrategy::extended_qgrams()),
    ];

    for (name, strategy) in strategies {
        group.bench_with_input(BenchmarkId::from_parameter(name), &strategy, |b, strategy| {
            b.iter(|| strategy.blocking_keys(black_box(text)))
        });
    }

    group.finish();
}

fn bench_block_building(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_building");
    group.sample_size(10);

    for size in [100, 1_000, 10_000] {
        let collection = generate_collection(size);
        let builder = BlockBuilder::new(
            BlockingConfig::default().with_workers(4).with_partitions(4),
        )
        .unwrap();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &collection,
            |b, collection| b.iter(|| builder.build(Arc::clone(black_box(collection))).unwrap()),
        );
    }

    group.finish();
}

fn bench_pruning(c: &mut Criterion) {
    let mut group = c.benchmark_group("pruning");
    group.sample_size(10);

    let collection = generate_collection(1_000);
    let builder =
        BlockBuilder::new(BlockingConfig::default().with_workers(4).with_partitions(4)).unwrap();
    let (index, _) = builder.build(Arc::clone(&collection)).unwrap();
    let pruner = CardinalityEdgePruner::new(
        PruneConfig::default().with_capacity(512).with_workers(4),
    )
    .unwrap();

    group.bench_function("common_blocks_1000", |b| {
        b.iter(|| pruner.prune(black_box(&collection), black_box(&index)).unwrap())
    });

    group.finish();
}

fn bench_topk(c: &mut Criterion) {
    let mut group = c.benchmark_group("topk");

    let mut edges: Vec<WeightedEdge> = (0..10_000)
        .map(|i| WeightedEdge::new(((i * 37) % 1000) as f64 / 10.0, i, 10_000 + i))
        .collect();
    edges.sort_by(|a, b| b.cmp(a));

    group.throughput(Throughput::Elements(edges.len() as u64));
    group.bench_function("extend_sorted_10k", |b| {
        b.iter(|| {
            let mut topk = TopKAggregator::new(128, 0.0).unwrap();
            topk.extend_sorted(black_box(edges.clone())).unwrap();
            topk
        })
    });

    group.bench_function("offer_10k", |b| {
        b.iter(|| {
            let mut topk = TopKAggregator::new(128, 0.0).unwrap();
            for edge in &edges {
                topk.offer(black_box(*edge));
            }
            topk
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_tokenizers,
    bench_block_building,
    bench_pruning,
    bench_topk
);
criterion_main!(benches);
