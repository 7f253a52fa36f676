use criterion::{Criterion, criterion_group, criterion_main};
use textmirror_engine::model::NodeKey;
use textmirror_engine::reconcile::OffsetIndex;

fn index(len: usize) -> OffsetIndex {
    OffsetIndex::from_locations((0..len).map(|i| (NodeKey(i as u32), i * 8)))
}

fn bench_offset_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("offset_index");

    let mut shifted = index(10_000);
    group.bench_function("shift_from_middle", |b| {
        b.iter(|| {
            shifted.add_from(std::hint::black_box(5_000), 1);
        });
    });

    let lookup = index(10_000);
    group.bench_function("location", |b| {
        b.iter(|| std::hint::black_box(lookup.location(std::hint::black_box(9_999))));
    });

    group.bench_function("push_10k", |b| {
        b.iter(|| {
            let mut index = OffsetIndex::new();
            for i in 0..10_000 {
                index.push(NodeKey(i as u32), i * 8);
            }
            std::hint::black_box(index.len())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_offset_index);
criterion_main!(benches);
