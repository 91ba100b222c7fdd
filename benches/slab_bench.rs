use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pelikan_core::item::EXPIRE_NEVER;
use pelikan_core::slab::{SlabConfig, SlabEngine, SlabEvictPolicy};

fn populated_engine(load: usize) -> SlabEngine {
    let mut engine = SlabEngine::new(SlabConfig {
        min_chunk: 96,
        max_chunk: 4096,
        growth_factor: 1.25,
        slab_size: 1024 * 1024,
        mem_limit: 256 * 1024 * 1024,
        nbucket: 1 << 16,
        evict_policy: SlabEvictPolicy::Lru,
        use_freeq: true,
        use_cas: true,
    });
    for i in 0..load {
        let key = format!("key-{i}");
        let _ = engine.set(key.as_bytes(), b"0123456789".to_vec(), 0, EXPIRE_NEVER, 0);
    }
    engine
}

fn bench_get_hit(c: &mut Criterion) {
    let mut engine = populated_engine(10_000);
    c.bench_function("slab_get_hit", |b| {
        b.iter(|| engine.get(black_box(b"key-5000"), black_box(0)))
    });
}

fn bench_set_under_eviction_pressure(c: &mut Criterion) {
    c.bench_function("slab_set_under_pressure", |b| {
        b.iter_batched(
            || {
                SlabEngine::new(SlabConfig {
                    min_chunk: 96,
                    max_chunk: 4096,
                    growth_factor: 1.25,
                    slab_size: 1024 * 1024,
                    mem_limit: 2 * 1024 * 1024, // only 2 slabs — forces eviction quickly
                    nbucket: 1024,
                    evict_policy: SlabEvictPolicy::Lru,
                    use_freeq: true,
                    use_cas: true,
                })
            },
            |mut engine| {
                for i in 0..5000 {
                    let key = format!("k-{i}");
                    let _ = engine.set(black_box(key.as_bytes()), black_box(b"0123456789".to_vec()), 0, EXPIRE_NEVER, 0);
                }
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_get_hit, bench_set_under_eviction_pressure);
criterion_main!(benches);
