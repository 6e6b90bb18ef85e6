use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use tiercache_core::{
    CacheConfig, EvictionPolicyKind, GetOptions, SetOptions, TierDescriptor, TierKind,
};
use tiercache_engine::CacheCoordinator;
use tiercache_storage::{BackendTier, InMemoryBackend, MemoryTier, Tier};

fn bench_tiers() -> Vec<Arc<dyn Tier>> {
    vec![
        Arc::new(MemoryTier::new(
            TierDescriptor::new("memory", TierKind::Memory, 1, 16 * 1024 * 1024),
            EvictionPolicyKind::Lru,
        )) as Arc<dyn Tier>,
        Arc::new(BackendTier::new(
            TierDescriptor::new("remote", TierKind::Remote, 2, 64 * 1024 * 1024),
            InMemoryBackend::new(),
        )),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime")
}

fn bench_get_hit(c: &mut Criterion) {
    let rt = runtime();
    let cache = rt
        .block_on(CacheCoordinator::with_tiers(CacheConfig::default(), bench_tiers()))
        .expect("build coordinator");
    rt.block_on(cache.set("hot", b"value", SetOptions::new()))
        .expect("seed");

    c.bench_function("coordinator/get_memory_hit", |b| {
        b.iter(|| {
            let value = rt.block_on(cache.get(black_box("hot"), GetOptions::new()));
            black_box(value);
        });
    });
}

fn bench_set(c: &mut Criterion) {
    let rt = runtime();
    let cache = rt
        .block_on(CacheCoordinator::with_tiers(CacheConfig::default(), bench_tiers()))
        .expect("build coordinator");
    let payload = "lorem ipsum dolor sit amet ".repeat(80).into_bytes();

    c.bench_function("coordinator/set_multi_tier_compressed", |b| {
        b.iter(|| {
            rt.block_on(cache.set("doc", black_box(&payload), SetOptions::new()))
                .expect("set");
        });
    });
}

fn bench_encrypted_roundtrip(c: &mut Criterion) {
    let rt = runtime();
    let config = CacheConfig::default()
        .with_encryption(true)
        .with_encryption_key("11".repeat(32));
    let cache = rt
        .block_on(CacheCoordinator::with_tiers(config, bench_tiers()))
        .expect("build coordinator");
    let payload = vec![7u8; 4096];

    c.bench_function("coordinator/encrypted_roundtrip", |b| {
        b.iter(|| {
            rt.block_on(async {
                cache
                    .set("secret", black_box(&payload), SetOptions::new())
                    .await
                    .expect("set");
                black_box(cache.get("secret", GetOptions::new()).await);
            });
        });
    });
}

criterion_group!(benches, bench_get_hit, bench_set, bench_encrypted_roundtrip);
criterion_main!(benches);
