use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use tenure::core::{InstanceId, LeaseKeys, Store};
use tenure::lease::LeaseProtocol;
use tenure::store::MemoryStore;
use tokio_util::sync::CancellationToken;

fn protocol(store: &MemoryStore, topic: &str) -> LeaseProtocol {
    let shared: Arc<dyn Store> = Arc::new(store.clone());
    LeaseProtocol::new(
        shared,
        LeaseKeys::new("bench", topic),
        InstanceId::random(),
        Duration::from_secs(15),
    )
}

fn bench_protocol(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");
    let cancel = CancellationToken::new();
    let store = MemoryStore::new();

    let leader = protocol(&store, "held");
    runtime.block_on(leader.obtain(&cancel)).expect("obtain");
    let follower = protocol(&store, "held");

    c.bench_function("renew_held_lease", |b| {
        b.iter(|| runtime.block_on(black_box(&leader).renew(&cancel)))
    });

    c.bench_function("check_held_lease", |b| {
        b.iter(|| runtime.block_on(black_box(&leader).check(&cancel)))
    });

    c.bench_function("contended_obtain", |b| {
        b.iter(|| runtime.block_on(black_box(&follower).obtain(&cancel)))
    });

    let churn = protocol(&store, "churn");
    c.bench_function("obtain_release_cycle", |b| {
        b.iter(|| {
            runtime.block_on(async {
                churn.obtain(&cancel).await.expect("obtain");
                churn.release(&cancel).await.expect("release");
            })
        })
    });
}

criterion_group!(benches, bench_protocol);
criterion_main!(benches);
