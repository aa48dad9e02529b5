use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tenure_core::{Broadcast, InstanceId, LeaseKeys, Store, Subscription};
use tenure_lease::prelude::*;
use tenure_lease::{ElectionMetrics, LeaseProtocol, NoopLogger};
use tenure_store::{FaultController, FaultyStore, MemoryStore};
use tokio::task::JoinHandle;

const VALIDITY: Duration = Duration::from_secs(1);
const OBTAIN_INTERVAL: Duration = Duration::from_millis(500);
const RENEW_BEFORE: Duration = Duration::from_millis(500);

fn fast_config<S: Store + 'static>(store: S, topic: &str) -> ElectorConfig {
    ElectorConfig::builder(store, topic)
        .min_validity(VALIDITY)
        .validity(VALIDITY)
        .obtain_interval(OBTAIN_INTERVAL)
        .renew_before(RENEW_BEFORE)
        .logger(NoopLogger)
        .build()
}

fn start<S: Store + 'static>(
    store: S,
    topic: &str,
    cancel: &CancellationToken,
) -> (ElectorHandle, JoinHandle<()>) {
    let elector = Elector::new(fast_config(store, topic)).unwrap();
    let handle = elector.handle();
    let task = tokio::spawn(elector.run(cancel.child_token()));
    (handle, task)
}

#[tokio::test(start_paused = true)]
async fn test_it_obtains_leader() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let (leader, _task) = start(store, "obtain", &cancel);

    leader.initialised().await;

    assert!(leader.is_leader());
    assert_eq!(leader.role(), Role::Leader);
    assert_eq!(leader.verify().await, Ok(()));
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_it_renews_leader() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let elector = Elector::new(fast_config(store, "renew")).unwrap();
    let metrics = elector.metrics().clone();
    let leader = elector.handle();
    tokio::spawn(elector.run(cancel.child_token()));

    leader.initialised().await;
    assert!(leader.is_leader());

    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(leader.is_leader());
    assert_eq!(leader.verify().await, Ok(()));
    assert!(metrics.renewals() >= 5, "renewals: {}", metrics.renewals());
    assert_eq!(metrics.is_leader(), 1);
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_only_one_obtains_leader() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let (first, _t1) = start(store.clone(), "only-one", &cancel);
    let (second, _t2) = start(store.clone(), "only-one", &cancel);

    first.initialised().await;
    second.initialised().await;

    assert_ne!(first.is_leader(), second.is_leader());
    let (leader, follower) = if first.is_leader() {
        (&first, &second)
    } else {
        (&second, &first)
    };
    assert_eq!(leader.verify().await, Ok(()));
    assert!(follower.verify().await.is_err());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(leader.is_leader());
    assert!(!follower.is_leader());
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_readiness_fires_once_for_a_follower() {
    let store = MemoryStore::new();
    let squatter = LeaseProtocol::new(
        Arc::new(store.clone()),
        LeaseKeys::new("tenure", "readiness"),
        InstanceId::random(),
        Duration::from_secs(30),
    );
    squatter.obtain(&CancellationToken::new()).await.unwrap();

    let cancel = CancellationToken::new();
    let elector = Elector::new(fast_config(store, "readiness")).unwrap();
    let handle = elector.handle();
    let mut readiness = handle.readiness();
    assert!(!handle.is_initialised());
    tokio::spawn(elector.run(cancel.child_token()));

    readiness.changed().await.unwrap();
    assert!(*readiness.borrow_and_update());
    assert!(!handle.is_leader());

    // Several more failed attempts must not signal again.
    tokio::time::sleep(OBTAIN_INTERVAL * 5).await;
    assert!(!readiness.has_changed().unwrap());
    assert!(handle.is_initialised());
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_follower_takes_over_from_stalled_leader() {
    let store = MemoryStore::new();
    // A leader that obtained the lease and then froze: it never renews.
    let stalled = LeaseProtocol::new(
        Arc::new(store.clone()),
        LeaseKeys::new("tenure", "failover"),
        InstanceId::random(),
        VALIDITY,
    );
    stalled.obtain(&CancellationToken::new()).await.unwrap();

    let cancel = CancellationToken::new();
    let (follower, _task) = start(store, "failover", &cancel);
    follower.initialised().await;
    assert!(!follower.is_leader());

    tokio::time::sleep(VALIDITY + OBTAIN_INTERVAL + Duration::from_millis(100)).await;

    assert!(follower.is_leader());
    assert_eq!(follower.verify().await, Ok(()));
    assert!(stalled.check(&CancellationToken::new()).await.is_err());
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_partitioned_leader_steps_down_and_follower_takes_over() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();

    let (first_store, first_faults): (_, FaultController) = FaultyStore::new(store.clone());
    let (first, _t1) = start(first_store, "partition", &cancel);
    first.initialised().await;
    assert!(first.is_leader());

    let (second, _t2) = start(store.clone(), "partition", &cancel);
    second.initialised().await;
    assert!(!second.is_leader());

    first_faults.partition();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(!first.is_leader(), "partitioned leader kept its role");
    assert!(second.is_leader());

    first_faults.heal();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!first.is_leader());
    assert!(second.is_leader());
    assert_eq!(store.holder("tenure:partition"), Some(second.instance()));
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_leader_releases_lease_when_cancelled() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let (leader, task) = start(store.clone(), "release", &cancel);
    leader.initialised().await;
    assert_eq!(store.holder("tenure:release"), Some(leader.instance()));

    cancel.cancel();
    task.await.unwrap();

    assert!(!leader.is_leader());
    assert_eq!(store.holder("tenure:release"), None);
}

#[tokio::test(start_paused = true)]
async fn test_clean_shutdown_hands_over_quickly() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let (first, first_task) = start(store.clone(), "handover", &cancel);
    first.initialised().await;
    let (second, _t2) = start(store.clone(), "handover", &cancel);
    second.initialised().await;
    assert!(!second.is_leader());
    // Let the follower's subscription settle.
    tokio::time::sleep(Duration::from_millis(10)).await;

    first.stop();
    first_task.await.unwrap();

    // The eviction broadcast lets the follower in well before the lease
    // would have expired or the next obtain tick come round.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(second.is_leader());
    cancel.cancel();
}

async fn evicted_within(subscription: &mut Subscription, wait: Duration) -> bool {
    matches!(
        tokio::time::timeout(wait, subscription.next()).await,
        Ok(Some(payload)) if payload == tenure_lease::EVICTED
    )
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_slow_renewal_still_releases() {
    let store = MemoryStore::new();
    let (faulty, faults) = FaultyStore::new(store.clone());
    let cancel = CancellationToken::new();
    let (leader, task) = start(faulty, "slow-renew", &cancel);
    leader.initialised().await;
    assert!(leader.is_leader());
    let mut evictions = store.subscribe("notify:tenure:slow-renew").await.unwrap();

    // The renewal due at 500ms is still waiting on the store when we cancel.
    faults.set_latency(Duration::from_millis(200));
    tokio::time::sleep(Duration::from_millis(600)).await;
    cancel.cancel();
    task.await.unwrap();

    assert!(!leader.is_leader());
    assert_eq!(store.holder("tenure:slow-renew"), None);
    assert!(evicted_within(&mut evictions, Duration::from_millis(10)).await);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_check_demotes_leader_the_store_no_longer_names() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let config = ElectorConfig::builder(store.clone(), "mismatch")
        .min_validity(VALIDITY)
        .validity(VALIDITY)
        .obtain_interval(OBTAIN_INTERVAL)
        .renew_before(RENEW_BEFORE)
        .check_interval(Duration::from_millis(100))
        .logger(NoopLogger)
        .build();
    let elector = Elector::new(config).unwrap();
    let metrics = elector.metrics().clone();
    let leader = elector.handle();
    tokio::spawn(elector.run(cancel.child_token()));
    leader.initialised().await;
    assert_eq!(metrics.is_leader(), 1);
    let mut evictions = store.subscribe("notify:tenure:mismatch").await.unwrap();

    // Behind the engine's back, the lease is dropped and taken by someone
    // else well before the next renewal would notice.
    let keys = LeaseKeys::new("tenure", "mismatch");
    let shared: Arc<dyn Store> = Arc::new(store.clone());
    LeaseProtocol::new(Arc::clone(&shared), keys.clone(), leader.instance(), VALIDITY)
        .release(&CancellationToken::new())
        .await
        .unwrap();
    let usurper = InstanceId::random();
    LeaseProtocol::new(shared, keys, usurper, VALIDITY)
        .obtain(&CancellationToken::new())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(!leader.is_leader());
    assert_eq!(metrics.is_leader(), 0);
    assert_eq!(metrics.renewals(), 0);
    assert!(evicted_within(&mut evictions, Duration::from_millis(10)).await);
    assert_eq!(store.holder("tenure:mismatch"), Some(usurper));
    cancel.cancel();
}

#[tokio::test]
async fn test_default_metrics_are_scoped_by_namespace() {
    let registry = prometheus::Registry::new();
    for namespace in ["billing", "payroll"] {
        let elector = Elector::new(
            ElectorConfig::builder(MemoryStore::new(), "shared")
                .namespace(namespace)
                .build(),
        )
        .unwrap();
        elector.metrics().register(&registry).unwrap();
    }

    let text = prometheus::TextEncoder::new()
        .encode_to_string(&registry.gather())
        .unwrap();
    assert!(text.contains("tenure_is_leader{namespace=\"billing\",topic=\"shared\"} 0"));
    assert!(text.contains("tenure_is_leader{namespace=\"payroll\",topic=\"shared\"} 0"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let (leader, task) = start(store.clone(), "double-stop", &cancel);
    leader.initialised().await;

    leader.stop();
    leader.stop();
    task.await.unwrap();
    leader.stop();

    assert!(leader.is_stopped());
    assert!(!leader.is_leader());
    assert_eq!(store.holder("tenure:double-stop"), None);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_before_run_never_attempts() {
    let store = MemoryStore::new();
    let elector = Elector::new(fast_config(store.clone(), "early-stop")).unwrap();
    let metrics = elector.metrics().clone();
    let handle = elector.handle();

    handle.stop();
    elector.run(CancellationToken::new()).await;

    assert_eq!(metrics.attempts(), 0);
    assert!(!handle.is_initialised());
    assert_eq!(store.holder("tenure:early-stop"), None);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_store_keeps_follower_running() {
    let (faulty, faults) = FaultyStore::new(MemoryStore::new());
    faults.partition();
    let cancel = CancellationToken::new();
    let elector = Elector::new(fast_config(faulty, "unreachable")).unwrap();
    let metrics = elector.metrics().clone();
    let handle = elector.handle();
    let task = tokio::spawn(elector.run(cancel.child_token()));

    handle.initialised().await;
    assert!(!handle.is_leader());

    tokio::time::sleep(OBTAIN_INTERVAL * 4).await;
    assert!(metrics.attempts() >= 4);
    assert!(!task.is_finished());

    faults.heal();
    tokio::time::sleep(OBTAIN_INTERVAL * 2).await;
    assert!(handle.is_leader());
    cancel.cancel();
}

#[tokio::test]
async fn test_config_rejection() {
    let store = MemoryStore::new();

    let short = ElectorConfig::builder(store.clone(), "config")
        .validity(Duration::from_secs(5))
        .build();
    assert!(matches!(
        Elector::new(short),
        Err(ConfigError::ValidityTooShort { .. })
    ));

    let renew = ElectorConfig::builder(store.clone(), "config")
        .renew_before(Duration::from_secs(15))
        .build();
    assert!(matches!(
        Elector::new(renew),
        Err(ConfigError::RenewBeforeTooLong { .. })
    ));

    let obtain = ElectorConfig::builder(store.clone(), "config")
        .obtain_interval(Duration::from_secs(15))
        .build();
    assert!(matches!(
        Elector::new(obtain),
        Err(ConfigError::ObtainIntervalTooLong { .. })
    ));

    let topic = ElectorConfig::builder(store, "").build();
    assert!(matches!(Elector::new(topic), Err(ConfigError::EmptyTopic)));
}

#[tokio::test]
async fn test_settings_load_from_json() {
    let settings: ElectionSettings = serde_json::from_str(
        r#"{"validity_ms": 20000, "obtain_interval_ms": 2500, "namespace": "billing"}"#,
    )
    .unwrap();

    assert_eq!(settings.validity, Duration::from_secs(20));
    assert_eq!(settings.obtain_interval, Duration::from_millis(2500));
    assert_eq!(settings.renew_before, Duration::from_secs(3));
    assert_eq!(settings.operation_timeout, None);
    assert_eq!(settings.namespace, "billing");

    let elector = Elector::new(
        ElectorConfig::builder(MemoryStore::new(), "json")
            .settings(settings)
            .build(),
    )
    .unwrap();
    assert_eq!(elector.keys().lease(), "billing:json");
    assert_eq!(elector.keys().channel(), "notify:billing:json");
}

#[tokio::test(start_paused = true)]
async fn test_caller_supplied_metrics_are_updated() {
    let metrics = ElectionMetrics::new("custom", "metrics").unwrap();
    let registry = prometheus::Registry::new();
    metrics.register(&registry).unwrap();

    let cancel = CancellationToken::new();
    let config = ElectorConfig::builder(MemoryStore::new(), "metrics")
        .min_validity(VALIDITY)
        .validity(VALIDITY)
        .obtain_interval(OBTAIN_INTERVAL)
        .renew_before(RENEW_BEFORE)
        .metrics(metrics.clone())
        .build();
    let elector = Elector::new(config).unwrap();
    let handle = elector.handle();
    tokio::spawn(elector.run(cancel.child_token()));

    handle.initialised().await;
    assert_eq!(metrics.is_leader(), 1);
    assert_eq!(metrics.attempts(), 1);
    cancel.cancel();
}
