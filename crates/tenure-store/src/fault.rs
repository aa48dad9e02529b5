use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tenure_core::{Broadcast, LeaseCommand, LeaseStore, Outcome, StoreError, Subscription};

#[derive(Debug, Default)]
struct FaultState {
    partitioned: AtomicBool,
    latency_ms: AtomicU64,
}

/// Switches faults on and off for one [`FaultyStore`].
#[derive(Debug, Clone)]
pub struct FaultController {
    state: Arc<FaultState>,
}

impl FaultController {
    /// Cuts the store off. Calls fail and messages read from existing
    /// subscriptions while partitioned are discarded.
    pub fn partition(&self) {
        self.state.partitioned.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.state.partitioned.store(false, Ordering::SeqCst);
    }

    pub fn is_partitioned(&self) -> bool {
        self.state.partitioned.load(Ordering::SeqCst)
    }

    /// Delay added before every call reaches the inner store.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.state.latency_ms.store(millis, Ordering::SeqCst);
    }
}

/// Wraps a store and injects partitions and latency on demand.
///
/// Each wrapper has its own controller, so several electors sharing one inner
/// store can be cut off independently.
pub struct FaultyStore<S> {
    inner: S,
    state: Arc<FaultState>,
}

impl<S> FaultyStore<S> {
    pub fn new(inner: S) -> (Self, FaultController) {
        let state = Arc::new(FaultState::default());
        let controller = FaultController {
            state: Arc::clone(&state),
        };
        (Self { inner, state }, controller)
    }

    async fn gate(&self) -> Result<(), StoreError> {
        let latency = self.state.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.state.partitioned.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("network partition".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: LeaseStore> LeaseStore for FaultyStore<S> {
    async fn execute(&self, command: LeaseCommand<'_>) -> Result<Outcome, StoreError> {
        self.gate().await?;
        self.inner.execute(command).await
    }
}

#[async_trait]
impl<S: Broadcast> Broadcast for FaultyStore<S> {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), StoreError> {
        self.gate().await?;
        self.inner.publish(channel, payload).await
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        self.gate().await?;
        let state = Arc::clone(&self.state);
        let stream = self
            .inner
            .subscribe(channel)
            .await?
            .filter(move |_| {
                let delivered = !state.partitioned.load(Ordering::SeqCst);
                futures::future::ready(delivered)
            });
        Ok(stream.boxed())
    }
}
