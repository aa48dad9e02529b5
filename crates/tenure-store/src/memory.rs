use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use tenure_core::{
    Broadcast, InstanceId, LeaseCommand, LeaseStore, Operation, Outcome, StoreError, Subscription,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

/// Messages buffered per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy)]
struct Record {
    holder: InstanceId,
    expires_at: Instant,
}

#[derive(Default)]
struct Shared {
    leases: Mutex<HashMap<String, Record>>,
    channels: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

/// An in-process lease store.
///
/// Every command runs under a single lock, which is what makes the four lease
/// operations atomic. Expiry follows tokio's clock, so tests running with a
/// paused clock see leases lapse deterministically. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live holder of `key`, if any.
    pub fn holder(&self, key: &str) -> Option<InstanceId> {
        let now = Instant::now();
        self.leases()
            .get(key)
            .filter(|record| record.expires_at > now)
            .map(|record| record.holder)
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscribers(&self, channel: &str) -> usize {
        self.channels()
            .get(channel)
            .map_or(0, |sender| sender.receiver_count())
    }

    fn leases(&self) -> MutexGuard<'_, HashMap<String, Record>> {
        self.shared
            .leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<Vec<u8>>>> {
        self.shared
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LeaseStore for MemoryStore {
    async fn execute(&self, command: LeaseCommand<'_>) -> Result<Outcome, StoreError> {
        let ttl = match (command.operation.requires_ttl(), command.ttl) {
            (true, Some(ttl)) if !ttl.is_zero() => Some(ttl),
            (true, _) => {
                return Err(StoreError::InvalidCommand(format!(
                    "{} requires a non-zero ttl",
                    command.operation.name()
                )));
            }
            (false, _) => None,
        };

        let now = Instant::now();
        let mut leases = self.leases();
        if leases
            .get(command.key)
            .is_some_and(|record| record.expires_at <= now)
        {
            leases.remove(command.key);
        }

        let held_by_caller = leases
            .get(command.key)
            .is_some_and(|record| record.holder == command.instance);

        let outcome = match (command.operation, ttl) {
            (Operation::Obtain, Some(ttl)) => {
                if leases.contains_key(command.key) {
                    Outcome::ConditionNotMet
                } else {
                    leases.insert(
                        command.key.to_string(),
                        Record {
                            holder: command.instance,
                            expires_at: now + ttl,
                        },
                    );
                    Outcome::Applied
                }
            }
            (Operation::Renew, Some(ttl)) if held_by_caller => {
                if let Some(record) = leases.get_mut(command.key) {
                    record.expires_at = now + ttl;
                }
                Outcome::Applied
            }
            (Operation::Release, _) if held_by_caller => {
                leases.remove(command.key);
                Outcome::Applied
            }
            (Operation::Check, _) if held_by_caller => Outcome::Applied,
            _ => Outcome::ConditionNotMet,
        };

        tracing::trace!(
            operation = command.operation.name(),
            key = command.key,
            instance = %command.instance,
            ?outcome,
            "executed lease command"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl Broadcast for MemoryStore {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), StoreError> {
        let mut channels = self.channels();
        let listeners = channels
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count);
        let delivered = if listeners == 0 {
            channels.remove(channel);
            0
        } else {
            channels
                .get(channel)
                .map_or(0, |sender| sender.send(payload.to_vec()).unwrap_or(0))
        };
        drop(channels);
        tracing::trace!(channel, delivered, "published message");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        let mut channels = self.channels();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        let receiver = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        drop(channels);

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => return Some((payload, receiver)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "subscriber lagged behind channel");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}
