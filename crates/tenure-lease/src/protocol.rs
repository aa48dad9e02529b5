use std::sync::Arc;
use std::time::Duration;

use tenure_core::{InstanceId, LeaseCommand, LeaseKeys, Operation, Outcome, Store, StoreError};
use tokio_util::sync::CancellationToken;

use crate::error::LeaseError;

/// The four lease operations for one instance on one key.
///
/// Holds no state of its own; every call is a single atomic command against
/// the store, bounded by the caller's token and the optional per-call timeout.
/// Nothing is retried.
#[derive(Clone)]
pub struct LeaseProtocol {
    store: Arc<dyn Store>,
    keys: LeaseKeys,
    instance: InstanceId,
    validity: Duration,
    timeout: Option<Duration>,
}

impl LeaseProtocol {
    pub fn new(
        store: Arc<dyn Store>,
        keys: LeaseKeys,
        instance: InstanceId,
        validity: Duration,
    ) -> Self {
        Self {
            store,
            keys,
            instance,
            validity,
            timeout: None,
        }
    }

    /// Bounds every store call by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn keys(&self) -> &LeaseKeys {
        &self.keys
    }

    /// Creates the lease for this instance if nobody holds a live one.
    ///
    /// Fails with [`LeaseError::NotAcquired`] while any lease exists,
    /// including one held by this same instance.
    pub async fn obtain(&self, cancel: &CancellationToken) -> Result<(), LeaseError> {
        match self
            .call(Operation::Obtain, Some(self.validity), cancel)
            .await?
        {
            Outcome::Applied => Ok(()),
            Outcome::ConditionNotMet => Err(LeaseError::NotAcquired),
        }
    }

    /// Resets the lease TTL if this instance holds it.
    pub async fn renew(&self, cancel: &CancellationToken) -> Result<(), LeaseError> {
        self.holder_only(Operation::Renew, Some(self.validity), cancel)
            .await
    }

    /// Deletes the lease if this instance holds it. Otherwise nothing changes.
    pub async fn release(&self, cancel: &CancellationToken) -> Result<(), LeaseError> {
        self.holder_only(Operation::Release, None, cancel).await
    }

    /// Succeeds iff this instance holds the lease. Read-only.
    pub async fn check(&self, cancel: &CancellationToken) -> Result<(), LeaseError> {
        self.holder_only(Operation::Check, None, cancel).await
    }

    async fn holder_only(
        &self,
        operation: Operation,
        ttl: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<(), LeaseError> {
        match self.call(operation, ttl, cancel).await? {
            Outcome::Applied => Ok(()),
            Outcome::ConditionNotMet => Err(LeaseError::NotHolder(self.instance)),
        }
    }

    async fn call(
        &self,
        operation: Operation,
        ttl: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Outcome, StoreError> {
        let command = LeaseCommand {
            operation,
            key: self.keys.lease(),
            instance: self.instance,
            ttl,
        };
        let bounded = async {
            match self.timeout {
                Some(timeout) => tokio::time::timeout(timeout, self.store.execute(command))
                    .await
                    .unwrap_or(Err(StoreError::Timeout(timeout))),
                None => self.store.execute(command).await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StoreError::Cancelled),
            outcome = bounded => outcome,
        }
    }
}
