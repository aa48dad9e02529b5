use std::time::Duration;

use tenure_core::{InstanceId, StoreError};
use thiserror::Error;

/// Result of a lease protocol call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeaseError {
    /// Another instance holds a live lease. Expected and frequent for followers.
    #[error("lease is held by another instance")]
    NotAcquired,

    /// The instance is not the current holder (renew, release and check).
    #[error("instance {0} does not hold the lease")]
    NotHolder(InstanceId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LeaseError {
    /// True for the benign "someone else is leader" outcome of obtain.
    pub fn is_not_acquired(&self) -> bool {
        matches!(self, LeaseError::NotAcquired)
    }
}

/// Rejected elector configuration. Raised by `Elector::new`, never at runtime.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("validity must be >= {min:?}, got {validity:?}")]
    ValidityTooShort { validity: Duration, min: Duration },

    #[error("renew_before ({renew_before:?}) must be smaller than validity ({validity:?})")]
    RenewBeforeTooLong {
        renew_before: Duration,
        validity: Duration,
    },

    #[error("obtain_interval ({obtain_interval:?}) must be smaller than validity ({validity:?})")]
    ObtainIntervalTooLong {
        obtain_interval: Duration,
        validity: Duration,
    },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("namespace must not be empty")]
    EmptyNamespace,

    #[error("failed to build election metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}
