use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::InstanceId;

/// The four atomic lease operations a store must be able to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create the record for the instance iff no live record exists.
    Obtain,
    /// Reset the TTL iff the instance is the current holder.
    Renew,
    /// Delete the record iff the instance is the current holder.
    Release,
    /// Succeed iff the instance is the current holder. Never mutates.
    Check,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Obtain => "obtain",
            Operation::Renew => "renew",
            Operation::Release => "release",
            Operation::Check => "check",
        }
    }

    /// Whether the operation carries a TTL.
    pub fn requires_ttl(&self) -> bool {
        matches!(self, Operation::Obtain | Operation::Renew)
    }
}

/// One named operation against a single lease key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseCommand<'a> {
    pub operation: Operation,
    pub key: &'a str,
    pub instance: InstanceId,
    /// Lease validity for `Obtain` and `Renew`; ignored otherwise.
    pub ttl: Option<Duration>,
}

/// What a store reports for a command that reached it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The holder/existence precondition of the operation did not hold.
    ConditionNotMet,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store call cancelled")]
    Cancelled,

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// Stream of raw payloads received on a subscribed channel.
pub type Subscription = BoxStream<'static, Vec<u8>>;

/// Executes lease operations atomically.
///
/// Implementations must be cancel-safe: dropping the returned future is how
/// callers enforce per-call deadlines.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    async fn execute(&self, command: LeaseCommand<'_>) -> Result<Outcome, StoreError>;
}

/// Fire-and-forget publish/subscribe on named channels.
#[async_trait]
pub trait Broadcast: Send + Sync {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), StoreError>;

    /// Subscribes to `channel`. The stream yields every payload published after
    /// the subscription is established, until it is dropped.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError>;
}

/// A backend offering both capabilities, which is what an elector needs.
pub trait Store: LeaseStore + Broadcast {}

impl<T: LeaseStore + Broadcast + ?Sized> Store for T {}
