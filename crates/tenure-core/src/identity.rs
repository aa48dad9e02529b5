use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Namespace prepended to every topic when no other is configured.
pub const DEFAULT_NAMESPACE: &str = "tenure";

/// The ownership token of one participating instance.
///
/// Generated once per engine and never changed, so a lease record in the
/// store can always be traced back to the process that wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub u128);

impl InstanceId {
    /// Draws a fresh 128-bit identifier from the thread-local RNG.
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid instance id {0:?}: expected 32 hex digits")]
pub struct ParseInstanceIdError(String);

impl FromStr for InstanceId {
    type Err = ParseInstanceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(ParseInstanceIdError(s.to_string()));
        }
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| ParseInstanceIdError(s.to_string()))
    }
}

/// Store key and broadcast channel derived from a topic.
///
/// The lease lives at `<namespace>:<topic>` and evictions are announced on
/// `notify:<namespace>:<topic>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseKeys {
    lease: String,
    channel: String,
}

impl LeaseKeys {
    pub fn new(namespace: &str, topic: &str) -> Self {
        let lease = format!("{namespace}:{topic}");
        let channel = format!("notify:{lease}");
        Self { lease, channel }
    }

    /// Key of the lease record.
    pub fn lease(&self) -> &str {
        &self.lease
    }

    /// Channel eviction broadcasts are published on.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}
