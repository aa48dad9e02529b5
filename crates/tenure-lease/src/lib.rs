//! Lease-Based Leader Election
//!
//! Exactly one instance per topic believes it is leader. Leadership is a lease
//! record in a shared store: obtained when absent, renewed before it lapses,
//! released on the way out, and verified every second in case the store and
//! the local belief drift apart.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Elector::run                          │
//! │   attempt ◄── obtain tick / eviction        fallback tick    │
//! │      │                                           │           │
//! │      ▼                                           ▼           │
//! │  ┌──────────────┐   renew-due   ┌─────────────────────────┐  │
//! │  │    Engine    │◄──────────────│   renewal scheduler     │  │
//! │  │ (sole writer)│               └─────────────────────────┘  │
//! │  └──────────────┘◄── evicted ───┌─────────────────────────┐  │
//! │      │       │                  │   EvictionNotifier      │  │
//! │      ▼       └── publish ──────►└─────────────────────────┘  │
//! │  ┌──────────────┐                                            │
//! │  │LeaseProtocol │ obtain · renew · release · check           │
//! │  └──────────────┘                                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Helper tasks reach the engine only through single-slot queues, so bursts
//! collapse and the role has exactly one writer.

pub mod config;
pub mod engine;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod notifier;
pub mod protocol;
mod renewal;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::{ElectionSettings, ElectorConfig, ElectorConfigBuilder, MIN_VALIDITY};
pub use engine::{Elector, ElectorHandle, Role};
pub use error::{ConfigError, LeaseError};
pub use logger::{Field, Logger, NoopLogger, TracingLogger};
pub use metrics::ElectionMetrics;
pub use notifier::{EVICTED, EvictionNotifier};
pub use protocol::LeaseProtocol;

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common use cases.
pub mod prelude {
    pub use crate::{
        ConfigError, ElectionSettings, Elector, ElectorConfig, ElectorHandle, LeaseError, Logger,
        Role, TracingLogger,
    };
    pub use tokio_util::sync::CancellationToken;
}
