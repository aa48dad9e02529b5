// tenure facade
// Re-exports the workspace crates behind one dependency.

pub mod error;
pub mod telemetry;

pub use tenure_core as core;
pub use tenure_lease as lease;
#[cfg(feature = "memory-store")]
pub use tenure_store as store;

pub use error::TenureError;
pub use tenure_lease::prelude::*;
