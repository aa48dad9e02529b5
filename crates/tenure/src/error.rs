use thiserror::Error;

/// Unified error type for the `tenure` crates.
///
/// Aggregates errors from the sub-crates into a single type for
/// application-level error handling.
#[derive(Error, Debug)]
pub enum TenureError {
    /// The elector configuration was rejected.
    #[error("Configuration error: {0}")]
    Config(#[from] tenure_lease::ConfigError),

    /// A lease protocol call failed.
    #[error("Lease error: {0}")]
    Lease(#[from] tenure_lease::LeaseError),

    /// The store could not be reached or refused a command.
    #[error("Store error: {0}")]
    Store(#[from] tenure_core::StoreError),

    /// Metrics could not be built or registered.
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// The telemetry pipeline could not be installed.
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Standard IO error.
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}
