//! Store adapters for tenure.
//!
//! [`MemoryStore`] keeps leases and channels in process memory and is what the
//! test suites and the demo CLI run against. [`FaultyStore`] wraps any store and
//! lets a caller partition it or slow it down.

mod fault;
mod memory;

pub use fault::{FaultController, FaultyStore};
pub use memory::MemoryStore;
