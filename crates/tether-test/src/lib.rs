//! Tether Test - Shared harness for exercising collections end to end
//!
//! Provides `MemoryBackend`, an in-memory `EntityBehavior` with sequential
//! key issue, a fetch table, call counters, optional latency and injectable
//! failures. The scenario and property tests in this crate drive the whole
//! stack (parent binding, reconciliation, listener bridge, persistence
//! coordination) against it.

pub mod backend;

pub use backend::*;

#[cfg(test)]
mod scenarios;

#[cfg(test)]
mod invariants;
