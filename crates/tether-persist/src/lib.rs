//! Tether Persist - Persistence coordination for bound collections
//!
//! Partitions a collection's members into new and changed-persisted sets on
//! a parent save, dispatches the matching per-entity operation for each
//! member concurrently, and brackets every non-empty batch with
//! collection-level `Saving`/`Saved` events using a fan-out/fan-in
//! countdown.

pub mod coordinator;

pub use coordinator::*;
