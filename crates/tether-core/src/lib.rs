//! Tether Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout tether:
//! - Key types (`KeyValue`, `PlaceholderKey`, `SlotKey`, `OwnerTag`)
//! - Attribute payloads (`Attrs`)
//! - Lifecycle signals and the owner-tagged emitter
//! - The `Entity` handle and its `EntityBehavior` persistence seam

pub mod key;
pub mod attrs;
pub mod signal;
pub mod emitter;
pub mod entity;
pub mod error;

pub use key::*;
pub use attrs::*;
pub use signal::*;
pub use emitter::*;
pub use entity::*;
pub use error::*;
