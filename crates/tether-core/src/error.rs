//! Error types for tether

use thiserror::Error;

/// Core tether errors
#[derive(Error, Debug)]
pub enum TetherError {
    // Resolution errors
    #[error("fetch failed for {entity} id {id}: {reason}")]
    Fetch {
        entity: String,
        id: String,
        reason: String,
    },

    #[error("malformed entry: {0}")]
    MalformedEntry(String),

    // Persistence errors
    #[error("save failed for {entity}: {reason}")]
    Save { entity: String, reason: String },

    #[error("update failed for {entity}: {reason}")]
    Update { entity: String, reason: String },

    #[error("persistence dispatch failed: {0}")]
    Dispatch(String),

    // Binding errors
    #[error("parent entity dropped while its collection was still in use")]
    ParentDetached,

    #[error("attribute not declared: {0}")]
    UnknownAttribute(String),

    #[error("attribute {0} does not hold key slots")]
    NotKeySlots(String),

    #[error("attribute {0} is managed by its bound collection")]
    SlotsManaged(String),

    #[error("collection not bound: {0}")]
    UnknownCollection(String),

    // Backend errors
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for tether operations
pub type TetherResult<T> = Result<T, TetherError>;
