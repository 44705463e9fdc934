//! Lifecycle signals
//!
//! Three signal alphabets flow through tether: an entity's self-reported
//! lifecycle, the collection-level events derived from it, and the parent
//! entity's own lifecycle. Each signal maps to a `Kind` discriminant so
//! emitter subscriptions can select exactly the signals they care about.

use serde_json::Value;

use crate::Entity;

/// Anything that can be emitted carries a kind for subscription filtering.
pub trait Signal: Send + 'static {
    type Kind: Copy + Eq + Send;

    fn kind(&self) -> Self::Kind;
}

/// Signals an entity raises about itself.
#[derive(Clone, Debug)]
pub enum EntitySignal {
    /// An attribute changed value.
    Change {
        field: String,
        value: Value,
        prev: Option<Value>,
    },
    /// The entity is going away and should leave every collection it is in.
    Removing,
    /// A persistence operation is about to run.
    Saving,
    /// A persistence operation succeeded.
    Saved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntitySignalKind {
    Change,
    Removing,
    Saving,
    Saved,
}

impl Signal for EntitySignal {
    type Kind = EntitySignalKind;

    fn kind(&self) -> EntitySignalKind {
        match self {
            EntitySignal::Change { .. } => EntitySignalKind::Change,
            EntitySignal::Removing => EntitySignalKind::Removing,
            EntitySignal::Saving => EntitySignalKind::Saving,
            EntitySignal::Saved => EntitySignalKind::Saved,
        }
    }
}

/// Collection-level events.
#[derive(Clone, Debug)]
pub enum CollectionEvent {
    /// A member entered the collection.
    Add(Entity),
    /// A member left the collection.
    Remove(Entity),
    /// A member's placeholder slot was swapped for its real primary key.
    Placeholder(Entity),
    /// A persistence batch is starting.
    Saving,
    /// A persistence batch completed.
    Saved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollectionEventKind {
    Add,
    Remove,
    Placeholder,
    Saving,
    Saved,
}

impl Signal for CollectionEvent {
    type Kind = CollectionEventKind;

    fn kind(&self) -> CollectionEventKind {
        match self {
            CollectionEvent::Add(_) => CollectionEventKind::Add,
            CollectionEvent::Remove(_) => CollectionEventKind::Remove,
            CollectionEvent::Placeholder(_) => CollectionEventKind::Placeholder,
            CollectionEvent::Saving => CollectionEventKind::Saving,
            CollectionEvent::Saved => CollectionEventKind::Saved,
        }
    }
}

impl CollectionEvent {
    /// The member this event concerns, when it concerns one.
    pub fn entity(&self) -> Option<&Entity> {
        match self {
            CollectionEvent::Add(e)
            | CollectionEvent::Remove(e)
            | CollectionEvent::Placeholder(e) => Some(e),
            _ => None,
        }
    }
}

/// Parent-entity lifecycle signals.
#[derive(Clone, Debug)]
pub enum ParentSignal {
    /// The parent finished constructing; bound collections exist and are
    /// seeded.
    Construct,
    /// The parent is being saved.
    Saving,
    /// The parent finished saving.
    Saved,
    /// A parent attribute changed (collections bubble membership changes
    /// here).
    Change { name: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParentSignalKind {
    Construct,
    Saving,
    Saved,
    Change,
}

impl Signal for ParentSignal {
    type Kind = ParentSignalKind;

    fn kind(&self) -> ParentSignalKind {
        match self {
            ParentSignal::Construct => ParentSignalKind::Construct,
            ParentSignal::Saving => ParentSignalKind::Saving,
            ParentSignal::Saved => ParentSignalKind::Saved,
            ParentSignal::Change { .. } => ParentSignalKind::Change,
        }
    }
}
