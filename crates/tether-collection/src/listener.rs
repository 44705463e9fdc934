//! Listener bridge
//!
//! Wires a member's self-lifecycle signals into its collection: a
//! `Removing` signal drops the member from the collection, and a primary-key
//! `Change` overwrites the member's key slot. Both subscriptions carry the
//! collection's owner tag, so detaching one collection leaves any other
//! collection observing the same entity untouched.
//!
//! Handlers capture the collection and the entity weakly; once either side
//! is gone they degrade to no-ops.

use tether_core::{Entity, EntitySignal, EntitySignalKind, KeyValue, SlotKey};

use crate::Collection;

/// Subscribe the two bridge handlers for `entity` on behalf of
/// `collection`.
pub(crate) fn attach(collection: &Collection, entity: &Entity) {
    let tag = collection.tag();

    let weak_collection = collection.downgrade();
    let weak_entity = entity.downgrade();
    entity
        .signals()
        .on(EntitySignalKind::Removing, tag, move |_| {
            let (Some(inner), Some(entity)) = (weak_collection.upgrade(), weak_entity.upgrade())
            else {
                return;
            };
            Collection::from_inner(inner).remove(&entity);
        });

    let weak_collection = collection.downgrade();
    let weak_entity = entity.downgrade();
    let primary_field = collection.behavior().primary_field().to_owned();
    entity
        .signals()
        .on(EntitySignalKind::Change, tag, move |signal| {
            let EntitySignal::Change { field, value, .. } = signal else {
                return;
            };
            if field != &primary_field {
                return;
            }
            let (Some(inner), Some(entity)) = (weak_collection.upgrade(), weak_entity.upgrade())
            else {
                return;
            };
            let collection = Collection::from_inner(inner);
            let Some(index) = collection.index_of(&entity) else {
                return;
            };
            let Some(key) = KeyValue::from_json(value) else {
                tracing::warn!(
                    collection = %collection.name(),
                    "primary key changed to a non-key value; slot left as-is"
                );
                return;
            };
            let _ = collection.set_slot(index, SlotKey::Primary(key));
        });
}

/// Remove exactly the two bridge subscriptions belonging to `collection`.
/// A placeholder's one-shot `Saved` subscription is not a bridge
/// subscription and survives detach.
pub(crate) fn detach(collection: &Collection, entity: &Entity) {
    let tag = collection.tag();
    entity.signals().off(EntitySignalKind::Removing, tag);
    entity.signals().off(EntitySignalKind::Change, tag);
}
