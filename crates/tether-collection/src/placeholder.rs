//! Placeholder key assignment
//!
//! An entity added without a persisted primary key gets a synthetic
//! placeholder in its key slot, plus a single-use subscription on its
//! `Saved` signal. The first successful persistence locates the slot by
//! the placeholder value, swaps in the real primary key, emits the
//! collection's `Placeholder` event, and unregisters itself. A later,
//! unrelated save never re-triggers the swap.

use std::sync::Weak;

use tether_core::{Entity, EntitySignalKind, OwnerTag, PlaceholderKey, SlotKey};

use crate::collection::CollectionInner;
use crate::Collection;

/// Issue a placeholder slot key for `entity` and arm the one-shot swap.
pub(crate) fn assign(collection: &Collection, entity: &Entity) -> SlotKey {
    let key = PlaceholderKey::generate();
    arm(collection.downgrade(), entity, collection.tag(), key.clone());
    SlotKey::Placeholder(key)
}

fn arm(collection: Weak<CollectionInner>, entity: &Entity, tag: OwnerTag, key: PlaceholderKey) {
    let weak_entity = entity.downgrade();
    entity.signals().once(EntitySignalKind::Saved, tag, move |_| {
        let Some(entity) = weak_entity.upgrade() else {
            return;
        };
        let Some(primary) = entity.primary() else {
            // persisted without a key; stay armed for the next save
            tracing::warn!(entity = ?entity, "saved without a primary key; placeholder kept");
            arm(collection.clone(), &entity, tag, key.clone());
            return;
        };
        let Some(inner) = collection.upgrade() else {
            return;
        };
        Collection::from_inner(inner).swap_placeholder(&key, primary, &entity);
    });
}
