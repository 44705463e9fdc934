//! Collection core
//!
//! An ordered container of entity handles bound to exactly one parent
//! attribute. Every mutation updates the member sequence and the parent's
//! key slot array together, inside one critical section, so the two stay
//! the same length with `slots[i]` identifying `members[i]` at every
//! observable point.
//!
//! Lock order is members, then parent bag. Signals are always emitted with
//! no lock held, so handlers may re-enter the collection.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use tether_core::{
    Attrs, CollectionEvent, Emitter, Entity, EntityBehavior, KeyValue, OwnerTag, PlaceholderKey,
    SlotKey, TetherError, TetherResult,
};

use crate::parent::{Parent, ParentInner};
use crate::{listener, placeholder};

/// Per-collection behavior switches.
#[derive(Clone, Debug)]
pub struct CollectionOptions {
    /// Dispatch `update` for dirty persisted members on a parent save.
    pub update_changed: bool,
    /// Dispatch `save` for unpersisted members on a parent save.
    pub save_new: bool,
    /// Debounce window for triggering a parent save after a placeholder
    /// slot is swapped for a real key. `None` disables the trigger.
    pub save_on_placeholder: Option<Duration>,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        CollectionOptions {
            update_changed: true,
            save_new: true,
            save_on_placeholder: None,
        }
    }
}

/// Input to `add` / `add_at`: raw attributes or an existing entity handle.
pub enum Member {
    Attrs(Attrs),
    Entity(Entity),
}

impl From<Attrs> for Member {
    fn from(attrs: Attrs) -> Self {
        Member::Attrs(attrs)
    }
}

impl From<Entity> for Member {
    fn from(entity: Entity) -> Self {
        Member::Entity(entity)
    }
}

pub(crate) struct CollectionInner {
    tag: OwnerTag,
    name: String,
    behavior: Arc<dyn EntityBehavior>,
    parent: Weak<ParentInner>,
    members: Mutex<Vec<Entity>>,
    events: Emitter<CollectionEvent>,
    options: CollectionOptions,
}

/// Handle to an ordered entity collection bound to one parent attribute.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

impl Collection {
    pub(crate) fn create(
        parent: &Parent,
        name: &str,
        behavior: Arc<dyn EntityBehavior>,
        options: CollectionOptions,
    ) -> Self {
        Collection {
            inner: Arc::new(CollectionInner {
                tag: OwnerTag::next(),
                name: name.to_owned(),
                behavior,
                parent: Arc::downgrade(parent.inner()),
                members: Mutex::new(Vec::new()),
                events: Emitter::new(),
                options,
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<CollectionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<CollectionInner>) -> Self {
        Collection { inner }
    }

    pub(crate) fn tag(&self) -> OwnerTag {
        self.inner.tag
    }

    /// The parent attribute this collection is bound to.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn behavior(&self) -> &Arc<dyn EntityBehavior> {
        &self.inner.behavior
    }

    pub fn options(&self) -> &CollectionOptions {
        &self.inner.options
    }

    pub fn events(&self) -> &Emitter<CollectionEvent> {
        &self.inner.events
    }

    pub fn len(&self) -> usize {
        self.inner.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.members.lock().is_empty()
    }

    /// Insert a member at `position` (clamped to the current length).
    ///
    /// Raw attributes construct a new entity through the collection's
    /// behavior; an entity handle is kept as-is. The matching key slot
    /// (the persisted primary key, or a fresh placeholder) is inserted at
    /// the same position in the same critical section. Attaches the
    /// listener bridge and emits `Add`.
    pub fn add_at(&self, position: usize, member: impl Into<Member>) -> TetherResult<Entity> {
        let parent = self
            .inner
            .parent
            .upgrade()
            .ok_or(TetherError::ParentDetached)?;

        let entity = match member.into() {
            Member::Entity(entity) => entity,
            Member::Attrs(attrs) => Entity::new(Arc::clone(&self.inner.behavior), attrs),
        };

        let key = match entity.primary() {
            Some(primary) => SlotKey::Primary(primary),
            None => placeholder::assign(self, &entity),
        };

        {
            let mut members = self.inner.members.lock();
            let position = position.min(members.len());
            parent.with_slots(&self.inner.name, |slots| slots.insert(position, key))?;
            members.insert(position, entity.clone());
        }

        listener::attach(self, &entity);
        self.inner.events.emit(CollectionEvent::Add(entity.clone()));
        Ok(entity)
    }

    /// Append a member; returns the new length.
    pub fn add(&self, member: impl Into<Member>) -> TetherResult<usize> {
        self.add_at(usize::MAX, member)?;
        Ok(self.len())
    }

    /// Alias for `add`.
    pub fn push(&self, member: impl Into<Member>) -> TetherResult<usize> {
        self.add(member)
    }

    /// Remove a member by handle identity. Deletes the sequence slot and
    /// the key slot at the same index, detaches the listener bridge, and
    /// emits `Remove`. Removing a non-member is a no-op returning `false`.
    pub fn remove(&self, entity: &Entity) -> bool {
        let Some(parent) = self.inner.parent.upgrade() else {
            tracing::warn!(collection = %self.inner.name, "remove on detached parent ignored");
            return false;
        };

        {
            let mut members = self.inner.members.lock();
            let Some(index) = members.iter().position(|m| Entity::ptr_eq(m, entity)) else {
                return false;
            };
            members.remove(index);
            let _ = parent.with_slots(&self.inner.name, |slots| slots.remove(index));
        }

        listener::detach(self, entity);
        self.inner
            .events
            .emit(CollectionEvent::Remove(entity.clone()));
        true
    }

    /// Index of a member by handle identity.
    pub fn index_of(&self, entity: &Entity) -> Option<usize> {
        self.inner
            .members
            .lock()
            .iter()
            .position(|m| Entity::ptr_eq(m, entity))
    }

    /// Snapshot of the member sequence.
    pub fn members(&self) -> Vec<Entity> {
        self.inner.members.lock().clone()
    }

    /// Iterate a snapshot of the members.
    pub fn iter(&self) -> impl Iterator<Item = Entity> {
        self.members().into_iter()
    }

    pub fn first(&self) -> Option<Entity> {
        self.inner.members.lock().first().cloned()
    }

    pub fn last(&self) -> Option<Entity> {
        self.inner.members.lock().last().cloned()
    }

    /// First member satisfying the predicate.
    pub fn find(&self, predicate: impl Fn(&Entity) -> bool) -> Option<Entity> {
        self.inner
            .members
            .lock()
            .iter()
            .find(|m| predicate(m))
            .cloned()
    }

    /// All members satisfying the predicate.
    pub fn select(&self, predicate: impl Fn(&Entity) -> bool) -> Vec<Entity> {
        self.inner
            .members
            .lock()
            .iter()
            .filter(|m| predicate(m))
            .cloned()
            .collect()
    }

    /// Visit every member of a snapshot.
    pub fn each(&self, mut f: impl FnMut(&Entity)) {
        for member in self.members() {
            f(&member);
        }
    }

    /// Member with the given persisted primary key.
    pub fn find_by_key(&self, key: &KeyValue) -> Option<Entity> {
        self.find(|m| m.primary().as_ref() == Some(key))
    }

    /// Typed snapshot of this collection's key slots.
    pub fn key_slots(&self) -> TetherResult<Vec<SlotKey>> {
        let parent = self
            .inner
            .parent
            .upgrade()
            .ok_or(TetherError::ParentDetached)?;
        parent.with_slots(&self.inner.name, |slots| slots.clone())
    }

    /// Overwrite the key slot at `index`. Used by the listener bridge when
    /// a member's primary key changes.
    pub(crate) fn set_slot(&self, index: usize, key: SlotKey) -> TetherResult<()> {
        let parent = self
            .inner
            .parent
            .upgrade()
            .ok_or(TetherError::ParentDetached)?;
        parent.with_slots(&self.inner.name, |slots| {
            if index < slots.len() {
                slots[index] = key;
            }
        })
    }

    /// Swap a placeholder slot for the member's real primary key and emit
    /// `Placeholder`. No-op if the placeholder is no longer present.
    pub(crate) fn swap_placeholder(
        &self,
        placeholder: &PlaceholderKey,
        primary: KeyValue,
        entity: &Entity,
    ) {
        let Some(parent) = self.inner.parent.upgrade() else {
            return;
        };
        let swapped = parent
            .with_slots(&self.inner.name, |slots| {
                let position = slots
                    .iter()
                    .position(|s| matches!(s, SlotKey::Placeholder(p) if p == placeholder));
                match position {
                    Some(index) => {
                        slots[index] = SlotKey::Primary(primary);
                        true
                    }
                    None => false,
                }
            })
            .unwrap_or(false);

        if swapped {
            self.inner
                .events
                .emit(CollectionEvent::Placeholder(entity.clone()));
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Collection({})", self.inner.name)
    }
}
