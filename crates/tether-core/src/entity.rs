//! Entity handles
//!
//! An `Entity` is a cheaply clonable handle over shared entity state:
//! an attribute map, a dirty-field tracker, and a signal emitter. The
//! domain-specific half (which field is the primary key, how records are
//! fetched and persisted) lives behind the `EntityBehavior` trait supplied
//! at construction, so this crate never touches a transport.
//!
//! Identity is handle identity: two `Entity` values are the same entity iff
//! they share the underlying allocation (`Entity::ptr_eq`). Collections rely
//! on this for membership checks.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::{Attrs, Emitter, EntitySignal, KeyValue, TetherResult};

/// Class-level behavior of an entity type: naming, primary-key field, and
/// the asynchronous persistence operations. Implementations own all
/// transport concerns.
#[async_trait]
pub trait EntityBehavior: Send + Sync {
    /// Entity type name, used in logs and error reports.
    fn name(&self) -> &str;

    /// Attribute field holding the persisted primary key.
    fn primary_field(&self) -> &str {
        "id"
    }

    /// Resolve a bare identifier into an attribute payload.
    async fn fetch(&self, id: &str) -> TetherResult<Attrs>;

    /// Persist a new entity. Returns the primary key the store assigned.
    async fn save(&self, entity: &Entity) -> TetherResult<KeyValue>;

    /// Persist changes to an already-persisted entity.
    async fn update(&self, entity: &Entity) -> TetherResult<()>;
}

struct EntityState {
    attrs: Attrs,
    /// Changed-but-unpersisted fields, mapped to their pending values.
    dirty: Map<String, Value>,
}

struct EntityInner {
    behavior: Arc<dyn EntityBehavior>,
    state: Mutex<EntityState>,
    signals: Emitter<EntitySignal>,
}

/// Handle to one entity.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

impl Entity {
    /// Construct an entity from raw attributes. Construction never marks
    /// fields dirty; only later mutation does.
    pub fn new(behavior: Arc<dyn EntityBehavior>, attrs: Attrs) -> Self {
        Entity {
            inner: Arc::new(EntityInner {
                behavior,
                state: Mutex::new(EntityState {
                    attrs,
                    dirty: Map::new(),
                }),
                signals: Emitter::new(),
            }),
        }
    }

    /// Same entity, by handle identity.
    #[inline]
    pub fn ptr_eq(a: &Entity, b: &Entity) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn behavior(&self) -> &Arc<dyn EntityBehavior> {
        &self.inner.behavior
    }

    pub fn signals(&self) -> &Emitter<EntitySignal> {
        &self.inner.signals
    }

    /// Snapshot of the current attributes.
    pub fn attrs(&self) -> Attrs {
        self.inner.state.lock().attrs.clone()
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.inner.state.lock().attrs.get(field).cloned()
    }

    /// The persisted primary key, if any.
    pub fn primary(&self) -> Option<KeyValue> {
        let state = self.inner.state.lock();
        state.attrs.key(self.inner.behavior.primary_field())
    }

    /// An entity with no persisted primary key has never been saved.
    pub fn is_new(&self) -> bool {
        self.primary().is_none()
    }

    pub fn is_dirty(&self) -> bool {
        !self.inner.state.lock().dirty.is_empty()
    }

    pub fn dirty_fields(&self) -> Vec<String> {
        self.inner.state.lock().dirty.keys().cloned().collect()
    }

    /// Set one attribute. Records the field as dirty and emits `Change`;
    /// writing the value already present is a no-op.
    pub fn set(&self, field: &str, value: Value) {
        let prev = {
            let mut state = self.inner.state.lock();
            if state.attrs.get(field) == Some(&value) {
                return;
            }
            state.dirty.insert(field.to_owned(), value.clone());
            state.attrs.set(field, value.clone())
        };
        self.inner.signals.emit(EntitySignal::Change {
            field: field.to_owned(),
            value,
            prev,
        });
    }

    /// Merge an attribute payload in, field by field.
    pub fn merge(&self, attrs: &Attrs) {
        for (field, value) in attrs.iter() {
            self.set(field, value.clone());
        }
    }

    /// Announce removal. Every collection holding this entity reacts by
    /// dropping it.
    pub fn emit_removing(&self) {
        self.inner.signals.emit(EntitySignal::Removing);
    }

    /// Persist this entity as a new record. On success the assigned primary
    /// key is adopted (without a `Change` signal; `Saved` carries the
    /// news), dirty state clears, and `Saved` fires.
    pub async fn save(&self) -> TetherResult<()> {
        self.inner.signals.emit(EntitySignal::Saving);
        let key = self.inner.behavior.save(self).await?;
        {
            let mut state = self.inner.state.lock();
            let field = self.inner.behavior.primary_field().to_owned();
            state.attrs.set(&field, key.to_json());
            state.dirty.clear();
        }
        self.inner.signals.emit(EntitySignal::Saved);
        Ok(())
    }

    /// Persist changes to this already-persisted entity. On success dirty
    /// state clears and `Saved` fires.
    pub async fn update(&self) -> TetherResult<()> {
        self.inner.signals.emit(EntitySignal::Saving);
        self.inner.behavior.update(self).await?;
        self.inner.state.lock().dirty.clear();
        self.inner.signals.emit(EntitySignal::Saved);
        Ok(())
    }
}

/// Non-owning entity handle.
///
/// Handlers stored in an entity's own emitter must capture the entity
/// weakly; a strong capture would keep the allocation alive forever.
#[derive(Clone)]
pub struct WeakEntity {
    inner: std::sync::Weak<EntityInner>,
}

impl Entity {
    pub fn downgrade(&self) -> WeakEntity {
        WeakEntity {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl WeakEntity {
    pub fn upgrade(&self) -> Option<Entity> {
        self.inner.upgrade().map(|inner| Entity { inner })
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entity({} key={})",
            self.inner.behavior.name(),
            self.primary()
                .map_or_else(|| "new".to_owned(), |k| k.to_string())
        )
    }
}
