//! Parent entity binding
//!
//! The parent owns an attribute bag. For every bound collection the bag
//! holds, under the collection's name, the key slot store: one key per
//! member, in member order. The slot array is mutated exclusively through
//! the collection; readers get a serialized snapshot.
//!
//! Construction mirrors the declare-then-build flow: a `ParentBlueprint`
//! collects collection declarations, `construct` binds each of them, seeds
//! them from the initial attribute data, and finally emits `Construct`.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

use tether_core::{
    Attrs, CollectionEventKind, Emitter, EntityBehavior, OwnerTag, ParentSignal, SlotKey,
    TetherError, TetherResult,
};

use crate::{Collection, CollectionOptions, Entry};

/// One attribute bag entry: either an opaque value or a collection-managed
/// key slot array.
enum Attribute {
    Value(Value),
    Slots(Vec<SlotKey>),
}

pub(crate) struct ParentInner {
    tag: OwnerTag,
    bag: Mutex<BTreeMap<String, Attribute>>,
    dirty: Mutex<BTreeSet<String>>,
    signals: Emitter<ParentSignal>,
    collections: Mutex<BTreeMap<String, Collection>>,
}

impl ParentInner {
    pub(crate) fn mark_dirty(&self, name: &str) {
        self.dirty.lock().insert(name.to_owned());
    }

    pub(crate) fn emit(&self, signal: ParentSignal) {
        self.signals.emit(signal);
    }

    /// Run `f` against the typed slot array for `name`. This is the only
    /// mutation path into a key slot store.
    pub(crate) fn with_slots<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Vec<SlotKey>) -> R,
    ) -> TetherResult<R> {
        let mut bag = self.bag.lock();
        match bag.get_mut(name) {
            Some(Attribute::Slots(slots)) => Ok(f(slots)),
            Some(Attribute::Value(_)) => Err(TetherError::NotKeySlots(name.to_owned())),
            None => Err(TetherError::UnknownAttribute(name.to_owned())),
        }
    }
}

/// Handle to a parent entity.
#[derive(Clone)]
pub struct Parent {
    inner: Arc<ParentInner>,
}

/// Non-owning parent handle for handlers and background tasks.
#[derive(Clone)]
pub struct WeakParent {
    inner: Weak<ParentInner>,
}

impl WeakParent {
    pub fn upgrade(&self) -> Option<Parent> {
        self.inner.upgrade().map(|inner| Parent { inner })
    }
}

impl Parent {
    pub fn new() -> Self {
        Parent {
            inner: Arc::new(ParentInner {
                tag: OwnerTag::next(),
                bag: Mutex::new(BTreeMap::new()),
                dirty: Mutex::new(BTreeSet::new()),
                signals: Emitter::new(),
                collections: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakParent {
        WeakParent {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn signals(&self) -> &Emitter<ParentSignal> {
        &self.inner.signals
    }

    /// Serialized view of an attribute. Key slot arrays come back as plain
    /// JSON arrays of keys.
    pub fn attr(&self, name: &str) -> Option<Value> {
        let bag = self.inner.bag.lock();
        match bag.get(name) {
            Some(Attribute::Value(value)) => Some(value.clone()),
            Some(Attribute::Slots(slots)) => {
                Some(Value::Array(slots.iter().map(SlotKey::to_json).collect()))
            }
            None => None,
        }
    }

    /// Set an opaque attribute, marking it dirty. Attributes bound to a
    /// collection are managed by that collection and refuse direct writes.
    pub fn set_attr(&self, name: &str, value: Value) -> TetherResult<()> {
        {
            let mut bag = self.inner.bag.lock();
            if let Some(Attribute::Slots(_)) = bag.get(name) {
                return Err(TetherError::SlotsManaged(name.to_owned()));
            }
            bag.insert(name.to_owned(), Attribute::Value(value));
        }
        self.inner.mark_dirty(name);
        self.inner.emit(ParentSignal::Change {
            name: name.to_owned(),
        });
        Ok(())
    }

    /// Construction-time attribute write: no dirty marking, no signal.
    pub(crate) fn seed_attr(&self, name: &str, value: Value) {
        self.inner
            .bag
            .lock()
            .insert(name.to_owned(), Attribute::Value(value));
    }

    /// Typed snapshot of a collection's key slot store.
    pub fn key_slots(&self, name: &str) -> TetherResult<Vec<SlotKey>> {
        self.inner.with_slots(name, |slots| slots.clone())
    }

    pub fn dirty_names(&self) -> Vec<String> {
        self.inner.dirty.lock().iter().cloned().collect()
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.inner.dirty.lock().contains(name)
    }

    /// Forget dirty state, e.g. after the parent itself was persisted.
    pub fn clear_dirty(&self) {
        self.inner.dirty.lock().clear();
    }

    pub fn collection(&self, name: &str) -> Option<Collection> {
        self.inner.collections.lock().get(name).cloned()
    }

    /// Every bound collection, in attribute-name order.
    pub fn collections(&self) -> Vec<(String, Collection)> {
        self.inner
            .collections
            .lock()
            .iter()
            .map(|(name, c)| (name.clone(), c.clone()))
            .collect()
    }

    /// Bind a collection to the attribute `name`. The bag gains an empty
    /// key slot array; membership events bubble into parent `Change`
    /// signals. Binding the same name twice returns the existing
    /// collection.
    pub fn bind_collection(
        &self,
        name: &str,
        behavior: Arc<dyn EntityBehavior>,
        options: CollectionOptions,
    ) -> Collection {
        if let Some(existing) = self.collection(name) {
            return existing;
        }

        self.inner
            .bag
            .lock()
            .insert(name.to_owned(), Attribute::Slots(Vec::new()));

        let collection = Collection::create(self, name, behavior, options);

        for kind in [
            CollectionEventKind::Add,
            CollectionEventKind::Remove,
            CollectionEventKind::Placeholder,
        ] {
            let weak = Arc::downgrade(&self.inner);
            let attr = name.to_owned();
            collection.events().on(kind, self.inner.tag, move |_| {
                let Some(parent) = weak.upgrade() else { return };
                parent.mark_dirty(&attr);
                parent.emit(ParentSignal::Change { name: attr.clone() });
            });
        }

        self.inner
            .collections
            .lock()
            .insert(name.to_owned(), collection.clone());
        collection
    }

    pub(crate) fn inner(&self) -> &Arc<ParentInner> {
        &self.inner
    }
}

impl Default for Parent {
    fn default() -> Self {
        Parent::new()
    }
}

struct Declaration {
    name: String,
    behavior: Arc<dyn EntityBehavior>,
    options: CollectionOptions,
}

type ConstructHook = Box<dyn Fn(&Parent) + Send + Sync>;

/// Declarations for a parent under construction.
pub struct ParentBlueprint {
    declarations: Vec<Declaration>,
    hooks: Vec<ConstructHook>,
}

impl ParentBlueprint {
    pub fn new() -> Self {
        ParentBlueprint {
            declarations: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Declare a collection bound to attribute `name`.
    pub fn collection(
        mut self,
        name: impl Into<String>,
        behavior: Arc<dyn EntityBehavior>,
        options: CollectionOptions,
    ) -> Self {
        self.declarations.push(Declaration {
            name: name.into(),
            behavior,
            options,
        });
        self
    }

    /// Register a hook to run once the parent is constructed and its
    /// collections are seeded, just before `Construct` is emitted.
    pub fn on_construct(mut self, hook: impl Fn(&Parent) + Send + Sync + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Construct with no initial attribute data.
    pub async fn construct(self) -> TetherResult<Parent> {
        self.construct_with(Attrs::new()).await
    }

    /// Construct the parent: bind every declared collection, seed each one
    /// from `initial` (its entry must be an array of payloads and/or
    /// identifiers), store the remaining attributes verbatim, then run
    /// construct hooks and emit `Construct`.
    pub async fn construct_with(self, initial: Attrs) -> TetherResult<Parent> {
        let parent = Parent::new();
        let declared: HashSet<&str> = self
            .declarations
            .iter()
            .map(|d| d.name.as_str())
            .collect();

        for decl in &self.declarations {
            parent.bind_collection(&decl.name, Arc::clone(&decl.behavior), decl.options.clone());
        }

        let mut seeds: Vec<(Collection, Vec<Entry>)> = Vec::new();
        for (name, value) in initial.iter() {
            if declared.contains(name.as_str()) {
                let Value::Array(items) = value else {
                    return Err(TetherError::MalformedEntry(format!(
                        "collection attribute {name} must be an array"
                    )));
                };
                let entries = items
                    .iter()
                    .cloned()
                    .map(Entry::from_json)
                    .collect::<TetherResult<Vec<_>>>()?;
                if let Some(collection) = parent.collection(name) {
                    seeds.push((collection, entries));
                }
            } else {
                parent.seed_attr(name, value.clone());
            }
        }

        for (collection, entries) in seeds {
            collection.replace(entries).await?;
        }

        for hook in &self.hooks {
            hook(&parent);
        }
        parent.signals().emit(ParentSignal::Construct);
        Ok(parent)
    }
}

impl Default for ParentBlueprint {
    fn default() -> Self {
        ParentBlueprint::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_core::{ParentSignalKind, TetherError};

    #[test]
    fn test_attr_round_trip() {
        let parent = Parent::new();
        assert!(parent.set_attr("title", json!("inbox")).is_ok());
        assert_eq!(parent.attr("title"), Some(json!("inbox")));
        assert_eq!(parent.attr("missing"), None);
        assert!(parent.is_dirty("title"));
    }

    #[test]
    fn test_change_signal_on_set_attr() {
        let parent = Parent::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        parent
            .signals()
            .on(ParentSignalKind::Change, OwnerTag::next(), move |signal| {
                if let ParentSignal::Change { name } = signal {
                    sink.lock().push(name.clone());
                }
            });

        parent.set_attr("title", json!("x")).unwrap();
        assert_eq!(seen.lock().as_slice(), ["title"]);
    }

    #[test]
    fn test_unknown_attribute_is_not_slots() {
        let parent = Parent::new();
        assert!(matches!(
            parent.key_slots("todos"),
            Err(TetherError::UnknownAttribute(_))
        ));
        parent.set_attr("todos", json!("oops")).unwrap();
        assert!(matches!(
            parent.key_slots("todos"),
            Err(TetherError::NotKeySlots(_))
        ));
    }

    #[test]
    fn test_bound_attribute_refuses_direct_writes() {
        let (parent, _collection) = crate::test_util::todos();
        assert!(matches!(
            parent.set_attr("todos", json!([9])),
            Err(TetherError::SlotsManaged(_))
        ));
        assert_eq!(parent.attr("todos"), Some(json!([])));
    }

    #[test]
    fn test_bind_collection_is_idempotent() {
        let parent = Parent::new();
        let behavior = crate::test_util::todo_behavior();
        let first = parent.bind_collection(
            "todos",
            behavior.clone() as _,
            crate::CollectionOptions::default(),
        );
        let second = parent.bind_collection(
            "todos",
            behavior as _,
            crate::CollectionOptions::default(),
        );
        first.add_at(0, crate::Member::Attrs(Attrs::new())).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(parent.collections().len(), 1);
    }
}
