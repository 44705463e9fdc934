//! In-crate behavior double for unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use tether_core::{Attrs, Entity, EntityBehavior, KeyValue, TetherError, TetherResult};

use crate::{Collection, CollectionOptions, Parent};

pub(crate) struct TodoBehavior {
    next_key: AtomicI64,
    records: Mutex<BTreeMap<String, Attrs>>,
}

impl TodoBehavior {
    pub(crate) fn insert_record(&self, id: &str, attrs: Attrs) {
        self.records.lock().insert(id.to_owned(), attrs);
    }
}

#[async_trait]
impl EntityBehavior for TodoBehavior {
    fn name(&self) -> &str {
        "todo"
    }

    async fn fetch(&self, id: &str) -> TetherResult<Attrs> {
        self.records
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| TetherError::Fetch {
                entity: "todo".into(),
                id: id.into(),
                reason: "no such record".into(),
            })
    }

    async fn save(&self, _entity: &Entity) -> TetherResult<KeyValue> {
        Ok(KeyValue::Int(self.next_key.fetch_add(1, Ordering::SeqCst)))
    }

    async fn update(&self, _entity: &Entity) -> TetherResult<()> {
        Ok(())
    }
}

pub(crate) fn todo_behavior() -> Arc<TodoBehavior> {
    Arc::new(TodoBehavior {
        next_key: AtomicI64::new(1),
        records: Mutex::new(BTreeMap::new()),
    })
}

pub(crate) fn todos() -> (Parent, Collection) {
    todos_with(todo_behavior())
}

pub(crate) fn todos_with(behavior: Arc<TodoBehavior>) -> (Parent, Collection) {
    let parent = Parent::new();
    let collection = parent.bind_collection("todos", behavior, CollectionOptions::default());
    (parent, collection)
}
