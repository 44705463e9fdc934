//! In-memory entity backend
//!
//! A test double for the persistence collaborator: records live in a map
//! keyed by their stringified primary key, saves issue sequential integer
//! keys, and every operation can be slowed down (to force real interleaving
//! of concurrent dispatches) or poisoned (to exercise error collection).

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use tether_core::{Attrs, Entity, EntityBehavior, KeyValue, TetherError, TetherResult};

pub struct MemoryBackend {
    name: String,
    primary_field: String,
    next_key: AtomicI64,
    records: Mutex<BTreeMap<String, Attrs>>,
    poisoned: Mutex<HashSet<String>>,
    latency: Option<Duration>,
    fetches: AtomicUsize,
    saves: AtomicUsize,
    updates: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(name: &str) -> Self {
        MemoryBackend {
            name: name.to_owned(),
            primary_field: "id".to_owned(),
            next_key: AtomicI64::new(1),
            records: Mutex::new(BTreeMap::new()),
            poisoned: Mutex::new(HashSet::new()),
            latency: None,
            fetches: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }

    /// Delay every operation, forcing concurrent dispatches to interleave.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn primary_field(mut self, field: &str) -> Self {
        self.primary_field = field.to_owned();
        self
    }

    /// Seed a fetchable record.
    pub fn insert_record(&self, id: &str, attrs: Attrs) {
        self.records.lock().insert(id.to_owned(), attrs);
    }

    /// Make persistence fail for entities whose `name` attribute equals
    /// `marker`.
    pub fn poison(&self, marker: &str) {
        self.poisoned.lock().insert(marker.to_owned());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn is_poisoned(&self, entity: &Entity) -> bool {
        match entity.get("name") {
            Some(Value::String(name)) => self.poisoned.lock().contains(&name),
            _ => false,
        }
    }
}

#[async_trait]
impl EntityBehavior for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn primary_field(&self) -> &str {
        &self.primary_field
    }

    async fn fetch(&self, id: &str) -> TetherResult<Attrs> {
        self.pause().await;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| TetherError::Fetch {
                entity: self.name.clone(),
                id: id.to_owned(),
                reason: "no such record".into(),
            })
    }

    async fn save(&self, entity: &Entity) -> TetherResult<KeyValue> {
        self.pause().await;
        if self.is_poisoned(entity) {
            return Err(TetherError::Save {
                entity: self.name.clone(),
                reason: "injected failure".into(),
            });
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        let key = KeyValue::Int(self.next_key.fetch_add(1, Ordering::SeqCst));
        let mut attrs = entity.attrs();
        attrs.set(&self.primary_field, key.to_json());
        self.records.lock().insert(key.to_string(), attrs);
        Ok(key)
    }

    async fn update(&self, entity: &Entity) -> TetherResult<()> {
        self.pause().await;
        if self.is_poisoned(entity) {
            return Err(TetherError::Update {
                entity: self.name.clone(),
                reason: "injected failure".into(),
            });
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        if let Some(key) = entity.primary() {
            self.records.lock().insert(key.to_string(), entity.attrs());
        }
        Ok(())
    }
}
