//! End-to-end scenarios
//!
//! Each test drives the full stack (blueprint construction, reconciliation,
//! listener bridge, placeholder swap, persistence coordination) against the
//! in-memory backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Value};

use tether_collection::{CollectionOptions, Parent, ParentBlueprint};
use tether_core::{
    Attrs, CollectionEventKind, Entity, KeyValue, OwnerTag, ParentSignal, ParentSignalKind,
};

use crate::MemoryBackend;

fn payload(value: Value) -> Attrs {
    Attrs::from_value(value).expect("object payload")
}

fn bind(backend: &Arc<MemoryBackend>, name: &str) -> (Parent, tether_collection::Collection) {
    let parent = Parent::new();
    let collection =
        parent.bind_collection(name, Arc::clone(backend) as _, CollectionOptions::default());
    (parent, collection)
}

#[tokio::test]
async fn test_blueprint_constructs_and_seeds() {
    let backend = Arc::new(MemoryBackend::new("todo"));
    backend.insert_record("2", payload(json!({"id": 2, "name": "fetched"})));

    let seeded_len = Arc::new(AtomicUsize::new(0));
    let probe = Arc::clone(&seeded_len);
    let parent = ParentBlueprint::new()
        .collection("todos", Arc::clone(&backend) as _, CollectionOptions::default())
        .on_construct(move |parent| {
            if let Some(todos) = parent.collection("todos") {
                probe.store(todos.len(), Ordering::SeqCst);
            }
        })
        .construct_with(payload(json!({
            "title": "inbox",
            "todos": [{"id": 1, "name": "first"}, "2", {"name": "draft"}],
        })))
        .await
        .unwrap();

    // the hook observed the fully seeded collection
    assert_eq!(seeded_len.load(Ordering::SeqCst), 3);
    assert_eq!(parent.attr("title"), Some(json!("inbox")));

    let todos = parent.collection("todos").unwrap();
    assert_eq!(todos.len(), 3);
    assert_eq!(todos.first().unwrap().primary(), Some(KeyValue::Int(1)));
    assert_eq!(
        todos.members()[1].get("name"),
        Some(json!("fetched"))
    );
    assert!(todos.last().unwrap().is_new());

    let serialized = parent.attr("todos").unwrap();
    let slots = serialized.as_array().unwrap();
    assert_eq!(slots[0], json!(1));
    assert_eq!(slots[1], json!(2));
    assert!(slots[2].is_string()); // placeholder for the unsaved draft
    assert_eq!(backend.fetch_count(), 1);
}

#[tokio::test]
async fn test_replace_with_lookups_preserves_matched_member() {
    let backend = Arc::new(MemoryBackend::new("todo"));
    backend.insert_record("2", payload(json!({"id": 2, "name": "fetched"})));
    let (parent, todos) = bind(&backend, "todos");
    todos.add(payload(json!({"id": 1, "name": "kept"}))).unwrap();
    let original = todos.first().unwrap();

    todos
        .replace(vec!["2".into(), payload(json!({"id": 1, "name": "renamed"})).into()])
        .await
        .unwrap();

    assert_eq!(todos.len(), 2);
    assert_eq!(todos.first().unwrap().primary(), Some(KeyValue::Int(2)));
    assert!(Entity::ptr_eq(&todos.last().unwrap(), &original));
    assert_eq!(original.get("name"), Some(json!("renamed")));
    assert_eq!(parent.attr("todos"), Some(json!([2, 1])));
}

#[tokio::test]
async fn test_placeholder_slots_resolve_through_flush() {
    let backend = Arc::new(MemoryBackend::new("todo"));
    let (parent, todos) = bind(&backend, "todos");
    todos.add(payload(json!({"name": "a"}))).unwrap();
    todos.add(payload(json!({"name": "b"}))).unwrap();

    let placeholders = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&placeholders);
    todos
        .events()
        .on(CollectionEventKind::Placeholder, OwnerTag::next(), move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

    let report = tether_persist::flush(&todos).await;

    assert_eq!(report.saved, 2);
    assert_eq!(placeholders.load(Ordering::SeqCst), 2);
    assert_eq!(parent.attr("todos"), Some(json!([1, 2])));
    assert!(todos
        .key_slots()
        .unwrap()
        .iter()
        .all(|slot| !slot.is_placeholder()));
}

#[tokio::test]
async fn test_parent_saving_signal_partitions_members() {
    let backend = Arc::new(MemoryBackend::new("todo"));
    let (parent, todos) = bind(&backend, "todos");
    tether_persist::install(&parent);

    todos.add(payload(json!({"name": "new one"}))).unwrap();
    todos.add(payload(json!({"name": "new two"}))).unwrap();
    todos.add(payload(json!({"id": 41}))).unwrap();
    todos.last().unwrap().set("name", json!("changed"));
    todos.add(payload(json!({"id": 42}))).unwrap(); // clean, untouched

    parent.signals().emit(ParentSignal::Saving);

    for _ in 0..200 {
        if backend.save_count() == 2 && backend.update_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(backend.save_count(), 2);
    assert_eq!(backend.update_count(), 1);
}

#[tokio::test]
async fn test_flush_parent_covers_every_collection() {
    let todo_backend = Arc::new(MemoryBackend::new("todo"));
    let tag_backend = Arc::new(MemoryBackend::new("tag"));
    let parent = ParentBlueprint::new()
        .collection("tags", Arc::clone(&tag_backend) as _, CollectionOptions::default())
        .collection("todos", Arc::clone(&todo_backend) as _, CollectionOptions::default())
        .construct()
        .await
        .unwrap();

    parent
        .collection("todos")
        .unwrap()
        .add(payload(json!({"name": "t"})))
        .unwrap();
    parent
        .collection("tags")
        .unwrap()
        .add(payload(json!({"name": "g"})))
        .unwrap();

    let report = tether_persist::flush_parent(&parent).await;

    assert!(report.is_ok());
    let names: Vec<&str> = report
        .collections
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(names, ["tags", "todos"]);
    assert_eq!(todo_backend.save_count(), 1);
    assert_eq!(tag_backend.save_count(), 1);
}

#[tokio::test]
async fn test_persistence_errors_are_collected_not_fatal() {
    let backend = Arc::new(MemoryBackend::new("todo"));
    backend.poison("broken");
    let (_parent, todos) = bind(&backend, "todos");
    todos.add(payload(json!({"name": "fine"}))).unwrap();
    todos.add(payload(json!({"name": "broken"}))).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in [CollectionEventKind::Saving, CollectionEventKind::Saved] {
        let sink = Arc::clone(&events);
        todos.events().on(kind, OwnerTag::next(), move |_| {
            sink.lock().push(kind);
        });
    }

    let report = tether_persist::flush(&todos).await;

    assert_eq!(report.saved, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(
        events.lock().as_slice(),
        [CollectionEventKind::Saving, CollectionEventKind::Saved]
    );

    // the failed entity is still new; the saved one carries its key
    let still_new = todos.select(|m| m.is_new());
    assert_eq!(still_new.len(), 1);
    assert_eq!(still_new[0].get("name"), Some(json!("broken")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_save_fan_out_runs_concurrently() {
    let backend = Arc::new(MemoryBackend::new("todo").latency(Duration::from_millis(50)));
    let (_parent, todos) = bind(&backend, "todos");
    for i in 0..5 {
        todos.add(payload(json!({"name": format!("n{i}")}))).unwrap();
    }

    let started = Instant::now();
    let report = tether_persist::flush(&todos).await;
    let elapsed = started.elapsed();

    assert_eq!(report.saved, 5);
    // five sequential 50ms saves would need 250ms; the fan-out overlaps them
    assert!(elapsed < Duration::from_millis(200), "took {elapsed:?}");
}

#[tokio::test]
async fn test_removing_signal_bubbles_to_parent() {
    let backend = Arc::new(MemoryBackend::new("todo"));
    let (parent, todos) = bind(&backend, "todos");
    todos.add(payload(json!({"id": 1}))).unwrap();
    let entity = todos.first().unwrap();

    let changes = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&changes);
    parent
        .signals()
        .on(ParentSignalKind::Change, OwnerTag::next(), move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

    entity.emit_removing();

    assert!(todos.is_empty());
    assert_eq!(parent.attr("todos"), Some(json!([])));
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert!(parent.is_dirty("todos"));
}
