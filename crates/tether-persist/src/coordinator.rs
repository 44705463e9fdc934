//! Persistence coordinator
//!
//! Two entry points cover the two ways a parent save is driven:
//!
//! - [`flush_parent`] is the awaitable path: it emits the parent's `Saving`
//!   signal, flushes every bound collection, clears the parent's dirty
//!   state and emits `Saved`, returning per-collection reports.
//! - [`install`] is the signal-driven path: it subscribes to the parent's
//!   `Saving` signal and spawns a flush per collection whenever it fires
//!   (plus the optional debounced save-on-placeholder trigger). Use one
//!   path or the other for a given parent; combining them dispatches
//!   every batch twice.
//!
//! Persistence errors never abort a batch: every completion counts down
//! the fan-in regardless of outcome, errors are collected into the report,
//! and the `Saved` event always fires once the countdown reaches zero.

use std::time::Duration;

use tokio::sync::mpsc;

use tether_collection::{Collection, Parent};
use tether_core::{
    CollectionEvent, CollectionEventKind, Entity, OwnerTag, ParentSignal, ParentSignalKind,
    TetherError,
};

#[derive(Clone, Copy, Debug)]
enum Op {
    Save,
    Update,
}

/// Outcome of one collection's persistence batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Successful `save` dispatches.
    pub saved: usize,
    /// Successful `update` dispatches.
    pub updated: usize,
    /// Collected per-entity failures.
    pub errors: Vec<TetherError>,
}

impl BatchReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total completions, successful or not.
    pub fn completed(&self) -> usize {
        self.saved + self.updated + self.errors.len()
    }

    fn absorb(&mut self, other: BatchReport) {
        self.saved += other.saved;
        self.updated += other.updated;
        self.errors.extend(other.errors);
    }
}

/// Outcome of a whole-parent flush.
#[derive(Debug, Default)]
pub struct ParentReport {
    /// Per-collection reports, in attribute-name order.
    pub collections: Vec<(String, BatchReport)>,
}

impl ParentReport {
    pub fn is_ok(&self) -> bool {
        self.collections.iter().all(|(_, report)| report.is_ok())
    }
}

/// Fan one operation out over `members` and wait for every completion.
///
/// Emits `Saving` before the first dispatch and `Saved` when the countdown
/// reaches zero; an empty member set emits nothing and dispatches nothing.
async fn dispatch(collection: &Collection, members: Vec<Entity>, op: Op) -> BatchReport {
    let mut report = BatchReport::default();
    if members.is_empty() {
        return report;
    }

    collection.events().emit(CollectionEvent::Saving);

    let mut remaining = members.len();
    let (tx, mut rx) = mpsc::channel(members.len());
    for entity in members {
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = match op {
                Op::Save => entity.save().await,
                Op::Update => entity.update().await,
            };
            let _ = tx.send(result).await;
        });
    }
    drop(tx);

    while let Some(result) = rx.recv().await {
        match result {
            Ok(()) => match op {
                Op::Save => report.saved += 1,
                Op::Update => report.updated += 1,
            },
            Err(error) => {
                tracing::warn!(collection = %collection.name(), %error, "persistence dispatch failed");
                report.errors.push(error);
            }
        }
        remaining -= 1;
        if remaining == 0 {
            break;
        }
    }

    collection.events().emit(CollectionEvent::Saved);
    report
}

/// Persist one collection: update dirty persisted members and save new
/// ones, as enabled by the collection's options. The two partitions
/// dispatch concurrently, each with its own `Saving`/`Saved` bracket.
/// Members that are neither new nor dirty are left untouched.
pub async fn flush(collection: &Collection) -> BatchReport {
    let options = collection.options();
    let members = collection.members();

    let to_update: Vec<Entity> = if options.update_changed {
        members
            .iter()
            .filter(|m| m.is_dirty() && !m.is_new())
            .cloned()
            .collect()
    } else {
        Vec::new()
    };
    let to_save: Vec<Entity> = if options.save_new {
        members.iter().filter(|m| m.is_new()).cloned().collect()
    } else {
        Vec::new()
    };

    let (mut report, save_report) = tokio::join!(
        dispatch(collection, to_update, Op::Update),
        dispatch(collection, to_save, Op::Save),
    );
    report.absorb(save_report);
    report
}

/// Dispatch `save` on every member regardless of status, with the same
/// fan-out/fan-in completion discipline.
pub async fn save_all(collection: &Collection) -> BatchReport {
    dispatch(collection, collection.members(), Op::Save).await
}

/// Awaitable whole-parent save: `Saving`, flush every bound collection,
/// clear the parent's dirty names, `Saved`.
pub async fn flush_parent(parent: &Parent) -> ParentReport {
    parent.signals().emit(ParentSignal::Saving);

    let mut collections = Vec::new();
    for (name, collection) in parent.collections() {
        let report = flush(&collection).await;
        collections.push((name, report));
    }

    parent.clear_dirty();
    parent.signals().emit(ParentSignal::Saved);
    ParentReport { collections }
}

/// Wire the signal-driven save path: every parent `Saving` emission spawns
/// a flush per bound collection, and collections configured with
/// `save_on_placeholder` get a debounced `Saving` trigger off their
/// `Placeholder` event.
///
/// Must be called from within a tokio runtime; the spawned flushes report
/// errors through logging only.
pub fn install(parent: &Parent) {
    let tag = OwnerTag::next();

    let weak = parent.downgrade();
    parent
        .signals()
        .on(ParentSignalKind::Saving, tag, move |_| {
            let Some(parent) = weak.upgrade() else { return };
            for (name, collection) in parent.collections() {
                tokio::spawn(async move {
                    let report = flush(&collection).await;
                    if !report.is_ok() {
                        tracing::warn!(
                            collection = %name,
                            errors = report.errors.len(),
                            "persistence batch completed with errors"
                        );
                    }
                });
            }
        });

    for (_, collection) in parent.collections() {
        if let Some(window) = collection.options().save_on_placeholder {
            wire_placeholder_save(parent, &collection, window, tag);
        }
    }
}

/// Debounced parent save: placeholder swaps within `window` of each other
/// coalesce into a single `Saving` emission.
fn wire_placeholder_save(parent: &Parent, collection: &Collection, window: Duration, tag: OwnerTag) {
    let (tx, mut rx) = mpsc::channel::<()>(8);

    let weak = parent.downgrade();
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            tokio::time::sleep(window).await;
            while rx.try_recv().is_ok() {}
            let Some(parent) = weak.upgrade() else { break };
            parent.signals().emit(ParentSignal::Saving);
        }
    });

    collection
        .events()
        .on(CollectionEventKind::Placeholder, tag, move |_| {
            let _ = tx.try_send(());
        });
}
