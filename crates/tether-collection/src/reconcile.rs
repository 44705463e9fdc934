//! Reconciliation engine
//!
//! `replace` takes a full new membership description and diffs it against
//! the current collection, preserving entity identity wherever a persisted
//! primary key matches. Matched members are merged in place and never
//! explicitly repositioned; their final position is whatever insertions at
//! lower indices shifted them to. Unmatched incoming entries are inserted
//! at their input index; current members the input never matched are
//! removed at the end.
//!
//! Identifier entries resolve through the class behavior's `fetch` before
//! any mutation. All lookups run concurrently and a single failure aborts
//! the whole replace, leaving the collection untouched.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use tether_core::{Attrs, Entity, TetherError, TetherResult};

use crate::{Collection, Member};

/// One incoming membership entry, discriminated up front rather than
/// sniffed at each use site.
#[derive(Clone, Debug)]
pub enum Entry {
    /// Raw attribute payload.
    Attrs(Attrs),
    /// An already-constructed entity; reconciliation compares against its
    /// attribute view.
    Entity(Entity),
    /// A bare identifier to resolve through the class behavior.
    Lookup(String),
}

impl Entry {
    /// Discriminate a JSON value: objects are payloads, strings are
    /// identifiers, anything else is malformed.
    pub fn from_json(value: Value) -> TetherResult<Entry> {
        match value {
            Value::Object(map) => Ok(Entry::Attrs(map.into())),
            Value::String(id) => Ok(Entry::Lookup(id)),
            other => Err(TetherError::MalformedEntry(other.to_string())),
        }
    }
}

impl From<Attrs> for Entry {
    fn from(attrs: Attrs) -> Self {
        Entry::Attrs(attrs)
    }
}

impl From<Entity> for Entry {
    fn from(entity: Entity) -> Self {
        Entry::Entity(entity)
    }
}

impl From<&str> for Entry {
    fn from(id: &str) -> Self {
        Entry::Lookup(id.to_owned())
    }
}

impl From<String> for Entry {
    fn from(id: String) -> Self {
        Entry::Lookup(id)
    }
}

/// Tally of one `replace` pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// Existing members updated in place.
    pub merged: usize,
    /// New members inserted.
    pub inserted: usize,
    /// Members dropped because no entry matched them.
    pub removed: usize,
}

impl Collection {
    /// Replace the whole membership with `entries`.
    ///
    /// Resolution happens first: identifier entries fetch concurrently,
    /// entity entries unwrap to their attribute view. Any fetch error
    /// aborts before any mutation. The diff then matches on persisted
    /// primary keys only; unkeyed entries always insert as new members.
    pub async fn replace(&self, entries: Vec<Entry>) -> TetherResult<ReplaceOutcome> {
        let resolved = resolve(self, entries).await?;
        apply(self, resolved)
    }
}

/// Resolve every entry to an attribute payload, in input order.
async fn resolve(collection: &Collection, entries: Vec<Entry>) -> TetherResult<Vec<Attrs>> {
    let mut resolved: Vec<Option<Attrs>> = Vec::with_capacity(entries.len());
    let mut lookups: Vec<(usize, String)> = Vec::new();

    for (index, entry) in entries.into_iter().enumerate() {
        match entry {
            Entry::Attrs(attrs) => resolved.push(Some(attrs)),
            Entry::Entity(entity) => resolved.push(Some(entity.attrs())),
            Entry::Lookup(id) => {
                resolved.push(None);
                lookups.push((index, id));
            }
        }
    }

    if !lookups.is_empty() {
        let (tx, mut rx) = mpsc::channel(lookups.len());
        for (index, id) in lookups {
            let behavior = Arc::clone(collection.behavior());
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = behavior.fetch(&id).await;
                let _ = tx.send((index, result)).await;
            });
        }
        drop(tx);

        let mut first_error = None;
        while let Some((index, result)) = rx.recv().await {
            match result {
                Ok(attrs) => resolved[index] = Some(attrs),
                Err(error) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }
        if let Some(error) = first_error {
            return Err(error);
        }
    }

    let mut out = Vec::with_capacity(resolved.len());
    for (index, slot) in resolved.into_iter().enumerate() {
        match slot {
            Some(attrs) => out.push(attrs),
            None => {
                return Err(TetherError::Dispatch(format!(
                    "fetch result missing for entry {index}"
                )))
            }
        }
    }
    Ok(out)
}

/// The synchronous diff: merge matches in place, insert the rest at their
/// input index, then drop every member no entry matched.
fn apply(collection: &Collection, resolved: Vec<Attrs>) -> TetherResult<ReplaceOutcome> {
    let primary_field = collection.behavior().primary_field().to_owned();
    let mut not_matched = collection.members();
    let mut outcome = ReplaceOutcome::default();

    for (index, attrs) in resolved.into_iter().enumerate() {
        let matched = attrs
            .key(&primary_field)
            .and_then(|key| collection.find_by_key(&key));
        match matched {
            Some(member) => {
                not_matched.retain(|m| !Entity::ptr_eq(m, &member));
                member.merge(&attrs);
                outcome.merged += 1;
            }
            None => {
                collection.add_at(index, Member::Attrs(attrs))?;
                outcome.inserted += 1;
            }
        }
    }

    for member in not_matched {
        if collection.remove(&member) {
            outcome.removed += 1;
        }
    }

    tracing::debug!(collection = %collection.name(), ?outcome, "membership replaced");
    Ok(outcome)
}
