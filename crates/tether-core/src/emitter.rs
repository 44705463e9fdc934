//! Owner-tagged signal emitter
//!
//! The subject side of the observer seam. Every subscription names the
//! signal kind it wants and the `OwnerTag` it belongs to, so one owner's
//! subscriptions can be removed without disturbing another's. The listener
//! bridge relies on this when an entity belongs to several collections at
//! once.
//!
//! Emission snapshots the matching handlers and invokes them after the
//! registry lock is released, so a handler may freely re-enter the emitter
//! (subscribe, detach, even trigger another emit). One-shot subscriptions
//! are unregistered *before* their single invocation and can never fire
//! twice, even if the signal is re-emitted from inside the handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{OwnerTag, Signal};

/// Handle to one subscription, usable for targeted removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubId(u64);

type Handler<S> = Arc<dyn Fn(&S) + Send + Sync>;

struct Subscriber<S: Signal> {
    id: SubId,
    kind: S::Kind,
    owner: OwnerTag,
    once: bool,
    handler: Handler<S>,
}

/// Subject end of the observer seam.
pub struct Emitter<S: Signal> {
    subs: Mutex<Vec<Subscriber<S>>>,
    next_id: AtomicU64,
}

impl<S: Signal> Emitter<S> {
    pub fn new() -> Self {
        Emitter {
            subs: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn subscribe(
        &self,
        kind: S::Kind,
        owner: OwnerTag,
        once: bool,
        handler: impl Fn(&S) + Send + Sync + 'static,
    ) -> SubId {
        let id = SubId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subs.lock().push(Subscriber {
            id,
            kind,
            owner,
            once,
            handler: Arc::new(handler),
        });
        id
    }

    /// Subscribe to every signal of `kind`.
    pub fn on(
        &self,
        kind: S::Kind,
        owner: OwnerTag,
        handler: impl Fn(&S) + Send + Sync + 'static,
    ) -> SubId {
        self.subscribe(kind, owner, false, handler)
    }

    /// Subscribe to the next signal of `kind` only. The subscription
    /// removes itself before the handler runs.
    pub fn once(
        &self,
        kind: S::Kind,
        owner: OwnerTag,
        handler: impl Fn(&S) + Send + Sync + 'static,
    ) -> SubId {
        self.subscribe(kind, owner, true, handler)
    }

    /// Remove every subscription matching both `kind` and `owner`.
    /// Returns how many were removed.
    pub fn off(&self, kind: S::Kind, owner: OwnerTag) -> usize {
        let mut subs = self.subs.lock();
        let before = subs.len();
        subs.retain(|s| !(s.kind == kind && s.owner == owner));
        before - subs.len()
    }

    /// Remove one subscription by id.
    pub fn unsubscribe(&self, id: SubId) -> bool {
        let mut subs = self.subs.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        before != subs.len()
    }

    /// Number of live subscriptions for `kind`.
    pub fn listener_count(&self, kind: S::Kind) -> usize {
        self.subs.lock().iter().filter(|s| s.kind == kind).count()
    }

    /// Emit a signal to every matching subscriber.
    pub fn emit(&self, signal: S) {
        let kind = signal.kind();
        let fired: Vec<Handler<S>> = {
            let mut subs = self.subs.lock();
            let fired = subs
                .iter()
                .filter(|s| s.kind == kind)
                .map(|s| Arc::clone(&s.handler))
                .collect();
            subs.retain(|s| !(s.kind == kind && s.once));
            fired
        };
        for handler in fired {
            handler(&signal);
        }
    }
}

impl<S: Signal> Default for Emitter<S> {
    fn default() -> Self {
        Emitter::new()
    }
}
