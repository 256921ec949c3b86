#![forbid(unsafe_code)]

//! Cross-store commit tracking.
//!
//! A [`StoreManager`] ref-counts the stores observed by mounted readers below
//! one provider, relays their notifications, and commits a whole rendering
//! pass worth of state back into every store at once.
//!
//! # Invariants
//!
//! 1. A tracked store has exactly one relay subscription, however many
//!    readers reference it.
//! 2. [`remove_store`](StoreManager::remove_store) only decrements. Entries
//!    at refcount 0 are released by [`sweep`](StoreManager::sweep), which runs
//!    after every [`commit_all_states`](StoreManager::commit_all_states). The
//!    last reader of a store may unmount in the same pass a new reader of it
//!    mounts; releasing eagerly would drop the committed baseline in between.
//! 3. Removing an untracked store, or one already at refcount 0, is an
//!    [`InvariantViolation::RefcountUnderflow`].
//! 4. Manager listeners learn which store notified, or `None` for a
//!    [`refresh`](StoreManager::refresh).

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::emitter::{Emitter, Subscription};
use crate::error::{InvariantViolation, Result};
use crate::store::{ErasedStore, Store, StoreId};

// ─── Snapshots ───────────────────────────────────────────────────────────────

/// One store's head or committed state at a given version.
#[derive(Clone)]
pub struct SnapshotEntry {
    store: Rc<dyn ErasedStore>,
    version: u64,
    committed: bool,
    state: Rc<dyn Any>,
}

impl SnapshotEntry {
    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.store.id()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Read from the committed side rather than from head.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    #[must_use]
    pub fn state<S: 'static>(&self) -> Option<&S> {
        self.state.downcast_ref::<S>()
    }
}

/// States of every tracked store, ordered by [`StoreId`].
///
/// Two snapshots are equal when they cover the same stores at the same
/// versions, each read from the same side (head or committed).
#[derive(Clone, Default)]
pub struct StoreSnapshot {
    entries: Vec<SnapshotEntry>,
}

impl StoreSnapshot {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn entry(&self, store: StoreId) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|entry| entry.store_id() == store)
    }

    /// Typed state of `store`, if it is part of this snapshot.
    #[must_use]
    pub fn get<S: 'static>(&self, store: StoreId) -> Option<&S> {
        self.entry(store).and_then(|entry| entry.state::<S>())
    }

    /// Replace the entry of the same store with `entry`. Stores missing from
    /// this snapshot are left out.
    #[must_use]
    pub fn overlay(mut self, entry: &SnapshotEntry) -> Self {
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|slot| slot.store_id() == entry.store_id())
        {
            *slot = entry.clone();
        }
        self
    }
}

impl PartialEq for StoreSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|(a, b)| {
                    a.store_id() == b.store_id()
                        && a.version == b.version
                        && a.committed == b.committed
                })
    }
}

impl fmt::Debug for StoreSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|entry| (entry.store_id(), (entry.version, entry.committed))),
            )
            .finish()
    }
}

// ─── Manager ─────────────────────────────────────────────────────────────────

struct Entry {
    store: Rc<dyn ErasedStore>,
    refcount: usize,
    _relay: Subscription,
}

struct ManagerInner {
    entries: RefCell<BTreeMap<StoreId, Entry>>,
    emitter: Emitter,
    /// Store whose notification is being relayed.
    origin: Rc<Cell<Option<StoreId>>>,
}

/// Ref-counted registry of the stores observed below one provider.
///
/// Cloning a `StoreManager` creates a new handle to the **same** registry.
#[derive(Clone)]
pub struct StoreManager {
    inner: Rc<ManagerInner>,
}

impl StoreManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ManagerInner {
                entries: RefCell::new(BTreeMap::new()),
                emitter: Emitter::new(),
                origin: Rc::new(Cell::new(None)),
            }),
        }
    }

    pub fn add_store<S: Clone + PartialEq + 'static, A: 'static>(&self, store: &Store<S, A>) {
        self.add_erased(store.erased());
    }

    /// Take a reference on `store`, subscribing to it on first reference.
    pub fn add_erased(&self, store: Rc<dyn ErasedStore>) {
        let id = store.id();
        if let Some(entry) = self.inner.entries.borrow_mut().get_mut(&id) {
            entry.refcount += 1;
            return;
        }

        let relay = self.inner.emitter.clone();
        let origin = Rc::clone(&self.inner.origin);
        let subscription = store.subscribe_erased(Box::new(move || {
            let outer = origin.replace(Some(id));
            relay.notify();
            origin.set(outer);
        }));
        debug!(store = %id, "store manager tracking store");
        self.inner.entries.borrow_mut().insert(
            id,
            Entry {
                store,
                refcount: 1,
                _relay: subscription,
            },
        );
    }

    pub fn remove_store<S: Clone + PartialEq + 'static, A: 'static>(
        &self,
        store: &Store<S, A>,
    ) -> Result<()> {
        self.remove_id(store.id())
    }

    /// Drop a reference on `store`. The subscription stays until the next
    /// [`sweep`](Self::sweep).
    pub fn remove_id(&self, store: StoreId) -> Result<()> {
        match self.inner.entries.borrow_mut().get_mut(&store) {
            Some(entry) if entry.refcount > 0 => {
                entry.refcount -= 1;
                Ok(())
            }
            _ => Err(InvariantViolation::RefcountUnderflow { store }.into()),
        }
    }

    /// Release every entry whose refcount dropped below 1.
    pub fn sweep(&self) {
        let released: Vec<Entry> = {
            let mut entries = self.inner.entries.borrow_mut();
            let idle: Vec<StoreId> = entries
                .iter()
                .filter(|(_, entry)| entry.refcount < 1)
                .map(|(id, _)| *id)
                .collect();
            idle.iter().filter_map(|id| entries.remove(id)).collect()
        };
        if !released.is_empty() {
            debug!(released = released.len(), "store manager swept idle stores");
        }
        // Subscriptions unsubscribe here, outside the borrow.
        drop(released);
    }

    /// Head state of every tracked store.
    #[must_use]
    pub fn all_states(&self) -> StoreSnapshot {
        self.snapshot(false)
    }

    /// Committed state of every tracked store.
    #[must_use]
    pub fn all_committed_states(&self) -> StoreSnapshot {
        self.snapshot(true)
    }

    fn snapshot(&self, committed: bool) -> StoreSnapshot {
        let entries = self.inner.entries.borrow();
        StoreSnapshot {
            entries: entries
                .values()
                .map(|entry| SnapshotEntry {
                    store: Rc::clone(&entry.store),
                    version: entry.store.version(),
                    committed,
                    state: if committed {
                        entry.store.committed_any()
                    } else {
                        entry.store.head_any()
                    },
                })
                .collect(),
        }
    }

    /// Commit every state in `snapshot` into its store, then sweep.
    pub fn commit_all_states(&self, snapshot: &StoreSnapshot) {
        for entry in snapshot.iter() {
            if !entry.store.commit_any(entry.state.as_ref()) {
                warn!(store = %entry.store_id(), "snapshot state has the wrong type, skipped");
            }
        }
        debug!(stores = snapshot.len(), "committed rendering pass");
        self.sweep();
    }

    /// Subscribe to notifications of every tracked store. The listener
    /// receives the notifying store.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl Fn(Option<StoreId>) + 'static) -> Subscription {
        let origin = Rc::clone(&self.inner.origin);
        self.inner.emitter.subscribe(move || listener(origin.get()))
    }

    /// Re-announce the tracked stores to manager subscribers without any
    /// store having changed. Listeners receive `None`.
    pub fn refresh(&self) {
        let outer = self.inner.origin.replace(None);
        self.inner.emitter.notify();
        self.inner.origin.set(outer);
    }

    #[must_use]
    pub fn tracked_len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    #[must_use]
    pub fn refcount(&self, store: StoreId) -> Option<usize> {
        self.inner
            .entries
            .borrow()
            .get(&store)
            .map(|entry| entry.refcount)
    }

    /// Release every entry regardless of refcount.
    pub fn dispose(&self) {
        let released = std::mem::take(&mut *self.inner.entries.borrow_mut());
        debug!(released = released.len(), "store manager disposed");
        drop(released);
    }
}

impl Default for StoreManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StoreManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.inner.entries.borrow();
        f.debug_map()
            .entries(entries.iter().map(|(id, entry)| (id, entry.refcount)))
            .finish()
    }
}
