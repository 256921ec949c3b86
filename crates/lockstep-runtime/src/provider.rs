#![forbid(unsafe_code)]

//! Provider scope and the commit tracker.
//!
//! A [`Provider`] is mounted exactly once above every reader of a subtree. It
//! owns the [`StoreManager`] for that subtree and one commit tracker: a host
//! component that mirrors the manager's aggregated state and, in its
//! pre-paint phase, commits it back into every store. That pre-paint phase
//! is the only point where a whole rendering pass, across any number of
//! stores, is known to be about to become visible, so it is the only caller
//! of [`StoreManager::commit_all_states`] in lockstep.
//!
//! The tracker is mounted before any reader of the provider, so its pre-paint
//! work runs before theirs within a pass.
//!
//! # Invariants
//!
//! 1. An immediate pass commits head only for the stores that notified in
//!    the immediate lane since the tracker last rendered. Every other store
//!    keeps its committed state, so one store's immediate update never
//!    publishes another store's unresolved deferred head.
//! 2. A deferred pass commits the head of every tracked store.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use lockstep_core::{
    ConfigurationError, Result, SnapshotEntry, StoreId, StoreManager, StoreSnapshot, Subscription,
};
use tracing::{debug, warn};

use crate::host::{Component, ComponentId, Host, Lane};
use crate::queue::UpdateQueue;
use crate::trace::TraceEvent;

// ─── Commit tracker ──────────────────────────────────────────────────────────

/// What the tracker would commit for one notification, per pass lane.
#[derive(Clone)]
struct Mirror {
    visible: StoreSnapshot,
    head: StoreSnapshot,
}

impl Mirror {
    fn into_lane(self, lane: Lane) -> StoreSnapshot {
        match lane {
            Lane::Immediate => self.visible,
            Lane::Deferred => self.head,
        }
    }
}

pub(crate) struct CommitTracker {
    id: ComponentId,
    host: Host,
    manager: StoreManager,
    queue: RefCell<UpdateQueue<Mirror>>,
    /// Heads captured by immediate notifications not yet rendered.
    immediate_heads: RefCell<BTreeMap<StoreId, SnapshotEntry>>,
    rendered: RefCell<StoreSnapshot>,
    /// Rendered a new snapshot this pass; commit it during pre-paint.
    changed: Cell<bool>,
    subscription: RefCell<Option<Subscription>>,
    torn_down: Cell<bool>,
}

impl CommitTracker {
    fn mount(host: &Host, manager: &StoreManager) -> Rc<Self> {
        let tracker = Rc::new(Self {
            id: host.next_component_id(),
            host: host.clone(),
            manager: manager.clone(),
            queue: RefCell::new(UpdateQueue::new()),
            immediate_heads: RefCell::new(BTreeMap::new()),
            rendered: RefCell::new(manager.all_committed_states()),
            changed: Cell::new(false),
            subscription: RefCell::new(None),
            torn_down: Cell::new(false),
        });

        let weak = Rc::downgrade(&tracker);
        let subscription = manager.subscribe(move |origin| {
            if let Some(tracker) = weak.upgrade() {
                tracker.mirror(origin);
            }
        });
        *tracker.subscription.borrow_mut() = Some(subscription);
        host.register(tracker.clone());
        tracker
    }

    /// Queue the manager's current aggregate in the current lane.
    ///
    /// Heads are captured now: a rebasing store moves its head again right
    /// after its immediate notification.
    fn mirror(&self, origin: Option<StoreId>) {
        let lane = self.host.current_lane();
        let head = self.manager.all_states();
        let visible = match lane {
            Lane::Deferred => head.clone(),
            Lane::Immediate => {
                let mut immediate_heads = self.immediate_heads.borrow_mut();
                if let Some(entry) = origin.and_then(|store| head.entry(store)) {
                    immediate_heads.insert(entry.store_id(), entry.clone());
                }
                immediate_heads
                    .values()
                    .fold(self.manager.all_committed_states(), StoreSnapshot::overlay)
            }
        };
        self.queue.borrow_mut().push(lane, Mirror { visible, head });
    }
}

impl Component for CommitTracker {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn needs_render(&self, lane: Lane) -> bool {
        !self.torn_down.get() && self.queue.borrow().has_pending(lane)
    }

    fn render(&self, lane: Lane) {
        let Some(mirror) = self.queue.borrow_mut().take(lane) else {
            return;
        };
        let snapshot = mirror.into_lane(lane);
        self.immediate_heads.borrow_mut().clear();
        if *self.rendered.borrow() != snapshot {
            self.changed.set(true);
        }
        self.host.trace().record(TraceEvent::Render {
            component: self.id,
            label: "commit-tracker".into(),
            lane,
            value: format!("{snapshot:?}"),
        });
        *self.rendered.borrow_mut() = snapshot;
    }

    fn pre_paint(&self) -> Result<()> {
        if !self.changed.replace(false) {
            return Ok(());
        }
        let snapshot = self.rendered.borrow().clone();
        self.manager.commit_all_states(&snapshot);
        self.host.trace().record(TraceEvent::Commit {
            stores: snapshot.len(),
        });
        Ok(())
    }

    fn paint(&self) {}

    fn has_deferred(&self) -> bool {
        self.queue.borrow().has_deferred()
    }

    fn discard_deferred(&self) {
        self.queue.borrow_mut().discard_deferred();
    }

    fn teardown(&self) -> Result<()> {
        if self.torn_down.replace(true) {
            return Ok(());
        }
        drop(self.subscription.borrow_mut().take());
        self.host.unregister(self.id);
        Ok(())
    }
}

// ─── Provider ────────────────────────────────────────────────────────────────

pub(crate) struct ProviderInner {
    host: Host,
    manager: StoreManager,
    tracker: Rc<CommitTracker>,
    readers: RefCell<Vec<Weak<dyn Component>>>,
    mounted: Cell<bool>,
}

impl ProviderInner {
    pub(crate) fn manager(&self) -> &StoreManager {
        &self.manager
    }

    pub(crate) fn track(&self, reader: Weak<dyn Component>) {
        let mut readers = self.readers.borrow_mut();
        readers.retain(|r| r.strong_count() > 0);
        readers.push(reader);
    }

    fn teardown(&self) -> Result<()> {
        if !self.mounted.replace(false) {
            return Ok(());
        }
        let readers = std::mem::take(&mut *self.readers.borrow_mut());
        let mut first_err = None;
        // Children unmount before their provider.
        for reader in readers.iter().filter_map(Weak::upgrade) {
            if let Err(err) = reader.teardown() {
                first_err.get_or_insert(err);
            }
        }
        self.tracker.teardown()?;
        self.manager.dispose();
        debug!(host_components = self.host.component_count(), "provider unmounted");
        first_err.map_or(Ok(()), Err)
    }
}

/// Mount point that every reader must sit below.
pub struct Provider {
    inner: Rc<ProviderInner>,
}

impl Provider {
    /// Mount a provider in `scope`, which must not already have one.
    pub fn mount(scope: &Scope) -> Result<Self> {
        if scope.has_provider() {
            return Err(ConfigurationError::NestedProvider.into());
        }
        let host = scope.host().clone();
        let manager = StoreManager::new();
        let tracker = CommitTracker::mount(&host, &manager);
        debug!(tracker = %tracker.id, "provider mounted");
        Ok(Self {
            inner: Rc::new(ProviderInner {
                host,
                manager,
                tracker,
                readers: RefCell::new(Vec::new()),
                mounted: Cell::new(true),
            }),
        })
    }

    /// Scope for the subtree below this provider.
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope {
            host: self.inner.host.clone(),
            provider: Some(Rc::clone(&self.inner)),
        }
    }

    #[must_use]
    pub fn manager(&self) -> &StoreManager {
        &self.inner.manager
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.get()
    }

    /// Unmount every reader below the provider, then release the commit
    /// tracker and every store subscription.
    pub fn unmount(self) -> Result<()> {
        self.inner.teardown()
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        if let Err(err) = self.inner.teardown() {
            warn!(%err, "provider teardown failed during drop");
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("mounted", &self.is_mounted())
            .field("manager", &self.inner.manager)
            .finish_non_exhaustive()
    }
}

// ─── Scope ───────────────────────────────────────────────────────────────────

/// Position in the tree where a reader or provider is mounted.
#[derive(Clone)]
pub struct Scope {
    host: Host,
    provider: Option<Rc<ProviderInner>>,
}

impl Scope {
    /// Top of the tree: no provider yet.
    #[must_use]
    pub fn root(host: &Host) -> Self {
        Self {
            host: host.clone(),
            provider: None,
        }
    }

    #[must_use]
    pub fn host(&self) -> &Host {
        &self.host
    }

    #[must_use]
    pub fn has_provider(&self) -> bool {
        self.provider
            .as_ref()
            .is_some_and(|provider| provider.mounted.get())
    }

    pub(crate) fn provider(&self) -> Result<&Rc<ProviderInner>> {
        match &self.provider {
            Some(provider) if provider.mounted.get() => Ok(provider),
            _ => Err(ConfigurationError::MissingProvider.into()),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("has_provider", &self.has_provider())
            .finish_non_exhaustive()
    }
}
