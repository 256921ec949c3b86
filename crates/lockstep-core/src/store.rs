#![forbid(unsafe_code)]

//! Head/committed snapshots of one [`Source`] and the rebase algorithm.
//!
//! # Model
//!
//! A [`Store`] keeps two values:
//!
//! - **head**: the latest value, possibly including an unresolved deferred
//!   action.
//! - **committed**: the value every reader currently agrees is visible.
//!
//! Both are folds of the same chronological action history from a common
//! ancestor. `committed` stops at the latest immediate action and excludes
//! any unresolved deferred action; `head` additionally includes it.
//!
//! # Update rules
//!
//! [`Store::handle_update`] runs right after the source applied an action:
//!
//! 1. Deferred batch open: `head := source`, notify. The readers' own
//!    recomputation lands in the same batch.
//! 2. No batch open and `head == committed`: `head := committed := source`,
//!    notify.
//! 3. No batch open and `head != committed` (rebase):
//!    `committed := reduce(committed, action)`, `head := committed`, notify;
//!    then inside a new deferred batch `head := source`, notify again.
//!
//! # Failure Modes
//!
//! - **Impure reducer**: step 3 calls `reduce` speculatively. Side effects
//!   there corrupt the rebased value and are not detected.
//! - **Out-of-order call**: calling `handle_update` before the source applied
//!   the action makes `head` lag by one action. Not detected either.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::emitter::{Emitter, Subscription};
use crate::error::{Result, UsageError};
use crate::schedule::Scheduler;
use crate::source::{ReducerSource, Source};

// ─── Store identity ──────────────────────────────────────────────────────────

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique store identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(u64);

impl StoreId {
    fn next() -> Self {
        Self(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

// ─── Inner shared state ──────────────────────────────────────────────────────

struct Snapshots<S> {
    head: S,
    committed: S,
}

struct StoreInner<S, A> {
    id: StoreId,
    label: RefCell<Option<String>>,
    source: Rc<dyn Source<State = S, Action = A>>,
    /// Present only for self-contained stores.
    local: Option<Rc<ReducerSource<S, A>>>,
    snapshots: RefCell<Snapshots<S>>,
    /// Bumped every time `head` is replaced.
    version: Cell<u64>,
    emitter: Emitter,
}

impl<S: Clone + PartialEq + 'static, A: 'static> StoreInner<S, A> {
    fn replace_head(&self, head: S) {
        self.snapshots.borrow_mut().head = head;
        self.version.set(self.version.get() + 1);
    }

    fn replace_both(&self, value: S) {
        {
            let mut snapshots = self.snapshots.borrow_mut();
            snapshots.head = value.clone();
            snapshots.committed = value;
        }
        self.version.set(self.version.get() + 1);
    }

    fn notify(&self) {
        trace!(store = %self.id, version = self.version.get(), "store notify");
        self.emitter.notify();
    }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Shared handle to a store. Cloning yields another handle to the same store;
/// identity is handle identity (see [`Store::ptr_eq`]).
pub struct Store<S, A> {
    inner: Rc<StoreInner<S, A>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S, A> Store<S, A> {
    #[must_use]
    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    #[must_use]
    pub fn label(&self) -> Option<String> {
        self.inner.label.borrow().clone()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<S: Clone + PartialEq + 'static, A: 'static> Store<S, A> {
    /// Self-contained store with its own internal source.
    #[must_use]
    pub fn new(initial: S, reducer: impl Fn(&S, &A) -> S + 'static) -> Self {
        let local = Rc::new(ReducerSource::new(initial, reducer));
        let source: Rc<dyn Source<State = S, Action = A>> = local.clone();
        Self::build(source, Some(local))
    }

    /// Store mirroring an external source. The integration applies actions
    /// to `source` itself and then calls [`handle_update`](Self::handle_update).
    #[must_use]
    pub fn from_source(source: Rc<dyn Source<State = S, Action = A>>) -> Self {
        Self::build(source, None)
    }

    fn build(
        source: Rc<dyn Source<State = S, Action = A>>,
        local: Option<Rc<ReducerSource<S, A>>>,
    ) -> Self {
        let initial = source.state();
        Self {
            inner: Rc::new(StoreInner {
                id: StoreId::next(),
                label: RefCell::new(None),
                source,
                local,
                snapshots: RefCell::new(Snapshots {
                    head: initial.clone(),
                    committed: initial,
                }),
                version: Cell::new(0),
                emitter: Emitter::new(),
            }),
        }
    }

    /// Attach a diagnostic label, shown in logs and `Debug` output.
    #[must_use]
    pub fn with_label(self, label: impl Into<String>) -> Self {
        *self.inner.label.borrow_mut() = Some(label.into());
        self
    }

    /// Head state: the latest value, possibly ahead of what is visible.
    #[must_use]
    pub fn state(&self) -> S {
        self.inner.snapshots.borrow().head.clone()
    }

    /// The value all readers currently agree is visible.
    #[must_use]
    pub fn committed_state(&self) -> S {
        self.inner.snapshots.borrow().committed.clone()
    }

    /// True while head is ahead of committed (a deferred value is outstanding).
    #[must_use]
    pub fn has_outstanding(&self) -> bool {
        let snapshots = self.inner.snapshots.borrow();
        snapshots.head != snapshots.committed
    }

    /// Per-store counter, bumped whenever head state is replaced.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl Fn() + 'static) -> Subscription {
        self.inner.emitter.subscribe(listener)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.emitter.listener_count()
    }

    /// Whether [`dispatch`](Self::dispatch) is available.
    #[must_use]
    pub fn is_dispatchable(&self) -> bool {
        self.inner.local.is_some()
    }

    /// Apply `action` to the internal source, then run
    /// [`handle_update`](Self::handle_update).
    pub fn dispatch(&self, action: &A, scheduler: &dyn Scheduler) -> Result<()> {
        let Some(local) = &self.inner.local else {
            return Err(UsageError::NotDispatchable { store: self.id() }.into());
        };
        local.apply(action);
        self.handle_update(action, scheduler);
        Ok(())
    }

    /// React to `action`, which the source has already applied.
    pub fn handle_update(&self, action: &A, scheduler: &dyn Scheduler) {
        let inner = &self.inner;

        if scheduler.is_deferred_batch_open() {
            inner.replace_head(inner.source.state());
            inner.notify();
            return;
        }

        if !self.has_outstanding() {
            inner.replace_both(inner.source.state());
            inner.notify();
            return;
        }

        // An immediate action arrived while a deferred value is unresolved.
        // Apply it to the last agreed value so it is visible at once, then
        // re-anchor the pending projection in a new deferred batch.
        let pending = inner.source.state();
        let rebased = {
            let snapshots = inner.snapshots.borrow();
            inner.source.reduce(&snapshots.committed, action)
        };
        debug!(
            store = %inner.id,
            label = inner.label.borrow().as_deref().unwrap_or(""),
            "rebasing outstanding deferred value onto immediate update"
        );
        inner.replace_both(rebased);
        inner.notify();

        let mut pending = Some(pending);
        scheduler.start_deferred(&mut || {
            if let Some(head) = pending.take() {
                inner.replace_head(head);
                inner.notify();
            }
        });
    }

    /// Record `state` as visible to every reader.
    pub fn commit(&self, state: S) {
        self.inner.snapshots.borrow_mut().committed = state;
    }

    /// Type-erased handle for cross-store bookkeeping.
    #[must_use]
    pub fn erased(&self) -> Rc<dyn ErasedStore> {
        self.inner.clone()
    }
}

impl<S: fmt::Debug, A> fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshots = self.inner.snapshots.borrow();
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label.borrow())
            .field("head", &snapshots.head)
            .field("committed", &snapshots.committed)
            .field("version", &self.inner.version.get())
            .finish()
    }
}

// ─── Type erasure ────────────────────────────────────────────────────────────

/// Object-safe view of a store, independent of its state and action types.
pub trait ErasedStore {
    fn id(&self) -> StoreId;
    fn version(&self) -> u64;
    fn head_any(&self) -> Rc<dyn Any>;
    fn committed_any(&self) -> Rc<dyn Any>;
    /// Commit a value produced by [`head_any`](Self::head_any). Returns false,
    /// leaving the store untouched, when `state` has the wrong type.
    fn commit_any(&self, state: &dyn Any) -> bool;
    fn subscribe_erased(&self, listener: Box<dyn Fn()>) -> Subscription;
    fn listener_count(&self) -> usize;
}

impl<S: Clone + PartialEq + 'static, A: 'static> ErasedStore for StoreInner<S, A> {
    fn id(&self) -> StoreId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn head_any(&self) -> Rc<dyn Any> {
        Rc::new(self.snapshots.borrow().head.clone())
    }

    fn committed_any(&self) -> Rc<dyn Any> {
        Rc::new(self.snapshots.borrow().committed.clone())
    }

    fn commit_any(&self, state: &dyn Any) -> bool {
        match state.downcast_ref::<S>() {
            Some(state) => {
                self.snapshots.borrow_mut().committed = state.clone();
                true
            }
            None => false,
        }
    }

    fn subscribe_erased(&self, listener: Box<dyn Fn()>) -> Subscription {
        self.emitter.subscribe(listener)
    }

    fn listener_count(&self) -> usize {
        self.emitter.listener_count()
    }
}
