#![forbid(unsafe_code)]

//! Reader binding: tear-free reads of a [`Store`] from inside a [`Host`].
//!
//! A reader is a host component bound for its whole lifetime to one store and
//! one [`Selector`]. Mounting runs in two steps:
//!
//! 1. **Render** derives the first value from the store's *head* state. When
//!    the reader mounts while a deferred batch is outstanding, this value is
//!    ahead of what every other reader shows.
//! 2. **Pre-paint fixup**, still before anything is visible:
//!    - register with the provider's [`StoreManager`];
//!    - recompute the selector against head and committed state;
//!    - if the rendered value differs from the committed-derived one, queue
//!      the committed-derived value as an immediate correction;
//!    - if head and committed derive different values, queue the head-derived
//!      value in a deferred batch so the reader resolves together with every
//!      other reader of the store, and refresh the commit tracker in the same
//!      batch;
//!    - subscribe. Every notification re-reads the store's current head.
//!
//! Teardown unsubscribes and releases the manager reference.
//!
//! # Invariants
//!
//! 1. A mounted reader's store and selector never change; attempts return
//!    [`UsageError::StoreChanged`] or [`UsageError::SelectorChanged`].
//! 2. Notifications never carry values; the reader re-derives at notify time.
//!
//! # Failure Modes
//!
//! - **Suspending head value**: a reader created with
//!   [`ReadOptions::with_suspense`] whose head-derived value suspends never
//!   reaches its fixup, even when the committed-derived value would render.
//!   It keeps showing its fallback (`visible() == None`) and retries only when
//!   the store's head changes again. This is a known limitation of the fixup
//!   protocol and is kept as is.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use lockstep_core::{
    Result, Store, StoreId, StoreManager, Subscription, UsageError,
};
use tracing::{debug, trace, warn};

use crate::host::{Component, ComponentId, Host, Lane};
use crate::provider::Scope;
use crate::queue::UpdateQueue;
use crate::trace::TraceEvent;

// ─── Selector ────────────────────────────────────────────────────────────────

/// Projection from store state to the value a reader shows.
///
/// Identity is pointer identity: clones of one selector are the same
/// selector, two separately built selectors never are.
pub struct Selector<S, T> {
    f: Rc<dyn Fn(&S) -> T>,
}

impl<S, T> Clone for Selector<S, T> {
    fn clone(&self) -> Self {
        Self {
            f: Rc::clone(&self.f),
        }
    }
}

impl<S: 'static, T: 'static> Selector<S, T> {
    #[must_use]
    pub fn new(f: impl Fn(&S) -> T + 'static) -> Self {
        Self { f: Rc::new(f) }
    }

    pub fn select(&self, state: &S) -> T {
        (self.f)(state)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}

impl<S: Clone + 'static> Selector<S, S> {
    #[must_use]
    pub fn identity() -> Self {
        Self::new(S::clone)
    }
}

impl<S, T> fmt::Debug for Selector<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("ptr", &Rc::as_ptr(&self.f).cast::<()>())
            .finish()
    }
}

// ─── Options ─────────────────────────────────────────────────────────────────

/// Per-reader options.
pub struct ReadOptions<T> {
    label: Option<String>,
    suspend_when: Option<Rc<dyn Fn(&T) -> bool>>,
}

impl<T> Default for ReadOptions<T> {
    fn default() -> Self {
        Self {
            label: None,
            suspend_when: None,
        }
    }
}

impl<T> ReadOptions<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Label used in traces and logs. Defaults to the store's label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Suspend instead of mounting while `predicate` holds for the first
    /// derived value.
    #[must_use]
    pub fn with_suspense(mut self, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        self.suspend_when = Some(Rc::new(predicate));
        self
    }
}

impl<T> fmt::Debug for ReadOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("label", &self.label)
            .field("suspense", &self.suspend_when.is_some())
            .finish()
    }
}

// ─── Reader component ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Registered with the host, not rendered yet.
    Pending,
    /// Showing its fallback; retries once the store's version moves past
    /// `version`.
    Suspended { version: u64 },
    /// Rendered its first value; the fixup runs in this pass's pre-paint.
    Mounting,
    Mounted,
    Unmounted,
}

struct ReaderInner<S, A, T> {
    this: Weak<Self>,
    id: ComponentId,
    label: String,
    host: Host,
    manager: StoreManager,
    store: Store<S, A>,
    selector: Selector<S, T>,
    suspend_when: Option<Rc<dyn Fn(&T) -> bool>>,
    phase: Cell<Phase>,
    queue: RefCell<UpdateQueue<T>>,
    rendered: RefCell<Option<T>>,
    visible: RefCell<Option<T>>,
    subscription: RefCell<Option<Subscription>>,
    /// Holds a reference in the manager.
    registered: Cell<bool>,
}

impl<S, A, T> ReaderInner<S, A, T>
where
    S: Clone + PartialEq + 'static,
    A: 'static,
    T: Clone + PartialEq + fmt::Debug + 'static,
{
    fn derive_head(&self) -> T {
        self.selector.select(&self.store.state())
    }

    fn render_initial(&self, lane: Lane) {
        let value = self.derive_head();
        if self.suspend_when.as_ref().is_some_and(|suspends| suspends(&value)) {
            self.phase.set(Phase::Suspended {
                version: self.store.version(),
            });
            debug!(component = %self.id, store = %self.store.id(), "reader suspended on head value");
            self.host.trace().record(TraceEvent::Suspend {
                component: self.id,
                label: self.label.clone(),
            });
            return;
        }
        self.record_render(lane, &value);
        *self.rendered.borrow_mut() = Some(value);
        self.phase.set(Phase::Mounting);
    }

    fn record_render(&self, lane: Lane, value: &T) {
        self.host.trace().record(TraceEvent::Render {
            component: self.id,
            label: self.label.clone(),
            lane,
            value: format!("{value:?}"),
        });
    }

    fn fixup(&self) {
        self.manager.add_store(&self.store);
        self.registered.set(true);

        let head = self.derive_head();
        let committed = self.selector.select(&self.store.committed_state());

        if self.rendered.borrow().as_ref() != Some(&committed) {
            trace!(component = %self.id, "reader corrects head-derived value before paint");
            self.queue
                .borrow_mut()
                .push(self.host.current_lane(), committed.clone());
        }
        if head != committed {
            // Rejoin the outstanding deferred batch, and make sure the commit
            // tracker resolves with it even if it never saw the store change.
            self.host.defer(|| {
                self.queue
                    .borrow_mut()
                    .push(self.host.current_lane(), head);
                self.manager.refresh();
            });
        }

        let weak = self.this.clone();
        let subscription = self.store.subscribe(move || {
            if let Some(reader) = weak.upgrade() {
                reader.on_store_change();
            }
        });
        *self.subscription.borrow_mut() = Some(subscription);
        self.phase.set(Phase::Mounted);
    }

    fn on_store_change(&self) {
        if self.phase.get() != Phase::Mounted {
            return;
        }
        let value = self.derive_head();
        self.queue
            .borrow_mut()
            .push(self.host.current_lane(), value);
    }

    fn teardown_inner(&self) -> Result<()> {
        if self.phase.replace(Phase::Unmounted) == Phase::Unmounted {
            return Ok(());
        }
        drop(self.subscription.borrow_mut().take());
        self.host.unregister(self.id);
        if self.registered.replace(false) {
            self.manager.remove_store(&self.store)?;
        }
        trace!(component = %self.id, store = %self.store.id(), "reader unmounted");
        Ok(())
    }
}

impl<S, A, T> Component for ReaderInner<S, A, T>
where
    S: Clone + PartialEq + 'static,
    A: 'static,
    T: Clone + PartialEq + fmt::Debug + 'static,
{
    fn id(&self) -> ComponentId {
        self.id
    }

    fn needs_render(&self, lane: Lane) -> bool {
        match self.phase.get() {
            Phase::Pending => true,
            Phase::Suspended { version } => self.store.version() != version,
            Phase::Mounted => self.queue.borrow().has_pending(lane),
            Phase::Mounting | Phase::Unmounted => false,
        }
    }

    fn render(&self, lane: Lane) {
        match self.phase.get() {
            Phase::Pending | Phase::Suspended { .. } => self.render_initial(lane),
            Phase::Mounted => {
                let Some(value) = self.queue.borrow_mut().take(lane) else {
                    return;
                };
                self.record_render(lane, &value);
                *self.rendered.borrow_mut() = Some(value);
            }
            Phase::Mounting | Phase::Unmounted => {}
        }
    }

    fn pre_paint(&self) -> Result<()> {
        if self.phase.get() == Phase::Mounting {
            self.fixup();
        }
        Ok(())
    }

    fn paint(&self) {
        let Some(value) = self.rendered.borrow().clone() else {
            return;
        };
        self.host.trace().record(TraceEvent::Paint {
            component: self.id,
            label: self.label.clone(),
            value: format!("{value:?}"),
        });
        *self.visible.borrow_mut() = Some(value);
    }

    fn has_deferred(&self) -> bool {
        self.queue.borrow().has_deferred()
    }

    fn discard_deferred(&self) {
        self.queue.borrow_mut().discard_deferred();
    }

    fn teardown(&self) -> Result<()> {
        self.teardown_inner()
    }
}

// ─── Reader handle ───────────────────────────────────────────────────────────

/// Handle to a mounted reader. Dropping it unmounts the reader.
pub struct Reader<S, A, T>
where
    S: Clone + PartialEq + 'static,
    A: 'static,
    T: Clone + PartialEq + fmt::Debug + 'static,
{
    inner: Rc<ReaderInner<S, A, T>>,
}

impl<S, A, T> Reader<S, A, T>
where
    S: Clone + PartialEq + 'static,
    A: 'static,
    T: Clone + PartialEq + fmt::Debug + 'static,
{
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.inner.id
    }

    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.inner.store.id()
    }

    /// Value painted last, or `None` while nothing was painted (not rendered
    /// yet, or showing a suspense fallback).
    #[must_use]
    pub fn visible(&self) -> Option<T> {
        self.inner.visible.borrow().clone()
    }

    /// Value rendered last, painted or not.
    #[must_use]
    pub fn rendered(&self) -> Option<T> {
        self.inner.rendered.borrow().clone()
    }

    /// Finished its pre-paint fixup and is subscribed to the store.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.inner.phase.get() == Phase::Mounted
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        matches!(self.inner.phase.get(), Phase::Suspended { .. })
    }

    /// Re-render with the given targets. Both must be the ones the reader
    /// was created with.
    pub fn rebind(&self, store: &Store<S, A>, selector: &Selector<S, T>) -> Result<()> {
        self.rebind_store(store)?;
        if !self.inner.selector.ptr_eq(selector) {
            return Err(UsageError::SelectorChanged {
                store: self.inner.store.id(),
            }
            .into());
        }
        Ok(())
    }

    /// Re-render with the given store, keeping the selector.
    pub fn rebind_store(&self, store: &Store<S, A>) -> Result<()> {
        if !self.inner.store.ptr_eq(store) {
            return Err(UsageError::StoreChanged {
                previous: self.inner.store.id(),
                next: store.id(),
            }
            .into());
        }
        Ok(())
    }

    /// Unsubscribe and release the store. Idempotent with provider teardown.
    pub fn unmount(self) -> Result<()> {
        self.inner.teardown_inner()
    }
}

impl<S, A, T> Drop for Reader<S, A, T>
where
    S: Clone + PartialEq + 'static,
    A: 'static,
    T: Clone + PartialEq + fmt::Debug + 'static,
{
    fn drop(&mut self) {
        if let Err(err) = self.inner.teardown_inner() {
            warn!(component = %self.inner.id, %err, "reader teardown failed during drop");
        }
    }
}

impl<S, A, T> fmt::Debug for Reader<S, A, T>
where
    S: Clone + PartialEq + 'static,
    A: 'static,
    T: Clone + PartialEq + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("id", &self.inner.id)
            .field("store", &self.inner.store.id())
            .field("phase", &self.inner.phase.get())
            .field("visible", &self.inner.visible.borrow())
            .finish()
    }
}

// ─── Entry points ────────────────────────────────────────────────────────────

/// Read `selector(state)` from `store`. The reader mounts on the host's next
/// pass.
pub fn use_store_selector<S, A, T>(
    scope: &Scope,
    store: &Store<S, A>,
    selector: &Selector<S, T>,
) -> Result<Reader<S, A, T>>
where
    S: Clone + PartialEq + 'static,
    A: 'static,
    T: Clone + PartialEq + fmt::Debug + 'static,
{
    use_store_selector_with(scope, store, selector, ReadOptions::default())
}

pub fn use_store_selector_with<S, A, T>(
    scope: &Scope,
    store: &Store<S, A>,
    selector: &Selector<S, T>,
    options: ReadOptions<T>,
) -> Result<Reader<S, A, T>>
where
    S: Clone + PartialEq + 'static,
    A: 'static,
    T: Clone + PartialEq + fmt::Debug + 'static,
{
    let provider = scope.provider()?;
    let host = scope.host();
    let label = options
        .label
        .or_else(|| store.label())
        .unwrap_or_else(|| "reader".to_owned());

    let inner = Rc::new_cyclic(|this| ReaderInner {
        this: this.clone(),
        id: host.next_component_id(),
        label,
        host: host.clone(),
        manager: provider.manager().clone(),
        store: store.clone(),
        selector: selector.clone(),
        suspend_when: options.suspend_when,
        phase: Cell::new(Phase::Pending),
        queue: RefCell::new(UpdateQueue::new()),
        rendered: RefCell::new(None),
        visible: RefCell::new(None),
        subscription: RefCell::new(None),
        registered: Cell::new(false),
    });

    let component: Rc<dyn Component> = inner.clone();
    provider.track(Rc::downgrade(&component));
    host.register(component);
    Ok(Reader { inner })
}

/// Read the whole state of `store`.
pub fn use_store<S, A>(scope: &Scope, store: &Store<S, A>) -> Result<Reader<S, A, S>>
where
    S: Clone + PartialEq + fmt::Debug + 'static,
    A: 'static,
{
    use_store_selector(scope, store, &Selector::identity())
}

/// Dispatch handle for a self-contained store.
pub struct Dispatch<S, A> {
    store: Store<S, A>,
    host: Host,
}

impl<S: Clone + PartialEq + 'static, A: 'static> Dispatch<S, A> {
    /// Dispatch in the host's current lane.
    pub fn dispatch(&self, action: A) -> Result<()> {
        self.store.dispatch(&action, &self.host)
    }

    /// Dispatch inside a new deferred batch.
    pub fn dispatch_deferred(&self, action: A) -> Result<()> {
        self.host.defer(|| self.store.dispatch(&action, &self.host))
    }
}

impl<S, A> Clone for Dispatch<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            host: self.host.clone(),
        }
    }
}

impl<S, A> fmt::Debug for Dispatch<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("store", &self.store.id())
            .finish()
    }
}

/// Dispatcher bound to `store` and the scope's host. No provider required.
pub fn use_dispatch<S, A>(scope: &Scope, store: &Store<S, A>) -> Result<Dispatch<S, A>>
where
    S: Clone + PartialEq + 'static,
    A: 'static,
{
    if !store.is_dispatchable() {
        return Err(UsageError::NotDispatchable { store: store.id() }.into());
    }
    Ok(Dispatch {
        store: store.clone(),
        host: scope.host().clone(),
    })
}
