#![forbid(unsafe_code)]

//! Deterministic cooperative host with two priority lanes.
//!
//! The [`Host`] models the rendering host that lockstep readers live in:
//!
//! - Updates are tagged with the lane that is current when they are
//!   scheduled: [`Lane::Deferred`] inside [`Host::defer`], otherwise
//!   [`Lane::Immediate`].
//! - A pass renders every component with work in its lane, runs the
//!   pre-paint phase of the components it rendered, re-renders for any
//!   immediate updates the pre-paint phase scheduled, and only then paints.
//!   Nothing rendered in a pass is visible before paint.
//! - Immediate work flushes with [`Host::flush`] (or at the end of
//!   [`Host::act`]). Deferred work stays queued, invisible, until
//!   [`Host::resolve_deferred`] or [`Host::discard_deferred`].
//!
//! The host creates no threads and no timers; every pass runs synchronously
//! on the caller's thread.
//!
//! # Invariants
//!
//! 1. Components render, run pre-paint work, and paint in mount order.
//! 2. A pass paints once, after every synchronous re-render settled.
//! 3. Updates scheduled during a pass belong to the immediate lane unless
//!    scheduled inside [`Host::defer`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use lockstep_core::{InvariantViolation, Result, Scheduler};
use tracing::{debug, trace};

use crate::trace::RenderTrace;

// ─── Lanes ───────────────────────────────────────────────────────────────────

/// Priority class of an update or pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lane {
    /// Visible as soon as the current synchronous work flushes.
    #[default]
    Immediate,
    /// Interruptible; visible only once its batch resolves.
    Deferred,
}

impl Lane {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Deferred => "deferred",
        }
    }

    /// Whether a pass over `self` applies updates tagged `update`.
    #[must_use]
    pub const fn includes(self, update: Lane) -> bool {
        match self {
            Self::Immediate => matches!(update, Self::Immediate),
            Self::Deferred => true,
        }
    }
}

// ─── Components ──────────────────────────────────────────────────────────────

/// Identifier of a component mounted in a [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component#{}", self.0)
    }
}

/// Something the host renders.
pub(crate) trait Component {
    fn id(&self) -> ComponentId;

    /// Whether a pass over `lane` has work for this component.
    fn needs_render(&self, lane: Lane) -> bool;

    fn render(&self, lane: Lane);

    /// Runs after render, before anything becomes visible.
    fn pre_paint(&self) -> Result<()>;

    fn paint(&self);

    fn has_deferred(&self) -> bool;

    fn discard_deferred(&self);

    /// Unsubscribe and unregister. Idempotent.
    fn teardown(&self) -> Result<()>;
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Configuration for a [`Host`].
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Synchronous render/pre-paint rounds allowed in one pass before the
    /// host gives up with [`InvariantViolation::UpdateDepthExceeded`].
    pub max_sync_passes: usize,
    /// Record a [`RenderTrace`].
    pub trace: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_sync_passes: 50,
            trace: true,
        }
    }
}

impl HostConfig {
    #[must_use]
    pub fn with_max_sync_passes(mut self, limit: usize) -> Self {
        self.max_sync_passes = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }
}

// ─── Host ────────────────────────────────────────────────────────────────────

struct HostInner {
    config: HostConfig,
    /// Lane that newly scheduled updates are tagged with.
    lane: Cell<Lane>,
    components: RefCell<Vec<Rc<dyn Component>>>,
    next_component: Cell<u64>,
    flushing: Cell<bool>,
    trace: RenderTrace,
}

/// Handle to a cooperative host. Cloning yields another handle to the same
/// host.
#[derive(Clone)]
pub struct Host {
    inner: Rc<HostInner>,
}

impl Host {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HostConfig::default())
    }

    #[must_use]
    pub fn with_config(config: HostConfig) -> Self {
        let trace = RenderTrace::new(config.trace);
        Self {
            inner: Rc::new(HostInner {
                config,
                lane: Cell::new(Lane::Immediate),
                components: RefCell::new(Vec::new()),
                next_component: Cell::new(1),
                flushing: Cell::new(false),
                trace,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn trace(&self) -> &RenderTrace {
        &self.inner.trace
    }

    /// Lane that an update scheduled right now would belong to.
    #[must_use]
    pub fn current_lane(&self) -> Lane {
        self.inner.lane.get()
    }

    #[must_use]
    pub fn component_count(&self) -> usize {
        self.inner.components.borrow().len()
    }

    /// Run `f` inside a deferred batch.
    pub fn defer<R>(&self, f: impl FnOnce() -> R) -> R {
        let prev = self.inner.lane.replace(Lane::Deferred);
        let out = f();
        self.inner.lane.set(prev);
        out
    }

    /// Run `f`, then flush immediate work.
    pub fn act<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let out = f();
        self.flush()?;
        Ok(out)
    }

    /// Render and paint every pending immediate update.
    pub fn flush(&self) -> Result<()> {
        self.run_pass(Lane::Immediate)
    }

    /// Resolve every open deferred batch: render it together with any
    /// immediate work, then paint.
    pub fn resolve_deferred(&self) -> Result<()> {
        self.run_pass(Lane::Deferred)
    }

    /// Abandon every unresolved deferred update. Visible output is left as is.
    pub fn discard_deferred(&self) {
        for component in self.snapshot_components() {
            component.discard_deferred();
        }
        debug!("host discarded deferred work");
        self.inner.trace.record(crate::trace::TraceEvent::Discard);
    }

    #[must_use]
    pub fn has_deferred_work(&self) -> bool {
        self.inner
            .components
            .borrow()
            .iter()
            .any(|component| component.has_deferred())
    }

    pub(crate) fn next_component_id(&self) -> ComponentId {
        let id = self.inner.next_component.get();
        self.inner.next_component.set(id + 1);
        ComponentId(id)
    }

    pub(crate) fn register(&self, component: Rc<dyn Component>) {
        trace!(component = %component.id(), "host mount");
        self.inner.components.borrow_mut().push(component);
    }

    pub(crate) fn unregister(&self, id: ComponentId) {
        // The removed component is dropped outside the borrow.
        let removed = {
            let mut components = self.inner.components.borrow_mut();
            components
                .iter()
                .position(|c| c.id() == id)
                .map(|idx| components.remove(idx))
        };
        if removed.is_some() {
            trace!(component = %id, "host unmount");
        }
    }

    fn snapshot_components(&self) -> Vec<Rc<dyn Component>> {
        self.inner.components.borrow().clone()
    }

    fn run_pass(&self, lane: Lane) -> Result<()> {
        if self.inner.flushing.get() {
            // Flushed by the outer pass once the current round finishes.
            return Ok(());
        }
        self.inner.flushing.set(true);
        let prev_lane = self.inner.lane.replace(Lane::Immediate);
        let result = self.run_pass_inner(lane);
        self.inner.lane.set(prev_lane);
        self.inner.flushing.set(false);
        result
    }

    fn run_pass_inner(&self, lane: Lane) -> Result<()> {
        let limit = self.inner.config.max_sync_passes;
        let mut pass_lane = lane;
        let mut touched: Vec<Rc<dyn Component>> = Vec::new();
        let mut rounds = 0usize;

        loop {
            let dirty: Vec<Rc<dyn Component>> = self
                .snapshot_components()
                .into_iter()
                .filter(|c| c.needs_render(pass_lane))
                .collect();
            if dirty.is_empty() {
                break;
            }
            if rounds == limit {
                return Err(InvariantViolation::UpdateDepthExceeded { limit }.into());
            }
            rounds += 1;

            for component in &dirty {
                component.render(pass_lane);
            }
            for component in &dirty {
                component.pre_paint()?;
            }
            for component in dirty {
                if !touched.iter().any(|t| t.id() == component.id()) {
                    touched.push(component);
                }
            }
            // Pre-paint corrections flush synchronously, before paint.
            pass_lane = Lane::Immediate;
        }

        if touched.is_empty() {
            return Ok(());
        }
        debug!(
            lane = lane.as_str(),
            rounds,
            components = touched.len(),
            "host pass painted"
        );
        touched.sort_by_key(|c| c.id());
        for component in &touched {
            component.paint();
        }
        Ok(())
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for Host {
    fn is_deferred_batch_open(&self) -> bool {
        self.current_lane() == Lane::Deferred
    }

    fn start_deferred(&self, f: &mut dyn FnMut()) {
        self.defer(f);
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("lane", &self.current_lane())
            .field("components", &self.component_count())
            .field("config", &self.inner.config)
            .finish()
    }
}
