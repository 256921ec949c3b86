#![forbid(unsafe_code)]

//! The scheduling capability a host exposes to stores.
//!
//! Stores never inspect scheduler internals. Whether a deferred batch is open
//! is asked through [`Scheduler::is_deferred_batch_open`], and the rebase
//! re-anchors a pending projection through [`Scheduler::start_deferred`]. The
//! integration threads a `&dyn Scheduler` into every
//! [`Store::handle_update`](crate::store::Store::handle_update) call.
//!
//! # Platform precondition
//!
//! The reader fixup protocol relies on the host having a pre-paint phase that
//! can still change what becomes visible, followed by a paint. A host without
//! that split cannot provide the no-tearing guarantee.

/// Priority-aware host capability.
pub trait Scheduler {
    /// True while code runs inside a deferred batch callback.
    fn is_deferred_batch_open(&self) -> bool;

    /// Run `f` inside a newly opened deferred batch. Every update scheduled
    /// by `f` belongs to that batch and stays invisible until it resolves.
    fn start_deferred(&self, f: &mut dyn FnMut());
}
