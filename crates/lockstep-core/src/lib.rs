#![forbid(unsafe_code)]

//! Core: stores, the rebase protocol, and cross-store commit tracking.
//!
//! - [`emitter`]: ordered listener list with RAII subscriptions.
//! - [`source`]: the contract for the external owner of a piece of state.
//! - [`schedule`]: the capability a host exposes for deferred batches.
//! - [`store`]: head/committed snapshots and the rebase algorithm.
//! - [`manager`]: ref-counted tracking and atomic commit across stores.
//! - [`error`]: the error taxonomy shared by every lockstep crate.
//!
//! Everything here is single-threaded (`Rc`/`RefCell`) and synchronous.
//! Lockstep never creates threads, tasks, or locks; it reacts to the host.

pub mod emitter;
pub mod error;
pub mod manager;
pub mod schedule;
pub mod source;
pub mod store;

pub use emitter::{Emitter, Subscription};
pub use error::{ConfigurationError, InvariantViolation, LockstepError, Result, UsageError};
pub use manager::{SnapshotEntry, StoreManager, StoreSnapshot};
pub use schedule::Scheduler;
pub use source::{ReducerSource, Source};
pub use store::{ErasedStore, Store, StoreId};
