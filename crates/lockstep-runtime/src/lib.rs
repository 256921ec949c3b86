#![forbid(unsafe_code)]

//! Runtime: a deterministic two-lane host and the tear-free reader binding.
//!
//! - [`host`]: cooperative host with immediate and deferred lanes and a
//!   pre-paint phase that can still change what becomes visible.
//! - [`provider`]: the per-subtree [`Provider`] and its commit tracker.
//! - [`reader`]: [`use_store_selector`], [`use_store`], [`use_dispatch`].
//! - [`trace`]: a [`RenderTrace`] of every render, commit and paint.
//!
//! # Example
//!
//! ```
//! use lockstep_core::Store;
//! use lockstep_runtime::{Host, Provider, Scope, use_store};
//!
//! let host = Host::new();
//! let provider = Provider::mount(&Scope::root(&host))?;
//! let store = Store::new(1_i32, |s: &i32, a: &i32| s + a);
//! let reader = host.act(|| use_store(&provider.scope(), &store))??;
//!
//! host.defer(|| store.dispatch(&1, &host))?;
//! host.flush()?;
//! assert_eq!(reader.visible(), Some(1));
//!
//! host.resolve_deferred()?;
//! assert_eq!(reader.visible(), Some(2));
//! # Ok::<(), lockstep_core::LockstepError>(())
//! ```

pub mod host;
pub mod provider;
mod queue;
pub mod reader;
pub mod trace;

pub use host::{ComponentId, Host, HostConfig, Lane};
pub use provider::{Provider, Scope};
pub use reader::{
    Dispatch, ReadOptions, Reader, Selector, use_dispatch, use_store, use_store_selector,
    use_store_selector_with,
};
pub use trace::{RenderTrace, TraceEvent};
