#![forbid(unsafe_code)]

//! Lockstep public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use lockstep_core::{LockstepError, Result, Source, Store, StoreId};

pub mod prelude {
    pub use lockstep_core as core;
    #[cfg(feature = "runtime")]
    pub use lockstep_runtime as runtime;

    pub use lockstep_core::{
        ConfigurationError, InvariantViolation, LockstepError, Result, Scheduler, Source, Store,
        StoreId, StoreManager, UsageError,
    };

    #[cfg(feature = "runtime")]
    pub use lockstep_runtime::{
        Dispatch, Host, HostConfig, Lane, Provider, ReadOptions, Reader, Scope, Selector,
        use_dispatch, use_store, use_store_selector, use_store_selector_with,
    };
}
