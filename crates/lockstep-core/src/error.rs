#![forbid(unsafe_code)]

//! Error taxonomy for lockstep.
//!
//! Every error is raised synchronously at the point of violation and is fatal
//! to the current rendering pass. Nothing here is retried: all operations are
//! local and synchronous, so a retry would observe the same state.
//!
//! - [`ConfigurationError`]: the tree is wired incorrectly (no provider in
//!   scope, or a provider nested inside another).
//! - [`UsageError`]: a caller broke an API contract, e.g. swapping the store
//!   or selector of a mounted reader.
//! - [`InvariantViolation`]: lockstep's own bookkeeping is inconsistent.

use thiserror::Error;

use crate::store::StoreId;

pub type Result<T> = std::result::Result<T, LockstepError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockstepError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("usage error: {0}")]
    Usage(#[from] UsageError),

    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error(
        "store readers must be mounted below a provider; mount a Provider above this reader"
    )]
    MissingProvider,

    #[error("a provider is already mounted in this scope; mount exactly one provider per subtree")]
    NestedProvider,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error(
        "reader was re-rendered with a different store ({previous} -> {next}); \
         the store of a mounted reader cannot change, remount it instead"
    )]
    StoreChanged { previous: StoreId, next: StoreId },

    #[error(
        "reader of store {store} was re-rendered with a different selector; \
         selectors must be stable for the reader's lifetime"
    )]
    SelectorChanged { store: StoreId },

    #[error(
        "store {store} wraps an external source and cannot be dispatched to; \
         apply the action to the source and call handle_update"
    )]
    NotDispatchable { store: StoreId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error(
        "store {store} was removed from the store manager more often than it was added \
         (unbalanced subscribe/unsubscribe)"
    )]
    RefcountUnderflow { store: StoreId },

    #[error("pre-paint updates did not settle after {limit} synchronous passes")]
    UpdateDepthExceeded { limit: usize },
}

impl LockstepError {
    /// Whether the error was caused by lockstep itself rather than its caller.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}
