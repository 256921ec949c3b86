#![forbid(unsafe_code)]

//! Reference fixtures: the counter reducer and a mounted host/provider pair.

use std::fmt;

use lockstep_core::{Result, Store};
use lockstep_runtime::{Host, HostConfig, Provider, Reader, Scope, use_store};

/// Actions of the reference counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterOp {
    Double,
    Increment,
}

/// `Double -> s * 2`, `Increment -> s + 1`.
#[must_use]
pub fn counter_reducer(state: &i64, op: &CounterOp) -> i64 {
    match op {
        CounterOp::Double => state.wrapping_mul(2),
        CounterOp::Increment => state.wrapping_add(1),
    }
}

#[must_use]
pub fn counter_store(initial: i64) -> Store<i64, CounterOp> {
    Store::new(initial, counter_reducer).with_label("counter")
}

/// A host with one provider mounted at its root.
pub struct Bench {
    host: Host,
    provider: Provider,
}

impl Bench {
    pub fn new() -> Result<Self> {
        Self::with_config(HostConfig::default())
    }

    pub fn with_config(config: HostConfig) -> Result<Self> {
        let host = Host::with_config(config);
        let provider = Provider::mount(&Scope::root(&host))?;
        Ok(Self { host, provider })
    }

    #[must_use]
    pub fn host(&self) -> &Host {
        &self.host
    }

    #[must_use]
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.provider.scope()
    }

    /// Mount an identity reader and flush, so it is visible on return.
    pub fn mount<S, A>(&self, store: &Store<S, A>) -> Result<Reader<S, A, S>>
    where
        S: Clone + PartialEq + fmt::Debug + 'static,
        A: 'static,
    {
        let scope = self.scope();
        self.host.act(|| use_store(&scope, store))?
    }

    /// Dispatch immediately and flush.
    pub fn dispatch<S, A>(&self, store: &Store<S, A>, action: A) -> Result<()>
    where
        S: Clone + PartialEq + 'static,
        A: 'static,
    {
        self.host.act(|| store.dispatch(&action, &self.host))?
    }

    /// Dispatch inside a deferred batch and leave it unresolved.
    pub fn dispatch_deferred<S, A>(&self, store: &Store<S, A>, action: A) -> Result<()>
    where
        S: Clone + PartialEq + 'static,
        A: 'static,
    {
        self.host.defer(|| store.dispatch(&action, &self.host))
    }

    pub fn resolve(&self) -> Result<()> {
        self.host.resolve_deferred()
    }

    /// Unmount the provider, tearing down every reader below it.
    pub fn teardown(self) -> Result<()> {
        self.provider.unmount()
    }
}

impl fmt::Debug for Bench {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bench")
            .field("host", &self.host)
            .field("provider", &self.provider)
            .finish()
    }
}
