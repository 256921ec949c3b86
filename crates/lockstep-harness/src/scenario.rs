#![forbid(unsafe_code)]

//! Scripted scenarios over a pair of counter stores.
//!
//! A [`Scenario`] is a flat list of [`Step`]s replayed against a fresh
//! [`Bench`] holding [`STORE_COUNT`] counter stores. Store `k` starts at
//! `initial + 10 * k`. After every step the run records what each mounted
//! reader shows, grouped by store, so callers can check for tears and
//! convergence.
//!
//! # Invariants checked by callers
//!
//! - **Paint consistency**: without [`Step::Discard`], every observation
//!   shows one value across all mounted readers of each store
//!   ([`Observation::is_torn`]).
//! - **Convergence**: once the run resolves every deferred batch, every
//!   reader shows its store's head, and every store with a mounted reader
//!   has committed that head ([`Run::converged`]).
//! - **Refcount hygiene**: after teardown no store has listeners.

use lockstep_core::{Result, Store};
use lockstep_runtime::Reader;
use tracing::debug;

use crate::bench::{Bench, CounterOp, counter_store};

/// Number of stores every scenario drives. Store indices in [`Step`] are
/// taken modulo this.
pub const STORE_COUNT: usize = 2;

/// One scripted host operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Dispatch to a store and flush.
    Dispatch(usize, CounterOp),
    /// Dispatch to a store inside a deferred batch; nothing is flushed.
    DispatchDeferred(usize, CounterOp),
    /// Mount a new identity reader of a store and flush.
    Mount(usize),
    /// Unmount the reader at this index, modulo the number of readers.
    Unmount(usize),
    Flush,
    Resolve,
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub initial: i64,
    pub steps: Vec<Step>,
}

/// What every mounted reader showed after one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub step: usize,
    /// Visible values of the mounted readers, indexed by store.
    pub visible: Vec<Vec<Option<i64>>>,
    pub head: Vec<i64>,
    pub committed: Vec<i64>,
}

impl Observation {
    /// Mounted readers of one store disagree on the visible value.
    #[must_use]
    pub fn is_torn(&self) -> bool {
        self.visible
            .iter()
            .any(|readers| readers.windows(2).any(|pair| pair[0] != pair[1]))
    }
}

/// Outcome of [`Scenario::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub observations: Vec<Observation>,
    /// Visible values after the final resolution, indexed by store.
    pub final_visible: Vec<Vec<Option<i64>>>,
    pub final_head: Vec<i64>,
    pub final_committed: Vec<i64>,
    /// Renders that were superseded within their pass and never painted.
    pub transient_renders: usize,
    /// Store listeners left after the provider was torn down.
    pub listeners_after_teardown: usize,
    /// The host's render trace, one JSON object per line.
    pub trace_jsonl: String,
}

impl Run {
    #[must_use]
    pub fn first_tear(&self) -> Option<&Observation> {
        self.observations.iter().find(|o| o.is_torn())
    }

    #[must_use]
    pub fn converged(&self) -> bool {
        self.final_visible
            .iter()
            .zip(self.final_head.iter().zip(&self.final_committed))
            .all(|(readers, (head, committed))| {
                readers.iter().all(|v| *v == Some(*head))
                    && (readers.is_empty() || committed == head)
            })
    }
}

type CounterReader = Reader<i64, CounterOp, i64>;

fn visible_by_store(readers: &[(usize, CounterReader)]) -> Vec<Vec<Option<i64>>> {
    let mut visible = vec![Vec::new(); STORE_COUNT];
    for (store, reader) in readers {
        visible[*store].push(reader.visible());
    }
    visible
}

impl Scenario {
    #[must_use]
    pub fn new(initial: i64) -> Self {
        Self {
            initial,
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn contains_discard(&self) -> bool {
        self.steps.contains(&Step::Discard)
    }

    /// Replay on a fresh bench, resolve whatever is left, then tear down.
    pub fn run(&self) -> Result<Run> {
        let bench = Bench::new()?;
        let stores: Vec<Store<i64, CounterOp>> = (0..STORE_COUNT)
            .map(|k| counter_store(self.initial.wrapping_add(10 * k as i64)))
            .collect();
        let mut readers: Vec<(usize, CounterReader)> = Vec::new();
        let mut mounted_ids = Vec::new();
        let mut observations = Vec::with_capacity(self.steps.len());

        for (idx, step) in self.steps.iter().enumerate() {
            match *step {
                Step::Dispatch(store, op) => bench.dispatch(&stores[store % STORE_COUNT], op)?,
                Step::DispatchDeferred(store, op) => {
                    bench.dispatch_deferred(&stores[store % STORE_COUNT], op)?;
                }
                Step::Mount(store) => {
                    let store = store % STORE_COUNT;
                    let reader = bench.mount(&stores[store])?;
                    mounted_ids.push(reader.id());
                    readers.push((store, reader));
                }
                Step::Unmount(slot) => {
                    if !readers.is_empty() {
                        let (_, reader) = readers.remove(slot % readers.len());
                        reader.unmount()?;
                    }
                }
                Step::Flush => bench.host().flush()?,
                Step::Resolve => bench.resolve()?,
                Step::Discard => bench.host().discard_deferred(),
            }
            observations.push(Observation {
                step: idx,
                visible: visible_by_store(&readers),
                head: stores.iter().map(Store::state).collect(),
                committed: stores.iter().map(Store::committed_state).collect(),
            });
        }

        bench.resolve()?;
        let final_visible = visible_by_store(&readers);
        let final_head = stores.iter().map(Store::state).collect();
        let final_committed = stores.iter().map(Store::committed_state).collect();

        let trace = bench.host().trace();
        let transient_renders = mounted_ids
            .iter()
            .map(|id| {
                trace
                    .rendered_values(*id)
                    .len()
                    .saturating_sub(trace.painted_values(*id).len())
            })
            .sum();
        let trace_jsonl = trace.to_jsonl();

        drop(readers);
        bench.teardown()?;
        let listeners_after_teardown = stores.iter().map(Store::listener_count).sum();

        debug!(
            steps = self.steps.len(),
            transient_renders, listeners_after_teardown, "scenario replayed"
        );
        Ok(Run {
            observations,
            final_visible,
            final_head,
            final_committed,
            transient_renders,
            listeners_after_teardown,
            trace_jsonl,
        })
    }
}
