#![forbid(unsafe_code)]

//! Test harness and reference fixtures for lockstep.
//!
//! - [`bench`]: the counter reducer (`Double`, `Increment`) and a [`Bench`]
//!   with a host and a mounted provider.
//! - [`scenario`]: scripted step sequences over two stores replayed on a
//!   fresh bench, with per-step observations of every reader.
//! - [`minimize`]: delta debugging of failing scenarios.

pub mod bench;
pub mod minimize;
pub mod scenario;

pub use bench::{Bench, CounterOp, counter_reducer, counter_store};
pub use minimize::{Minimization, ReductionPhase, ReductionStep, minimize};
pub use scenario::{Observation, Run, STORE_COUNT, Scenario, Step};
