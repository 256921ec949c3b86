#![forbid(unsafe_code)]

//! Delta-debugging minimization of failing [`Scenario`]s.
//!
//! When a property test finds a scenario that tears or fails to converge,
//! [`minimize`] removes steps while the failure predicate still holds and
//! returns a 1-minimal scenario: dropping any single remaining step makes
//! the failure disappear.
//!
//! # Algorithm
//!
//! Classic ddmin over the step list:
//!
//! 1. Split the steps into `n` chunks (starting with 2).
//! 2. Try dropping each chunk; on success restart with `n = 2`.
//! 3. Otherwise try keeping only one chunk; on success restart.
//! 4. Otherwise double `n`, stopping once chunks are single steps.
//!
//! Every attempt is logged as a [`ReductionStep`].

use std::fmt;
use std::fmt::Write as _;

use lockstep_core::Result;
use tracing::debug;

use crate::scenario::{Scenario, Step};

/// How a candidate was built from the current scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionPhase {
    ChunkRemoval,
    ChunkRetention,
}

impl fmt::Display for ReductionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChunkRemoval => write!(f, "chunk_removal"),
            Self::ChunkRetention => write!(f, "chunk_retention"),
        }
    }
}

/// One predicate evaluation during minimization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionStep {
    pub step: usize,
    pub phase: ReductionPhase,
    pub steps_before: usize,
    /// Equal to `steps_before` when the candidate was rejected.
    pub steps_after: usize,
    pub accepted: bool,
}

#[derive(Debug, Clone)]
pub struct Minimization {
    pub scenario: Scenario,
    pub log: Vec<ReductionStep>,
    pub predicate_calls: usize,
}

impl Minimization {
    /// One JSON object per reduction step.
    #[must_use]
    pub fn log_to_jsonl(&self) -> String {
        let mut out = String::new();
        for step in &self.log {
            let _ = writeln!(
                out,
                r#"{{"step":{},"phase":"{}","steps_before":{},"steps_after":{},"accepted":{}}}"#,
                step.step, step.phase, step.steps_before, step.steps_after, step.accepted
            );
        }
        out
    }

    /// Replay the minimized scenario and describe it for a failure message:
    /// the steps, the reduction log and the render trace, both as JSONL.
    pub fn report(&self) -> Result<String> {
        let run = self.scenario.run()?;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "minimized to {} steps in {} predicate calls: {:?}",
            self.scenario.len(),
            self.predicate_calls,
            self.scenario
        );
        let _ = writeln!(out, "-- reduction --");
        out.push_str(&self.log_to_jsonl());
        let _ = writeln!(out, "-- trace --");
        out.push_str(&run.trace_jsonl);
        Ok(out)
    }
}

/// Shrink `scenario` while `fails` keeps returning true.
///
/// Returns `None` when `fails` does not hold for `scenario` itself.
pub fn minimize(scenario: Scenario, fails: impl Fn(&Scenario) -> bool) -> Option<Minimization> {
    if !fails(&scenario) {
        return None;
    }

    let mut current = scenario;
    let mut log = Vec::new();
    let mut n = 2usize;

    loop {
        let len = current.steps.len();
        if len == 0 {
            break;
        }
        let chunk = len.div_ceil(n);
        let bounds: Vec<(usize, usize)> = (0..n)
            .map(|i| (i * chunk, ((i + 1) * chunk).min(len)))
            .filter(|(start, _)| *start < len)
            .collect();

        let mut accepted = None;
        for &(start, end) in &bounds {
            let kept: Vec<Step> = current.steps[..start]
                .iter()
                .chain(&current.steps[end..])
                .copied()
                .collect();
            if let Some(candidate) =
                try_candidate(&current, kept, ReductionPhase::ChunkRemoval, &fails, &mut log)
            {
                accepted = Some(candidate);
                break;
            }
        }

        if accepted.is_none() && bounds.len() > 1 {
            for &(start, end) in &bounds {
                let kept = current.steps[start..end].to_vec();
                if let Some(candidate) =
                    try_candidate(&current, kept, ReductionPhase::ChunkRetention, &fails, &mut log)
                {
                    accepted = Some(candidate);
                    break;
                }
            }
        }

        match accepted {
            Some(candidate) => {
                current = candidate;
                n = 2;
            }
            None if n >= len => break,
            None => n = (n * 2).min(len),
        }
    }

    debug!(
        steps = current.steps.len(),
        attempts = log.len(),
        "scenario minimized"
    );
    Some(Minimization {
        scenario: current,
        predicate_calls: log.len() + 1,
        log,
    })
}

fn try_candidate(
    current: &Scenario,
    kept: Vec<Step>,
    phase: ReductionPhase,
    fails: &impl Fn(&Scenario) -> bool,
    log: &mut Vec<ReductionStep>,
) -> Option<Scenario> {
    let before = current.steps.len();
    let after = kept.len();
    let candidate = Scenario {
        initial: current.initial,
        steps: kept,
    };
    let accepted = fails(&candidate);
    log.push(ReductionStep {
        step: log.len(),
        phase,
        steps_before: before,
        steps_after: if accepted { after } else { before },
        accepted,
    });
    accepted.then_some(candidate)
}
