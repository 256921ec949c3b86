#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lockstep_harness::{CounterOp, Scenario, Step};

#[derive(Arbitrary, Debug, Clone, Copy)]
enum FuzzStep {
    Double(bool),
    Increment(bool),
    DeferredDouble(bool),
    DeferredIncrement(bool),
    Mount(bool),
    Unmount(u8),
    Flush,
    Resolve,
    Discard,
}

/// `false` picks the first store, `true` the second.
fn store(second: bool) -> usize {
    usize::from(second)
}

impl FuzzStep {
    fn to_step(self) -> Step {
        match self {
            FuzzStep::Double(s) => Step::Dispatch(store(s), CounterOp::Double),
            FuzzStep::Increment(s) => Step::Dispatch(store(s), CounterOp::Increment),
            FuzzStep::DeferredDouble(s) => Step::DispatchDeferred(store(s), CounterOp::Double),
            FuzzStep::DeferredIncrement(s) => {
                Step::DispatchDeferred(store(s), CounterOp::Increment)
            }
            FuzzStep::Mount(s) => Step::Mount(store(s)),
            FuzzStep::Unmount(slot) => Step::Unmount(usize::from(slot)),
            FuzzStep::Flush => Step::Flush,
            FuzzStep::Resolve => Step::Resolve,
            FuzzStep::Discard => Step::Discard,
        }
    }
}

fuzz_target!(|input: (i8, Vec<FuzzStep>)| {
    let (initial, steps) = input;
    let scenario = Scenario {
        initial: i64::from(initial),
        steps: steps.into_iter().take(256).map(FuzzStep::to_step).collect(),
    };

    let run = scenario.run().expect("scenario replay must not error");
    assert_eq!(run.listeners_after_teardown, 0);
    if !scenario.contains_discard() {
        assert!(
            run.first_tear().is_none(),
            "torn: {:?}\n{}",
            run.first_tear(),
            run.trace_jsonl
        );
        assert!(
            run.converged(),
            "not converged: {:?} (head {:?}, committed {:?})",
            run.final_visible,
            run.final_head,
            run.final_committed
        );
    }
});
