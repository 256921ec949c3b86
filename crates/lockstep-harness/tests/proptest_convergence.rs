//! Property-based invariants over random scenarios.
//!
//! 1. Convergence: after the final resolution every mounted reader shows
//!    its store's head, and that head is committed.
//! 2. Paint consistency: without discards, no observation is torn, across
//!    interleaved updates to both stores.
//! 3. Refcount hygiene: teardown leaves the store without listeners.
//! 4. Discard never changes what is visible.
//! 5. Minimization of a failing predicate yields a scenario that still fails.

use lockstep_harness::{CounterOp, STORE_COUNT, Scenario, Step, minimize};
use proptest::prelude::*;

// ── Helpers ──────────────────────────────────────────────────────────

fn arb_op() -> impl Strategy<Value = CounterOp> {
    prop_oneof![Just(CounterOp::Double), Just(CounterOp::Increment)]
}

fn arb_store() -> impl Strategy<Value = usize> {
    0..STORE_COUNT
}

fn arb_step(with_discard: bool) -> BoxedStrategy<Step> {
    let core = prop_oneof![
        3 => (arb_store(), arb_op()).prop_map(|(store, op)| Step::Dispatch(store, op)),
        3 => (arb_store(), arb_op()).prop_map(|(store, op)| Step::DispatchDeferred(store, op)),
        3 => arb_store().prop_map(Step::Mount),
        1 => (0usize..8).prop_map(Step::Unmount),
        1 => Just(Step::Flush),
        2 => Just(Step::Resolve),
    ];
    if with_discard {
        prop_oneof![13 => core, 1 => Just(Step::Discard)].boxed()
    } else {
        core.boxed()
    }
}

fn arb_scenario(with_discard: bool) -> impl Strategy<Value = Scenario> {
    (
        -20i64..20,
        proptest::collection::vec(arb_step(with_discard), 0..32),
    )
        .prop_map(|(initial, steps)| Scenario { initial, steps })
}

fn misbehaves(scenario: &Scenario) -> bool {
    scenario
        .run()
        .map(|run| run.first_tear().is_some() || !run.converged())
        .unwrap_or(true)
}

/// Minimized reproduction with its reduction and render traces.
fn explain(scenario: &Scenario) -> String {
    minimize(scenario.clone(), misbehaves)
        .and_then(|result| result.report().ok())
        .unwrap_or_else(|| format!("{scenario:?}"))
}

// ═════════════════════════════════════════════════════════════════════════
// 1-3. Convergence, paint consistency, refcount hygiene
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn scenarios_without_discard_never_tear(scenario in arb_scenario(false)) {
        let run = scenario.run().unwrap();
        prop_assert!(
            run.first_tear().is_none(),
            "torn at {:?}\n{}",
            run.first_tear(),
            explain(&scenario)
        );
        prop_assert!(
            run.converged(),
            "not converged: {:?} (head {:?}, committed {:?})\n{}",
            run.final_visible,
            run.final_head,
            run.final_committed,
            explain(&scenario)
        );
        prop_assert_eq!(run.listeners_after_teardown, 0);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Discard keeps visible output
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn discard_never_changes_visible_values(scenario in arb_scenario(true)) {
        let run = scenario.run().unwrap();
        for pair in run.observations.windows(2) {
            if scenario.steps[pair[1].step] == Step::Discard {
                prop_assert_eq!(&pair[0].visible, &pair[1].visible);
            }
        }
        prop_assert_eq!(run.listeners_after_teardown, 0);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Minimization preserves the failure
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn minimized_scenarios_still_render_transients(scenario in arb_scenario(false)) {
        let renders_transient =
            |s: &Scenario| s.run().map(|run| run.transient_renders > 0).unwrap_or(false);
        if let Some(result) = minimize(scenario.clone(), renders_transient) {
            prop_assert!(renders_transient(&result.scenario));
            prop_assert!(result.scenario.len() <= scenario.len());
            prop_assert!(result.scenario.len() >= 2);
        }
    }
}
