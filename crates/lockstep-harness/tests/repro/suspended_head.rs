//! A reader whose head-derived value suspends never reaches its pre-paint
//! fixup, so it keeps its fallback even though the committed value would
//! render. This pins the current behavior of the fixup protocol.

use lockstep_harness::{Bench, CounterOp, counter_store};
use lockstep_runtime::{ReadOptions, Selector, TraceEvent, use_store_selector_with};

#[test]
fn reader_suspended_on_head_value_is_stuck_on_fallback() {
    let bench = Bench::new().unwrap();
    let store = counter_store(1);
    let settled = bench.mount(&store).unwrap();

    // 1. Open a deferred batch that moves head to a value the new reader
    //    cannot render yet.
    bench.dispatch_deferred(&store, CounterOp::Double).unwrap();
    assert_eq!(store.state(), 2);
    assert_eq!(store.committed_state(), 1);

    // 2. Mount a reader that suspends on even values. Committed (1) would
    //    render, head (2) suspends.
    let reader = bench
        .host()
        .act(|| {
            use_store_selector_with(
                &bench.scope(),
                &store,
                &Selector::identity(),
                ReadOptions::new()
                    .with_label("odd-only")
                    .with_suspense(|v: &i64| v % 2 == 0),
            )
        })
        .unwrap()
        .unwrap();

    assert!(reader.is_suspended());
    assert_eq!(reader.visible(), None, "fallback instead of committed value 1");
    assert_eq!(settled.visible(), Some(1));
    assert!(
        bench
            .host()
            .trace()
            .events()
            .iter()
            .any(|e| matches!(e, TraceEvent::Suspend { label, .. } if label == "odd-only"))
    );

    // 3. Resolving the batch does not move head, so the reader stays on its
    //    fallback while its sibling shows 2.
    bench.resolve().unwrap();
    assert_eq!(settled.visible(), Some(2));
    assert!(reader.is_suspended());
    assert_eq!(reader.visible(), None);

    // 4. Only a later head change that no longer suspends lets it mount.
    bench.dispatch(&store, CounterOp::Increment).unwrap();
    assert!(reader.is_mounted());
    assert_eq!(reader.visible(), Some(3));
    assert_eq!(settled.visible(), Some(3));
}
