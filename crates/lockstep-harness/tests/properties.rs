//! Reference properties of the store, manager, and reader protocol.
//!
//! Each test pins one worked example with the counter reducer
//! (`Double -> s * 2`, `Increment -> s + 1`).

use std::cell::RefCell;
use std::rc::Rc;

use lockstep_core::{
    ConfigurationError, LockstepError, Source, Store, UsageError,
};
use lockstep_harness::{Bench, CounterOp, counter_store};
use lockstep_runtime::{Provider, Selector, use_dispatch, use_store_selector};

// ── No tear under immediate updates ─────────────────────────────────

#[test]
fn immediate_dispatch_reaches_every_reader_in_one_pass() {
    let bench = Bench::new().unwrap();
    let store = counter_store(1);
    let readers: Vec<_> = (0..4).map(|_| bench.mount(&store).unwrap()).collect();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let handle = store.clone();
    let _sub = store.subscribe(move || log.borrow_mut().push(handle.state()));

    bench.dispatch(&store, CounterOp::Double).unwrap();
    assert_eq!(*seen.borrow(), vec![2]);
    for reader in &readers {
        assert_eq!(reader.visible(), Some(2));
    }
    assert!(!store.has_outstanding());
}

// ── Rebase arithmetic ───────────────────────────────────────────────

#[test]
fn immediate_update_rebases_over_pending_double() {
    let bench = Bench::new().unwrap();
    let store = counter_store(2);
    let reader = bench.mount(&store).unwrap();

    bench.dispatch_deferred(&store, CounterOp::Double).unwrap();
    bench.host().flush().unwrap();
    assert_eq!(reader.visible(), Some(2));

    bench.dispatch(&store, CounterOp::Increment).unwrap();
    assert_eq!(store.committed_state(), 3);
    assert_eq!(reader.visible(), Some(3));

    let late = bench.mount(&store).unwrap();
    assert_eq!(bench.host().trace().rendered_values(late.id()), vec!["5", "3"]);
    assert_eq!(late.visible(), Some(3));

    bench.resolve().unwrap();
    assert_eq!(store.state(), 5);
    assert_eq!(store.committed_state(), 5);
    assert_eq!(reader.visible(), Some(5));
    assert_eq!(late.visible(), Some(5));
}

#[test]
fn two_increments_under_one_pending_double() {
    let bench = Bench::new().unwrap();
    let store = counter_store(2);
    let reader = bench.mount(&store).unwrap();

    bench.dispatch_deferred(&store, CounterOp::Double).unwrap();
    bench
        .host()
        .act(|| {
            store.dispatch(&CounterOp::Increment, bench.host()).unwrap();
            store.dispatch(&CounterOp::Increment, bench.host()).unwrap();
        })
        .unwrap();
    assert_eq!(store.committed_state(), 4);
    assert_eq!(reader.visible(), Some(4));

    bench.resolve().unwrap();
    assert_eq!(store.state(), 6);
    assert_eq!(reader.visible(), Some(6));
}

// ── Mount mid-transition ────────────────────────────────────────────

#[test]
fn mount_during_unresolved_increment_is_corrected_before_paint() {
    let bench = Bench::new().unwrap();
    let store = counter_store(1);
    let first = bench.mount(&store).unwrap();

    bench.dispatch_deferred(&store, CounterOp::Increment).unwrap();
    bench.host().flush().unwrap();
    assert_eq!(first.visible(), Some(1));

    let second = bench.mount(&store).unwrap();
    let trace = bench.host().trace();
    assert_eq!(trace.rendered_values(second.id()), vec!["2", "1"]);
    assert_eq!(trace.painted_values(second.id()), vec!["1"]);
    assert_eq!(second.visible(), Some(1));

    bench.resolve().unwrap();
    assert_eq!(first.visible(), Some(2));
    assert_eq!(second.visible(), Some(2));
}

// ── Refcount hygiene ────────────────────────────────────────────────

#[test]
fn unmounting_every_reader_releases_all_listeners() {
    let bench = Bench::new().unwrap();
    let store = counter_store(0);
    let a = bench.mount(&store).unwrap();
    let b = bench.mount(&store).unwrap();
    assert!(store.listener_count() > 0);

    a.unmount().unwrap();
    drop(b);
    // The manager keeps its relay until the next committed pass.
    assert_eq!(store.listener_count(), 1);
    bench.provider().manager().sweep();
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn provider_teardown_releases_all_listeners() {
    let bench = Bench::new().unwrap();
    let store = counter_store(0);
    let readers: Vec<_> = (0..3).map(|_| bench.mount(&store).unwrap()).collect();
    bench.dispatch_deferred(&store, CounterOp::Increment).unwrap();

    bench.teardown().unwrap();
    assert_eq!(store.listener_count(), 0);
    drop(readers);
    assert_eq!(store.listener_count(), 0);
}

// ── Store isolation ─────────────────────────────────────────────────

#[test]
fn updates_do_not_notify_unrelated_stores() {
    let bench = Bench::new().unwrap();
    let left = counter_store(1);
    let right = counter_store(10);
    let left_reader = bench.mount(&left).unwrap();
    let right_reader = bench.mount(&right).unwrap();

    let right_hits = Rc::new(RefCell::new(0));
    let hits = Rc::clone(&right_hits);
    let _sub = right.subscribe(move || *hits.borrow_mut() += 1);
    let rendered_before = bench.host().trace().rendered_values(right_reader.id());

    bench.dispatch(&left, CounterOp::Double).unwrap();
    assert_eq!(left_reader.visible(), Some(2));
    assert_eq!(*right_hits.borrow(), 0);
    assert_eq!(
        bench.host().trace().rendered_values(right_reader.id()),
        rendered_before
    );
}

// ── Deferred values stay per store ──────────────────────────────────

#[test]
fn immediate_update_elsewhere_does_not_publish_a_pending_double() {
    let bench = Bench::new().unwrap();
    let a = counter_store(2);
    let b = counter_store(10);
    let a1 = bench.mount(&a).unwrap();
    let b1 = bench.mount(&b).unwrap();

    bench.dispatch_deferred(&a, CounterOp::Double).unwrap();
    bench.dispatch(&b, CounterOp::Increment).unwrap();
    assert_eq!(b1.visible(), Some(11));
    assert_eq!(a.state(), 4);
    assert_eq!(a.committed_state(), 2);
    assert_eq!(a1.visible(), Some(2));

    let a2 = bench.mount(&a).unwrap();
    assert_eq!(a1.visible(), Some(2));
    assert_eq!(a2.visible(), Some(2));

    // The double is still outstanding, so this increment rebases.
    bench.dispatch(&a, CounterOp::Increment).unwrap();
    assert_eq!(a.committed_state(), 3);
    assert_eq!(a1.visible(), Some(3));
    assert_eq!(a2.visible(), Some(3));

    bench.resolve().unwrap();
    assert_eq!(a.committed_state(), 5);
    assert_eq!(a1.visible(), Some(5));
    assert_eq!(a2.visible(), Some(5));
    assert_eq!(b1.visible(), Some(11));
}

// ── Identity stability ──────────────────────────────────────────────

#[test]
fn swapping_store_or_selector_is_rejected() {
    let bench = Bench::new().unwrap();
    let store = counter_store(0);
    let other = counter_store(0);
    let selector = Selector::new(|s: &i64| s * 10);
    let reader = bench
        .host()
        .act(|| use_store_selector(&bench.scope(), &store, &selector))
        .unwrap()
        .unwrap();

    let err = reader.rebind(&other, &selector).unwrap_err();
    assert!(matches!(err, LockstepError::Usage(UsageError::StoreChanged { .. })));
    assert!(err.to_string().contains(&other.id().to_string()));

    let err = reader.rebind(&store, &Selector::new(|s: &i64| s * 10)).unwrap_err();
    assert_eq!(
        err,
        LockstepError::from(UsageError::SelectorChanged { store: store.id() })
    );
    assert!(reader.rebind(&store, &selector).is_ok());
}

// ── Discard ─────────────────────────────────────────────────────────

#[test]
fn discarded_batch_leaves_visible_values() {
    let bench = Bench::new().unwrap();
    let store = counter_store(3);
    let a = bench.mount(&store).unwrap();
    let b = bench.mount(&store).unwrap();

    bench.dispatch_deferred(&store, CounterOp::Double).unwrap();
    bench.host().discard_deferred();
    assert!(!bench.host().has_deferred_work());
    bench.resolve().unwrap();
    assert_eq!(a.visible(), Some(3));
    assert_eq!(b.visible(), Some(3));

    // Later immediate work still reaches both readers together.
    bench.dispatch(&store, CounterOp::Increment).unwrap();
    assert_eq!(a.visible(), b.visible());
}

// ── Configuration and dispatch errors ───────────────────────────────

#[test]
fn nested_provider_is_rejected() {
    let bench = Bench::new().unwrap();
    let err = Provider::mount(&bench.scope()).unwrap_err();
    assert_eq!(err, LockstepError::from(ConfigurationError::NestedProvider));
    assert!(!err.is_internal());
}

struct Thermometer {
    celsius: RefCell<i64>,
}

impl Source for Thermometer {
    type State = i64;
    type Action = i64;

    fn state(&self) -> i64 {
        *self.celsius.borrow()
    }

    fn reduce(&self, state: &i64, delta: &i64) -> i64 {
        state + delta
    }
}

#[test]
fn external_source_store_is_read_only() {
    let bench = Bench::new().unwrap();
    let source = Rc::new(Thermometer {
        celsius: RefCell::new(20),
    });
    let store: Store<i64, i64> = Store::from_source(source.clone());
    let reader = bench.mount(&store).unwrap();

    let err = use_dispatch(&bench.scope(), &store).unwrap_err();
    assert_eq!(
        err,
        LockstepError::from(UsageError::NotDispatchable { store: store.id() })
    );

    bench
        .host()
        .act(|| {
            *source.celsius.borrow_mut() += 5;
            store.handle_update(&5, bench.host());
        })
        .unwrap();
    assert_eq!(reader.visible(), Some(25));
}
