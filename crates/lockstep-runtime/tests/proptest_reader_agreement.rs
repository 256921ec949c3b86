//! Property-based agreement between readers with different selectors.
//!
//! Two readers of one store, one with the identity selector and one with a
//! projection, receive the same notifications in the same lanes. After any
//! host operation the projection reader must show the projection of what
//! the identity reader shows.

use lockstep_core::Store;
use lockstep_runtime::{Host, Provider, Scope, Selector, use_store, use_store_selector};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum HostOp {
    Dispatch(i64),
    DispatchDeferred(i64),
    Flush,
    Resolve,
    Discard,
}

fn arb_host_op() -> impl Strategy<Value = HostOp> {
    prop_oneof![
        3 => (-5i64..5).prop_map(HostOp::Dispatch),
        3 => (-5i64..5).prop_map(HostOp::DispatchDeferred),
        2 => Just(HostOp::Flush),
        2 => Just(HostOp::Resolve),
        1 => Just(HostOp::Discard),
    ]
}

proptest! {
    #[test]
    fn projection_tracks_identity_reader(
        initial in -20i64..20,
        ops in proptest::collection::vec(arb_host_op(), 0..30),
    ) {
        let host = Host::new();
        let provider = Provider::mount(&Scope::root(&host)).unwrap();
        let scope = provider.scope();
        let store = Store::new(initial, |s: &i64, a: &i64| s + a);
        let parity = Selector::new(|s: &i64| s.rem_euclid(2));

        let whole = use_store(&scope, &store).unwrap();
        let even_odd = use_store_selector(&scope, &store, &parity).unwrap();
        host.flush().unwrap();

        for op in ops {
            match op {
                HostOp::Dispatch(delta) => {
                    store.dispatch(&delta, &host).unwrap();
                }
                HostOp::DispatchDeferred(delta) => {
                    host.defer(|| store.dispatch(&delta, &host)).unwrap();
                }
                HostOp::Flush => host.flush().unwrap(),
                HostOp::Resolve => host.resolve_deferred().unwrap(),
                HostOp::Discard => host.discard_deferred(),
            }

            let shown = whole.visible().unwrap();
            prop_assert_eq!(even_odd.visible(), Some(shown.rem_euclid(2)));
        }
    }
}
