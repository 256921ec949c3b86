//! Provider and reader lifecycle across mounts, unmounts, and teardown.

use lockstep_core::{ConfigurationError, LockstepError, Store};
use lockstep_runtime::{Host, HostConfig, Provider, Scope, TraceEvent, use_store};

fn counter(initial: i32) -> Store<i32, i32> {
    Store::new(initial, |s: &i32, a: &i32| s + a)
}

#[test]
fn provider_teardown_unmounts_every_reader() {
    let host = Host::new();
    let provider = Provider::mount(&Scope::root(&host)).unwrap();
    let scope = provider.scope();
    let a = counter(0);
    let b = counter(10);

    let readers = host
        .act(|| {
            (
                use_store(&scope, &a).unwrap(),
                use_store(&scope, &a).unwrap(),
                use_store(&scope, &b).unwrap(),
            )
        })
        .unwrap();
    assert_eq!(host.component_count(), 4);
    assert!(a.listener_count() > 0);

    provider.unmount().unwrap();
    assert_eq!(a.listener_count(), 0);
    assert_eq!(b.listener_count(), 0);
    assert_eq!(host.component_count(), 0);
    assert!(!readers.0.is_mounted());

    // Unmounting after the provider is gone is a no-op.
    let (first, second, third) = readers;
    first.unmount().unwrap();
    drop((second, third));
}

#[test]
fn scope_loses_its_provider_on_unmount() {
    let host = Host::new();
    let provider = Provider::mount(&Scope::root(&host)).unwrap();
    let scope = provider.scope();
    drop(provider);

    let err = use_store(&scope, &counter(0)).unwrap_err();
    assert_eq!(err, LockstepError::from(ConfigurationError::MissingProvider));
    // A fresh provider can be mounted at the root again.
    assert!(Provider::mount(&Scope::root(&host)).is_ok());
}

#[test]
fn readers_mounted_after_teardown_of_siblings_keep_working() {
    let host = Host::new();
    let provider = Provider::mount(&Scope::root(&host)).unwrap();
    let scope = provider.scope();
    let store = counter(1);

    let old = host.act(|| use_store(&scope, &store)).unwrap().unwrap();
    drop(old);
    provider.manager().sweep();
    assert_eq!(store.listener_count(), 0);

    let fresh = host.act(|| use_store(&scope, &store)).unwrap().unwrap();
    host.act(|| store.dispatch(&4, &host)).unwrap().unwrap();
    assert_eq!(fresh.visible(), Some(5));
}

#[test]
fn disabled_trace_stays_empty() {
    let host = Host::with_config(HostConfig::default().with_trace(false));
    let provider = Provider::mount(&Scope::root(&host)).unwrap();
    let store = counter(0);
    let reader = host
        .act(|| use_store(&provider.scope(), &store))
        .unwrap()
        .unwrap();
    host.act(|| store.dispatch(&1, &host)).unwrap().unwrap();
    assert_eq!(reader.visible(), Some(1));
    assert!(!host.trace().is_enabled());
    assert!(host.trace().events().is_empty());
}

#[test]
fn discard_is_traced() {
    let host = Host::new();
    let provider = Provider::mount(&Scope::root(&host)).unwrap();
    let store = counter(0);
    let reader = host
        .act(|| use_store(&provider.scope(), &store))
        .unwrap()
        .unwrap();

    host.defer(|| store.dispatch(&1, &host)).unwrap();
    host.discard_deferred();
    assert_eq!(host.trace().events().last(), Some(&TraceEvent::Discard));
    assert_eq!(reader.visible(), Some(0));
}

