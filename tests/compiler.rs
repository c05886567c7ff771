use std::sync::Arc;

use wirebox::{DefaultScope, DiError, Inject, Lifetime, ProviderRegistry, Resolver, ServiceKey};

#[test]
fn compile_is_idempotent_until_a_registration() {
    let registry = ProviderRegistry::new();
    registry.add_singleton(1u32).unwrap();

    let container = registry.container().unwrap();
    let first = container.compile().unwrap();
    let second = container.compile().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    registry.add_singleton(2u64).unwrap();
    let third = container.compile().unwrap();
    assert!(!Arc::ptr_eq(&second, &third));
    assert!(third.generation() > second.generation());
}

#[test]
fn every_registration_bumps_the_generation() {
    let registry = ProviderRegistry::new();
    let g0 = registry.generation();
    registry.add_singleton(1u8).unwrap();
    let g1 = registry.generation();
    registry.add_singleton(2u8).unwrap();
    let g2 = registry.generation();
    assert!(g0 < g1 && g1 < g2);
}

#[test]
fn asynchrony_propagates_to_consumers() {
    struct Remote(u32);
    struct Facade {
        remote: Arc<Remote>,
    }

    let registry = ProviderRegistry::new();
    registry
        .add_singleton_async::<Remote, _, _>(|| async { Remote(7) })
        .unwrap();
    // Facade's own factory is synchronous, but its subgraph is not.
    registry
        .add_singleton_factory::<Facade, _, _>(|Inject(remote): Inject<Remote>| Facade { remote })
        .unwrap();

    let container = registry.container().unwrap();
    let assembly = container.compile().unwrap();

    let info = assembly
        .step_info(&ServiceKey::of::<Facade>())
        .unwrap()
        .unwrap();
    assert!(info.is_async);

    match container.get::<Facade>() {
        Err(DiError::AsyncFromSync { key }) => assert!(key.to_string().contains("Facade")),
        other => panic!("expected AsyncFromSync, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn async_entry_point_resolves_async_subgraphs() {
    struct Remote(u32);
    struct Facade {
        remote: Arc<Remote>,
    }

    let registry = ProviderRegistry::new();
    registry
        .add_singleton_async::<Remote, _, _>(|| async {
            tokio::task::yield_now().await;
            Remote(7)
        })
        .unwrap();
    registry
        .add_singleton_factory::<Facade, _, _>(|Inject(remote): Inject<Remote>| Facade { remote })
        .unwrap();

    let container = registry.container().unwrap();
    let facade = container.get_async::<Facade>().await.unwrap();
    assert_eq!(facade.remote.0, 7);

    // Asynchrony is a compile-time fact, not a cache state: the sync entry
    // point still refuses even though the singleton is already built.
    assert!(container.get::<Facade>().is_err());
}

#[tokio::test]
async fn async_scoped_factories_resolve_dependencies() {
    struct Conn(u32);
    struct Tx {
        conn: Arc<Conn>,
    }

    let registry = ProviderRegistry::new();
    registry
        .add_scoped_async::<Conn, _, _>(DefaultScope::Request, || async { Conn(1) })
        .unwrap();
    registry
        .add_scoped_async::<Tx, _, _>(DefaultScope::Request, |Inject(conn): Inject<Conn>| {
            async move { Tx { conn } }
        })
        .unwrap();

    let container = registry.container().unwrap();
    let request = container.enter_scope().unwrap();
    let tx = request.get_async::<Tx>().await.unwrap();
    let conn = request.get_async::<Conn>().await.unwrap();
    assert!(Arc::ptr_eq(&tx.conn, &conn));
}

#[test]
fn dependency_inference_failure_is_rejected_at_registration() {
    struct Opaque;

    let registry = ProviderRegistry::new();
    let spec = wirebox::ProviderSpec::sync_factory(
        ServiceKey::of::<Opaque>(),
        Lifetime::Singleton,
        |_ctx, _bindings| Ok(wirebox::boxed(Opaque)),
    );
    match registry.register(spec) {
        Err(DiError::DependencyInference { type_name }) => {
            assert!(type_name.contains("Opaque"));
        }
        other => panic!("expected DependencyInference, got {:?}", other),
    }

    // The same factory with a declared (empty) dependency list is fine.
    let spec = wirebox::ProviderSpec::sync_factory(
        ServiceKey::of::<Opaque>(),
        Lifetime::Singleton,
        |_ctx, _bindings| Ok(wirebox::boxed(Opaque)),
    )
    .no_deps();
    registry.register(spec).unwrap();

    let container = registry.container().unwrap();
    assert!(container.get::<Opaque>().is_ok());
}

#[test]
fn scoped_registration_requires_a_scope() {
    struct Thing;

    let registry = ProviderRegistry::new();
    let spec = wirebox::ProviderSpec::sync_factory(
        ServiceKey::of::<Thing>(),
        Lifetime::Scoped,
        |_ctx, _bindings| Ok(wirebox::boxed(Thing)),
    )
    .no_deps();
    assert!(matches!(
        registry.register(spec),
        Err(DiError::InvalidRegistration { .. })
    ));
}

#[test]
fn execution_order_respects_dependencies() {
    struct A;
    struct B {
        _a: Arc<A>,
    }
    struct C {
        _b: Arc<B>,
    }

    let registry = ProviderRegistry::new();
    // Register in reverse dependency order on purpose.
    registry
        .add_singleton_factory::<C, _, _>(|Inject(b): Inject<B>| C { _b: b })
        .unwrap();
    registry
        .add_singleton_factory::<B, _, _>(|Inject(a): Inject<A>| B { _a: a })
        .unwrap();
    registry.add_singleton_factory::<A, _, _>(|| A).unwrap();

    let container = registry.container().unwrap();
    let order = container.compile().unwrap().execution_order();

    let pos = |name: &str| {
        order
            .iter()
            .position(|k| k.to_string().ends_with(name))
            .unwrap()
    };
    assert!(pos("A") < pos("B"));
    assert!(pos("B") < pos("C"));
}

#[test]
fn lock_mode_auto_resolves_per_subgraph() {
    struct SyncThing;
    struct AsyncThing;

    let registry = ProviderRegistry::new();
    registry
        .add_singleton_factory::<SyncThing, _, _>(|| SyncThing)
        .unwrap();
    registry
        .add_singleton_async::<AsyncThing, _, _>(|| async { AsyncThing })
        .unwrap();

    let container = registry.container().unwrap();
    let assembly = container.compile().unwrap();

    let sync_info = assembly
        .step_info(&ServiceKey::of::<SyncThing>())
        .unwrap()
        .unwrap();
    let async_info = assembly
        .step_info(&ServiceKey::of::<AsyncThing>())
        .unwrap()
        .unwrap();
    assert_eq!(sync_info.lock, wirebox::LockMode::Thread);
    assert_eq!(async_info.lock, wirebox::LockMode::Async);
}
