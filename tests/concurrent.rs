use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wirebox::{DefaultScope, ProviderRegistry, Resolver};

#[test]
fn concurrent_singleton_first_resolve_builds_once() {
    struct Expensive(u32);

    let built = Arc::new(AtomicUsize::new(0));
    let built_clone = built.clone();

    let registry = ProviderRegistry::new();
    registry
        .add_singleton_factory::<Expensive, _, _>(move || {
            built_clone.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            Expensive(42)
        })
        .unwrap();

    let container = Arc::new(registry.container().unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = container.clone();
            std::thread::spawn(move || container.get::<Expensive>().unwrap())
        })
        .collect();
    let values: Vec<Arc<Expensive>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(built.load(Ordering::SeqCst), 1);
    for value in &values[1..] {
        assert!(Arc::ptr_eq(value, &values[0]));
    }
}

#[test]
fn concurrent_scoped_first_resolve_builds_once_per_instance() {
    struct PerRequest(u32);

    let built = Arc::new(AtomicUsize::new(0));
    let built_clone = built.clone();

    let registry = ProviderRegistry::new();
    registry
        .add_scoped_factory::<PerRequest, _, _>(DefaultScope::Request, move || {
            built_clone.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            PerRequest(1)
        })
        .unwrap();

    let container = registry.container().unwrap();
    let scope = Arc::new(container.enter_scope().unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let scope = scope.clone();
            std::thread::spawn(move || scope.get::<PerRequest>().unwrap())
        })
        .collect();
    let values: Vec<Arc<PerRequest>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(built.load(Ordering::SeqCst), 1);
    for value in &values[1..] {
        assert!(Arc::ptr_eq(value, &values[0]));
    }

    // A fresh instance builds its own.
    let scope2 = container.enter_scope().unwrap();
    let _ = scope2.get::<PerRequest>().unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_async_singleton_builds_once() {
    struct Remote(u32);

    let built = Arc::new(AtomicUsize::new(0));
    let built_clone = built.clone();

    let registry = ProviderRegistry::new();
    registry
        .add_singleton_async::<Remote, _, _>(move || {
            let built = built_clone.clone();
            async move {
                built.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Remote(7)
            }
        })
        .unwrap();

    let container = Arc::new(registry.container().unwrap());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let container = container.clone();
            tokio::spawn(async move { container.get_async::<Remote>().await.unwrap() })
        })
        .collect();
    let mut values = Vec::new();
    for task in tasks {
        values.push(task.await.unwrap());
    }

    assert_eq!(built.load(Ordering::SeqCst), 1);
    for value in &values[1..] {
        assert!(Arc::ptr_eq(value, &values[0]));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_sync_and_async_callers_share_one_container() {
    struct Shared(u32);

    let registry = ProviderRegistry::new();
    registry
        .add_singleton_factory::<Shared, _, _>(|| Shared(3))
        .unwrap();

    let container = Arc::new(registry.container().unwrap());

    let sync_side = {
        let container = container.clone();
        tokio::task::spawn_blocking(move || container.get::<Shared>().unwrap())
    };
    let async_side = {
        let container = container.clone();
        tokio::spawn(async move { container.get_async::<Shared>().await.unwrap() })
    };

    let a = sync_side.await.unwrap();
    let b = async_side.await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}
