use std::sync::{Arc, Mutex};

use wirebox::{DefaultScope, DiError, Inject, InjectOpt, ProviderRegistry, Resolver};

#[test]
fn concrete_singleton_is_shared() {
    let registry = ProviderRegistry::new();
    registry.add_singleton(42usize).unwrap();
    registry.add_singleton("hello".to_string()).unwrap();

    let container = registry.container().unwrap();

    let num1 = container.get::<usize>().unwrap();
    let num2 = container.get::<usize>().unwrap();
    let str1 = container.get::<String>().unwrap();
    let str2 = container.get::<String>().unwrap();

    assert_eq!(*num1, 42);
    assert_eq!(*str1, "hello");
    assert!(Arc::ptr_eq(&num1, &num2));
    assert!(Arc::ptr_eq(&str1, &str2));
}

#[test]
fn factory_with_dependencies() {
    #[derive(Debug)]
    struct Config {
        port: u16,
    }

    #[derive(Debug)]
    struct Server {
        config: Arc<Config>,
        name: String,
    }

    let registry = ProviderRegistry::new();
    registry.add_singleton(Config { port: 8080 }).unwrap();
    registry
        .add_singleton_factory::<Server, _, _>(|Inject(config): Inject<Config>| Server {
            config,
            name: "MyServer".to_string(),
        })
        .unwrap();

    let container = registry.container().unwrap();
    let server = container.get::<Server>().unwrap();

    assert_eq!(server.config.port, 8080);
    assert_eq!(server.name, "MyServer");
}

#[test]
fn transient_creates_new_instances() {
    let counter = Arc::new(Mutex::new(0));
    let counter_clone = counter.clone();

    let registry = ProviderRegistry::new();
    registry
        .add_transient_factory::<String, _, _>(move || {
            let mut c = counter_clone.lock().unwrap();
            *c += 1;
            format!("instance-{}", *c)
        })
        .unwrap();

    let container = registry.container().unwrap();

    let a = container.get::<String>().unwrap();
    let b = container.get::<String>().unwrap();
    let c = container.get::<String>().unwrap();

    assert_eq!(*a, "instance-1");
    assert_eq!(*b, "instance-2");
    assert_eq!(*c, "instance-3");
    assert!(!Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&b, &c));
}

#[test]
fn not_registered_carries_the_key() {
    struct Unregistered;

    let registry = ProviderRegistry::new();
    let container = registry.container().unwrap();

    match container.get::<Unregistered>() {
        Err(DiError::NotRegistered { key }) => {
            assert!(key.to_string().contains("Unregistered"));
        }
        other => panic!("expected NotRegistered, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn replace_semantics_last_registration_wins() {
    let registry = ProviderRegistry::new();
    registry.add_singleton(1usize).unwrap();
    registry.add_singleton(2usize).unwrap();

    let container = registry.container().unwrap();
    assert_eq!(*container.get::<usize>().unwrap(), 2);

    // Only one live registration remains for the key.
    let count = registry
        .descriptors()
        .iter()
        .filter(|d| d.key.to_string().contains("usize"))
        .count();
    assert_eq!(count, 1);
}

#[test]
fn named_components_are_distinct() {
    #[derive(Debug)]
    struct Db {
        url: &'static str,
    }

    let registry = ProviderRegistry::new();
    registry
        .add_named_singleton("primary", Db { url: "postgres://primary" })
        .unwrap();
    registry
        .add_named_singleton("replica", Db { url: "postgres://replica" })
        .unwrap();

    let container = registry.container().unwrap();
    assert_eq!(
        container.get_named::<Db>("primary").unwrap().url,
        "postgres://primary"
    );
    assert_eq!(
        container.get_named::<Db>("replica").unwrap().url,
        "postgres://replica"
    );
    // The plain key was never registered.
    assert!(container.get::<Db>().is_err());
}

#[test]
fn optional_dependencies_resolve_to_none_when_missing() {
    struct Metrics;
    struct Service {
        metrics: Option<Arc<Metrics>>,
    }

    let registry = ProviderRegistry::new();
    registry
        .add_singleton_factory::<Service, _, _>(|InjectOpt(metrics): InjectOpt<Metrics>| {
            Service { metrics }
        })
        .unwrap();

    let container = registry.container().unwrap();
    assert!(container.get::<Service>().unwrap().metrics.is_none());

    // Registering the dependency invalidates the assembly; a fresh resolve
    // sees it. The singleton itself was already built, so use a new
    // container over the same registry.
    registry.add_singleton(Metrics).unwrap();
    let container = registry.container().unwrap();
    assert!(container.get::<Service>().unwrap().metrics.is_some());
}

#[test]
fn registry_introspection_by_slot_and_scope() {
    struct AppCfg;
    struct ReqState;

    let registry = ProviderRegistry::new();
    registry.add_singleton(AppCfg).unwrap();
    registry
        .add_scoped_factory::<ReqState, _, _>(DefaultScope::Request, || ReqState)
        .unwrap();

    let in_request = registry.descriptors_in_scope(DefaultScope::Request);
    assert_eq!(in_request.len(), 1);
    assert!(in_request[0].key.to_string().contains("ReqState"));

    let by_slot = registry.descriptor_by_slot(in_request[0].slot).unwrap();
    assert_eq!(by_slot.key, in_request[0].key);
    assert!(registry.descriptor_by_slot(999).is_none());
}

#[test]
fn registration_after_build_is_visible() {
    let registry = ProviderRegistry::new();
    let container = registry.container().unwrap();

    assert!(container.get::<u32>().is_err());
    registry.add_singleton(7u32).unwrap();
    assert_eq!(*container.get::<u32>().unwrap(), 7);
}
