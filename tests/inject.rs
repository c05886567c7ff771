use wirebox::{Context, DefaultScope, Inject, InjectOpt, ProviderRegistry};

struct Greeter {
    greeting: &'static str,
}

#[test]
fn wired_callable_fills_injected_parameters() {
    let registry = ProviderRegistry::new();
    registry.add_singleton(Greeter { greeting: "hello" }).unwrap();
    let container = registry.container().unwrap();

    let wired = container.wire::<_, (Inject<Greeter>,), (String,), String>(
        |Inject(greeter): Inject<Greeter>, name: String| format!("{}, {}", greeter.greeting, name),
    );

    assert_eq!(wired.call(("world".into(),)).unwrap(), "hello, world");
    assert_eq!(wired.call(("again".into(),)).unwrap(), "hello, again");
}

#[test]
fn overrides_shadow_container_resolution() {
    let registry = ProviderRegistry::new();
    registry.add_singleton(Greeter { greeting: "hello" }).unwrap();
    let container = registry.container().unwrap();

    let wired = container
        .wire::<_, (Inject<Greeter>,), (String,), String>(
            |Inject(greeter): Inject<Greeter>, name: String| {
                format!("{}, {}", greeter.greeting, name)
            },
        )
        .with_override(Greeter { greeting: "HEY" });

    assert_eq!(wired.call(("world".into(),)).unwrap(), "HEY, world");
}

#[test]
fn wired_callables_run_against_a_scope() {
    struct RequestUser(&'static str);

    let registry = ProviderRegistry::new();
    registry
        .add_context_value::<RequestUser>(DefaultScope::Request)
        .unwrap();
    let container = registry.container().unwrap();

    let scope = container
        .enter_scope_with(DefaultScope::Request, Context::new().with(RequestUser("ada")))
        .unwrap();

    let wired = scope.wire::<_, (Inject<RequestUser>,), (), &'static str>(
        |Inject(user): Inject<RequestUser>| user.0,
    );
    assert_eq!(wired.call(()).unwrap(), "ada");
}

#[test]
fn multiple_injected_and_caller_parameters() {
    struct Prefix(&'static str);
    struct Suffix(&'static str);

    let registry = ProviderRegistry::new();
    registry.add_singleton(Prefix("<<")).unwrap();
    registry.add_singleton(Suffix(">>")).unwrap();
    let container = registry.container().unwrap();

    let wired = container.wire::<_, (Inject<Prefix>, Inject<Suffix>), (String, usize), String>(
        |Inject(pre): Inject<Prefix>, Inject(suf): Inject<Suffix>, body: String, reps: usize| {
            format!("{}{}{}", pre.0, body.repeat(reps), suf.0)
        },
    );
    assert_eq!(wired.call(("ab".into(), 2)).unwrap(), "<<abab>>");
}

#[test]
fn optional_injection_in_wired_callables() {
    struct Missing;

    let registry = ProviderRegistry::new();
    let container = registry.container().unwrap();

    let wired = container.wire::<_, (InjectOpt<Missing>,), (), bool>(
        |InjectOpt(missing): InjectOpt<Missing>| missing.is_some(),
    );
    assert!(!wired.call(()).unwrap());

    registry.add_singleton(Missing).unwrap();
    assert!(wired.call(()).unwrap());
}

#[test]
fn wired_errors_propagate() {
    struct Unavailable;

    let registry = ProviderRegistry::new();
    let container = registry.container().unwrap();

    let wired = container
        .wire::<_, (Inject<Unavailable>,), (), ()>(|Inject(_): Inject<Unavailable>| ());
    assert!(wired.call(()).is_err());
}

#[test]
fn overrides_satisfy_unregistered_parameters() {
    let registry = ProviderRegistry::new();
    let container = registry.container().unwrap();

    // No registration at all: the override alone satisfies the parameter.
    let wired = container
        .wire::<_, (Inject<Greeter>,), (), &'static str>(
            |Inject(greeter): Inject<Greeter>| greeter.greeting,
        )
        .with_override(Greeter { greeting: "solo" });
    assert_eq!(wired.call(()).unwrap(), "solo");
}
