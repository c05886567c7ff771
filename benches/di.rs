use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use wirebox::{
    boxed, concrete, var, DefaultScope, Inject, Lifetime, LockMode, ProviderRegistry, ProviderSpec,
    Resolver, ServiceKey,
};

struct Config {
    url: String,
}

struct Repo {
    _config: Arc<Config>,
}

struct Service {
    _repo: Arc<Repo>,
}

fn registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();
    registry
        .add_singleton(Config { url: "postgres://localhost".into() })
        .unwrap();
    registry
        .add_singleton_factory::<Repo, _, _>(|Inject(config): Inject<Config>| Repo {
            _config: config,
        })
        .unwrap();
    registry
        .add_transient_factory::<Service, _, _>(|Inject(repo): Inject<Repo>| Service {
            _repo: repo,
        })
        .unwrap();
    registry
}

fn bench_singleton(c: &mut Criterion) {
    let container = registry().container().unwrap();
    let _ = container.get::<Config>().unwrap();

    c.bench_function("singleton_cached", |b| {
        b.iter(|| container.get::<Config>().unwrap())
    });
}

fn bench_transient_graph(c: &mut Criterion) {
    let container = registry().container().unwrap();

    c.bench_function("transient_three_level_graph", |b| {
        b.iter(|| container.get::<Service>().unwrap())
    });
}

fn bench_scoped(c: &mut Criterion) {
    struct PerRequest(u64);

    let reg = registry();
    reg.add_scoped_factory::<PerRequest, _, _>(DefaultScope::Request, || PerRequest(1))
        .unwrap();
    let container = reg.container().unwrap();
    let scope = container.enter_scope().unwrap();
    let _ = scope.get::<PerRequest>().unwrap();

    c.bench_function("scoped_cached", |b| {
        b.iter(|| scope.get::<PerRequest>().unwrap())
    });

    c.bench_function("scope_enter_resolve_close", |b| {
        b.iter(|| {
            let scope = container.enter_scope().unwrap();
            let value = scope.get::<PerRequest>().unwrap();
            scope.close().unwrap();
            value
        })
    });
}

fn bench_unlocked_singleton(c: &mut Criterion) {
    struct Fast(u8);

    let reg = ProviderRegistry::new();
    let spec = ProviderSpec::sync_factory(
        ServiceKey::of::<Fast>(),
        Lifetime::Singleton,
        |_ctx, _bindings| Ok(boxed(Fast(1))),
    )
    .no_deps()
    .with_lock(LockMode::None);
    reg.register(spec).unwrap();
    let container = reg.container().unwrap();
    let _ = container.get::<Fast>().unwrap();

    c.bench_function("singleton_lock_free", |b| {
        b.iter(|| container.get::<Fast>().unwrap())
    });
}

fn bench_template_specialization(c: &mut Criterion) {
    struct Carton {
        _tag: &'static str,
    }

    let reg = ProviderRegistry::new();
    reg.add_template(
        ServiceKey::of::<Carton>().with_args(vec![var("T")]),
        Lifetime::Transient,
        |_ctx, _bindings| Ok(boxed(Carton { _tag: "tpl" })),
    )
    .unwrap();
    let container = reg.container().unwrap();
    let key = ServiceKey::of::<Carton>().with_args(vec![concrete::<u32>()]);
    let _ = container.get_keyed::<Carton>(&key).unwrap();

    c.bench_function("template_memoized_specialization", |b| {
        b.iter(|| container.get_keyed::<Carton>(&key).unwrap())
    });
}

criterion_group!(
    benches,
    bench_singleton,
    bench_transient_graph,
    bench_scoped,
    bench_unlocked_singleton,
    bench_template_specialization
);
criterion_main!(benches);
