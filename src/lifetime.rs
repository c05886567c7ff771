//! Lifetime and lock-mode definitions.

/// Instance lifetime controlling caching and identity.
///
/// # Examples
///
/// ```rust
/// use wirebox::{ProviderRegistry, DefaultScope, Inject, Resolver};
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Session { id: u32 }
///
/// let registry = ProviderRegistry::new();
/// registry.add_singleton(Config { url: "postgres://localhost".into() }).unwrap();
/// registry
///     .add_scoped_factory::<Session, _, _>(DefaultScope::Request, |_: Inject<Config>| {
///         Session { id: 7 }
///     })
///     .unwrap();
///
/// let container = registry.container().unwrap();
///
/// // Singletons are shared across scopes.
/// let c1 = container.get::<Config>().unwrap();
/// let scope = container.enter_scope().unwrap();
/// let c2 = scope.get::<Config>().unwrap();
/// assert!(Arc::ptr_eq(&c1, &c2));
///
/// // Scoped instances are shared within one scope instance only.
/// let s1 = scope.get::<Session>().unwrap();
/// let s2 = scope.get::<Session>().unwrap();
/// assert!(Arc::ptr_eq(&s1, &s2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// New instance on every resolution, never cached.
    Transient,
    /// One instance per container, cached in the root scope instance.
    Singleton,
    /// One instance per owning scope instance at the declared level.
    Scoped,
}

/// First-build locking discipline for a cacheable provider.
///
/// `Auto` is the default: the resolution compiler picks `Thread` for
/// sync-reachable providers and `Async` when the provider's subgraph is
/// asynchronous. `None` disables first-build mutual exclusion entirely; the
/// caller guarantees single-threaded access (e.g. benchmarking), and a race
/// may build twice with the last write winning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Blocking mutex guarding first build.
    Thread,
    /// Async-safe mutex guarding first build on asynchronous paths.
    Async,
    /// No locking at all.
    None,
    /// Picked at compile time from the subgraph's asynchrony.
    Auto,
}

impl Default for LockMode {
    fn default() -> Self {
        LockMode::Auto
    }
}
