//! Resolution traits shared by containers, scopes, and factory contexts.

use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::key::{ServiceKey, TypeKey};
use crate::scope::AnyArc;
use crate::BoxFuture;

pub(crate) fn downcast<T: Send + Sync + 'static>(
    any: AnyArc,
    key: &ServiceKey,
) -> DiResult<Arc<T>> {
    any.downcast::<T>()
        .map_err(|_| DiError::TypeMismatch { key: key.clone() })
}

/// Object-safe resolution core.
///
/// Implementors run the compiled assembly for a key. Each call is one
/// execution context: a fresh resolution stack is created per top-level
/// entry, so concurrent callers never share in-flight markers.
pub trait ResolverCore: Send + Sync {
    /// Resolves one key through the synchronous entry point. Fails with
    /// [`DiError::AsyncFromSync`] when the key's subgraph is asynchronous.
    fn resolve_any(&self, key: &ServiceKey) -> DiResult<AnyArc>;

    /// Resolves one key through the asynchronous entry point.
    fn aresolve_any<'a>(&'a self, key: &'a ServiceKey) -> BoxFuture<'a, DiResult<AnyArc>>;

    /// Resolves every provider registered for a base type (plain and
    /// labeled components) in registration order.
    fn resolve_all_any(&self, base: TypeKey) -> DiResult<Vec<AnyArc>>;
}

/// Typed convenience layer over [`ResolverCore`].
///
/// Implemented for every core resolver; this is the API factories and
/// callers actually use.
///
/// # Examples
///
/// ```rust
/// use wirebox::{ProviderRegistry, Resolver, Inject};
/// use std::sync::Arc;
///
/// struct Config { port: u16 }
/// struct Server { config: Arc<Config> }
///
/// let registry = ProviderRegistry::new();
/// registry.add_singleton(Config { port: 8080 }).unwrap();
/// registry
///     .add_singleton_factory::<Server, _, _>(|Inject(config): Inject<Config>| {
///         Server { config }
///     })
///     .unwrap();
///
/// let container = registry.container().unwrap();
/// let server = container.get::<Server>().unwrap();
/// assert_eq!(server.config.port, 8080);
/// ```
pub trait Resolver: ResolverCore {
    /// Resolves a plain concrete type.
    fn get<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let key = ServiceKey::of::<T>();
        downcast(self.resolve_any(&key)?, &key)
    }

    /// Resolves a labeled component of a base type.
    fn get_named<T: Send + Sync + 'static>(&self, label: &'static str) -> DiResult<Arc<T>> {
        let key = ServiceKey::named::<T>(label);
        downcast(self.resolve_any(&key)?, &key)
    }

    /// Resolves an explicit key (parameterized or labeled requests) and
    /// downcasts the result.
    fn get_keyed<T: Send + Sync + 'static>(&self, key: &ServiceKey) -> DiResult<Arc<T>> {
        downcast(self.resolve_any(key)?, key)
    }

    /// Resolves an explicit key without downcasting.
    fn resolve_key(&self, key: &ServiceKey) -> DiResult<AnyArc> {
        self.resolve_any(key)
    }

    /// Resolves a plain concrete type, panicking on failure. Convenience
    /// for wiring code where a missing provider is a bug.
    fn get_required<T: Send + Sync + 'static>(&self) -> Arc<T> {
        match self.get::<T>() {
            Ok(value) => value,
            Err(e) => panic!("required dependency failed to resolve: {}", e),
        }
    }

    /// Resolves every implementation registered for base type `T` in
    /// registration order.
    fn get_all<T: Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        let base = TypeKey::of::<T>();
        let key = ServiceKey::of::<T>();
        self.resolve_all_any(base)?
            .into_iter()
            .map(|any| downcast(any, &key))
            .collect()
    }

    /// Resolves a plain concrete type through the asynchronous entry point.
    fn get_async<'a, T: Send + Sync + 'static>(&'a self) -> BoxFuture<'a, DiResult<Arc<T>>> {
        Box::pin(async move {
            let key = ServiceKey::of::<T>();
            let any = self.aresolve_any(&key).await?;
            downcast(any, &key)
        })
    }

    /// Resolves an explicit key through the asynchronous entry point.
    fn get_keyed_async<'a, T: Send + Sync + 'static>(
        &'a self,
        key: &'a ServiceKey,
    ) -> BoxFuture<'a, DiResult<Arc<T>>> {
        Box::pin(async move {
            let any = self.aresolve_any(key).await?;
            downcast(any, key)
        })
    }
}

impl<R: ResolverCore + ?Sized> Resolver for R {}
