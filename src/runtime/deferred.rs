//! Deferred handles: the sanctioned way to break dependency cycles.

use std::fmt;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;

use crate::error::{DiError, DiResult};
use crate::key::ServiceKey;
use crate::runtime::{Scope, ScopeInner};
use crate::traits::resolver::downcast;
use crate::traits::ResolverCore;

/// A zero-argument handle standing in for a dependency.
///
/// Requesting a `Deferred<T>` instead of `T` converts a build-time cycle
/// into a runtime indirection: the handle captures just the scope and key,
/// and resolves the target on first invocation, outside of the in-flight
/// stack frame that created it. The result is memoized per handle.
///
/// The captured scope reference is weak; invoking a handle after its scope
/// was released fails with [`DiError::ResolverNotSet`].
///
/// # Examples
///
/// ```rust
/// use wirebox::{ProviderRegistry, Deferred, Inject, Resolver};
/// use std::sync::Arc;
///
/// struct Parent { child: Arc<Child> }
/// struct Child { parent: Deferred<Parent> }
///
/// let registry = ProviderRegistry::new();
/// registry
///     .add_singleton_factory::<Parent, _, _>(|Inject(child): Inject<Child>| {
///         Parent { child }
///     })
///     .unwrap();
/// registry
///     .add_singleton_factory::<Child, _, _>(|parent: Deferred<Parent>| {
///         Child { parent }
///     })
///     .unwrap();
///
/// let container = registry.container().unwrap();
/// let parent = container.get::<Parent>().unwrap();
/// let via_child = parent.child.parent.get().unwrap();
/// assert!(Arc::ptr_eq(&parent, &via_child));
/// ```
pub struct Deferred<T: Send + Sync + 'static> {
    scope: Weak<ScopeInner>,
    key: ServiceKey,
    cell: OnceCell<Arc<T>>,
}

impl<T: Send + Sync + 'static> Deferred<T> {
    pub(crate) fn new(scope: &Arc<ScopeInner>, key: ServiceKey) -> Self {
        Self {
            scope: Arc::downgrade(scope),
            key,
            cell: OnceCell::new(),
        }
    }

    /// The key this handle resolves.
    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    /// Whether the target was already resolved through this handle.
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    fn scope(&self) -> DiResult<Scope> {
        self.scope
            .upgrade()
            .map(|inner| Scope { inner })
            .ok_or_else(|| DiError::ResolverNotSet {
                key: self.key.clone(),
            })
    }

    /// Resolves the target on first invocation and memoizes it. Fails with
    /// [`DiError::AsyncFromSync`] when the target subgraph is asynchronous.
    pub fn get(&self) -> DiResult<Arc<T>> {
        if let Some(value) = self.cell.get() {
            return Ok(value.clone());
        }
        let scope = self.scope()?;
        let any = scope.resolve_any(&self.key)?;
        let value = downcast::<T>(any, &self.key)?;
        Ok(self.cell.get_or_init(|| value).clone())
    }

    /// Async variant of [`get`](Self::get).
    pub async fn get_async(&self) -> DiResult<Arc<T>> {
        if let Some(value) = self.cell.get() {
            return Ok(value.clone());
        }
        let scope = self.scope()?;
        let any = scope.aresolve_any(&self.key).await?;
        let value = downcast::<T>(any, &self.key)?;
        Ok(self.cell.get_or_init(|| value).clone())
    }
}

impl<T: Send + Sync + 'static> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            key: self.key.clone(),
            cell: self.cell.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("key", &self.key)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
