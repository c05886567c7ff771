//! The resolution runtime: containers, scope instances, and the contexts
//! handed to factories.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::compiler::{compiled, CompiledAssembly, ResolveStep};
use crate::error::{DiError, DiResult};
use crate::key::{ServiceKey, TypeKey};
use crate::lifetime::Lifetime;
use crate::registry::{Factory, RegistryShared};
use crate::scope::{AnyArc, Context, ScopeData, ScopeLevel};
use crate::traits::resolver::downcast;
use crate::traits::{AsyncDispose, Dispose, ResolverCore};
use crate::BoxFuture;

mod cache;
mod cleanup;
mod deferred;
mod stack;

pub use deferred::Deferred;
pub use stack::ResolutionStack;

use cache::LifetimeCache;
use cleanup::CleanupStack;

pub(crate) struct ScopeInner {
    pub(crate) registry: Arc<RegistryShared>,
    level: ScopeData,
    parent: Option<Arc<ScopeInner>>,
    cache: LifetimeCache,
    cleanups: Mutex<CleanupStack>,
    context: HashMap<ServiceKey, AnyArc>,
    closed: AtomicBool,
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let bag = self.cleanups.get_mut();
        if !bag.is_empty() {
            warn!(
                scope = self.level.name,
                "scope dropped without close; running sync cleanup"
            );
            let stranded = bag.run_sync_reverse_lossy();
            if stranded > 0 {
                warn!(
                    scope = self.level.name,
                    stranded, "async cleanup actions dropped without running"
                );
            }
        }
    }
}

/// One live instance of a scope level.
///
/// A scope owns the lifetime cache and cleanup stack for everything built at
/// its level, a context-value map visible to itself and its descendants, and
/// a back-reference to its parent. It is created by `enter_scope`, closed
/// exactly once (explicitly or by the drop fallback), and cheap to clone.
///
/// # Examples
///
/// ```rust
/// use wirebox::{ProviderRegistry, DefaultScope, Resolver};
/// use std::sync::Arc;
///
/// struct Conn(u32);
///
/// let registry = ProviderRegistry::new();
/// registry
///     .add_scoped_factory::<Conn, _, _>(DefaultScope::Request, || Conn(1))
///     .unwrap();
/// let container = registry.container().unwrap();
///
/// let scope = container.enter_scope().unwrap();
/// let a = scope.get::<Conn>().unwrap();
/// let b = scope.get::<Conn>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// scope.close().unwrap();
/// ```
#[derive(Clone)]
pub struct Scope {
    pub(crate) inner: Arc<ScopeInner>,
}

/// The root handle over a compiled registry.
///
/// Building a container auto-enters the hierarchy through its leading
/// skippable levels down to the first non-skippable one; singletons cache in
/// that root instance and are torn down only by an explicit
/// [`close`](Container::close)/[`aclose`](Container::aclose).
pub struct Container {
    root: Scope,
}

impl Container {
    pub(crate) fn new(registry: Arc<RegistryShared>) -> DiResult<Self> {
        let mut parent: Option<Arc<ScopeInner>> = None;
        for level in registry.hierarchy.entry_chain() {
            parent = Some(Arc::new(ScopeInner {
                registry: registry.clone(),
                level: *level,
                parent,
                cache: LifetimeCache::new(),
                cleanups: Mutex::new(CleanupStack::default()),
                context: HashMap::new(),
                closed: AtomicBool::new(false),
            }));
        }
        let inner = parent.expect("validated hierarchy is non-empty");
        debug!(root = inner.level.name, "container built");
        Ok(Self {
            root: Scope { inner },
        })
    }

    /// The root scope instance.
    pub fn root(&self) -> &Scope {
        &self.root
    }

    /// Compiles (or returns the cached) assembly for the current registry
    /// generation. Idempotent until a registration invalidates it.
    pub fn compile(&self) -> DiResult<Arc<CompiledAssembly>> {
        compiled(&self.root.inner.registry)
    }

    /// Enters the next non-skippable scope level below the root.
    pub fn enter_scope(&self) -> DiResult<Scope> {
        self.root.enter_scope()
    }

    /// Enters an explicit scope level below the root.
    pub fn enter_scope_at(&self, level: impl ScopeLevel) -> DiResult<Scope> {
        self.root.enter_scope_at(level)
    }

    /// Enters an explicit scope level with attached context values.
    pub fn enter_scope_with(&self, level: impl ScopeLevel, context: Context) -> DiResult<Scope> {
        self.root.enter_scope_with(level, context)
    }

    /// Synchronously drains the root chain's cleanup stacks, deepest first.
    /// Fails without running anything when an async cleanup is pending.
    pub fn close(&self) -> DiResult<()> {
        let mut cur = Some(self.root.inner.clone());
        while let Some(inner) = cur {
            Scope {
                inner: inner.clone(),
            }
            .close()?;
            cur = inner.parent.clone();
        }
        Ok(())
    }

    /// Asynchronously drains the root chain's cleanup stacks, deepest first.
    pub async fn aclose(&self) {
        let mut cur = Some(self.root.inner.clone());
        while let Some(inner) = cur {
            Scope {
                inner: inner.clone(),
            }
            .aclose()
            .await;
            cur = inner.parent.clone();
        }
    }
}

impl ResolverCore for Container {
    fn resolve_any(&self, key: &ServiceKey) -> DiResult<AnyArc> {
        self.root.resolve_any(key)
    }

    fn aresolve_any<'a>(&'a self, key: &'a ServiceKey) -> BoxFuture<'a, DiResult<AnyArc>> {
        self.root.aresolve_any(key)
    }

    fn resolve_all_any(&self, base: TypeKey) -> DiResult<Vec<AnyArc>> {
        self.root.resolve_all_any(base)
    }
}

impl Scope {
    /// Name of this instance's level.
    pub fn level_name(&self) -> &'static str {
        self.inner.level.name
    }

    fn enter(&self, level: ScopeData, context: Context) -> DiResult<Scope> {
        if !self.inner.registry.hierarchy.contains(level) {
            return Err(DiError::InvalidProviderSpec {
                detail: format!("scope level '{}' is not in the hierarchy", level.name),
            });
        }
        if level.rank <= self.inner.level.rank {
            return Err(DiError::InvalidProviderSpec {
                detail: format!(
                    "cannot enter scope '{}' from the deeper or equal scope '{}'",
                    level.name, self.inner.level.name
                ),
            });
        }
        // Only skippable levels may be bypassed on the way down.
        for between in self.inner.registry.hierarchy.levels() {
            if between.rank > self.inner.level.rank
                && between.rank < level.rank
                && !between.skippable
            {
                return Err(DiError::InvalidProviderSpec {
                    detail: format!(
                        "entering scope '{}' from '{}' would bypass the non-skippable \
                         scope '{}'",
                        level.name, self.inner.level.name, between.name
                    ),
                });
            }
        }
        debug!(from = self.inner.level.name, to = level.name, "entering scope");
        Ok(Scope {
            inner: Arc::new(ScopeInner {
                registry: self.inner.registry.clone(),
                level,
                parent: Some(self.inner.clone()),
                cache: LifetimeCache::new(),
                cleanups: Mutex::new(CleanupStack::default()),
                context: context.into_entries(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Enters the next non-skippable level below this one.
    pub fn enter_scope(&self) -> DiResult<Scope> {
        self.enter_scope_context(Context::new())
    }

    /// Enters an explicit level, bypassing intermediate skippable levels.
    pub fn enter_scope_at(&self, level: impl ScopeLevel) -> DiResult<Scope> {
        self.enter(level.data(), Context::new())
    }

    /// Enters an explicit level with attached context values.
    pub fn enter_scope_with(&self, level: impl ScopeLevel, context: Context) -> DiResult<Scope> {
        self.enter(level.data(), context)
    }

    /// Enters the next non-skippable level with attached context values.
    pub fn enter_scope_context(&self, context: Context) -> DiResult<Scope> {
        let next = self
            .inner
            .registry
            .hierarchy
            .next_enterable_below(self.inner.level.rank)
            .ok_or_else(|| DiError::InvalidProviderSpec {
                detail: format!("no enterable scope level below '{}'", self.inner.level.name),
            })?;
        self.enter(next, context)
    }

    /// A context value visible from this scope, child entries shadowing
    /// parents.
    pub fn context_value<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let key = ServiceKey::of::<T>();
        let any = self
            .lookup_context(&key)
            .ok_or_else(|| DiError::NotRegistered { key: key.clone() })?;
        downcast(any, &key)
    }

    pub(crate) fn lookup_context(&self, key: &ServiceKey) -> Option<AnyArc> {
        let mut cur: Option<&Arc<ScopeInner>> = Some(&self.inner);
        while let Some(inner) = cur {
            if let Some(value) = inner.context.get(key) {
                return Some(value.clone());
            }
            cur = inner.parent.as_ref();
        }
        None
    }

    /// Synchronously closes this instance: cleanup runs in reverse
    /// acquisition order, the lifetime cache is cleared. Idempotent; a
    /// pending async cleanup fails the call without running anything.
    pub fn close(&self) -> DiResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut bag = self.inner.cleanups.lock();
        if let Some(key) = bag.pending_async_key() {
            return Err(DiError::AsyncFromSync { key: key.clone() });
        }
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut taken = std::mem::take(&mut *bag);
        drop(bag);
        taken.run_sync_reverse_lossy();
        self.inner.cache.clear();
        debug!(scope = self.inner.level.name, "scope closed");
        Ok(())
    }

    /// Asynchronously closes this instance, draining sync and async cleanup
    /// in reverse acquisition order. Idempotent.
    pub async fn aclose(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut taken = std::mem::take(&mut *self.inner.cleanups.lock());
        taken.run_all_reverse().await;
        self.inner.cache.clear();
        debug!(scope = self.inner.level.name, "scope closed");
    }
}

impl ResolverCore for Scope {
    fn resolve_any(&self, key: &ServiceKey) -> DiResult<AnyArc> {
        let assembly = compiled(&self.inner.registry)?;
        let stack = Mutex::new(ResolutionStack::new());
        resolve_sync(self, &assembly, key, &stack)
    }

    fn aresolve_any<'a>(&'a self, key: &'a ServiceKey) -> BoxFuture<'a, DiResult<AnyArc>> {
        Box::pin(async move {
            let assembly = compiled(&self.inner.registry)?;
            let stack = Arc::new(Mutex::new(ResolutionStack::new()));
            resolve_async(self.clone(), assembly, key.clone(), stack).await
        })
    }

    fn resolve_all_any(&self, base: TypeKey) -> DiResult<Vec<AnyArc>> {
        let assembly = compiled(&self.inner.registry)?;
        let stack = Mutex::new(ResolutionStack::new());
        assembly
            .collection(base)
            .iter()
            .map(|key| resolve_sync(self, &assembly, key, &stack))
            .collect()
    }
}

// ----- Execution -----
//
// The in-flight marker for a key is pushed before the slot's init lock is
// touched: a factory that re-requests its own key must hit the cycle check,
// not block on the lock it already holds.

fn resolve_sync(
    scope: &Scope,
    assembly: &Arc<CompiledAssembly>,
    key: &ServiceKey,
    stack: &Mutex<ResolutionStack>,
) -> DiResult<AnyArc> {
    let step = assembly
        .step_for(key)?
        .ok_or_else(|| DiError::NotRegistered { key: key.clone() })?;
    if step.is_async {
        return Err(DiError::AsyncFromSync { key: key.clone() });
    }
    match step.lifetime {
        Lifetime::Transient => {
            stack.lock().push(&step.key)?;
            let result = construct_sync(scope, assembly, &step, stack);
            stack.lock().pop();
            result
        }
        Lifetime::Singleton | Lifetime::Scoped => {
            let owner = owner_for(scope, &step)?;
            let cell = owner.inner.cache.cell(step.slot, step.lock);
            if let Some(value) = cell.peek() {
                return Ok(value);
            }
            stack.lock().push(&step.key)?;
            let result = cell.get_or_build_sync(|| construct_sync(&owner, assembly, &step, stack));
            stack.lock().pop();
            result
        }
    }
}

fn resolve_async(
    scope: Scope,
    assembly: Arc<CompiledAssembly>,
    key: ServiceKey,
    stack: Arc<Mutex<ResolutionStack>>,
) -> BoxFuture<'static, DiResult<AnyArc>> {
    Box::pin(async move {
        let step = assembly
            .step_for(&key)?
            .ok_or_else(|| DiError::NotRegistered { key: key.clone() })?;
        match step.lifetime {
            Lifetime::Transient => {
                stack.lock().push(&step.key)?;
                let result = construct_async(&scope, &assembly, &step, &stack).await;
                stack.lock().pop();
                result
            }
            Lifetime::Singleton | Lifetime::Scoped => {
                let owner = owner_for(&scope, &step)?;
                let cell = owner.inner.cache.cell(step.slot, step.lock);
                if let Some(value) = cell.peek() {
                    return Ok(value);
                }
                stack.lock().push(&step.key)?;
                let result = if step.is_async {
                    cell.get_or_build_async(|| construct_async(&owner, &assembly, &step, &stack))
                        .await
                } else {
                    cell.get_or_build_sync(|| construct_sync(&owner, &assembly, &step, &stack))
                };
                stack.lock().pop();
                result
            }
        }
    })
}

/// The scope instance that caches and owns a step's value: the requesting
/// scope for transients, the container root for singletons, and for scoped
/// providers the shallowest live instance whose rank is at or above the
/// declared level (the instance that subsumed any skipped levels).
fn owner_for(scope: &Scope, step: &ResolveStep) -> DiResult<Scope> {
    let declared = match step.lifetime {
        Lifetime::Transient => return Ok(scope.clone()),
        Lifetime::Singleton => scope.inner.registry.hierarchy.root_level(),
        Lifetime::Scoped => step.scope.ok_or_else(|| DiError::InvalidProviderSpec {
            detail: format!("scoped provider {} carries no scope level", step.key),
        })?,
    };
    if scope.inner.level.rank < declared.rank {
        return Err(DiError::ScopeMismatch {
            key: step.key.clone(),
            declared: declared.name,
            current: scope.inner.level.name,
        });
    }
    let mut cur = scope.inner.clone();
    loop {
        match cur.parent.clone() {
            Some(parent) if parent.level.rank >= declared.rank => cur = parent,
            _ => break,
        }
    }
    Ok(Scope { inner: cur })
}

/// Invokes the step's factory against its owning scope. The caller has
/// already pushed the in-flight marker.
fn construct_sync(
    owner: &Scope,
    assembly: &Arc<CompiledAssembly>,
    step: &ResolveStep,
    stack: &Mutex<ResolutionStack>,
) -> DiResult<AnyArc> {
    let result = match &step.factory {
        Factory::Instance(value) => Ok(value.clone()),
        Factory::Context => owner
            .lookup_context(&step.key)
            .ok_or_else(|| DiError::NotRegistered {
                key: step.key.clone(),
            }),
        Factory::Sync(f) | Factory::Hybrid(f, _) => {
            let ctx = ResolverContext::new(owner, assembly, stack, &step.key);
            f(&ctx, &step.bindings)
        }
        Factory::Async(_) => Err(DiError::AsyncFromSync {
            key: step.key.clone(),
        }),
    };
    if let Err(e) = &result {
        error!(key = %step.key, error = %e, "resolution failed");
    }
    result
}

async fn construct_async(
    owner: &Scope,
    assembly: &Arc<CompiledAssembly>,
    step: &Arc<ResolveStep>,
    stack: &Arc<Mutex<ResolutionStack>>,
) -> DiResult<AnyArc> {
    let result = match &step.factory {
        Factory::Instance(value) => Ok(value.clone()),
        Factory::Context => owner
            .lookup_context(&step.key)
            .ok_or_else(|| DiError::NotRegistered {
                key: step.key.clone(),
            }),
        Factory::Sync(f) => {
            let ctx = ResolverContext::new(owner, assembly, stack, &step.key);
            f(&ctx, &step.bindings)
        }
        Factory::Hybrid(_, f) | Factory::Async(f) => {
            // The factory's future is a new execution context: it gets a
            // fork of the in-flight markers, never the live stack.
            let forked = stack.lock().fork();
            let ctx = AsyncResolverContext {
                scope: owner.clone(),
                assembly: assembly.clone(),
                stack: Arc::new(Mutex::new(forked)),
                key: step.key.clone(),
            };
            f(ctx, step.bindings.clone()).await
        }
    };
    if let Err(e) = &result {
        error!(key = %step.key, error = %e, "resolution failed");
    }
    result
}

/// Context handed to synchronous factories: resolves dependencies through
/// the requesting assembly, hands out deferred handles, reads context
/// values, and registers cleanup against the owning scope.
pub struct ResolverContext<'a> {
    scope: &'a Scope,
    assembly: &'a Arc<CompiledAssembly>,
    stack: &'a Mutex<ResolutionStack>,
    key: &'a ServiceKey,
}

impl<'a> ResolverContext<'a> {
    pub(crate) fn new(
        scope: &'a Scope,
        assembly: &'a Arc<CompiledAssembly>,
        stack: &'a Mutex<ResolutionStack>,
        key: &'a ServiceKey,
    ) -> Self {
        Self {
            scope,
            assembly,
            stack,
            key,
        }
    }

    /// Resolves a plain concrete dependency.
    pub fn get<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let key = ServiceKey::of::<T>();
        downcast(self.resolve_key(&key)?, &key)
    }

    /// Resolves a labeled component.
    pub fn get_named<T: Send + Sync + 'static>(&self, label: &'static str) -> DiResult<Arc<T>> {
        let key = ServiceKey::named::<T>(label);
        downcast(self.resolve_key(&key)?, &key)
    }

    /// Resolves an explicit key and downcasts.
    pub fn get_keyed<T: Send + Sync + 'static>(&self, key: &ServiceKey) -> DiResult<Arc<T>> {
        downcast(self.resolve_key(key)?, key)
    }

    /// Resolves an explicit key without downcasting.
    pub fn resolve_key(&self, key: &ServiceKey) -> DiResult<AnyArc> {
        resolve_sync(self.scope, self.assembly, key, self.stack)
    }

    /// Resolves a dependency that may legitimately be unregistered.
    pub fn try_get<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        match self.get::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(DiError::NotRegistered { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolves every implementation registered for base type `T` in
    /// registration order.
    pub fn get_all<T: Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        let base = TypeKey::of::<T>();
        self.assembly
            .collection(base)
            .iter()
            .map(|key| downcast(self.resolve_key(key)?, key))
            .collect()
    }

    /// A deferred handle to `T`, resolved on first invocation outside the
    /// current in-flight frame. The sanctioned way to break cycles.
    pub fn deferred<T: Send + Sync + 'static>(&self) -> Deferred<T> {
        Deferred::new(&self.scope.inner, ServiceKey::of::<T>())
    }

    /// A deferred handle under an explicit key.
    pub fn deferred_keyed<T: Send + Sync + 'static>(&self, key: ServiceKey) -> Deferred<T> {
        Deferred::new(&self.scope.inner, key)
    }

    /// A context value visible from the owning scope.
    pub fn context_value<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.scope.context_value::<T>()
    }

    /// Registers a cleanup action against the owning scope. Runs on scope
    /// exit in reverse acquisition order.
    pub fn on_cleanup(&self, f: impl FnOnce() + Send + 'static) {
        self.scope.inner.cleanups.lock().push_sync(Box::new(f));
    }

    /// Registers an asynchronous cleanup action; the owning scope must then
    /// be closed through the async path.
    pub fn on_async_cleanup<F, Fut>(&self, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.scope
            .inner
            .cleanups
            .lock()
            .push_async(self.key.clone(), f);
    }

    /// Registers a [`Dispose`] implementor for teardown.
    pub fn register_disposer<T: Dispose>(&self, service: Arc<T>) {
        self.on_cleanup(move || service.dispose());
    }

    /// Registers an [`AsyncDispose`] implementor for teardown.
    pub fn register_async_disposer<T: AsyncDispose>(&self, service: Arc<T>) {
        self.on_async_cleanup(move || async move { service.dispose().await });
    }
}

/// Owned context handed to asynchronous factories. Carries its own fork of
/// the resolution stack, created at the concurrency boundary.
pub struct AsyncResolverContext {
    scope: Scope,
    assembly: Arc<CompiledAssembly>,
    stack: Arc<Mutex<ResolutionStack>>,
    key: ServiceKey,
}

impl AsyncResolverContext {
    /// Resolves a plain concrete dependency.
    pub async fn get<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let key = ServiceKey::of::<T>();
        let any = self.resolve_key(&key).await?;
        downcast(any, &key)
    }

    /// Resolves a labeled component.
    pub async fn get_named<T: Send + Sync + 'static>(
        &self,
        label: &'static str,
    ) -> DiResult<Arc<T>> {
        let key = ServiceKey::named::<T>(label);
        let any = self.resolve_key(&key).await?;
        downcast(any, &key)
    }

    /// Resolves an explicit key without downcasting.
    pub async fn resolve_key(&self, key: &ServiceKey) -> DiResult<AnyArc> {
        resolve_async(
            self.scope.clone(),
            self.assembly.clone(),
            key.clone(),
            self.stack.clone(),
        )
        .await
    }

    /// Resolves a dependency that may legitimately be unregistered.
    pub async fn try_get<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        match self.get::<T>().await {
            Ok(value) => Ok(Some(value)),
            Err(DiError::NotRegistered { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// A deferred handle to `T`.
    pub fn deferred<T: Send + Sync + 'static>(&self) -> Deferred<T> {
        Deferred::new(&self.scope.inner, ServiceKey::of::<T>())
    }

    /// A context value visible from the owning scope.
    pub fn context_value<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.scope.context_value::<T>()
    }

    /// Registers a cleanup action against the owning scope.
    pub fn on_cleanup(&self, f: impl FnOnce() + Send + 'static) {
        self.scope.inner.cleanups.lock().push_sync(Box::new(f));
    }

    /// Registers an asynchronous cleanup action.
    pub fn on_async_cleanup<F, Fut>(&self, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.scope
            .inner
            .cleanups
            .lock()
            .push_async(self.key.clone(), f);
    }

    /// Registers a [`Dispose`] implementor for teardown.
    pub fn register_disposer<T: Dispose>(&self, service: Arc<T>) {
        self.on_cleanup(move || service.dispose());
    }

    /// Registers an [`AsyncDispose`] implementor for teardown.
    pub fn register_async_disposer<T: AsyncDispose>(&self, service: Arc<T>) {
        self.on_async_cleanup(move || async move { service.dispose().await });
    }
}
