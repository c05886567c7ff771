//! Provider registry: specs, slots, templates, and the registration surface.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use tracing::debug;

use crate::compiler::CompiledAssembly;
use crate::error::{DiError, DiResult};
use crate::generics::{best_match, Bindings, TemplateMatch};
use crate::inject::{IntoAsyncFactory, IntoAsyncResourceFactory, IntoFactory, IntoResourceFactory};
use crate::key::{ServiceKey, TypeKey};
use crate::lifetime::{Lifetime, LockMode};
use crate::runtime::{AsyncResolverContext, Container, ResolverContext};
use crate::scope::{AnyArc, ScopeData, ScopeHierarchy, ScopeLevel};
use crate::BoxFuture;

pub(crate) type SyncFactoryFn =
    Arc<dyn for<'a> Fn(&ResolverContext<'a>, &Bindings) -> DiResult<AnyArc> + Send + Sync>;
pub(crate) type AsyncFactoryFn =
    Arc<dyn Fn(AsyncResolverContext, Bindings) -> BoxFuture<'static, DiResult<AnyArc>> + Send + Sync>;

/// How a provider produces its value.
#[derive(Clone)]
pub(crate) enum Factory {
    /// A pre-built shared instance.
    Instance(AnyArc),
    /// Synchronous closure resolving its dependencies through the context.
    /// Its dependencies must form a synchronous subgraph.
    Sync(SyncFactoryFn),
    /// A synchronous producer with extractor-inferred dependencies: the
    /// async shim awaits dependency extraction, so the producer stays usable
    /// when a dependency's subgraph is asynchronous.
    Hybrid(SyncFactoryFn, AsyncFactoryFn),
    /// Asynchronous closure.
    Async(AsyncFactoryFn),
    /// Value looked up in the scope's context chain under the provider key.
    Context,
}

/// Whether a dependency slot is resolved eagerly or through a deferred
/// handle. Deferred slots are not edges for cycle or asynchrony analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepKind {
    Direct,
    Deferred,
}

/// One declared dependency of a provider: a slot name (the dependency's type
/// name; Rust has no runtime parameter names), the requested key, whether
/// the dependency is required, and its kind.
#[derive(Clone, Debug)]
pub struct DependencySlot {
    pub name: &'static str,
    pub key: ServiceKey,
    pub required: bool,
    pub kind: DepKind,
}

impl DependencySlot {
    pub fn direct(key: ServiceKey) -> Self {
        Self {
            name: key.base().name(),
            key,
            required: true,
            kind: DepKind::Direct,
        }
    }

    pub fn optional(key: ServiceKey) -> Self {
        Self {
            required: false,
            ..Self::direct(key)
        }
    }

    pub fn deferred(key: ServiceKey) -> Self {
        Self {
            kind: DepKind::Deferred,
            ..Self::direct(key)
        }
    }
}

/// Factory closure plus everything a typed registration infers about it.
pub struct FactoryParts {
    pub(crate) factory: Factory,
    pub(crate) deps: SmallVec<[DependencySlot; 4]>,
    pub(crate) is_async: bool,
    pub(crate) needs_cleanup: bool,
}

/// A registered recipe for producing one key.
///
/// Most code goes through the typed `add_*` surface; `ProviderSpec` is the
/// low-level escape hatch for dynamic registration, and the unit the
/// compiler consumes.
#[derive(Clone)]
pub struct ProviderSpec {
    pub(crate) key: ServiceKey,
    pub(crate) factory: Factory,
    pub(crate) dependencies: SmallVec<[DependencySlot; 4]>,
    pub(crate) deps_declared: bool,
    pub(crate) lifetime: Lifetime,
    pub(crate) scope: Option<ScopeData>,
    pub(crate) lock: LockMode,
    pub(crate) is_async: bool,
    pub(crate) needs_cleanup: bool,
    pub(crate) slot: usize,
}

impl ProviderSpec {
    fn base(key: ServiceKey, factory: Factory, lifetime: Lifetime) -> Self {
        Self {
            key,
            factory,
            dependencies: SmallVec::new(),
            deps_declared: false,
            lifetime,
            scope: None,
            lock: LockMode::Auto,
            is_async: false,
            needs_cleanup: false,
            slot: 0,
        }
    }

    /// Spec wrapping a pre-built shared instance.
    pub fn instance(key: ServiceKey, value: AnyArc) -> Self {
        let mut spec = Self::base(key, Factory::Instance(value), Lifetime::Singleton);
        spec.deps_declared = true;
        spec
    }

    /// Spec around a type-erased synchronous factory. The dependency list
    /// must be supplied with [`with_dependencies`](Self::with_dependencies)
    /// or explicitly waived with [`no_deps`](Self::no_deps).
    pub fn sync_factory<F>(key: ServiceKey, lifetime: Lifetime, f: F) -> Self
    where
        F: for<'a> Fn(&ResolverContext<'a>, &Bindings) -> DiResult<AnyArc> + Send + Sync + 'static,
    {
        Self::base(key, Factory::Sync(Arc::new(f)), lifetime)
    }

    /// Spec around a type-erased asynchronous factory.
    pub fn async_factory<F>(key: ServiceKey, lifetime: Lifetime, f: F) -> Self
    where
        F: Fn(AsyncResolverContext, Bindings) -> BoxFuture<'static, DiResult<AnyArc>>
            + Send
            + Sync
            + 'static,
    {
        let mut spec = Self::base(key, Factory::Async(Arc::new(f)), lifetime);
        spec.is_async = true;
        spec
    }

    /// Spec resolved from the scope's context chain.
    pub fn context(key: ServiceKey, scope: ScopeData) -> Self {
        let mut spec = Self::base(key, Factory::Context, Lifetime::Scoped);
        spec.scope = Some(scope);
        spec.deps_declared = true;
        spec
    }

    pub(crate) fn from_parts(
        key: ServiceKey,
        lifetime: Lifetime,
        scope: Option<ScopeData>,
        parts: FactoryParts,
    ) -> Self {
        Self {
            key,
            factory: parts.factory,
            dependencies: parts.deps,
            deps_declared: true,
            lifetime,
            scope,
            lock: LockMode::Auto,
            is_async: parts.is_async,
            needs_cleanup: parts.needs_cleanup,
            slot: 0,
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<DependencySlot>) -> Self {
        self.dependencies = deps.into();
        self.deps_declared = true;
        self
    }

    /// Marks the factory as dependency-free.
    pub fn no_deps(mut self) -> Self {
        self.deps_declared = true;
        self
    }

    pub fn in_scope(mut self, level: impl ScopeLevel) -> Self {
        self.scope = Some(level.data());
        self
    }

    pub fn with_lock(mut self, lock: LockMode) -> Self {
        self.lock = lock;
        self
    }

    /// Marks the provider as owning a resource needing teardown.
    pub fn with_cleanup(mut self) -> Self {
        self.needs_cleanup = true;
        self
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn scope_name(&self) -> Option<&'static str> {
        self.scope.map(|s| s.name)
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn has_cleanup(&self) -> bool {
        self.needs_cleanup
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn dependencies(&self) -> &[DependencySlot] {
        &self.dependencies
    }
}

/// Registration metadata snapshot for introspection and diagnostics.
#[derive(Clone, Debug)]
pub struct ProviderDescriptor {
    pub key: ServiceKey,
    pub lifetime: Lifetime,
    pub scope: Option<&'static str>,
    pub is_async: bool,
    pub needs_cleanup: bool,
    pub slot: usize,
}

fn describe(spec: &ProviderSpec) -> ProviderDescriptor {
    ProviderDescriptor {
        key: spec.key.clone(),
        lifetime: spec.lifetime,
        scope: spec.scope_name(),
        is_async: spec.is_async,
        needs_cleanup: spec.needs_cleanup,
        slot: spec.slot,
    }
}

pub(crate) enum Lookup {
    Slot(usize),
    Template(TemplateMatch),
}

pub(crate) struct RegistryState {
    pub(crate) slots: Vec<Option<ProviderSpec>>,
    pub(crate) by_key: HashMap<ServiceKey, usize>,
    pub(crate) templates: HashMap<(TypeKey, Option<&'static str>), Vec<usize>>,
    pub(crate) by_base: HashMap<TypeKey, Vec<usize>>,
    pub(crate) generation: u64,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            by_key: HashMap::new(),
            templates: HashMap::new(),
            by_base: HashMap::new(),
            generation: 0,
        }
    }

    pub(crate) fn spec(&self, slot: usize) -> Option<&ProviderSpec> {
        self.slots.get(slot).and_then(|s| s.as_ref())
    }

    /// Exact-key or best-open-template lookup. A closed registration always
    /// outranks any template.
    pub(crate) fn lookup(&self, key: &ServiceKey) -> DiResult<Option<Lookup>> {
        if let Some(&slot) = self.by_key.get(key) {
            return Ok(Some(Lookup::Slot(slot)));
        }
        let pool = self.template_pool(key.base(), key.label());
        if pool.is_empty() {
            return Ok(None);
        }
        Ok(best_match(key, &pool)?.map(Lookup::Template))
    }

    fn template_pool(
        &self,
        base: TypeKey,
        label: Option<&'static str>,
    ) -> Vec<(usize, ServiceKey)> {
        let mut pool = Vec::new();
        if let Some(slots) = self.templates.get(&(base, label)) {
            for &slot in slots {
                if let Some(spec) = self.spec(slot) {
                    pool.push((slot, spec.key.clone()));
                }
            }
        }
        pool
    }

    /// Re-runs transitive cleanup propagation until fixpoint. Registering a
    /// cleanup-requiring dependency after its consumers retroactively flips
    /// their flags.
    fn propagate_cleanup(&mut self) {
        loop {
            let dirty: HashSet<ServiceKey> = self
                .slots
                .iter()
                .flatten()
                .filter(|s| s.needs_cleanup)
                .map(|s| s.key.clone())
                .collect();
            let mut changed = false;
            for spec in self.slots.iter_mut().flatten() {
                if !spec.needs_cleanup
                    && spec.dependencies.iter().any(|d| dirty.contains(&d.key))
                {
                    spec.needs_cleanup = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
}

/// Slots for template specializations live in their own namespace, far above
/// anything the registry will ever assign, and are memoized per closed key so
/// a specialization keeps its slot (and therefore its cached instances)
/// across recompiles.
const SPECIALIZATION_SLOT_BASE: usize = usize::MAX / 2;

pub(crate) struct RegistryShared {
    pub(crate) state: RwLock<RegistryState>,
    pub(crate) hierarchy: ScopeHierarchy,
    pub(crate) compiled: RwLock<Option<Arc<CompiledAssembly>>>,
    pub(crate) compile_lock: Mutex<()>,
    pub(crate) special_slots: Mutex<HashMap<ServiceKey, usize>>,
}

impl RegistryShared {
    /// The stable slot for a closed key served by a template.
    pub(crate) fn specialization_slot(&self, key: &ServiceKey) -> usize {
        let mut slots = self.special_slots.lock();
        let next = SPECIALIZATION_SLOT_BASE + slots.len();
        *slots.entry(key.clone()).or_insert(next)
    }
}

/// The registration surface and the container's backing store.
///
/// Registration stays open after containers are built; any successful
/// registration bumps a generation counter that invalidates the cached
/// compiled assembly, forcing recompilation on next use.
///
/// # Examples
///
/// ```rust
/// use wirebox::{ProviderRegistry, DefaultScope, Inject, Resolver};
/// use std::sync::Arc;
///
/// struct Db { url: String }
/// struct Users { db: Arc<Db> }
///
/// let registry = ProviderRegistry::new();
/// registry.add_singleton(Db { url: "postgres://localhost".into() }).unwrap();
/// registry
///     .add_scoped_factory::<Users, _, _>(DefaultScope::Request, |Inject(db): Inject<Db>| {
///         Users { db }
///     })
///     .unwrap();
///
/// let container = registry.container().unwrap();
/// let scope = container.enter_scope().unwrap();
/// assert_eq!(scope.get::<Users>().unwrap().db.url, "postgres://localhost");
/// ```
#[derive(Clone)]
pub struct ProviderRegistry {
    pub(crate) shared: Arc<RegistryShared>,
}

impl ProviderRegistry {
    /// A registry over the standard six-level hierarchy.
    pub fn new() -> Self {
        Self::with_hierarchy(ScopeHierarchy::default_scopes())
    }

    /// A registry over a custom, already-validated hierarchy.
    pub fn with_hierarchy(hierarchy: ScopeHierarchy) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                state: RwLock::new(RegistryState::new()),
                hierarchy,
                compiled: RwLock::new(None),
                compile_lock: Mutex::new(()),
                special_slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn hierarchy(&self) -> &ScopeHierarchy {
        &self.shared.hierarchy
    }

    /// Builds a container over this registry. The container auto-enters
    /// through leading skippable levels to the first non-skippable one.
    pub fn container(&self) -> DiResult<Container> {
        Container::new(self.shared.clone())
    }

    /// Current registration generation; bumped by every successful
    /// registration.
    pub fn generation(&self) -> u64 {
        self.shared.state.read().generation
    }

    /// Snapshot of all live registrations in slot order.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.shared
            .state
            .read()
            .slots
            .iter()
            .flatten()
            .map(describe)
            .collect()
    }

    /// The live registration at a slot, if any.
    pub fn descriptor_by_slot(&self, slot: usize) -> Option<ProviderDescriptor> {
        self.shared.state.read().spec(slot).map(describe)
    }

    /// Live registrations bound to the given scope level, in slot order.
    pub fn descriptors_in_scope(&self, level: impl ScopeLevel) -> Vec<ProviderDescriptor> {
        let level = level.data();
        self.shared
            .state
            .read()
            .slots
            .iter()
            .flatten()
            .filter(|s| s.scope == Some(level))
            .map(describe)
            .collect()
    }

    /// Low-level registration. Validates the spec, assigns its slot,
    /// overwrites any previous registration for the same closed key (the
    /// old slot is removed entirely), and invalidates the compiled assembly.
    pub fn register(&self, mut spec: ProviderSpec) -> DiResult<()> {
        if spec.lifetime == Lifetime::Scoped {
            match spec.scope {
                None => {
                    return Err(DiError::InvalidRegistration {
                        key: spec.key,
                        detail: "scoped providers must name a scope level",
                    })
                }
                Some(level) if !self.shared.hierarchy.contains(level) => {
                    return Err(DiError::InvalidRegistration {
                        key: spec.key,
                        detail: "scope level is not part of the hierarchy",
                    })
                }
                Some(_) => {}
            }
        } else if spec.scope.is_some() {
            return Err(DiError::InvalidRegistration {
                key: spec.key,
                detail: "only scoped providers name a scope level",
            });
        }
        if !spec.deps_declared {
            return Err(DiError::DependencyInference {
                type_name: spec.key.base().name(),
            });
        }
        for dep in &spec.dependencies {
            if !dep.key.is_closed() {
                return Err(DiError::InvalidRegistration {
                    key: spec.key.clone(),
                    detail: "dependency keys must be closed",
                });
            }
        }

        let mut state = self.shared.state.write();
        let slot = state.slots.len();
        spec.slot = slot;
        let key = spec.key.clone();
        let base = key.base();

        if key.is_template() {
            state
                .templates
                .entry((base, key.label()))
                .or_default()
                .push(slot);
        } else {
            if let Some(old) = state.by_key.insert(key.clone(), slot) {
                state.slots[old] = None;
                if let Some(order) = state.by_base.get_mut(&base) {
                    order.retain(|s| *s != old);
                }
            }
            state.by_base.entry(base).or_default().push(slot);
        }
        state.slots.push(Some(spec));
        state.propagate_cleanup();
        state.generation += 1;
        debug!(key = %key, generation = state.generation, "provider registered");
        Ok(())
    }

    // ----- Instances -----

    /// Registers a pre-built singleton instance.
    pub fn add_singleton<T: Send + Sync + 'static>(&self, value: T) -> DiResult<()> {
        self.register(ProviderSpec::instance(ServiceKey::of::<T>(), Arc::new(value)))
    }

    /// Registers a pre-built singleton under a component label.
    pub fn add_named_singleton<T: Send + Sync + 'static>(
        &self,
        label: &'static str,
        value: T,
    ) -> DiResult<()> {
        self.register(ProviderSpec::instance(
            ServiceKey::named::<T>(label),
            Arc::new(value),
        ))
    }

    // ----- Sync factories -----

    /// Registers a singleton built lazily on first resolve. Dependencies
    /// are inferred from the factory's extractor parameters.
    pub fn add_singleton_factory<T, A, F>(&self, factory: F) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            ServiceKey::of::<T>(),
            Lifetime::Singleton,
            None,
            factory.into_factory(),
        ))
    }

    /// Registers a provider cached once per instance of the given scope
    /// level.
    pub fn add_scoped_factory<T, A, F>(&self, scope: impl ScopeLevel, factory: F) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            ServiceKey::of::<T>(),
            Lifetime::Scoped,
            Some(scope.data()),
            factory.into_factory(),
        ))
    }

    /// Registers a provider built fresh on every resolution.
    pub fn add_transient_factory<T, A, F>(&self, factory: F) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            ServiceKey::of::<T>(),
            Lifetime::Transient,
            None,
            factory.into_factory(),
        ))
    }

    pub fn add_named_singleton_factory<T, A, F>(
        &self,
        label: &'static str,
        factory: F,
    ) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            ServiceKey::named::<T>(label),
            Lifetime::Singleton,
            None,
            factory.into_factory(),
        ))
    }

    pub fn add_named_scoped_factory<T, A, F>(
        &self,
        label: &'static str,
        scope: impl ScopeLevel,
        factory: F,
    ) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            ServiceKey::named::<T>(label),
            Lifetime::Scoped,
            Some(scope.data()),
            factory.into_factory(),
        ))
    }

    pub fn add_named_transient_factory<T, A, F>(
        &self,
        label: &'static str,
        factory: F,
    ) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            ServiceKey::named::<T>(label),
            Lifetime::Transient,
            None,
            factory.into_factory(),
        ))
    }

    /// Registers a factory under an explicit key, for parameterized closed
    /// keys such as a specialization that should outrank a template.
    pub fn add_keyed_factory<T, A, F>(
        &self,
        key: ServiceKey,
        lifetime: Lifetime,
        factory: F,
    ) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            key,
            lifetime,
            None,
            factory.into_factory(),
        ))
    }

    pub fn add_keyed_scoped_factory<T, A, F>(
        &self,
        key: ServiceKey,
        scope: impl ScopeLevel,
        factory: F,
    ) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            key,
            Lifetime::Scoped,
            Some(scope.data()),
            factory.into_factory(),
        ))
    }

    // ----- Async factories -----

    /// Registers a singleton built by an asynchronous factory. The provider
    /// and everything depending on it become async-only subgraphs.
    pub fn add_singleton_async<T, A, F>(&self, factory: F) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoAsyncFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            ServiceKey::of::<T>(),
            Lifetime::Singleton,
            None,
            factory.into_async_factory(),
        ))
    }

    pub fn add_scoped_async<T, A, F>(&self, scope: impl ScopeLevel, factory: F) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoAsyncFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            ServiceKey::of::<T>(),
            Lifetime::Scoped,
            Some(scope.data()),
            factory.into_async_factory(),
        ))
    }

    pub fn add_transient_async<T, A, F>(&self, factory: F) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoAsyncFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            ServiceKey::of::<T>(),
            Lifetime::Transient,
            None,
            factory.into_async_factory(),
        ))
    }

    // ----- Resource factories -----

    /// Registers a singleton that acquires a resource: the factory returns
    /// `(value, cleanup)` and the cleanup runs when the container closes.
    pub fn add_singleton_resource<T, A, F>(&self, factory: F) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoResourceFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            ServiceKey::of::<T>(),
            Lifetime::Singleton,
            None,
            factory.into_resource_factory(),
        ))
    }

    /// Registers a scope-bound resource: `(value, cleanup)`, cleanup running
    /// when the owning scope instance exits.
    pub fn add_scoped_resource<T, A, F>(&self, scope: impl ScopeLevel, factory: F) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoResourceFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            ServiceKey::of::<T>(),
            Lifetime::Scoped,
            Some(scope.data()),
            factory.into_resource_factory(),
        ))
    }

    /// Async variant of [`add_singleton_resource`](Self::add_singleton_resource):
    /// the factory and the cleanup are both asynchronous.
    pub fn add_singleton_async_resource<T, A, F>(&self, factory: F) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoAsyncResourceFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            ServiceKey::of::<T>(),
            Lifetime::Singleton,
            None,
            factory.into_async_resource_factory(),
        ))
    }

    pub fn add_scoped_async_resource<T, A, F>(
        &self,
        scope: impl ScopeLevel,
        factory: F,
    ) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: IntoAsyncResourceFactory<T, A>,
    {
        self.register(ProviderSpec::from_parts(
            ServiceKey::of::<T>(),
            Lifetime::Scoped,
            Some(scope.data()),
            factory.into_async_resource_factory(),
        ))
    }

    // ----- Context values -----

    /// Registers `T` as a value read from the scope context chain: the
    /// entering caller supplies it via
    /// [`Context`](crate::Context), and providers at or below `scope` can
    /// depend on it.
    pub fn add_context_value<T: Send + Sync + 'static>(
        &self,
        scope: impl ScopeLevel,
    ) -> DiResult<()> {
        self.register(ProviderSpec::context(ServiceKey::of::<T>(), scope.data()))
    }

    /// Labeled variant of [`add_context_value`](Self::add_context_value).
    pub fn add_named_context_value<T: Send + Sync + 'static>(
        &self,
        label: &'static str,
        scope: impl ScopeLevel,
    ) -> DiResult<()> {
        self.register(ProviderSpec::context(
            ServiceKey::named::<T>(label),
            scope.data(),
        ))
    }

    // ----- Open templates -----

    /// Registers an open-generic template. The key must contain at least
    /// one type variable; the factory receives the bindings produced by the
    /// match and must return a value matching the closed request.
    pub fn add_template<F>(&self, key: ServiceKey, lifetime: Lifetime, factory: F) -> DiResult<()>
    where
        F: for<'a> Fn(&ResolverContext<'a>, &Bindings) -> DiResult<AnyArc> + Send + Sync + 'static,
    {
        if !key.is_template() {
            return Err(DiError::InvalidRegistration {
                key,
                detail: "template keys must contain at least one type variable",
            });
        }
        if lifetime == Lifetime::Scoped {
            return Err(DiError::InvalidRegistration {
                key,
                detail: "scoped templates go through add_scoped_template",
            });
        }
        // Template factories resolve their dependencies dynamically through
        // the context; the runtime stack still guards cycles.
        self.register(ProviderSpec::sync_factory(key, lifetime, factory).no_deps())
    }

    /// Registers a scope-bound open-generic template.
    pub fn add_scoped_template<F>(
        &self,
        key: ServiceKey,
        scope: impl ScopeLevel,
        factory: F,
    ) -> DiResult<()>
    where
        F: for<'a> Fn(&ResolverContext<'a>, &Bindings) -> DiResult<AnyArc> + Send + Sync + 'static,
    {
        if !key.is_template() {
            return Err(DiError::InvalidRegistration {
                key,
                detail: "template keys must contain at least one type variable",
            });
        }
        self.register(
            ProviderSpec::sync_factory(key, Lifetime::Scoped, factory)
                .in_scope(scope)
                .no_deps(),
        )
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a value for type-erased provider surfaces (template factories,
/// context entries).
pub fn boxed<T: Send + Sync + 'static>(value: T) -> AnyArc {
    Arc::new(value)
}
