//! Extractor markers, factory dependency inference, and wired callables.
//!
//! Typed factories declare their dependency slots through their parameter
//! types: `Inject<T>` for a required dependency, `InjectOpt<T>` for an
//! optional one, `Deferred<T>` for a cycle-breaking handle. The registration
//! surface reads the slots off the closure signature, so the compiler can
//! order, cycle-check, and propagate asynchrony without ever calling the
//! factory.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::{smallvec, SmallVec};

use crate::compiler::compiled;
use crate::error::{DiError, DiResult};
use crate::generics::Bindings;
use crate::key::ServiceKey;
use crate::registry::{
    AsyncFactoryFn, DependencySlot, Factory, FactoryParts, SyncFactoryFn,
};
use crate::runtime::{
    AsyncResolverContext, Container, Deferred, ResolutionStack, ResolverContext, Scope,
};
use crate::scope::{AnyArc, Context};
use crate::BoxFuture;

/// Required dependency marker: the wrapped value is resolved from the
/// container before the factory runs.
pub struct Inject<T: Send + Sync + 'static>(pub Arc<T>);

/// Optional dependency marker: `None` when no provider is registered.
pub struct InjectOpt<T: Send + Sync + 'static>(pub Option<Arc<T>>);

/// A factory or callable parameter fillable from the container.
pub trait FromResolver: Sized + Send + 'static {
    /// The dependency slot this parameter contributes to its provider.
    fn dependency() -> DependencySlot;

    fn extract(ctx: &ResolverContext<'_>) -> DiResult<Self>;

    fn extract_async<'a>(ctx: &'a AsyncResolverContext) -> BoxFuture<'a, DiResult<Self>>;

    /// Builds the parameter from a caller-supplied override value, when the
    /// parameter kind supports overriding.
    fn from_override(value: AnyArc) -> Option<Self> {
        let _ = value;
        None
    }
}

impl<T: Send + Sync + 'static> FromResolver for Inject<T> {
    fn dependency() -> DependencySlot {
        DependencySlot::direct(ServiceKey::of::<T>())
    }

    fn extract(ctx: &ResolverContext<'_>) -> DiResult<Self> {
        Ok(Inject(ctx.get::<T>()?))
    }

    fn extract_async<'a>(ctx: &'a AsyncResolverContext) -> BoxFuture<'a, DiResult<Self>> {
        Box::pin(async move { Ok(Inject(ctx.get::<T>().await?)) })
    }

    fn from_override(value: AnyArc) -> Option<Self> {
        value.downcast::<T>().ok().map(Inject)
    }
}

impl<T: Send + Sync + 'static> FromResolver for InjectOpt<T> {
    fn dependency() -> DependencySlot {
        DependencySlot::optional(ServiceKey::of::<T>())
    }

    fn extract(ctx: &ResolverContext<'_>) -> DiResult<Self> {
        Ok(InjectOpt(ctx.try_get::<T>()?))
    }

    fn extract_async<'a>(ctx: &'a AsyncResolverContext) -> BoxFuture<'a, DiResult<Self>> {
        Box::pin(async move { Ok(InjectOpt(ctx.try_get::<T>().await?)) })
    }

    fn from_override(value: AnyArc) -> Option<Self> {
        value.downcast::<T>().ok().map(|v| InjectOpt(Some(v)))
    }
}

impl<T: Send + Sync + 'static> FromResolver for Deferred<T> {
    fn dependency() -> DependencySlot {
        DependencySlot::deferred(ServiceKey::of::<T>())
    }

    fn extract(ctx: &ResolverContext<'_>) -> DiResult<Self> {
        Ok(ctx.deferred::<T>())
    }

    fn extract_async<'a>(ctx: &'a AsyncResolverContext) -> BoxFuture<'a, DiResult<Self>> {
        Box::pin(async move { Ok(ctx.deferred::<T>()) })
    }
}

/// Factory return values: either the value itself or a `DiResult` of it.
pub trait IntoProvided<T> {
    fn into_provided(self) -> DiResult<T>;
}

impl<T> IntoProvided<T> for T {
    fn into_provided(self) -> DiResult<T> {
        Ok(self)
    }
}

impl<T> IntoProvided<T> for DiResult<T> {
    fn into_provided(self) -> DiResult<T> {
        self
    }
}

/// Resource factory return values: `(value, cleanup)` or a `DiResult` of it.
pub trait IntoResource<T> {
    fn into_resource(self) -> DiResult<(T, Box<dyn FnOnce() + Send + 'static>)>;
}

impl<T, C> IntoResource<T> for (T, C)
where
    C: FnOnce() + Send + 'static,
{
    fn into_resource(self) -> DiResult<(T, Box<dyn FnOnce() + Send + 'static>)> {
        Ok((self.0, Box::new(self.1)))
    }
}

impl<T, C> IntoResource<T> for DiResult<(T, C)>
where
    C: FnOnce() + Send + 'static,
{
    fn into_resource(self) -> DiResult<(T, Box<dyn FnOnce() + Send + 'static>)> {
        self.map(|(value, cleanup)| (value, Box::new(cleanup) as Box<dyn FnOnce() + Send>))
    }
}

type BoxAsyncCleanup = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send + 'static>;

/// Async resource factory return values.
pub trait IntoAsyncResource<T> {
    fn into_async_resource(self) -> DiResult<(T, BoxAsyncCleanup)>;
}

impl<T, C, CF> IntoAsyncResource<T> for (T, C)
where
    C: FnOnce() -> CF + Send + 'static,
    CF: Future<Output = ()> + Send + 'static,
{
    fn into_async_resource(self) -> DiResult<(T, BoxAsyncCleanup)> {
        let (value, cleanup) = self;
        Ok((
            value,
            Box::new(move || Box::pin(cleanup()) as BoxFuture<'static, ()>),
        ))
    }
}

impl<T, C, CF> IntoAsyncResource<T> for DiResult<(T, C)>
where
    C: FnOnce() -> CF + Send + 'static,
    CF: Future<Output = ()> + Send + 'static,
{
    fn into_async_resource(self) -> DiResult<(T, BoxAsyncCleanup)> {
        let (value, cleanup) = self?;
        Ok((
            value,
            Box::new(move || Box::pin(cleanup()) as BoxFuture<'static, ()>),
        ))
    }
}

/// Closures convertible into a synchronous provider factory with inferred
/// dependency slots.
pub trait IntoFactory<T, Args> {
    fn into_factory(self) -> FactoryParts;
}

/// Closures convertible into an asynchronous provider factory.
pub trait IntoAsyncFactory<T, Args> {
    fn into_async_factory(self) -> FactoryParts;
}

/// Closures convertible into a resource-acquiring factory: the returned
/// cleanup is pushed onto the owning scope immediately on acquisition.
pub trait IntoResourceFactory<T, Args> {
    fn into_resource_factory(self) -> FactoryParts;
}

/// Async variant of [`IntoResourceFactory`].
pub trait IntoAsyncResourceFactory<T, Args> {
    fn into_async_resource_factory(self) -> FactoryParts;
}

macro_rules! impl_factories {
    ($($P:ident),*) => {
        #[allow(non_snake_case, unused_variables)]
        impl<T, F, R, $($P),*> IntoFactory<T, ($($P,)*)> for F
        where
            T: Send + Sync + 'static,
            F: Fn($($P),*) -> R + Send + Sync + 'static,
            R: IntoProvided<T> + 'static,
            $($P: FromResolver,)*
        {
            fn into_factory(self) -> FactoryParts {
                let deps: SmallVec<[DependencySlot; 4]> =
                    smallvec![$(<$P as FromResolver>::dependency()),*];
                let f = Arc::new(self);
                let sync_shim: SyncFactoryFn = {
                    let f = f.clone();
                    Arc::new(
                        move |ctx: &ResolverContext<'_>, _bindings: &Bindings| -> DiResult<AnyArc> {
                            $(let $P = <$P as FromResolver>::extract(ctx)?;)*
                            let value = (f)($($P),*).into_provided()?;
                            Ok(Arc::new(value) as AnyArc)
                        },
                    )
                };
                let async_shim: AsyncFactoryFn = Arc::new(
                    move |ctx: AsyncResolverContext, _bindings: Bindings| {
                        let f = f.clone();
                        Box::pin(async move {
                            $(let $P = <$P as FromResolver>::extract_async(&ctx).await?;)*
                            let value = (f)($($P),*).into_provided()?;
                            Ok(Arc::new(value) as AnyArc)
                        }) as BoxFuture<'static, DiResult<AnyArc>>
                    },
                );
                FactoryParts {
                    factory: Factory::Hybrid(sync_shim, async_shim),
                    deps,
                    is_async: false,
                    needs_cleanup: false,
                }
            }
        }

        #[allow(non_snake_case, unused_variables)]
        impl<T, F, Fut, R, $($P),*> IntoAsyncFactory<T, ($($P,)*)> for F
        where
            T: Send + Sync + 'static,
            F: Fn($($P),*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoProvided<T> + 'static,
            $($P: FromResolver,)*
        {
            fn into_async_factory(self) -> FactoryParts {
                let deps: SmallVec<[DependencySlot; 4]> =
                    smallvec![$(<$P as FromResolver>::dependency()),*];
                let factory: AsyncFactoryFn = Arc::new(
                    move |ctx: AsyncResolverContext, _bindings: Bindings| {
                        let f = self.clone();
                        Box::pin(async move {
                            $(let $P = <$P as FromResolver>::extract_async(&ctx).await?;)*
                            let value = f($($P),*).await.into_provided()?;
                            Ok(Arc::new(value) as AnyArc)
                        }) as BoxFuture<'static, DiResult<AnyArc>>
                    },
                );
                FactoryParts {
                    factory: Factory::Async(factory),
                    deps,
                    is_async: true,
                    needs_cleanup: false,
                }
            }
        }

        #[allow(non_snake_case, unused_variables)]
        impl<T, F, R, $($P),*> IntoResourceFactory<T, ($($P,)*)> for F
        where
            T: Send + Sync + 'static,
            F: Fn($($P),*) -> R + Send + Sync + 'static,
            R: IntoResource<T> + 'static,
            $($P: FromResolver,)*
        {
            fn into_resource_factory(self) -> FactoryParts {
                let deps: SmallVec<[DependencySlot; 4]> =
                    smallvec![$(<$P as FromResolver>::dependency()),*];
                let f = Arc::new(self);
                let sync_shim: SyncFactoryFn = {
                    let f = f.clone();
                    Arc::new(
                        move |ctx: &ResolverContext<'_>, _bindings: &Bindings| -> DiResult<AnyArc> {
                            $(let $P = <$P as FromResolver>::extract(ctx)?;)*
                            let (value, cleanup) = (f)($($P),*).into_resource()?;
                            ctx.on_cleanup(cleanup);
                            Ok(Arc::new(value) as AnyArc)
                        },
                    )
                };
                let async_shim: AsyncFactoryFn = Arc::new(
                    move |ctx: AsyncResolverContext, _bindings: Bindings| {
                        let f = f.clone();
                        Box::pin(async move {
                            $(let $P = <$P as FromResolver>::extract_async(&ctx).await?;)*
                            let (value, cleanup) = (f)($($P),*).into_resource()?;
                            ctx.on_cleanup(cleanup);
                            Ok(Arc::new(value) as AnyArc)
                        }) as BoxFuture<'static, DiResult<AnyArc>>
                    },
                );
                FactoryParts {
                    factory: Factory::Hybrid(sync_shim, async_shim),
                    deps,
                    is_async: false,
                    needs_cleanup: true,
                }
            }
        }

        #[allow(non_snake_case, unused_variables)]
        impl<T, F, Fut, R, $($P),*> IntoAsyncResourceFactory<T, ($($P,)*)> for F
        where
            T: Send + Sync + 'static,
            F: Fn($($P),*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoAsyncResource<T> + 'static,
            $($P: FromResolver,)*
        {
            fn into_async_resource_factory(self) -> FactoryParts {
                let deps: SmallVec<[DependencySlot; 4]> =
                    smallvec![$(<$P as FromResolver>::dependency()),*];
                let factory: AsyncFactoryFn = Arc::new(
                    move |ctx: AsyncResolverContext, _bindings: Bindings| {
                        let f = self.clone();
                        Box::pin(async move {
                            $(let $P = <$P as FromResolver>::extract_async(&ctx).await?;)*
                            let (value, cleanup) = f($($P),*).await.into_async_resource()?;
                            ctx.on_async_cleanup(move || cleanup());
                            Ok(Arc::new(value) as AnyArc)
                        }) as BoxFuture<'static, DiResult<AnyArc>>
                    },
                );
                FactoryParts {
                    factory: Factory::Async(factory),
                    deps,
                    is_async: true,
                    needs_cleanup: true,
                }
            }
        }
    };
}

impl_factories!();
impl_factories!(P1);
impl_factories!(P1, P2);
impl_factories!(P1, P2, P3);
impl_factories!(P1, P2, P3, P4);

// ----- Wired callables -----

/// Marker key under which wired-call cleanup actions are tagged.
#[allow(dead_code)]
struct WiredCall;

/// A callable whose leading parameters are container-fillable extractors
/// and whose trailing parameters stay caller-supplied.
///
/// The split between injected (`I`) and caller (`A`) tuples is chosen by the
/// type parameters; spell them out with a turbofish when inference cannot
/// pick a unique split.
pub trait WireTarget<I, A, R>: Send + Sync {
    fn invoke(&self, scope: &Scope, overrides: &Context, args: A) -> DiResult<R>;
}

macro_rules! impl_wire_target {
    ([$($I:ident),*], [$($A:ident),*]) => {
        #[allow(non_snake_case, unused_variables)]
        impl<F, R, $($I,)* $($A,)*> WireTarget<($($I,)*), ($($A,)*), R> for F
        where
            F: Fn($($I,)* $($A),*) -> R + Send + Sync,
            $($I: FromResolver,)*
            $($A: Send,)*
        {
            fn invoke(
                &self,
                scope: &Scope,
                overrides: &Context,
                args: ($($A,)*),
            ) -> DiResult<R> {
                let assembly = compiled(&scope.inner.registry)?;
                let stack = Mutex::new(ResolutionStack::new());
                let call_key = ServiceKey::of::<WiredCall>();
                let ctx = ResolverContext::new(scope, &assembly, &stack, &call_key);
                $(
                    let $I = match overrides.get(&<$I as FromResolver>::dependency().key) {
                        Some(value) => <$I as FromResolver>::from_override(value)
                            .ok_or_else(|| DiError::TypeMismatch {
                                key: <$I as FromResolver>::dependency().key,
                            })?,
                        None => <$I as FromResolver>::extract(&ctx)?,
                    };
                )*
                let ($($A,)*) = args;
                Ok((self)($($I,)* $($A),*))
            }
        }
    };
}

impl_wire_target!([I1], []);
impl_wire_target!([I1], [A1]);
impl_wire_target!([I1], [A1, A2]);
impl_wire_target!([I1, I2], []);
impl_wire_target!([I1, I2], [A1]);
impl_wire_target!([I1, I2], [A1, A2]);
impl_wire_target!([I1, I2, I3], []);
impl_wire_target!([I1, I2, I3], [A1]);
impl_wire_target!([I1, I2, I3], [A1, A2]);

/// A callable bound to a scope with its injected parameters filled from the
/// container on every call. Caller-supplied parameters remain in the public
/// signature; per-call overrides shadow container resolution.
///
/// # Examples
///
/// ```rust
/// use wirebox::{ProviderRegistry, Inject};
///
/// struct Greeter { greeting: &'static str }
///
/// let registry = ProviderRegistry::new();
/// registry.add_singleton(Greeter { greeting: "hello" }).unwrap();
/// let container = registry.container().unwrap();
///
/// let wired = container
///     .wire::<_, (Inject<Greeter>,), (String,), String>(
///         |Inject(greeter): Inject<Greeter>, name: String| {
///             format!("{}, {}", greeter.greeting, name)
///         },
///     );
/// assert_eq!(wired.call(("world".into(),)).unwrap(), "hello, world");
///
/// // A per-call override shadows the container.
/// let shouty = wired.with_override(Greeter { greeting: "HEY" });
/// assert_eq!(shouty.call(("world".into(),)).unwrap(), "HEY, world");
/// ```
pub struct WiredFn<F, I, A, R> {
    scope: Scope,
    f: F,
    overrides: Context,
    _marker: PhantomData<fn(I, A) -> R>,
}

impl<F, I, A, R> WiredFn<F, I, A, R>
where
    F: WireTarget<I, A, R>,
{
    /// Supplies a value that shadows container resolution for the matching
    /// injected parameter on every call.
    pub fn with_override<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.overrides = self.overrides.with(value);
        self
    }

    /// Invokes the callable, filling injected parameters from overrides
    /// first, then the container.
    pub fn call(&self, args: A) -> DiResult<R> {
        self.f.invoke(&self.scope, &self.overrides, args)
    }
}

impl Scope {
    /// Wraps a callable so its extractor-typed leading parameters are filled
    /// from this scope on each call.
    pub fn wire<F, I, A, R>(&self, f: F) -> WiredFn<F, I, A, R>
    where
        F: WireTarget<I, A, R>,
    {
        WiredFn {
            scope: self.clone(),
            f,
            overrides: Context::new(),
            _marker: PhantomData,
        }
    }
}

impl Container {
    /// Wraps a callable against the container's root scope.
    pub fn wire<F, I, A, R>(&self, f: F) -> WiredFn<F, I, A, R>
    where
        F: WireTarget<I, A, R>,
    {
        self.root().wire(f)
    }
}
