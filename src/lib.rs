//! # wirebox
//!
//! Scope-aware dependency resolution for Rust: a provider registry, a
//! structural matcher for parameterized request keys, a resolution compiler
//! producing a cached executable assembly, and a scope/lifetime/cleanup
//! runtime safe under threads and concurrent async tasks.
//!
//! ## Features
//!
//! - **Three lifetimes**: transient, container-wide singleton, scope-bound
//! - **Scope hierarchy**: ordered levels (runtime → app → session → request
//!   → action → step) with skippable levels and per-scope context values
//! - **Open generics**: templates over type-variable trees, matched
//!   structurally with closed overrides always winning
//! - **Compiled assemblies**: one resolve step per slot, topologically
//!   ordered, cached until a registration invalidates it
//! - **Asynchrony as a compile-time fact**: the sync entry point rejects
//!   async subgraphs instead of blocking
//! - **Deterministic teardown**: per-scope LIFO cleanup, pushed on
//!   acquisition, drained on close
//! - **Cycle detection**: per-call resolution stacks with deferred handles
//!   as the sanctioned escape
//!
//! ## Quick Start
//!
//! ```rust
//! use wirebox::{ProviderRegistry, DefaultScope, Inject, Resolver};
//! use std::sync::Arc;
//!
//! struct Database {
//!     connection_string: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let registry = ProviderRegistry::new();
//! registry
//!     .add_singleton(Database {
//!         connection_string: "postgres://localhost".to_string(),
//!     })
//!     .unwrap();
//! registry
//!     .add_scoped_factory::<UserService, _, _>(
//!         DefaultScope::Request,
//!         |Inject(db): Inject<Database>| UserService { db },
//!     )
//!     .unwrap();
//!
//! let container = registry.container().unwrap();
//! let request = container.enter_scope().unwrap();
//! let users = request.get::<UserService>().unwrap();
//! assert_eq!(users.db.connection_string, "postgres://localhost");
//! request.close().unwrap();
//! ```
//!
//! ## Lifetimes and scopes
//!
//! Singletons live in the container's root instance and are torn down only
//! by [`Container::close`]/[`Container::aclose`]. Scoped providers live in
//! the first instance at their declared level, walking up from the
//! requesting scope; resolving one from a shallower chain is a
//! [`DiError::ScopeMismatch`], never a silent second instance.
//!
//! ## Async resolution
//!
//! Factories may be async; asynchrony propagates transitively at compile
//! time. `get` on an async subgraph fails immediately with
//! [`DiError::AsyncFromSync`]; `get_async` awaits it.
//!
//! ```rust
//! use wirebox::{ProviderRegistry, Resolver};
//!
//! struct Remote(u32);
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let registry = ProviderRegistry::new();
//! registry
//!     .add_singleton_async::<Remote, _, _>(|| async { Remote(7) })
//!     .unwrap();
//! let container = registry.container().unwrap();
//!
//! assert!(container.get::<Remote>().is_err());
//! let remote = container.get_async::<Remote>().await.unwrap();
//! assert_eq!(remote.0, 7);
//! # });
//! ```

use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future used across the async surfaces.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod compiler;
pub mod error;
pub mod generics;
pub mod inject;
pub mod key;
pub mod lifetime;
pub mod registry;
pub mod runtime;
pub mod scope;
pub mod traits;

pub use compiler::{CompiledAssembly, StepInfo};
pub use error::{DiError, DiResult};
pub use generics::Bindings;
pub use inject::{
    FromResolver, Inject, InjectOpt, IntoAsyncFactory, IntoAsyncResource,
    IntoAsyncResourceFactory, IntoFactory, IntoProvided, IntoResource, IntoResourceFactory,
    WireTarget, WiredFn,
};
pub use key::{
    concrete, parameterized, var, var_in, GenericArg, ParamShape, ServiceKey, TypeKey, TypeVar,
};
pub use lifetime::{Lifetime, LockMode};
pub use registry::{
    boxed, DepKind, DependencySlot, FactoryParts, ProviderDescriptor, ProviderRegistry,
    ProviderSpec,
};
pub use runtime::{
    AsyncResolverContext, Container, Deferred, ResolutionStack, ResolverContext, Scope,
};
pub use scope::{AnyArc, Context, DefaultScope, ScopeData, ScopeHierarchy, ScopeLevel};
pub use traits::{AsyncDispose, Dispose, Resolver, ResolverCore};
