//! Disposal traits for resource teardown.

/// Trait for synchronous resource teardown.
///
/// Implement this for values that need structured cleanup (flushing caches,
/// closing connections). Registered through
/// [`ResolverContext::register_disposer`](crate::ResolverContext::register_disposer),
/// hooks run in reverse acquisition order when the owning scope closes.
///
/// # Examples
///
/// ```rust
/// use wirebox::{Dispose, ProviderRegistry, DefaultScope};
///
/// struct Cache {
///     name: &'static str,
/// }
///
/// impl Dispose for Cache {
///     fn dispose(&self) {
///         println!("flushing {}", self.name);
///     }
/// }
///
/// let registry = ProviderRegistry::new();
/// registry
///     .add_scoped_resource::<Cache, _, _>(DefaultScope::Request, || {
///         let cache = Cache { name: "user_cache" };
///         (cache, || println!("released"))
///     })
///     .unwrap();
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Perform synchronous cleanup of resources.
    fn dispose(&self);
}

/// Trait for asynchronous resource teardown.
///
/// Implement this for values requiring async cleanup (graceful connection
/// shutdown, async I/O). Scopes holding async teardown must be closed with
/// the async close path.
///
/// # Examples
///
/// ```rust
/// use wirebox::AsyncDispose;
/// use async_trait::async_trait;
///
/// struct DbClient {
///     connection_id: u64,
/// }
///
/// #[async_trait]
/// impl AsyncDispose for DbClient {
///     async fn dispose(&self) {
///         println!("closing connection {}", self.connection_id);
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait AsyncDispose: Send + Sync + 'static {
    /// Perform asynchronous cleanup of resources.
    async fn dispose(&self);
}
