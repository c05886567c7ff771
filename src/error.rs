//! Error types for the dependency-resolution runtime.

use std::fmt;

use crate::key::ServiceKey;

/// Resolution and registration errors.
///
/// Every variant carries the offending key and, where relevant, the declared
/// and current scope names, so misconfiguration is diagnosable from the
/// message alone.
///
/// # Examples
///
/// ```rust
/// use wirebox::{ProviderRegistry, DiError, Resolver};
///
/// struct Missing;
///
/// let registry = ProviderRegistry::new();
/// let container = registry.container().unwrap();
/// match container.get::<Missing>() {
///     Err(DiError::NotRegistered { key }) => {
///         assert!(key.to_string().contains("Missing"));
///     }
///     other => panic!("expected NotRegistered, got {:?}", other.map(|_| ())),
/// }
/// ```
#[derive(Debug, Clone)]
pub enum DiError {
    /// No provider registered for the key.
    NotRegistered { key: ServiceKey },
    /// A resolved value failed to downcast to the requested type.
    TypeMismatch { key: ServiceKey },
    /// An undeferred dependency cycle was detected on the resolution stack.
    Circular { path: Vec<ServiceKey> },
    /// A scope-bound provider was resolved from an incompatible scope chain.
    ScopeMismatch {
        key: ServiceKey,
        declared: &'static str,
        current: &'static str,
    },
    /// The synchronous entry point hit an asynchronous subgraph.
    AsyncFromSync { key: ServiceKey },
    /// A type-variable constraint was violated or the generic request was
    /// malformed.
    InvalidGenericArgument { key: ServiceKey, detail: String },
    /// A registration call was rejected (missing scope, closed template,
    /// malformed key).
    InvalidRegistration {
        key: ServiceKey,
        detail: &'static str,
    },
    /// The provider set is inconsistent with the scope hierarchy; raised by
    /// the compiler before any step is produced, or by scope entry.
    InvalidProviderSpec { detail: String },
    /// A type-erased factory was registered without a dependency list and
    /// without opting out of one.
    DependencyInference { type_name: &'static str },
    /// A deferred handle was invoked after its backing scope was released.
    ResolverNotSet { key: ServiceKey },
    /// Maximum resolution depth exceeded.
    DepthExceeded(usize),
}

impl fmt::Display for DiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiError::NotRegistered { key } => {
                write!(f, "No provider registered for {}", key)
            }
            DiError::TypeMismatch { key } => {
                write!(f, "Type mismatch resolving {}", key)
            }
            DiError::Circular { path } => {
                write!(f, "Circular dependency: ")?;
                for (i, k) in path.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" -> ")?;
                    }
                    write!(f, "{}", k)?;
                }
                Ok(())
            }
            DiError::ScopeMismatch {
                key,
                declared,
                current,
            } => write!(
                f,
                "{} is bound to scope '{}' but was resolved from scope '{}'",
                key, declared, current
            ),
            DiError::AsyncFromSync { key } => write!(
                f,
                "{} requires an asynchronous subgraph; use the async entry point",
                key
            ),
            DiError::InvalidGenericArgument { key, detail } => {
                write!(f, "Invalid generic argument for {}: {}", key, detail)
            }
            DiError::InvalidRegistration { key, detail } => {
                write!(f, "Invalid registration for {}: {}", key, detail)
            }
            DiError::InvalidProviderSpec { detail } => {
                write!(f, "Invalid provider specification: {}", detail)
            }
            DiError::DependencyInference { type_name } => write!(
                f,
                "Cannot infer dependencies for factory producing {}; \
                 supply an explicit dependency list or mark it dependency-free",
                type_name
            ),
            DiError::ResolverNotSet { key } => write!(
                f,
                "Deferred handle for {} invoked after its scope was released",
                key
            ),
            DiError::DepthExceeded(depth) => write!(f, "Max resolution depth {} exceeded", depth),
        }
    }
}

impl std::error::Error for DiError {}

/// Result type for container operations.
pub type DiResult<T> = Result<T, DiError>;
