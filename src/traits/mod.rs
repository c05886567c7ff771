//! Core traits for the dependency-resolution runtime.

mod dispose;
pub(crate) mod resolver;

pub use dispose::{AsyncDispose, Dispose};
pub use resolver::{Resolver, ResolverCore};
