//! Request identity: base type, component label, and generic-argument trees.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// Identity of a single Rust type, usable inside key and argument trees.
///
/// Equality and hashing go through the `TypeId` only. The type name is
/// carried for diagnostics and never participates in identity, so two
/// requests that differ only in attached naming noise can never produce
/// distinct keys.
///
/// # Examples
///
/// ```rust
/// use wirebox::TypeKey;
///
/// let a = TypeKey::of::<u32>();
/// let b = TypeKey::of::<u32>();
/// assert_eq!(a, b);
/// assert!(a.name().contains("u32"));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Creates the key for a concrete type.
    #[inline(always)]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying `TypeId`.
    #[inline(always)]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The full type name, for display only.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name, used in error messages.
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl PartialEq for TypeKey {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl PartialOrd for TypeKey {
    #[inline(always)]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeKey {
    #[inline(always)]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl std::hash::Hash for TypeKey {
    #[inline(always)]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// A type parameter appearing in an open template, optionally restricted to
/// an enumerated set of concrete substitutions.
///
/// Identity is the variable name; the constraint set is declaration metadata
/// checked during matching, not part of identity.
#[derive(Clone, Debug)]
pub struct TypeVar {
    name: &'static str,
    allowed: Option<Arc<[TypeKey]>>,
}

impl TypeVar {
    /// An unconstrained type variable.
    pub fn new(name: &'static str) -> Self {
        Self { name, allowed: None }
    }

    /// A type variable restricted to the given concrete substitutions.
    pub fn restricted(name: &'static str, allowed: Vec<TypeKey>) -> Self {
        Self {
            name,
            allowed: Some(allowed.into()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether `candidate` is an admissible concrete substitution.
    pub fn admits(&self, candidate: &TypeKey) -> bool {
        match &self.allowed {
            Some(set) => set.contains(candidate),
            None => true,
        }
    }

    /// Whether this variable carries a constraint set at all. Constrained
    /// variables only admit concrete substitutions.
    pub fn is_restricted(&self) -> bool {
        self.allowed.is_some()
    }
}

impl PartialEq for TypeVar {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TypeVar {}

impl std::hash::Hash for TypeVar {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// One position in a generic-argument tree.
///
/// A tagged representation replaces runtime generic introspection: a request
/// for `Repo<Vec<i32>>` is written as a `Parameterized` node over a
/// `Concrete` leaf, and an open template for `Repo<T>` carries a `Var` in
/// the same position.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GenericArg {
    /// A fully closed type.
    Concrete(TypeKey),
    /// An unbound template parameter. Only valid inside templates.
    Var(TypeVar),
    /// A nested parameterized shape, e.g. the `Vec<U>` in `Repo<Vec<U>>`.
    Parameterized(ParamShape),
}

impl GenericArg {
    /// True when no variable appears anywhere below this node.
    pub fn is_closed(&self) -> bool {
        match self {
            GenericArg::Concrete(_) => true,
            GenericArg::Var(_) => false,
            GenericArg::Parameterized(p) => p.args.iter().all(GenericArg::is_closed),
        }
    }
}

/// Base type plus arguments for a nested parameterized node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParamShape {
    pub base: TypeKey,
    pub args: Vec<GenericArg>,
}

/// Builds a closed argument for a concrete type.
pub fn concrete<T: ?Sized + 'static>() -> GenericArg {
    GenericArg::Concrete(TypeKey::of::<T>())
}

/// Builds an unconstrained template variable.
pub fn var(name: &'static str) -> GenericArg {
    GenericArg::Var(TypeVar::new(name))
}

/// Builds a template variable restricted to an enumerated substitution set.
pub fn var_in(name: &'static str, allowed: Vec<TypeKey>) -> GenericArg {
    GenericArg::Var(TypeVar::restricted(name, allowed))
}

/// Builds a nested parameterized argument.
pub fn parameterized(base: TypeKey, args: Vec<GenericArg>) -> GenericArg {
    GenericArg::Parameterized(ParamShape { base, args })
}

/// Canonical identity of a requested dependency.
///
/// A key is a base type, an optional component label distinguishing several
/// providers of the same base, and an ordered generic-argument tree. Keys
/// are immutable once built and compare positionally and recursively; they
/// are used both as registry map keys and as resolution-stack entries for
/// cycle detection.
///
/// # Examples
///
/// ```rust
/// use wirebox::{ServiceKey, concrete};
///
/// struct Repo;
///
/// let plain = ServiceKey::of::<Repo>();
/// let named = ServiceKey::named::<Repo>("replica");
/// let closed = ServiceKey::of::<Repo>().with_args(vec![concrete::<i32>()]);
///
/// assert_ne!(plain, named);
/// assert_ne!(plain, closed);
/// assert!(closed.is_closed());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    base: TypeKey,
    label: Option<&'static str>,
    args: Vec<GenericArg>,
}

impl ServiceKey {
    /// Key for a plain concrete type.
    #[inline(always)]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            base: TypeKey::of::<T>(),
            label: None,
            args: Vec::new(),
        }
    }

    /// Key for a labeled component of a base type.
    pub fn named<T: ?Sized + 'static>(label: &'static str) -> Self {
        Self {
            base: TypeKey::of::<T>(),
            label: Some(label),
            args: Vec::new(),
        }
    }

    /// Key built from an explicit base, for template machinery.
    pub fn from_base(base: TypeKey) -> Self {
        Self {
            base,
            label: None,
            args: Vec::new(),
        }
    }

    /// Returns this key with the given component label.
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    /// Returns this key with the given generic arguments.
    pub fn with_args(mut self, args: Vec<GenericArg>) -> Self {
        self.args = args;
        self
    }

    pub fn base(&self) -> TypeKey {
        self.base
    }

    pub fn label(&self) -> Option<&'static str> {
        self.label
    }

    pub fn args(&self) -> &[GenericArg] {
        &self.args
    }

    /// True when no type variable appears anywhere in the argument tree.
    /// Only closed keys may be requested.
    pub fn is_closed(&self) -> bool {
        self.args.iter().all(GenericArg::is_closed)
    }

    /// True for open-template keys (at least one variable).
    pub fn is_template(&self) -> bool {
        !self.is_closed()
    }
}

fn fmt_arg(arg: &GenericArg, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match arg {
        GenericArg::Concrete(t) => write!(f, "{}", t),
        GenericArg::Var(v) => write!(f, "${}", v.name()),
        GenericArg::Parameterized(p) => {
            write!(f, "{}<", p.base)?;
            for (i, a) in p.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                fmt_arg(a, f)?;
            }
            f.write_str(">")
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        if !self.args.is_empty() {
            f.write_str("<")?;
            for (i, a) in self.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                fmt_arg(a, f)?;
            }
            f.write_str(">")?;
        }
        if let Some(label) = self.label {
            write!(f, "@{}", label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of<T: Hash>(v: &T) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn type_key_identity_ignores_name() {
        let a = TypeKey::of::<String>();
        let b = TypeKey::of::<String>();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn labels_create_distinct_identities() {
        struct Db;
        let plain = ServiceKey::of::<Db>();
        let primary = ServiceKey::named::<Db>("primary");
        let replica = ServiceKey::named::<Db>("replica");
        assert_ne!(plain, primary);
        assert_ne!(primary, replica);
        assert_eq!(primary, ServiceKey::named::<Db>("primary"));
    }

    #[test]
    fn args_compare_positionally_and_recursively() {
        struct Repo;
        struct List;
        let a = ServiceKey::of::<Repo>().with_args(vec![parameterized(
            TypeKey::of::<List>(),
            vec![concrete::<i32>()],
        )]);
        let b = ServiceKey::of::<Repo>().with_args(vec![parameterized(
            TypeKey::of::<List>(),
            vec![concrete::<i32>()],
        )]);
        let c = ServiceKey::of::<Repo>().with_args(vec![parameterized(
            TypeKey::of::<List>(),
            vec![concrete::<u64>()],
        )]);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);
    }

    #[test]
    fn closedness() {
        struct Repo;
        let open = ServiceKey::of::<Repo>().with_args(vec![var("T")]);
        let closed = ServiceKey::of::<Repo>().with_args(vec![concrete::<i32>()]);
        assert!(open.is_template());
        assert!(closed.is_closed());
    }

    #[test]
    fn restricted_var_admits_only_listed_types() {
        let v = TypeVar::restricted("T", vec![TypeKey::of::<i32>(), TypeKey::of::<u64>()]);
        assert!(v.admits(&TypeKey::of::<i32>()));
        assert!(!v.admits(&TypeKey::of::<String>()));
    }

    #[test]
    fn display_is_readable() {
        struct Repo;
        struct List;
        let key = ServiceKey::of::<Repo>()
            .with_args(vec![parameterized(TypeKey::of::<List>(), vec![var("U")])])
            .with_label("cold");
        let text = format!("{}", key);
        assert!(text.contains("Repo<List<$U>>@cold"), "got: {}", text);
    }
}
