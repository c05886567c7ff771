//! Scope hierarchy: ordered, optionally skippable levels, plus per-scope
//! context values inherited down the instance chain.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::key::ServiceKey;

/// Names that the runtime reserves for its own bindings; a hierarchy level
/// may not collide with them.
const RESERVED_NAMES: &[&str] = &["container", "context"];

/// One level of a scope hierarchy: a rank in a fixed total order, a name,
/// and whether entry may bypass it when descending from an ancestor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeData {
    pub name: &'static str,
    pub rank: u8,
    pub skippable: bool,
}

/// Anything that designates a hierarchy level: the built-in [`DefaultScope`]
/// enum or a raw [`ScopeData`] for custom hierarchies.
pub trait ScopeLevel {
    fn data(&self) -> ScopeData;
}

impl ScopeLevel for ScopeData {
    fn data(&self) -> ScopeData {
        *self
    }
}

/// The standard six-level hierarchy.
///
/// `Runtime` and `Session` are skippable: entering a scope from an ancestor
/// bypasses them unless they are targeted explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DefaultScope {
    Runtime,
    App,
    Session,
    Request,
    Action,
    Step,
}

impl DefaultScope {
    const ALL: [ScopeData; 6] = [
        ScopeData { name: "runtime", rank: 0, skippable: true },
        ScopeData { name: "app", rank: 1, skippable: false },
        ScopeData { name: "session", rank: 2, skippable: true },
        ScopeData { name: "request", rank: 3, skippable: false },
        ScopeData { name: "action", rank: 4, skippable: false },
        ScopeData { name: "step", rank: 5, skippable: false },
    ];
}

impl ScopeLevel for DefaultScope {
    fn data(&self) -> ScopeData {
        Self::ALL[*self as usize]
    }
}

/// A validated, strictly rank-ordered list of scope levels.
///
/// Construction fails fast on an inconsistent hierarchy: non-ascending or
/// duplicate ranks, duplicate or empty names, reserved-name collisions, or a
/// hierarchy with no enterable (non-skippable) level.
///
/// # Examples
///
/// ```rust
/// use wirebox::{ScopeHierarchy, ScopeData};
///
/// let custom = ScopeHierarchy::new(vec![
///     ScopeData { name: "process", rank: 0, skippable: false },
///     ScopeData { name: "job", rank: 1, skippable: false },
/// ])
/// .unwrap();
/// assert_eq!(custom.root_level().name, "process");
/// ```
#[derive(Clone, Debug)]
pub struct ScopeHierarchy {
    levels: Arc<[ScopeData]>,
}

impl ScopeHierarchy {
    pub fn new(levels: Vec<ScopeData>) -> DiResult<Self> {
        if levels.is_empty() {
            return Err(DiError::InvalidProviderSpec {
                detail: "scope hierarchy must contain at least one level".into(),
            });
        }
        let mut last_rank: Option<u8> = None;
        for level in &levels {
            if level.name.is_empty() {
                return Err(DiError::InvalidProviderSpec {
                    detail: "scope level name must not be empty".into(),
                });
            }
            if RESERVED_NAMES.contains(&level.name) {
                return Err(DiError::InvalidProviderSpec {
                    detail: format!("scope level name '{}' is reserved", level.name),
                });
            }
            if levels.iter().filter(|l| l.name == level.name).count() > 1 {
                return Err(DiError::InvalidProviderSpec {
                    detail: format!("duplicate scope level name '{}'", level.name),
                });
            }
            if let Some(prev) = last_rank {
                if level.rank <= prev {
                    return Err(DiError::InvalidProviderSpec {
                        detail: format!(
                            "scope level '{}' breaks the rank order (rank {} after {})",
                            level.name, level.rank, prev
                        ),
                    });
                }
            }
            last_rank = Some(level.rank);
        }
        if levels.iter().all(|l| l.skippable) {
            return Err(DiError::InvalidProviderSpec {
                detail: "scope hierarchy needs at least one non-skippable level".into(),
            });
        }
        Ok(Self { levels: levels.into() })
    }

    /// The standard runtime/app/session/request/action/step hierarchy.
    pub fn default_scopes() -> Self {
        Self {
            levels: DefaultScope::ALL.to_vec().into(),
        }
    }

    pub fn levels(&self) -> &[ScopeData] {
        &self.levels
    }

    /// Whether the given level is one of this hierarchy's levels.
    pub fn contains(&self, level: ScopeData) -> bool {
        self.levels.iter().any(|l| *l == level)
    }

    pub fn level_by_name(&self, name: &str) -> Option<ScopeData> {
        self.levels.iter().copied().find(|l| l.name == name)
    }

    /// The first non-skippable level; a freshly built container's root
    /// instance sits here.
    pub fn root_level(&self) -> ScopeData {
        self.levels
            .iter()
            .copied()
            .find(|l| !l.skippable)
            .expect("validated hierarchy has a non-skippable level")
    }

    /// Levels entered automatically when the container is built: everything
    /// up to and including the first non-skippable level.
    pub(crate) fn entry_chain(&self) -> &[ScopeData] {
        let end = self
            .levels
            .iter()
            .position(|l| !l.skippable)
            .expect("validated hierarchy has a non-skippable level");
        &self.levels[..=end]
    }

    /// The next non-skippable level strictly below `rank`, if any.
    pub(crate) fn next_enterable_below(&self, rank: u8) -> Option<ScopeData> {
        self.levels
            .iter()
            .copied()
            .find(|l| l.rank > rank && !l.skippable)
    }
}

impl Default for ScopeHierarchy {
    fn default() -> Self {
        Self::default_scopes()
    }
}

/// Type-erased shared value, the currency of the type-erased surfaces
/// (template factories, context entries, `resolve_key`).
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Literal values attached to a scope instance on entry, keyed by
/// [`ServiceKey`]. A child scope's entry for a key shadows the parent's;
/// lookup falls through the parent chain.
///
/// # Examples
///
/// ```rust
/// use wirebox::{Context, ProviderRegistry, DefaultScope, Resolver};
///
/// #[derive(Debug, PartialEq)]
/// struct RequestId(u64);
///
/// let registry = ProviderRegistry::new();
/// registry.add_context_value::<RequestId>(DefaultScope::Request).unwrap();
///
/// let container = registry.container().unwrap();
/// let scope = container
///     .enter_scope_with(DefaultScope::Request, Context::new().with(RequestId(17)))
///     .unwrap();
/// assert_eq!(*scope.get::<RequestId>().unwrap(), RequestId(17));
/// ```
#[derive(Clone, Default)]
pub struct Context {
    entries: HashMap<ServiceKey, AnyArc>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a value under its plain type key.
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.entries.insert(ServiceKey::of::<T>(), Arc::new(value));
        self
    }

    /// Attaches an already-shared value under an explicit key.
    pub fn with_keyed(mut self, key: ServiceKey, value: Arc<dyn Any + Send + Sync>) -> Self {
        self.entries.insert(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, key: &ServiceKey) -> Option<AnyArc> {
        self.entries.get(key).cloned()
    }

    pub(crate) fn into_entries(self) -> HashMap<ServiceKey, AnyArc> {
        self.entries
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
