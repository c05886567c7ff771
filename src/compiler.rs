//! The resolution compiler: registry snapshot in, executable assembly out.
//!
//! The assembly is a data-driven plan: one resolve step per live slot, in
//! topological dependency order, with closed-key template specializations
//! baked in for every dependency known at compile time. Asynchrony and
//! cleanup requirements are propagated transitively here, so the sync entry
//! point can reject an async subgraph before executing anything.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::debug;

use crate::error::{DiError, DiResult};
use crate::generics::Bindings;
use crate::key::{ServiceKey, TypeKey};
use crate::lifetime::{Lifetime, LockMode};
use crate::registry::{DepKind, DependencySlot, Factory, Lookup, ProviderSpec, RegistryShared};
use crate::scope::ScopeData;

/// One executable slot of the assembly.
pub(crate) struct ResolveStep {
    pub(crate) key: ServiceKey,
    pub(crate) slot: usize,
    pub(crate) lifetime: Lifetime,
    pub(crate) scope: Option<ScopeData>,
    pub(crate) lock: LockMode,
    pub(crate) is_async: bool,
    pub(crate) needs_cleanup: bool,
    pub(crate) factory: Factory,
    pub(crate) bindings: Bindings,
}

/// Propagated facts about one compiled step, for introspection and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepInfo {
    pub lifetime: Lifetime,
    pub lock: LockMode,
    pub is_async: bool,
    pub needs_cleanup: bool,
}

/// The cached, executable resolution plan for one registry generation.
///
/// Obtained through [`Container::compile`](crate::Container::compile);
/// identical (pointer-equal) across calls until a registration invalidates
/// it.
pub struct CompiledAssembly {
    pub(crate) generation: u64,
    steps: HashMap<ServiceKey, Arc<ResolveStep>>,
    order: Vec<ServiceKey>,
    collections: HashMap<TypeKey, Vec<ServiceKey>>,
    /// Closed keys first requested at resolve time, specialized lazily from
    /// templates and memoized here.
    specials: RwLock<HashMap<ServiceKey, Arc<ResolveStep>>>,
    registry: Arc<RegistryShared>,
}

impl CompiledAssembly {
    /// The registry generation this assembly was compiled from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of resolve steps materialized at compile time.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Keys in execution (topological) order.
    pub fn execution_order(&self) -> Vec<ServiceKey> {
        self.order.clone()
    }

    /// Propagated facts about the step for a closed key.
    pub fn step_info(&self, key: &ServiceKey) -> DiResult<Option<StepInfo>> {
        Ok(self.step_for(key)?.map(|step| StepInfo {
            lifetime: step.lifetime,
            lock: step.lock,
            is_async: step.is_async,
            needs_cleanup: step.needs_cleanup,
        }))
    }

    pub(crate) fn collection(&self, base: TypeKey) -> Vec<ServiceKey> {
        self.collections.get(&base).cloned().unwrap_or_default()
    }

    /// The step for a closed key: compile-time step, memoized runtime
    /// specialization, or a fresh template specialization.
    pub(crate) fn step_for(&self, key: &ServiceKey) -> DiResult<Option<Arc<ResolveStep>>> {
        if let Some(step) = self.steps.get(key) {
            return Ok(Some(step.clone()));
        }
        if let Some(step) = self.specials.read().get(key) {
            return Ok(Some(step.clone()));
        }

        let state = self.registry.state.read();
        let found = match state.lookup(key)? {
            None => return Ok(None),
            Some(found) => found,
        };
        let step = match found {
            // A closed slot the compile pass missed can only appear through
            // a registration racing this stale assembly; serve it anyway,
            // the next resolve recompiles.
            Lookup::Slot(slot) => {
                let spec = match state.spec(slot) {
                    Some(spec) => spec,
                    None => return Ok(None),
                };
                Arc::new(step_from_spec(
                    key.clone(),
                    spec,
                    spec.slot,
                    Bindings::default(),
                ))
            }
            Lookup::Template(m) => {
                let spec = match state.spec(m.slot) {
                    Some(spec) => spec,
                    None => return Ok(None),
                };
                let slot = self.registry.specialization_slot(key);
                debug!(key = %key, template = %spec.key(), "specializing template at resolve time");
                Arc::new(step_from_spec(key.clone(), spec, slot, m.bindings))
            }
        };
        drop(state);

        let mut specials = self.specials.write();
        let entry = specials.entry(key.clone()).or_insert(step);
        Ok(Some(entry.clone()))
    }
}

fn resolve_lock(requested: LockMode, is_async: bool) -> LockMode {
    match requested {
        LockMode::Auto => {
            if is_async {
                LockMode::Async
            } else {
                LockMode::Thread
            }
        }
        // A blocking mutex cannot guard an await point; async subgraphs are
        // promoted to the async-safe lock.
        LockMode::Thread if is_async => LockMode::Async,
        other => other,
    }
}

fn step_from_spec(
    key: ServiceKey,
    spec: &ProviderSpec,
    slot: usize,
    bindings: Bindings,
) -> ResolveStep {
    ResolveStep {
        key,
        slot,
        lifetime: spec.lifetime,
        scope: spec.scope,
        lock: resolve_lock(spec.lock, spec.is_async),
        is_async: spec.is_async,
        needs_cleanup: spec.needs_cleanup,
        factory: spec.factory.clone(),
        bindings,
    }
}

/// Returns the memoized assembly for the registry's current generation,
/// recompiling when stale. Idempotent: two calls without an intervening
/// registration return the same `Arc`.
pub(crate) fn compiled(shared: &Arc<RegistryShared>) -> DiResult<Arc<CompiledAssembly>> {
    let generation = shared.state.read().generation;
    if let Some(asm) = shared.compiled.read().as_ref() {
        if asm.generation == generation {
            return Ok(asm.clone());
        }
    }

    let _guard = shared.compile_lock.lock();
    let generation = shared.state.read().generation;
    if let Some(asm) = shared.compiled.read().as_ref() {
        if asm.generation == generation {
            return Ok(asm.clone());
        }
    }

    debug!(generation, "compiling resolution assembly");
    let asm = Arc::new(build(shared, generation)?);
    *shared.compiled.write() = Some(asm.clone());
    Ok(asm)
}

struct RawStep {
    slot: usize,
    lifetime: Lifetime,
    scope: Option<ScopeData>,
    lock: LockMode,
    own_async: bool,
    own_cleanup: bool,
    deps: SmallVec<[DependencySlot; 4]>,
    factory: Factory,
    bindings: Bindings,
}

fn build(shared: &Arc<RegistryShared>, generation: u64) -> DiResult<CompiledAssembly> {
    let state = shared.state.read();
    let hierarchy = &shared.hierarchy;

    // Fail fast on hierarchy inconsistencies before producing any step.
    for spec in state.slots.iter().flatten() {
        if spec.lifetime == Lifetime::Scoped {
            let level = spec.scope.ok_or_else(|| DiError::InvalidProviderSpec {
                detail: format!("scoped provider {} carries no scope level", spec.key()),
            })?;
            if !hierarchy.contains(level) {
                return Err(DiError::InvalidProviderSpec {
                    detail: format!(
                        "provider {} names scope level '{}' which is not in the hierarchy",
                        spec.key(),
                        level.name
                    ),
                });
            }
        }
    }

    // Materialize raw steps: every closed registration, plus template
    // specializations for every dependency key known now.
    let mut raw: HashMap<ServiceKey, RawStep> = HashMap::new();
    let mut worklist: Vec<ServiceKey> = Vec::new();

    for (key, &slot) in &state.by_key {
        let spec = match state.spec(slot) {
            Some(spec) => spec,
            None => continue,
        };
        raw.insert(
            key.clone(),
            RawStep {
                slot,
                lifetime: spec.lifetime,
                scope: spec.scope,
                lock: spec.lock,
                own_async: spec.is_async,
                own_cleanup: spec.needs_cleanup,
                deps: spec.dependencies.clone(),
                factory: spec.factory.clone(),
                bindings: Bindings::default(),
            },
        );
        worklist.extend(spec.dependencies.iter().map(|d| d.key.clone()));
    }

    while let Some(key) = worklist.pop() {
        if raw.contains_key(&key) {
            continue;
        }
        match state.lookup(&key)? {
            Some(Lookup::Template(m)) => {
                let spec = match state.spec(m.slot) {
                    Some(spec) => spec,
                    None => continue,
                };
                let slot = shared.specialization_slot(&key);
                raw.insert(
                    key.clone(),
                    RawStep {
                        slot,
                        lifetime: spec.lifetime,
                        scope: spec.scope,
                        lock: spec.lock,
                        own_async: spec.is_async,
                        own_cleanup: spec.needs_cleanup,
                        deps: spec.dependencies.clone(),
                        factory: spec.factory.clone(),
                        bindings: m.bindings,
                    },
                );
            }
            // Closed slots were covered above; a missing dependency stays a
            // resolve-time defect because an optional slot may legitimately
            // have no provider.
            Some(Lookup::Slot(_)) | None => {}
        }
    }

    // Topological order, direct-edge cycle detection, and transitive
    // asynchrony/cleanup propagation in one DFS.
    let mut order: Vec<ServiceKey> = Vec::new();
    let mut flags: HashMap<ServiceKey, (bool, bool)> = HashMap::new();
    let mut visiting: Vec<ServiceKey> = Vec::new();
    let mut keys: Vec<ServiceKey> = raw.keys().cloned().collect();
    keys.sort_by(|a, b| raw[a].slot.cmp(&raw[b].slot));
    for key in &keys {
        visit(key, &raw, &mut flags, &mut visiting, &mut order)?;
    }

    let mut steps: HashMap<ServiceKey, Arc<ResolveStep>> = HashMap::new();
    for (key, raw_step) in raw {
        let (is_async, needs_cleanup) = flags[&key];
        steps.insert(
            key.clone(),
            Arc::new(ResolveStep {
                key,
                slot: raw_step.slot,
                lifetime: raw_step.lifetime,
                scope: raw_step.scope,
                lock: resolve_lock(raw_step.lock, is_async),
                is_async,
                needs_cleanup,
                factory: raw_step.factory,
                bindings: raw_step.bindings,
            }),
        );
    }

    let mut collections: HashMap<TypeKey, Vec<ServiceKey>> = HashMap::new();
    for (base, slots) in &state.by_base {
        let keys: Vec<ServiceKey> = slots
            .iter()
            .filter_map(|&s| state.spec(s))
            .map(|spec| spec.key().clone())
            .collect();
        if !keys.is_empty() {
            collections.insert(*base, keys);
        }
    }

    debug!(steps = steps.len(), "assembly compiled");
    Ok(CompiledAssembly {
        generation,
        steps,
        order,
        collections,
        specials: RwLock::new(HashMap::new()),
        registry: shared.clone(),
    })
}

fn visit(
    key: &ServiceKey,
    raw: &HashMap<ServiceKey, RawStep>,
    flags: &mut HashMap<ServiceKey, (bool, bool)>,
    visiting: &mut Vec<ServiceKey>,
    order: &mut Vec<ServiceKey>,
) -> DiResult<(bool, bool)> {
    if let Some(done) = flags.get(key) {
        return Ok(*done);
    }
    let step = match raw.get(key) {
        Some(step) => step,
        // Unregistered dependency: a resolve-time defect, not an edge.
        None => return Ok((false, false)),
    };
    if let Some(pos) = visiting.iter().position(|k| k == key) {
        let mut path: Vec<ServiceKey> = visiting[pos..].to_vec();
        path.push(key.clone());
        return Err(DiError::Circular { path });
    }

    visiting.push(key.clone());
    let mut is_async = step.own_async;
    let mut needs_cleanup = step.own_cleanup;
    for dep in &step.deps {
        // Deferred handles resolve outside this frame: neither a cycle edge
        // nor an asynchrony edge. Cleanup still propagates, since invoking
        // the handle acquires into the same scope tree.
        match dep.kind {
            DepKind::Direct => {
                let (dep_async, dep_cleanup) = visit(&dep.key, raw, flags, visiting, order)?;
                is_async |= dep_async;
                needs_cleanup |= dep_cleanup;
            }
            DepKind::Deferred => {
                if let Some(target) = raw.get(&dep.key) {
                    needs_cleanup |= target.own_cleanup;
                }
            }
        }
    }
    visiting.pop();

    flags.insert(key.clone(), (is_async, needs_cleanup));
    order.push(key.clone());
    Ok((is_async, needs_cleanup))
}
