//! Structural matching of closed request keys against open templates.
//!
//! Specificity is computed from the shape of the generic-argument trees,
//! never from registration order alone: a concrete position beats a nested
//! parameterized one, which beats a bare variable, compared left to right
//! across positions. Registration order only breaks exact structural ties,
//! last registered winning, mirroring the registry's override policy.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{DiError, DiResult};
use crate::key::{GenericArg, ServiceKey, TypeKey};

/// Substitutions produced by a successful template match: variable name to
/// the closed argument it was bound to. Template factories receive these to
/// decide what to build.
#[derive(Clone, Debug, Default)]
pub struct Bindings {
    map: HashMap<&'static str, GenericArg>,
}

impl Bindings {
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The closed argument bound to `var`, if the variable was bound.
    pub fn get(&self, var: &str) -> Option<&GenericArg> {
        self.map.get(var)
    }

    /// The concrete type bound to `var`, when it was bound to a plain type.
    pub fn concrete(&self, var: &str) -> Option<TypeKey> {
        match self.map.get(var) {
            Some(GenericArg::Concrete(t)) => Some(*t),
            _ => None,
        }
    }

    /// Whether `var` was bound to exactly the concrete type `T`.
    pub fn is<T: ?Sized + 'static>(&self, var: &str) -> bool {
        self.concrete(var) == Some(TypeKey::of::<T>())
    }

    fn bind(&mut self, name: &'static str, arg: &GenericArg) -> bool {
        match self.map.get(name) {
            Some(existing) => existing == arg,
            None => {
                self.map.insert(name, arg.clone());
                true
            }
        }
    }
}

/// A winning template for a closed request.
#[derive(Debug)]
pub(crate) struct TemplateMatch {
    pub slot: usize,
    pub bindings: Bindings,
}

enum Unified {
    Bound(Bindings),
    Mismatch,
    ConstraintViolation(String),
}

fn unify_args(template: &[GenericArg], request: &[GenericArg]) -> Unified {
    if template.len() != request.len() {
        return Unified::Mismatch;
    }
    let mut bindings = Bindings::default();
    match unify_into(template, request, &mut bindings) {
        Ok(true) => Unified::Bound(bindings),
        Ok(false) => Unified::Mismatch,
        Err(detail) => Unified::ConstraintViolation(detail),
    }
}

fn unify_into(
    template: &[GenericArg],
    request: &[GenericArg],
    bindings: &mut Bindings,
) -> Result<bool, String> {
    for (t, r) in template.iter().zip(request) {
        match (t, r) {
            (GenericArg::Concrete(a), GenericArg::Concrete(b)) => {
                if a != b {
                    return Ok(false);
                }
            }
            (GenericArg::Var(v), GenericArg::Concrete(b)) => {
                if !v.admits(b) {
                    return Err(format!(
                        "'{}' is not an allowed substitution for ${}",
                        b.name(),
                        v.name()
                    ));
                }
                if !bindings.bind(v.name(), r) {
                    return Ok(false);
                }
            }
            (GenericArg::Var(v), GenericArg::Parameterized(p)) => {
                if v.is_restricted() {
                    return Err(format!(
                        "parameterized argument {}<..> cannot satisfy the \
                         constrained variable ${}",
                        p.base,
                        v.name()
                    ));
                }
                if !bindings.bind(v.name(), r) {
                    return Ok(false);
                }
            }
            (GenericArg::Parameterized(a), GenericArg::Parameterized(b)) => {
                if a.base != b.base || a.args.len() != b.args.len() {
                    return Ok(false);
                }
                if !unify_into(&a.args, &b.args, bindings)? {
                    return Ok(false);
                }
            }
            // A concrete template position never matches a parameterized
            // request position and vice versa; request keys never carry vars.
            _ => return Ok(false),
        }
    }
    Ok(true)
}

/// Structural specificity of one template position against another.
fn cmp_arg(a: &GenericArg, b: &GenericArg) -> Ordering {
    match (a, b) {
        (GenericArg::Concrete(_), GenericArg::Concrete(_)) => Ordering::Equal,
        (GenericArg::Concrete(_), _) => Ordering::Greater,
        (_, GenericArg::Concrete(_)) => Ordering::Less,
        (GenericArg::Parameterized(x), GenericArg::Parameterized(y)) => {
            cmp_args(&x.args, &y.args)
        }
        (GenericArg::Parameterized(_), GenericArg::Var(_)) => Ordering::Greater,
        (GenericArg::Var(_), GenericArg::Parameterized(_)) => Ordering::Less,
        (GenericArg::Var(_), GenericArg::Var(_)) => Ordering::Equal,
    }
}

fn cmp_args(a: &[GenericArg], b: &[GenericArg]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match cmp_arg(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Picks the most specific template for a closed request key.
///
/// `pool` holds `(slot, template key)` pairs in registration order for the
/// request's base type and label. Returns `Ok(None)` when nothing matches;
/// a request that only fails constraint validation is an error, as is a
/// request that is not closed.
pub(crate) fn best_match(
    request: &ServiceKey,
    pool: &[(usize, ServiceKey)],
) -> DiResult<Option<TemplateMatch>> {
    if !request.is_closed() {
        return Err(DiError::InvalidGenericArgument {
            key: request.clone(),
            detail: "request keys must be closed (no unbound type variables)".into(),
        });
    }

    let mut winner: Option<(usize, &ServiceKey, Bindings)> = None;
    let mut violation: Option<String> = None;

    for (slot, template) in pool {
        if template.label() != request.label() {
            continue;
        }
        match unify_args(template.args(), request.args()) {
            Unified::Bound(bindings) => {
                let more_specific = match &winner {
                    // Last registered wins ties: pool is in registration
                    // order, so Equal also replaces.
                    Some((_, best, _)) => cmp_args(template.args(), best.args()) != Ordering::Less,
                    None => true,
                };
                if more_specific {
                    winner = Some((*slot, template, bindings));
                }
            }
            Unified::ConstraintViolation(detail) => {
                violation.get_or_insert(detail);
            }
            Unified::Mismatch => {}
        }
    }

    match winner {
        Some((slot, _, bindings)) => Ok(Some(TemplateMatch { slot, bindings })),
        None => match violation {
            Some(detail) => Err(DiError::InvalidGenericArgument {
                key: request.clone(),
                detail,
            }),
            None => Ok(None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{concrete, parameterized, var, var_in};

    struct Repo;
    struct List;

    fn repo_key(args: Vec<GenericArg>) -> ServiceKey {
        ServiceKey::of::<Repo>().with_args(args)
    }

    #[test]
    fn bare_var_matches_any_concrete() {
        let pool = vec![(0, repo_key(vec![var("T")]))];
        let m = best_match(&repo_key(vec![concrete::<i32>()]), &pool)
            .unwrap()
            .unwrap();
        assert_eq!(m.slot, 0);
        assert!(m.bindings.is::<i32>("T"));
    }

    #[test]
    fn nested_shape_beats_bare_var() {
        let pool = vec![
            (0, repo_key(vec![var("T")])),
            (
                1,
                repo_key(vec![parameterized(TypeKey::of::<List>(), vec![var("U")])]),
            ),
        ];
        let request = repo_key(vec![parameterized(
            TypeKey::of::<List>(),
            vec![concrete::<i32>()],
        )]);
        let m = best_match(&request, &pool).unwrap().unwrap();
        assert_eq!(m.slot, 1);
        assert!(m.bindings.is::<i32>("U"));

        // Same outcome with the pool in the opposite registration order:
        // the ranking is structural, not positional.
        let pool_rev = vec![(1, pool[1].1.clone()), (0, pool[0].1.clone())];
        let m = best_match(&request, &pool_rev).unwrap().unwrap();
        assert_eq!(m.slot, 1);
    }

    #[test]
    fn last_registered_wins_exact_ties() {
        let pool = vec![(3, repo_key(vec![var("T")])), (9, repo_key(vec![var("S")]))];
        let m = best_match(&repo_key(vec![concrete::<u8>()]), &pool)
            .unwrap()
            .unwrap();
        assert_eq!(m.slot, 9);
    }

    #[test]
    fn repeated_var_must_bind_consistently() {
        let pool = vec![(0, repo_key(vec![var("T"), var("T")]))];
        let ok = repo_key(vec![concrete::<i32>(), concrete::<i32>()]);
        let bad = repo_key(vec![concrete::<i32>(), concrete::<u8>()]);
        assert!(best_match(&ok, &pool).unwrap().is_some());
        assert!(best_match(&bad, &pool).unwrap().is_none());
    }

    #[test]
    fn constraint_violation_is_an_error_not_a_miss() {
        let pool = vec![(
            0,
            repo_key(vec![var_in("T", vec![TypeKey::of::<i32>(), TypeKey::of::<u64>()])]),
        )];
        assert!(best_match(&repo_key(vec![concrete::<i32>()]), &pool)
            .unwrap()
            .is_some());
        let err = best_match(&repo_key(vec![concrete::<String>()]), &pool).unwrap_err();
        assert!(matches!(err, DiError::InvalidGenericArgument { .. }));
    }

    #[test]
    fn open_request_is_rejected() {
        let pool = vec![(0, repo_key(vec![var("T")]))];
        let err = best_match(&repo_key(vec![var("X")]), &pool).unwrap_err();
        assert!(matches!(err, DiError::InvalidGenericArgument { .. }));
    }

    #[test]
    fn labels_partition_the_pool() {
        let pool = vec![(0, repo_key(vec![var("T")]).with_label("cold"))];
        assert!(best_match(&repo_key(vec![concrete::<i32>()]), &pool)
            .unwrap()
            .is_none());
        let labeled = repo_key(vec![concrete::<i32>()]).with_label("cold");
        assert!(best_match(&labeled, &pool).unwrap().is_some());
    }

    #[test]
    fn arity_mismatch_never_matches() {
        let pool = vec![(0, repo_key(vec![var("T")]))];
        let request = repo_key(vec![concrete::<i32>(), concrete::<i32>()]);
        assert!(best_match(&request, &pool).unwrap().is_none());
    }
}
