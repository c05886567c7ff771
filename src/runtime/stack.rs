//! In-flight resolution tracking for cycle detection.
//!
//! The stack is an explicit value threaded through each top-level resolve
//! call, never ambient state: crossing into an asynchronous factory's future
//! forks the stack, so two logically concurrent resolutions cannot observe
//! each other's in-flight markers.

use crate::error::{DiError, DiResult};
use crate::key::ServiceKey;

const MAX_DEPTH: usize = 256;

/// Stack of keys currently being resolved within one execution context.
#[derive(Clone, Debug, Default)]
pub struct ResolutionStack {
    frames: Vec<ServiceKey>,
}

impl ResolutionStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as in flight. Detects re-entry before pushing and returns
    /// the full cycle path.
    pub(crate) fn push(&mut self, key: &ServiceKey) -> DiResult<()> {
        if self.frames.iter().any(|k| k == key) {
            let mut path = self.frames.clone();
            path.push(key.clone());
            return Err(DiError::Circular { path });
        }
        if self.frames.len() >= MAX_DEPTH {
            return Err(DiError::DepthExceeded(self.frames.len()));
        }
        self.frames.push(key.clone());
        Ok(())
    }

    pub(crate) fn pop(&mut self) {
        let popped = self.frames.pop();
        debug_assert!(popped.is_some(), "pop without matching push");
    }

    /// Clones the in-flight markers for a new execution context. Used at
    /// every concurrency boundary instead of sharing the live stack.
    pub(crate) fn fork(&self) -> Self {
        self.clone()
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn reentry_yields_full_path() {
        let mut stack = ResolutionStack::new();
        stack.push(&ServiceKey::of::<A>()).unwrap();
        stack.push(&ServiceKey::of::<B>()).unwrap();
        let err = stack.push(&ServiceKey::of::<A>()).unwrap_err();
        match err {
            DiError::Circular { path } => {
                assert_eq!(path.len(), 3);
                assert_eq!(path[0], ServiceKey::of::<A>());
                assert_eq!(path[2], ServiceKey::of::<A>());
            }
            other => panic!("expected Circular, got {:?}", other),
        }
    }

    #[test]
    fn fork_is_independent() {
        let mut stack = ResolutionStack::new();
        stack.push(&ServiceKey::of::<A>()).unwrap();
        let mut forked = stack.fork();
        forked.push(&ServiceKey::of::<B>()).unwrap();
        assert_eq!(stack.depth(), 1);
        assert_eq!(forked.depth(), 2);
        // The fork carries the ancestor marker.
        assert!(forked.push(&ServiceKey::of::<A>()).is_err());
    }

    #[test]
    fn depth_guard() {
        struct Deep;
        let mut stack = ResolutionStack::new();
        for i in 0..MAX_DEPTH {
            // Distinct labels keep the cycle check out of the way.
            let key = ServiceKey::of::<Deep>().with_label(Box::leak(format!("d{}", i).into_boxed_str()));
            stack.push(&key).unwrap();
        }
        let err = stack.push(&ServiceKey::of::<A>()).unwrap_err();
        assert!(matches!(err, DiError::DepthExceeded(_)));
    }
}
