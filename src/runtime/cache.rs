//! Per-scope-instance lifetime cache with per-slot lock-mode selection.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use crate::error::DiResult;
use crate::lifetime::LockMode;
use crate::scope::AnyArc;

/// Storage for one cacheable slot.
///
/// `Thread` and `Async` cells give the exactly-once guarantee: first builds
/// are serialized by a mutex matching the slot's execution mode, with a
/// lock-free read once initialized. `Free` cells skip mutual exclusion
/// entirely; a racing first build may run twice, last write winning.
pub(crate) enum SlotCell {
    Thread {
        cell: OnceCell<AnyArc>,
        init: Mutex<()>,
    },
    Async {
        cell: OnceCell<AnyArc>,
        init: tokio::sync::Mutex<()>,
    },
    Free {
        value: RwLock<Option<AnyArc>>,
    },
}

impl SlotCell {
    fn new(mode: LockMode) -> Self {
        match mode {
            LockMode::Async => SlotCell::Async {
                cell: OnceCell::new(),
                init: tokio::sync::Mutex::new(()),
            },
            LockMode::None => SlotCell::Free {
                value: RwLock::new(None),
            },
            // Auto is resolved by the compiler; treat a stray one as Thread.
            LockMode::Thread | LockMode::Auto => SlotCell::Thread {
                cell: OnceCell::new(),
                init: Mutex::new(()),
            },
        }
    }

    pub(crate) fn peek(&self) -> Option<AnyArc> {
        match self {
            SlotCell::Thread { cell, .. } | SlotCell::Async { cell, .. } => cell.get().cloned(),
            SlotCell::Free { value } => value.read().clone(),
        }
    }

    /// Double-checked synchronous first build. Only `Thread` and `Free`
    /// cells reach this path; async-mode slots are rejected before caching.
    pub(crate) fn get_or_build_sync(
        &self,
        build: impl FnOnce() -> DiResult<AnyArc>,
    ) -> DiResult<AnyArc> {
        if let Some(v) = self.peek() {
            return Ok(v);
        }
        match self {
            SlotCell::Thread { cell, init } => {
                let _guard = init.lock();
                if let Some(v) = cell.get() {
                    return Ok(v.clone());
                }
                let v = build()?;
                let _ = cell.set(v.clone());
                Ok(v)
            }
            SlotCell::Free { value } => {
                let v = build()?;
                *value.write() = Some(v.clone());
                Ok(v)
            }
            SlotCell::Async { cell, .. } => {
                debug_assert!(false, "async-mode slot built from the sync path");
                let v = build()?;
                let _ = cell.set(v.clone());
                Ok(v)
            }
        }
    }

    /// Double-checked asynchronous first build.
    pub(crate) async fn get_or_build_async<F, Fut>(&self, build: F) -> DiResult<AnyArc>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DiResult<AnyArc>>,
    {
        if let Some(v) = self.peek() {
            return Ok(v);
        }
        match self {
            SlotCell::Async { cell, init } => {
                let _guard = init.lock().await;
                if let Some(v) = cell.get() {
                    return Ok(v.clone());
                }
                let v = build().await?;
                let _ = cell.set(v.clone());
                Ok(v)
            }
            SlotCell::Free { value } => {
                let v = build().await?;
                *value.write() = Some(v.clone());
                Ok(v)
            }
            SlotCell::Thread { cell, .. } => {
                // Sync-reachable slots are built through the sync path even
                // when entered via aresolve; this arm only backstops a
                // mis-tagged step.
                debug_assert!(false, "thread-mode slot built from the async path");
                let v = build().await?;
                let _ = cell.set(v.clone());
                Ok(cell.get().cloned().unwrap_or(v))
            }
        }
    }
}

/// Slot-indexed cache owned by one scope instance.
pub(crate) struct LifetimeCache {
    cells: RwLock<HashMap<usize, Arc<SlotCell>>>,
}

impl LifetimeCache {
    pub(crate) fn new() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }

    /// The cell for a slot, created on first touch with the slot's resolved
    /// lock mode.
    pub(crate) fn cell(&self, slot: usize, mode: LockMode) -> Arc<SlotCell> {
        if let Some(cell) = self.cells.read().get(&slot) {
            return cell.clone();
        }
        self.cells
            .write()
            .entry(slot)
            .or_insert_with(|| Arc::new(SlotCell::new(mode)))
            .clone()
    }

    pub(crate) fn clear(&self) {
        self.cells.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn thread_cell_builds_exactly_once() {
        let cache = LifetimeCache::new();
        let built = Arc::new(AtomicUsize::new(0));

        let cell = cache.cell(0, LockMode::Thread);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                let built = built.clone();
                std::thread::spawn(move || {
                    cell.get_or_build_sync(|| {
                        built.fetch_add(1, Ordering::SeqCst);
                        Ok(Arc::new(42u32) as AnyArc)
                    })
                    .unwrap()
                })
            })
            .collect();
        let values: Vec<AnyArc> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(built.load(Ordering::SeqCst), 1);
        for v in &values[1..] {
            assert!(Arc::ptr_eq(v, &values[0]));
        }
    }

    #[tokio::test]
    async fn async_cell_builds_exactly_once() {
        let cache = Arc::new(LifetimeCache::new());
        let built = Arc::new(AtomicUsize::new(0));

        let cell = cache.cell(1, LockMode::Async);
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                let built = built.clone();
                tokio::spawn(async move {
                    cell.get_or_build_async(|| async move {
                        tokio::task::yield_now().await;
                        built.fetch_add(1, Ordering::SeqCst);
                        Ok(Arc::new("once".to_string()) as AnyArc)
                    })
                    .await
                    .unwrap()
                })
            })
            .collect();
        let mut values = Vec::new();
        for t in tasks {
            values.push(t.await.unwrap());
        }

        assert_eq!(built.load(Ordering::SeqCst), 1);
        for v in &values[1..] {
            assert!(Arc::ptr_eq(v, &values[0]));
        }
    }

    #[test]
    fn failed_build_is_not_cached() {
        let cache = LifetimeCache::new();
        let cell = cache.cell(2, LockMode::Thread);

        let err = cell.get_or_build_sync(|| {
            Err(crate::DiError::DepthExceeded(0))
        });
        assert!(err.is_err());

        let ok = cell
            .get_or_build_sync(|| Ok(Arc::new(1u8) as AnyArc))
            .unwrap();
        assert_eq!(*ok.downcast::<u8>().unwrap(), 1);
    }
}
