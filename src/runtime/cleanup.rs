//! Per-scope cleanup stack: acquired resources torn down in reverse order.

use std::future::Future;
use std::pin::Pin;

use crate::key::ServiceKey;

/// Future type for asynchronous cleanup actions.
pub(crate) type BoxFutureUnit = Pin<Box<dyn Future<Output = ()> + Send>>;

enum CleanupAction {
    Sync(Box<dyn FnOnce() + Send>),
    /// Tagged with the provider key that acquired the resource, so a sync
    /// close can name the offender.
    Async(ServiceKey, Box<dyn FnOnce() -> BoxFutureUnit + Send>),
}

/// LIFO record of cleanup actions for one scope instance.
///
/// Actions are pushed immediately when a resource is acquired, not when the
/// surrounding graph finishes, so an aborted resolution still tears down
/// everything it had acquired. Draining preserves one interleaved order:
/// strictly the reverse of acquisition, regardless of sync/async kind.
#[derive(Default)]
pub(crate) struct CleanupStack {
    actions: Vec<CleanupAction>,
}

impl CleanupStack {
    pub(crate) fn push_sync(&mut self, f: Box<dyn FnOnce() + Send>) {
        self.actions.push(CleanupAction::Sync(f));
    }

    pub(crate) fn push_async<Fut, F>(&mut self, key: ServiceKey, f: F)
    where
        Fut: Future<Output = ()> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
    {
        self.actions
            .push(CleanupAction::Async(key, Box::new(move || Box::pin(f()))));
    }

    /// The key of the most recently acquired async action, if any. A scope
    /// holding one refuses the synchronous close path.
    pub(crate) fn pending_async_key(&self) -> Option<&ServiceKey> {
        self.actions.iter().rev().find_map(|a| match a {
            CleanupAction::Async(key, _) => Some(key),
            CleanupAction::Sync(_) => None,
        })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs every action in reverse acquisition order.
    pub(crate) async fn run_all_reverse(&mut self) {
        while let Some(action) = self.actions.pop() {
            match action {
                CleanupAction::Sync(f) => f(),
                CleanupAction::Async(_, f) => f().await,
            }
        }
    }

    /// Runs sync actions in reverse acquisition order and drops async ones,
    /// returning how many async actions were stranded. Only the drop
    /// fallback uses this; a regular sync close refuses to run at all while
    /// async actions are pending.
    pub(crate) fn run_sync_reverse_lossy(&mut self) -> usize {
        let mut stranded = 0;
        while let Some(action) = self.actions.pop() {
            match action {
                CleanupAction::Sync(f) => f(),
                CleanupAction::Async(_, _) => stranded += 1,
            }
        }
        stranded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Conn;

    #[test]
    fn sync_actions_run_in_reverse() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut stack = CleanupStack::default();
        for name in ["first", "second", "third"] {
            let order = order.clone();
            stack.push_sync(Box::new(move || order.lock().unwrap().push(name)));
        }
        assert_eq!(stack.run_sync_reverse_lossy(), 0);
        assert_eq!(*order.lock().unwrap(), vec!["third", "second", "first"]);
        assert!(stack.is_empty());
    }

    #[tokio::test]
    async fn mixed_actions_keep_acquisition_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut stack = CleanupStack::default();

        let o = order.clone();
        stack.push_sync(Box::new(move || o.lock().unwrap().push("sync-1")));
        let o = order.clone();
        stack.push_async(ServiceKey::of::<Conn>(), move || async move {
            o.lock().unwrap().push("async-2");
        });
        let o = order.clone();
        stack.push_sync(Box::new(move || o.lock().unwrap().push("sync-3")));

        assert!(stack.pending_async_key().is_some());
        stack.run_all_reverse().await;
        assert_eq!(*order.lock().unwrap(), vec!["sync-3", "async-2", "sync-1"]);
    }

    #[test]
    fn lossy_drain_counts_stranded_async_actions() {
        let mut stack = CleanupStack::default();
        stack.push_sync(Box::new(|| {}));
        stack.push_async(ServiceKey::of::<Conn>(), || async {});
        assert_eq!(stack.run_sync_reverse_lossy(), 1);
    }
}
