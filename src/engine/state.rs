//! Component state.
//!
//! Two containers:
//!
//! - [`TreeState`]: committed state per global key plus queued updates. A
//!   resolve reads a snapshot with the queued updates applied; the commit of
//!   that resolve makes the result current and drops the updates it applied.
//! - [`InitialStateContainer`]: states created while some layout is pending
//!   but not yet committed. Racing resolves of the same key serialize on a
//!   per-key lock so `initial_state` runs at most once per component
//!   instance; the container empties itself when the last pending layout
//!   unregisters.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;

// =============================================================================
// State values
// =============================================================================

/// A value stored as component state.
pub trait StateValue: Any + Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync + Debug> StateValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shared, immutable state value.
pub type StateRef = Arc<dyn StateValue>;

/// Borrow a state value as its concrete type.
pub fn downcast_state<T: 'static>(state: &StateRef) -> Option<&T> {
    (**state).as_any().downcast_ref::<T>()
}

/// Computes a new state value from the current one.
pub type StateUpdater = Arc<dyn Fn(Option<&StateRef>) -> StateRef + Send + Sync>;

// =============================================================================
// TreeState
// =============================================================================

#[derive(Clone)]
struct PendingUpdate {
    seq: u64,
    updater: StateUpdater,
}

/// Committed state of one component tree.
#[derive(Clone, Default)]
pub struct TreeState {
    committed: HashMap<String, StateRef>,
    pending: HashMap<String, Vec<PendingUpdate>>,
    next_seq: u64,
}

impl TreeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an update for `global_key`. Returns its sequence number.
    pub fn update_state(&mut self, global_key: impl Into<String>, updater: StateUpdater) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.pending
            .entry(global_key.into())
            .or_default()
            .push(PendingUpdate { seq, updater });
        seq
    }

    /// Highest sequence number handed out so far.
    pub fn last_update_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn has_pending_updates(&self) -> bool {
        self.pending.values().any(|updates| !updates.is_empty())
    }

    /// Committed value, without queued updates.
    pub fn committed(&self, global_key: &str) -> Option<&StateRef> {
        self.committed.get(global_key)
    }

    /// Value a resolve should see: committed plus queued updates in order.
    ///
    /// `base` seeds keys that have no committed value yet.
    pub fn state_for_resolve(&self, global_key: &str, base: Option<StateRef>) -> Option<StateRef> {
        let mut current = self.committed.get(global_key).cloned().or(base);
        if let Some(updates) = self.pending.get(global_key) {
            for update in updates {
                current = Some((update.updater)(current.as_ref()));
            }
        }
        current
    }

    /// Make the states of a resolve current.
    ///
    /// Keys absent from `states` are dropped (their components left the
    /// tree). Updates up to `applied_through` were consumed by that resolve.
    pub fn commit(&mut self, states: HashMap<String, StateRef>, applied_through: u64) {
        self.committed = states;
        for updates in self.pending.values_mut() {
            updates.retain(|update| update.seq > applied_through);
        }
        self.pending.retain(|_, updates| !updates.is_empty());
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    /// Committed values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &StateRef)> {
        let mut entries: Vec<_> = self.committed.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter()
    }
}

impl Debug for TreeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeState")
            .field("committed", &self.committed.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

// =============================================================================
// InitialStateContainer
// =============================================================================

#[derive(Default)]
struct InitialStates {
    states: HashMap<String, StateRef>,
    locks: HashMap<String, Arc<Mutex<()>>>,
    pending_layouts: usize,
}

/// Initial states shared by all in-flight layouts of one tree.
#[derive(Default)]
pub struct InitialStateContainer {
    inner: Mutex<InitialStates>,
}

impl InitialStateContainer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a pending layout. The container is cleared when the last
    /// returned guard drops.
    pub fn register(self: &Arc<Self>) -> PendingLayoutGuard {
        self.inner.lock().pending_layouts += 1;
        PendingLayoutGuard {
            container: Arc::clone(self),
        }
    }

    /// Initial state for `global_key`, creating it at most once.
    ///
    /// Concurrent callers for the same key block on that key's lock and the
    /// loser receives the winner's state.
    pub fn get_or_create(&self, global_key: &str, create: impl FnOnce() -> StateRef) -> StateRef {
        let key_lock = {
            let mut inner = self.inner.lock();
            if let Some(state) = inner.states.get(global_key) {
                return state.clone();
            }
            inner
                .locks
                .entry(global_key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let _held = key_lock.lock();
        if let Some(state) = self.inner.lock().states.get(global_key) {
            return state.clone();
        }
        let state = create();
        self.inner
            .lock()
            .states
            .insert(global_key.to_string(), state.clone());
        log::trace!("created initial state for {global_key}");
        state
    }

    /// Move a key's state out once it has been committed.
    pub fn take(&self, global_key: &str) -> Option<StateRef> {
        let mut inner = self.inner.lock();
        inner.locks.remove(global_key);
        inner.states.remove(global_key)
    }

    pub fn contains(&self, global_key: &str) -> bool {
        self.inner.lock().states.contains_key(global_key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_layouts(&self) -> usize {
        self.inner.lock().pending_layouts
    }

    fn unregister(&self) {
        let mut inner = self.inner.lock();
        inner.pending_layouts = inner.pending_layouts.saturating_sub(1);
        if inner.pending_layouts == 0 && !inner.states.is_empty() {
            log::debug!("last pending layout finished, dropping {} initial states", inner.states.len());
            inner.states.clear();
            inner.locks.clear();
        }
    }
}

/// Keeps initial states alive while a layout is pending.
pub struct PendingLayoutGuard {
    container: Arc<InitialStateContainer>,
}

impl Drop for PendingLayoutGuard {
    fn drop(&mut self) {
        self.container.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn counter_update(delta: i32) -> StateUpdater {
        Arc::new(move |current: Option<&StateRef>| {
            let value = current.and_then(downcast_state::<i32>).copied().unwrap_or(0);
            Arc::new(value + delta) as StateRef
        })
    }

    #[test]
    fn test_downcast_state() {
        let state: StateRef = Arc::new(String::from("hi"));
        assert_eq!(downcast_state::<String>(&state).map(String::as_str), Some("hi"));
        assert!(downcast_state::<i32>(&state).is_none());
    }

    #[test]
    fn test_pending_updates_apply_in_order_until_commit() {
        let mut tree = TreeState::new();
        tree.update_state("1,a", counter_update(2));
        let applied = tree.update_state("1,a", counter_update(3));

        let resolved = tree.state_for_resolve("1,a", None).unwrap();
        assert_eq!(downcast_state::<i32>(&resolved), Some(&5));

        tree.update_state("1,a", counter_update(10));
        tree.commit(HashMap::from([("1,a".to_string(), resolved)]), applied);

        assert!(tree.has_pending_updates());
        let next = tree.state_for_resolve("1,a", None).unwrap();
        assert_eq!(downcast_state::<i32>(&next), Some(&15));
    }

    #[test]
    fn test_commit_drops_removed_keys() {
        let mut tree = TreeState::new();
        tree.commit(
            HashMap::from([("a".to_string(), Arc::new(1_i32) as StateRef)]),
            0,
        );
        tree.commit(HashMap::new(), 0);
        assert!(tree.committed("a").is_none());
    }

    #[test]
    fn test_initial_state_created_once_under_race() {
        let container = InitialStateContainer::new();
        let _guard = container.register();
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let container = container.clone();
                let calls = calls.clone();
                thread::spawn(move || {
                    container.get_or_create("1,a", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Arc::new(42_i32) as StateRef
                    })
                })
            })
            .collect();

        let states: Vec<StateRef> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(states.iter().all(|s| Arc::ptr_eq(s, &states[0])));
    }

    #[test]
    fn test_container_cleared_after_last_guard() {
        let container = InitialStateContainer::new();
        let first = container.register();
        let second = container.register();
        container.get_or_create("k", || Arc::new(1_i32) as StateRef);

        drop(first);
        assert!(container.contains("k"));
        drop(second);
        assert!(container.is_empty());
        assert_eq!(container.pending_layouts(), 0);
    }

    #[test]
    fn test_take_moves_state_out() {
        let container = InitialStateContainer::new();
        let _guard = container.register();
        container.get_or_create("k", || Arc::new(1_i32) as StateRef);
        assert!(container.take("k").is_some());
        assert!(!container.contains("k"));
    }
}
