//! ComponentTree - owner of one root component and its committed layout.
//!
//! # Computation
//!
//! ```text
//! request ─┬─ equivalent to committed ──────────────▶ committed layout
//!          ├─ equivalent to in-flight ──▶ join ─────▶ shared result
//!          └─ otherwise: cancel in-flight, new future
//!                 │
//!                 ▼
//!          resolve ─▶ (interrupted? park / resume) ─▶ layout ─▶ commit
//! ```
//!
//! Commit is the only place tree-wide state changes: the resolved states
//! replace the committed ones, initial states move out of the shared
//! container, the measured cache freezes, the event table switches to the
//! new owners, and a debug snapshot is recorded when time travel is on.
//! A computation whose token was cancelled never commits.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::RenderConfig;
use crate::engine::{
    ComponentRef, EventHandlersController, InitialStateContainer, StateRef, StateUpdater,
    TreeState,
};
use crate::error::RenderResult;
use crate::layout::{LayoutOutcome, LayoutState, calculate_layout};
use crate::mount::{ContentFactory, MountContent, MountState};
use crate::resolve::{
    CancellationToken, MeasuredResultCache, ResolveEnv, ResolveOutcome, ResolvedTree, resolve,
};
use crate::types::SizeSpec;

use super::{DebugHistory, DebugSnapshot, FutureResult, LayoutRequest, SharedError, TreeFuture};
use super::future::Claim;

struct Shared {
    root: Option<ComponentRef>,
    width: SizeSpec,
    height: SizeSpec,
    tree_state: TreeState,
    next_version: u64,
    committed: Option<Arc<LayoutState>>,
    /// Request and state sequence the committed layout was computed for.
    committed_request: Option<(LayoutRequest, u64)>,
    committed_cache: Option<Arc<MeasuredResultCache>>,
    in_flight: Option<Arc<TreeFuture>>,
    history: DebugHistory,
}

/// A component tree and its layout lifecycle.
///
/// Layout can be requested from any thread. Mounting the committed layout
/// is done by a [`MountState`] on the UI thread.
pub struct ComponentTree {
    config: RenderConfig,
    initial_states: Arc<InitialStateContainer>,
    events: Arc<EventHandlersController>,
    shared: Mutex<Shared>,
}

impl ComponentTree {
    pub fn new(config: RenderConfig) -> Self {
        let history = DebugHistory::new(if config.time_travel {
            config.time_travel_history
        } else {
            0
        });
        Self {
            config,
            initial_states: InitialStateContainer::new(),
            events: Arc::new(EventHandlersController::new()),
            shared: Mutex::new(Shared {
                root: None,
                width: SizeSpec::unspecified(),
                height: SizeSpec::unspecified(),
                tree_state: TreeState::new(),
                next_version: 1,
                committed: None,
                committed_request: None,
                committed_cache: None,
                in_flight: None,
                history,
            }),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventHandlersController> {
        &self.events
    }

    pub fn initial_states(&self) -> &Arc<InitialStateContainer> {
        &self.initial_states
    }

    /// Mount state for this tree's layouts, sharing its event table.
    pub fn create_mount_state(
        &self,
        root: Box<dyn MountContent>,
        factory: Box<dyn ContentFactory>,
    ) -> MountState {
        MountState::new(root, factory, self.events.clone(), self.config.clone())
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Replace the root and lay it out on the calling thread.
    pub fn set_root(&self, root: ComponentRef) -> RenderResult<Option<Arc<LayoutState>>> {
        let (width, height) = {
            let shared = self.shared.lock();
            (shared.width, shared.height)
        };
        self.calculate(LayoutRequest::new(root, width, height), true)
    }

    /// Replace the root size specs and lay out the current root.
    ///
    /// `Ok(None)` when no root is set yet.
    pub fn set_size_spec(
        &self,
        width: SizeSpec,
        height: SizeSpec,
    ) -> RenderResult<Option<Arc<LayoutState>>> {
        let root = {
            let mut shared = self.shared.lock();
            shared.width = width;
            shared.height = height;
            shared.root.clone()
        };
        match root {
            Some(root) => self.calculate(LayoutRequest::new(root, width, height), true),
            None => Ok(None),
        }
    }

    pub fn set_root_and_size_spec(
        &self,
        root: ComponentRef,
        width: SizeSpec,
        height: SizeSpec,
    ) -> RenderResult<Option<Arc<LayoutState>>> {
        self.calculate(LayoutRequest::new(root, width, height), true)
    }

    /// Queue a state update for the next layout. Returns its sequence number.
    pub fn update_state(&self, global_key: impl Into<String>, updater: StateUpdater) -> u64 {
        let mut shared = self.shared.lock();
        let seq = shared.tree_state.update_state(global_key, updater);
        log::trace!("queued state update #{seq}");
        seq
    }

    /// Queue a state update and lay out the current root right away.
    pub fn update_state_sync(
        &self,
        global_key: impl Into<String>,
        updater: StateUpdater,
    ) -> RenderResult<Option<Arc<LayoutState>>> {
        self.update_state(global_key, updater);
        let request = {
            let shared = self.shared.lock();
            shared
                .root
                .clone()
                .map(|root| LayoutRequest::new(root, shared.width, shared.height))
        };
        match request {
            Some(request) => self.calculate(request, true),
            None => Ok(None),
        }
    }

    /// Compute (or join) the layout for `request`.
    ///
    /// `sync` marks a caller that needs the result now, typically the UI
    /// thread: it is never interrupted and it takes over interruptible work
    /// already running elsewhere. Returns `Ok(None)` when the computation
    /// was cancelled by a newer request.
    pub fn calculate(
        &self,
        request: LayoutRequest,
        sync: bool,
    ) -> RenderResult<Option<Arc<LayoutState>>> {
        let future = {
            let mut shared = self.shared.lock();
            shared.root = Some(request.root.clone());
            shared.width = request.width;
            shared.height = request.height;
            let seq = shared.tree_state.last_update_seq();

            if let Some((committed, applied)) = &shared.committed_request {
                if committed.is_equivalent_to(&request) && *applied == seq {
                    log::trace!("request matches committed layout");
                    return Ok(shared.committed.clone());
                }
            }

            match &shared.in_flight {
                Some(running)
                    if running.request().is_equivalent_to(&request)
                        && running.applied_through() == seq
                        && !running.is_done() =>
                {
                    log::debug!("joining in-flight layout v{}", running.version());
                    running.clone()
                }
                running => {
                    if let Some(running) = running {
                        log::debug!("cancelling layout v{} for a new request", running.version());
                        running.cancel();
                    }
                    let version = shared.next_version;
                    shared.next_version += 1;
                    let future = TreeFuture::new(
                        version,
                        request,
                        Arc::new(shared.tree_state.clone()),
                        self.initial_states.register(),
                    );
                    shared.in_flight = Some(future.clone());
                    future
                }
            }
        };
        self.drive(&future, sync)
    }

    /// The in-flight computation, if any.
    pub fn in_flight(&self) -> Option<Arc<TreeFuture>> {
        self.shared.lock().in_flight.clone()
    }

    /// Cancel the in-flight computation.
    pub fn cancel_pending(&self) {
        if let Some(future) = self.shared.lock().in_flight.take() {
            future.cancel();
        }
    }

    // =========================================================================
    // Committed state
    // =========================================================================

    pub fn committed_layout(&self) -> Option<Arc<LayoutState>> {
        self.shared.lock().committed.clone()
    }

    pub fn committed_state(&self, global_key: &str) -> Option<StateRef> {
        self.shared.lock().tree_state.committed(global_key).cloned()
    }

    pub fn has_pending_updates(&self) -> bool {
        self.shared.lock().tree_state.has_pending_updates()
    }

    // =========================================================================
    // Time travel
    // =========================================================================

    pub fn snapshot(&self, revision: u64) -> Option<DebugSnapshot> {
        self.shared.lock().history.get(revision).cloned()
    }

    /// Revisions kept in the debug history, oldest first.
    pub fn revisions(&self) -> Vec<u64> {
        self.shared.lock().history.revisions()
    }

    /// Lay out a recorded revision again with its frozen states.
    ///
    /// Queued updates are dropped. The result is committed as a new
    /// revision; `Ok(None)` when `revision` is not in the history.
    pub fn rewind(&self, revision: u64) -> RenderResult<Option<Arc<LayoutState>>> {
        let request = {
            let mut shared = self.shared.lock();
            let Some(snapshot) = shared.history.get(revision).cloned() else {
                log::warn!("no snapshot for revision {revision}");
                return Ok(None);
            };
            if let Some(running) = shared.in_flight.take() {
                running.cancel();
            }
            let through = shared.tree_state.last_update_seq();
            shared.tree_state.commit(snapshot.states.clone(), through);
            shared.committed_request = None;
            log::debug!("rewinding to revision {revision}");
            LayoutRequest::new(snapshot.root.clone(), snapshot.width, snapshot.height)
        };
        self.calculate(request, true)
    }

    // =========================================================================
    // Driving a future
    // =========================================================================

    fn drive(
        &self,
        future: &Arc<TreeFuture>,
        sync: bool,
    ) -> RenderResult<Option<Arc<LayoutState>>> {
        let outcome = match future.claim(sync) {
            Claim::Done(result) => return result.map_err(Into::into),
            Claim::Start(token) => {
                let env = self.env_for(future, token, self.fresh_cache(), sync);
                resolve(env, future.request().root.clone())
            }
            Claim::Resume(ctx, token) => ctx.resume(token),
        };

        match self.finish_resolve(future, outcome, sync) {
            Some(result) => self.complete(future, result),
            None => future.wait().map_err(Into::into),
        }
    }

    /// Run a resolve to completion, then lay out and commit.
    ///
    /// `None` when the work was handed to a waiting synchronous caller.
    fn finish_resolve(
        &self,
        future: &TreeFuture,
        mut outcome: RenderResult<ResolveOutcome>,
        sync: bool,
    ) -> Option<RenderResult<Option<Arc<LayoutState>>>> {
        loop {
            match outcome {
                Err(err) => return Some(Err(err)),
                Ok(ResolveOutcome::Cancelled) => return Some(Ok(None)),
                Ok(ResolveOutcome::Interrupted(ctx)) => match future.park(ctx) {
                    Some((ctx, token)) => outcome = ctx.resume(token),
                    None => return None,
                },
                Ok(ResolveOutcome::Complete(tree)) => {
                    return Some(self.lay_out_and_commit(future, &tree, sync));
                }
            }
        }
    }

    fn lay_out_and_commit(
        &self,
        future: &TreeFuture,
        tree: &ResolvedTree,
        sync: bool,
    ) -> RenderResult<Option<Arc<LayoutState>>> {
        let env = self.env_for(future, future.token(), tree.measured_cache().clone(), sync);
        let previous = self.shared.lock().committed.clone();
        let request = future.request();
        let outcome = calculate_layout(
            &env,
            tree,
            request.width,
            request.height,
            previous.as_deref(),
            self.config.retain_layout_results,
        )?;
        match outcome {
            LayoutOutcome::Complete(state) => Ok(self.commit(future, tree, state)),
            LayoutOutcome::Cancelled => Ok(None),
        }
    }

    fn commit(&self, future: &TreeFuture, tree: &ResolvedTree, state: LayoutState) -> Option<Arc<LayoutState>> {
        let mut shared = self.shared.lock();
        let superseded = shared
            .committed
            .as_ref()
            .is_some_and(|committed| committed.version() >= future.version());
        if future.is_cancelled() || superseded {
            log::debug!("dropping stale layout v{}", future.version());
            return None;
        }

        shared
            .tree_state
            .commit(tree.states().clone(), future.applied_through());
        for key in tree.states().keys() {
            self.initial_states.take(key);
        }
        tree.measured_cache().freeze();
        shared.committed_cache = Some(tree.measured_cache().clone());

        let state = Arc::new(state);
        self.events
            .commit(state.version(), state.owners().iter().cloned());
        if self.config.time_travel {
            let request = future.request();
            shared
                .history
                .record(DebugSnapshot::capture(tree, request.width, request.height));
        }
        shared.committed = Some(state.clone());
        shared.committed_request = Some((future.request().clone(), future.applied_through()));
        log::debug!("committed layout v{}", state.version());
        Some(state)
    }

    /// Publish the result to joined callers and retire the future.
    fn complete(
        &self,
        future: &Arc<TreeFuture>,
        result: RenderResult<Option<Arc<LayoutState>>>,
    ) -> RenderResult<Option<Arc<LayoutState>>> {
        let shared_result: FutureResult = match &result {
            Ok(state) => Ok(state.clone()),
            Err(err) => Err(SharedError {
                version: future.version(),
                message: err.to_string(),
            }),
        };
        future.finish(shared_result);
        let mut shared = self.shared.lock();
        if shared
            .in_flight
            .as_ref()
            .is_some_and(|running| Arc::ptr_eq(running, future))
        {
            shared.in_flight = None;
        }
        result
    }

    fn fresh_cache(&self) -> Arc<MeasuredResultCache> {
        match &self.shared.lock().committed_cache {
            Some(committed) => MeasuredResultCache::with_delegate(committed.clone()),
            None => MeasuredResultCache::new(),
        }
    }

    fn env_for(
        &self,
        future: &TreeFuture,
        token: CancellationToken,
        cache: Arc<MeasuredResultCache>,
        sync: bool,
    ) -> ResolveEnv {
        ResolveEnv {
            tree_state: future.tree_state().clone(),
            initial_states: self.initial_states.clone(),
            cache,
            token,
            version: future.version(),
            interruptible: self.config.interruptible_resolve && !sync,
        }
    }
}

impl std::fmt::Debug for ComponentTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("ComponentTree")
            .field("committed", &shared.committed.as_ref().map(|s| s.version()))
            .field("in_flight", &shared.in_flight.as_ref().map(|f| f.version()))
            .field("states", &shared.tree_state.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CanResolveInline, Component, downcast_state};
    use crate::error::{CallbackError, RenderError};
    use crate::resolve::RenderContext;
    use crate::testing::{TestInline, TestLeaf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn text(key: &str) -> ComponentRef {
        Component::leaf("Text", TestLeaf::labeled(key, 50.0, 10.0)).key(key).build()
    }

    fn counter() -> ComponentRef {
        Component::column(vec![
            Component::leaf("Counter", TestLeaf::fixed(10.0, 10.0))
                .key("counter")
                .initial_state(Arc::new(|| Arc::new(0i32) as StateRef))
                .build(),
        ])
        .build()
    }

    fn increment() -> StateUpdater {
        Arc::new(|current: Option<&StateRef>| {
            let value = current.and_then(downcast_state::<i32>).copied().unwrap_or(0);
            Arc::new(value + 1) as StateRef
        })
    }

    fn counter_key(tree: &ComponentTree) -> String {
        let layout = tree.committed_layout().unwrap();
        layout.states().keys().next().unwrap().clone()
    }

    /// Renders `child` once `release` lets it, announcing the call first.
    struct Gate {
        child: ComponentRef,
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
        renders: AtomicUsize,
    }

    impl CanResolveInline for Gate {
        fn render(&self, _ctx: &mut RenderContext<'_>) -> Result<Option<ComponentRef>, CallbackError> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            let _ = self.started.lock().send(());
            let _ = self.release.lock().recv();
            Ok(Some(self.child.clone()))
        }
    }

    fn gate() -> (Arc<Gate>, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gate = Arc::new(Gate {
            child: Component::column(vec![text("a")]).build(),
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
            renders: AtomicUsize::new(0),
        });
        (gate, started_rx, release_tx)
    }

    #[test]
    fn test_set_root_commits_layout() {
        let tree = ComponentTree::new(RenderConfig::default());
        let layout = tree
            .set_root_and_size_spec(
                Component::column(vec![text("a"), text("b")]).build(),
                SizeSpec::exactly(100.0),
                SizeSpec::unspecified(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(layout.version(), 1);
        assert!(Arc::ptr_eq(&tree.committed_layout().unwrap(), &layout));
        assert!(tree.in_flight().is_none());
    }

    #[test]
    fn test_equivalent_request_returns_committed() {
        let tree = ComponentTree::new(RenderConfig::default());
        let root = Component::column(vec![text("a")]).build();
        let first = tree.set_root(root.clone()).unwrap().unwrap();
        let again = tree.set_root(root).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let resized = tree
            .set_size_spec(SizeSpec::exactly(40.0), SizeSpec::unspecified())
            .unwrap()
            .unwrap();
        assert_eq!(resized.version(), 2);
    }

    #[test]
    fn test_state_update_applies_on_next_layout() {
        let tree = ComponentTree::new(RenderConfig::default());
        tree.set_root(counter()).unwrap();
        let key = counter_key(&tree);
        assert_eq!(tree.committed_state(&key).and_then(|s| downcast_state::<i32>(&s).copied()), Some(0));
        assert!(tree.initial_states().is_empty());

        tree.update_state(key.clone(), increment());
        assert!(tree.has_pending_updates());
        tree.update_state_sync(key.clone(), increment()).unwrap();
        assert!(!tree.has_pending_updates());
        assert_eq!(tree.committed_state(&key).and_then(|s| downcast_state::<i32>(&s).copied()), Some(2));
    }

    #[test]
    fn test_unhandled_render_error_is_returned() {
        let tree = ComponentTree::new(RenderConfig::default());
        let root = Component::inline("Broken", TestInline::failing("bad")).build();
        let err = tree.set_root(root).unwrap_err();
        assert!(matches!(err, RenderError::Callback { .. }));
        assert!(tree.committed_layout().is_none());
        assert!(tree.in_flight().is_none());
    }

    #[test]
    fn test_equivalent_background_requests_share_one_computation() {
        let tree = Arc::new(ComponentTree::new(RenderConfig::default()));
        let (gate, started, release) = gate();
        let root = Component::inline("Gate", gate.clone()).build();
        let request = LayoutRequest::new(root, SizeSpec::exactly(100.0), SizeSpec::unspecified());

        let first = {
            let (tree, request) = (tree.clone(), request.clone());
            std::thread::spawn(move || tree.calculate(request, false).unwrap())
        };
        started.recv().unwrap();
        let second = {
            let (tree, request) = (tree.clone(), request.clone());
            std::thread::spawn(move || tree.calculate(request, false).unwrap())
        };
        release.send(()).unwrap();

        let a = first.join().unwrap().unwrap();
        let b = second.join().unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(gate.renders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sync_caller_takes_over_interrupted_work() {
        let tree = Arc::new(ComponentTree::new(RenderConfig::default()));
        let (gate, started, release) = gate();
        let root = Component::inline("Gate", gate.clone()).build();
        let request = LayoutRequest::new(root, SizeSpec::exactly(100.0), SizeSpec::unspecified());

        let background = {
            let (tree, request) = (tree.clone(), request.clone());
            std::thread::spawn(move || tree.calculate(request, false).unwrap())
        };
        started.recv().unwrap();

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            release.send(()).unwrap();
        });
        let sync = tree.calculate(request, true).unwrap().unwrap();
        releaser.join().unwrap();

        let from_background = background.join().unwrap().unwrap();
        assert!(Arc::ptr_eq(&sync, &from_background));
        assert_eq!(gate.renders.load(Ordering::SeqCst), 1);
        assert_eq!(sync.outputs().len(), 2);
    }

    #[test]
    fn test_different_request_cancels_in_flight() {
        let tree = Arc::new(ComponentTree::new(RenderConfig::default()));
        let (gate, started, release) = gate();
        let slow = Component::inline("Gate", gate).build();

        let background = {
            let tree = tree.clone();
            std::thread::spawn(move || {
                tree.calculate(
                    LayoutRequest::new(slow, SizeSpec::exactly(100.0), SizeSpec::unspecified()),
                    false,
                )
                .unwrap()
            })
        };
        started.recv().unwrap();

        let fast = tree
            .set_root_and_size_spec(
                Component::column(vec![text("b")]).build(),
                SizeSpec::exactly(100.0),
                SizeSpec::unspecified(),
            )
            .unwrap()
            .unwrap();
        release.send(()).unwrap();

        assert!(background.join().unwrap().is_none());
        assert_eq!(fast.version(), 2);
        assert_eq!(tree.committed_layout().unwrap().version(), 2);
    }

    #[test]
    fn test_rewind_restores_frozen_state() {
        let config = RenderConfig {
            time_travel: true,
            ..RenderConfig::default()
        };
        let tree = ComponentTree::new(config);
        tree.set_root(counter()).unwrap();
        let key = counter_key(&tree);
        tree.update_state_sync(key.clone(), increment()).unwrap();
        assert_eq!(tree.revisions(), vec![1, 2]);

        let rewound = tree.rewind(1).unwrap().unwrap();
        assert_eq!(rewound.version(), 3);
        assert_eq!(tree.committed_state(&key).and_then(|s| downcast_state::<i32>(&s).copied()), Some(0));
        assert!(tree.rewind(99).unwrap().is_none());
        assert_eq!(tree.snapshot(3).unwrap().frozen_state.get(&key).map(String::as_str), Some("0"));
    }

    #[test]
    fn test_history_off_by_default() {
        let tree = ComponentTree::new(RenderConfig::default());
        tree.set_root(counter()).unwrap();
        assert!(tree.revisions().is_empty());
    }
}
