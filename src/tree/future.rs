//! Tree futures - one shared, cancellable layout computation.
//!
//! A future is created for a [`LayoutRequest`] and shared by every caller
//! asking for an equivalent request while it runs. Exactly one caller drives
//! it at a time; the others wait on its condition variable.
//!
//! ```text
//!   Pending ──claim──▶ Running ──finish──▶ Done
//!                        │  ▲
//!          interrupt+park│  │claim (sync caller resumes)
//!                        ▼  │
//!                       Parked
//! ```
//!
//! A synchronous caller joining a running future interrupts it. The driver
//! parks its resolve continuation at the next node boundary and the
//! synchronous caller resumes it on its own thread.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::engine::{ComponentRef, PendingLayoutGuard, TreeState};
use crate::error::RenderError;
use crate::layout::LayoutState;
use crate::resolve::{CancellationToken, ResolveStateContext};
use crate::types::SizeSpec;

/// Root component plus root size specs.
#[derive(Clone, Debug)]
pub struct LayoutRequest {
    pub root: ComponentRef,
    pub width: SizeSpec,
    pub height: SizeSpec,
}

impl LayoutRequest {
    pub fn new(root: ComponentRef, width: SizeSpec, height: SizeSpec) -> Self {
        Self { root, width, height }
    }

    /// Same root instance under the same specs.
    pub fn is_equivalent_to(&self, other: &LayoutRequest) -> bool {
        Arc::ptr_eq(&self.root, &other.root) && self.width == other.width && self.height == other.height
    }
}

/// What a finished future hands its callers.
///
/// `None` when the computation was cancelled or superseded.
pub type FutureResult = Result<Option<Arc<LayoutState>>, SharedError>;

/// Error of a finished future, readable by every joined caller.
#[derive(Debug, Clone)]
pub struct SharedError {
    pub version: u64,
    pub message: String,
}

impl From<SharedError> for RenderError {
    fn from(err: SharedError) -> Self {
        RenderError::Joined {
            version: err.version,
            message: err.message,
        }
    }
}

enum Slot {
    Pending,
    Running,
    Parked(Box<ResolveStateContext>),
    Done(FutureResult),
}

impl Slot {
    fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Parked(_) => "parked",
            Self::Done(_) => "done",
        }
    }
}

struct Inner {
    slot: Slot,
    token: CancellationToken,
    sync_waiters: usize,
    _pending: Option<PendingLayoutGuard>,
}

/// What a caller should do next with a future.
pub(crate) enum Claim {
    /// Start the computation from scratch.
    Start(CancellationToken),
    /// Continue a parked resolve.
    Resume(Box<ResolveStateContext>, CancellationToken),
    Done(FutureResult),
}

/// One in-flight computation shared by coalesced callers.
pub struct TreeFuture {
    version: u64,
    request: LayoutRequest,
    /// State snapshot the resolve reads, queued updates applied.
    tree_state: Arc<TreeState>,
    applied_through: u64,
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl TreeFuture {
    pub(crate) fn new(
        version: u64,
        request: LayoutRequest,
        tree_state: Arc<TreeState>,
        pending: PendingLayoutGuard,
    ) -> Arc<Self> {
        Arc::new(Self {
            version,
            request,
            applied_through: tree_state.last_update_seq(),
            tree_state,
            inner: Mutex::new(Inner {
                slot: Slot::Pending,
                token: CancellationToken::new(),
                sync_waiters: 0,
                _pending: Some(pending),
            }),
            changed: Condvar::new(),
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn request(&self) -> &LayoutRequest {
        &self.request
    }

    pub(crate) fn tree_state(&self) -> &Arc<TreeState> {
        &self.tree_state
    }

    /// Last queued state update the snapshot includes.
    pub fn applied_through(&self) -> u64 {
        self.applied_through
    }

    /// Token of the current run.
    pub(crate) fn token(&self) -> CancellationToken {
        self.inner.lock().token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().token.is_cancelled()
    }

    pub fn is_done(&self) -> bool {
        matches!(self.inner.lock().slot, Slot::Done(_))
    }

    /// Stop the computation and discard its work.
    pub fn cancel(&self) {
        self.inner.lock().token.cancel();
    }

    /// Ask the driver to park at the next node boundary.
    pub fn interrupt(&self) {
        self.inner.lock().token.interrupt();
    }

    /// Decide what the calling thread does next, blocking while another
    /// thread drives the future.
    ///
    /// A synchronous caller interrupts the driver so the work comes back to
    /// it as [`Claim::Resume`].
    pub(crate) fn claim(&self, sync: bool) -> Claim {
        let mut inner = self.inner.lock();
        if sync {
            inner.sync_waiters += 1;
        }
        let claim = loop {
            match std::mem::replace(&mut inner.slot, Slot::Running) {
                Slot::Pending => break Claim::Start(inner.token.clone()),
                Slot::Parked(ctx) => {
                    if !inner.token.is_cancelled() {
                        inner.token = CancellationToken::new();
                    }
                    break Claim::Resume(ctx, inner.token.clone());
                }
                Slot::Done(result) => {
                    inner.slot = Slot::Done(result.clone());
                    break Claim::Done(result);
                }
                Slot::Running => {
                    if sync {
                        inner.token.interrupt();
                    }
                    self.changed.wait(&mut inner);
                }
            }
        };
        if sync {
            inner.sync_waiters -= 1;
        }
        claim
    }

    /// Hand an interrupted resolve to a waiting synchronous caller.
    ///
    /// Returns the continuation back (with a fresh token) when nobody is
    /// waiting for it, so the driver keeps going itself.
    pub(crate) fn park(
        &self,
        ctx: ResolveStateContext,
    ) -> Option<(ResolveStateContext, CancellationToken)> {
        let mut inner = self.inner.lock();
        if inner.token.is_cancelled() {
            return Some((ctx, inner.token.clone()));
        }
        if inner.sync_waiters == 0 {
            inner.token = CancellationToken::new();
            return Some((ctx, inner.token.clone()));
        }
        log::debug!("parking layout v{} for a synchronous caller", self.version);
        inner.slot = Slot::Parked(Box::new(ctx));
        self.changed.notify_all();
        None
    }

    /// Publish the result and wake every waiter.
    pub(crate) fn finish(&self, result: FutureResult) {
        let mut inner = self.inner.lock();
        log::trace!("tree future v{} {} -> done", self.version, inner.slot.name());
        inner.slot = Slot::Done(result);
        inner._pending = None;
        self.changed.notify_all();
    }

    /// Block until the future is done.
    pub fn wait(&self) -> FutureResult {
        let mut inner = self.inner.lock();
        loop {
            if let Slot::Done(result) = &inner.slot {
                return result.clone();
            }
            self.changed.wait(&mut inner);
        }
    }
}

impl std::fmt::Debug for TreeFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeFuture")
            .field("version", &self.version)
            .field("state", &self.inner.lock().slot.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Component, InitialStateContainer, TreeState};
    use crate::resolve::{ResolveEnv, ResolveOutcome, resolve};
    use crate::testing::TestLeaf;

    fn request() -> LayoutRequest {
        LayoutRequest::new(
            Component::leaf("Text", TestLeaf::fixed(1.0, 1.0)).build(),
            SizeSpec::exactly(10.0),
            SizeSpec::unspecified(),
        )
    }

    fn future(request: LayoutRequest) -> Arc<TreeFuture> {
        let container = InitialStateContainer::new();
        TreeFuture::new(1, request, Arc::new(TreeState::new()), container.register())
    }

    #[test]
    fn test_equivalence_is_root_identity_and_specs() {
        let a = request();
        let same = LayoutRequest::new(a.root.clone(), a.width, a.height);
        let other_root = request();
        let other_spec = LayoutRequest::new(a.root.clone(), SizeSpec::exactly(20.0), a.height);
        assert!(a.is_equivalent_to(&same));
        assert!(!a.is_equivalent_to(&other_root));
        assert!(!a.is_equivalent_to(&other_spec));
    }

    #[test]
    fn test_first_claim_starts_then_done_is_shared() {
        let future = future(request());
        assert!(matches!(future.claim(false), Claim::Start(_)));
        future.finish(Ok(None));
        assert!(future.is_done());
        assert!(matches!(future.claim(true), Claim::Done(Ok(None))));
        assert!(matches!(future.wait(), Ok(None)));
    }

    #[test]
    fn test_interrupted_resolve_continues_without_sync_waiter() {
        let future = future(request());
        let Claim::Start(token) = future.claim(false) else {
            panic!("expected start");
        };
        token.interrupt();
        let env = ResolveEnv {
            token,
            ..ResolveEnv::detached(1)
        };
        let ResolveOutcome::Interrupted(ctx) = resolve(env, future.request().root.clone()).unwrap() else {
            panic!("expected interruption");
        };
        let (ctx, token) = future.park(ctx).expect("nobody waits, driver keeps the work");
        assert!(!token.is_interrupted());
        assert!(ctx.resume(token).unwrap().into_tree().is_some());
    }

    #[test]
    fn test_sync_caller_takes_parked_work() {
        let future = future(request());
        let Claim::Start(token) = future.claim(false) else {
            panic!("expected start");
        };

        let joiner = {
            let future = future.clone();
            std::thread::spawn(move || match future.claim(true) {
                Claim::Resume(ctx, token) => {
                    let tree = ctx.resume(token).unwrap().into_tree();
                    future.finish(Ok(None));
                    tree.is_some()
                }
                _ => false,
            })
        };

        while !token.is_interrupted() {
            std::thread::yield_now();
        }
        let env = ResolveEnv {
            token,
            ..ResolveEnv::detached(1)
        };
        let ResolveOutcome::Interrupted(ctx) = resolve(env, future.request().root.clone()).unwrap() else {
            panic!("expected interruption");
        };
        assert!(future.park(ctx).is_none());
        assert!(joiner.join().unwrap());
        assert!(matches!(future.wait(), Ok(None)));
    }

    #[test]
    fn test_shared_error_converts_to_joined() {
        let err: RenderError = SharedError {
            version: 4,
            message: "boom".to_string(),
        }
        .into();
        assert!(matches!(err, RenderError::Joined { version: 4, .. }));
    }
}
