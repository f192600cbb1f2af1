//! Resolver - iterative, resumable component tree walk.
//!
//! The walk is driven by an explicit stack of [`ResolveTask`]s instead of
//! recursion, so the whole continuation of an interrupted resolve is plain
//! data: the partial arena, the remaining tasks, the key generator and the
//! states seen so far. [`ResolveStateContext::resume`] picks it up on any
//! thread.
//!
//! # Processing one task
//!
//! ```text
//! pop task ─▶ global key ─▶ state ─▶ error scope ─┬─ Inline: render, push child (merged)
//!                                                  └─ other:  create node, push children reversed
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::engine::{
    ComponentKind, ComponentRef, ErrorScope, InitialStateContainer, KeyGenerator,
    MAX_COMPONENT_TYPE_ID, StateRef, TreeState, downcast_state,
};
use crate::error::{CallbackError, CallbackPhase, RenderError, RenderResult};
use crate::types::{Size, SizeSpec};

use super::node::content_for;
use super::{
    CancellationToken, LayoutNode, MeasuredResultCache, NodeComponent, NodeId, ResolvedTree,
    TokenState,
};

// =============================================================================
// Environment
// =============================================================================

/// Everything a resolve reads besides the component tree.
///
/// Constructed per computation by the owning tree and cloned into nested
/// resolves; there is no global state.
#[derive(Clone)]
pub struct ResolveEnv {
    pub tree_state: Arc<TreeState>,
    pub initial_states: Arc<InitialStateContainer>,
    pub cache: Arc<MeasuredResultCache>,
    pub token: CancellationToken,
    pub version: u64,
    /// Honor interruption requests (cancellation is always honored).
    pub interruptible: bool,
}

impl ResolveEnv {
    /// Environment with empty state, a fresh cache and a fresh token.
    pub fn detached(version: u64) -> Self {
        Self {
            tree_state: Arc::new(TreeState::new()),
            initial_states: InitialStateContainer::new(),
            cache: MeasuredResultCache::new(),
            token: CancellationToken::new(),
            version,
            interruptible: true,
        }
    }

    pub(crate) fn non_interruptible(&self) -> Self {
        Self {
            interruptible: false,
            ..self.clone()
        }
    }
}

// =============================================================================
// RenderContext
// =============================================================================

/// Context handed to render callbacks.
pub struct RenderContext<'a> {
    env: &'a ResolveEnv,
    global_key: &'a str,
    state: Option<StateRef>,
    scope: &'a ErrorScope,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(
        env: &'a ResolveEnv,
        global_key: &'a str,
        state: Option<StateRef>,
        scope: &'a ErrorScope,
    ) -> Self {
        Self {
            env,
            global_key,
            state,
            scope,
        }
    }

    pub fn global_key(&self) -> &str {
        self.global_key
    }

    pub fn state(&self) -> Option<&StateRef> {
        self.state.as_ref()
    }

    /// State downcast to its concrete type.
    pub fn state_as<T: 'static>(&self) -> Option<&T> {
        self.state.as_ref().and_then(downcast_state::<T>)
    }

    pub fn version(&self) -> u64 {
        self.env.version
    }

    /// Measure `component` as if it were laid out under this component.
    ///
    /// The result is recorded in the measured result cache so layout does
    /// not measure the same component instance again.
    pub fn measure(
        &self,
        component: &ComponentRef,
        width: SizeSpec,
        height: SizeSpec,
    ) -> Result<Size, CallbackError> {
        if let Some(size) = self.env.cache.get(component, width, height) {
            return Ok(size);
        }

        let size = match component.kind() {
            ComponentKind::Leaf(leaf) => leaf.measure(width, height)?,
            _ => {
                let env = self.env.non_interruptible();
                let tree = resolve_nested(&env, component.clone(), self.global_key, self.scope)
                    .map_err(|err| CallbackError::with_source("measuring child failed", err))?;
                match tree {
                    Some(tree) => crate::layout::measure_tree(&env, &tree, width, height)
                        .map_err(|err| CallbackError::with_source("measuring child failed", err))?,
                    None => Size::ZERO,
                }
            }
        };
        self.env.cache.record(component, width, height, size);
        Ok(size)
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Result of running (or resuming) a resolve.
pub enum ResolveOutcome {
    Complete(ResolvedTree),
    /// Paused at a node boundary; resume to finish.
    Interrupted(ResolveStateContext),
    /// Stopped; nothing to keep.
    Cancelled,
}

impl ResolveOutcome {
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Complete(_) => "complete",
            Self::Interrupted(_) => "interrupted",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }

    pub fn into_tree(self) -> Option<ResolvedTree> {
        match self {
            Self::Complete(tree) => Some(tree),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ResolveOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(tree) => f.debug_tuple("Complete").field(tree).finish(),
            Self::Interrupted(ctx) => f
                .debug_struct("Interrupted")
                .field("resolved", &ctx.nodes.len())
                .field("remaining", &ctx.stack.len())
                .finish(),
            Self::Cancelled => f.write_str("Cancelled"),
        }
    }
}

// =============================================================================
// Continuation
// =============================================================================

#[derive(Clone)]
struct ResolveTask {
    component: ComponentRef,
    parent: Option<NodeId>,
    parent_key: Option<String>,
    /// Composites merging into the next node, outermost first.
    merged: SmallVec<[NodeComponent; 2]>,
    scope: ErrorScope,
}

/// Saved state of a resolve: partial arena plus remaining work.
pub struct ResolveStateContext {
    env: ResolveEnv,
    root_component: ComponentRef,
    nodes: Vec<LayoutNode>,
    root: Option<NodeId>,
    stack: Vec<ResolveTask>,
    keys: KeyGenerator,
    states: HashMap<String, StateRef>,
}

impl ResolveStateContext {
    fn start(
        env: ResolveEnv,
        root_component: ComponentRef,
        parent_key: Option<&str>,
        scope: ErrorScope,
    ) -> Self {
        let task = ResolveTask {
            component: root_component.clone(),
            parent: None,
            parent_key: parent_key.map(str::to_string),
            merged: SmallVec::new(),
            scope,
        };
        Self {
            env,
            root_component,
            nodes: Vec::new(),
            root: None,
            stack: vec![task],
            keys: KeyGenerator::new(),
            states: HashMap::new(),
        }
    }

    /// Nodes created so far.
    pub fn resolved_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Components still waiting on the work stack.
    pub fn remaining(&self) -> usize {
        self.stack.len()
    }

    pub fn version(&self) -> u64 {
        self.env.version
    }

    /// Continue under a new token.
    pub fn resume(mut self, token: CancellationToken) -> RenderResult<ResolveOutcome> {
        log::debug!(
            "resuming resolve v{} with {} nodes done, {} pending",
            self.env.version,
            self.nodes.len(),
            self.stack.len()
        );
        self.env.token = token;
        self.run()
    }

    fn run(mut self) -> RenderResult<ResolveOutcome> {
        while let Some(task) = self.stack.pop() {
            match self.env.token.state() {
                TokenState::Cancelled => {
                    log::debug!("resolve v{} cancelled", self.env.version);
                    return Ok(ResolveOutcome::Cancelled);
                }
                TokenState::Interrupted if self.env.interruptible => {
                    self.stack.push(task);
                    log::debug!(
                        "resolve v{} interrupted after {} nodes",
                        self.env.version,
                        self.nodes.len()
                    );
                    return Ok(ResolveOutcome::Interrupted(self));
                }
                _ => {}
            }
            self.step(task)?;
        }

        log::debug!("resolved v{} into {} nodes", self.env.version, self.nodes.len());
        Ok(ResolveOutcome::Complete(ResolvedTree {
            nodes: self.nodes.into_iter().map(Arc::new).collect(),
            root: self.root,
            states: self.states,
            cache: self.env.cache.clone(),
            root_component: self.root_component,
            version: self.env.version,
        }))
    }

    fn step(&mut self, task: ResolveTask) -> RenderResult<()> {
        let component = task.component;
        let type_id = component.component_type_id().value();
        if type_id == 0 || type_id > MAX_COMPONENT_TYPE_ID {
            return Err(RenderError::ComponentTypeOverflow {
                type_id,
                name: component.name().to_string(),
            });
        }

        let global_key = self.keys.global_key(
            task.parent_key.as_deref(),
            component.component_type_id(),
            component.key(),
        );
        let state = self.state_for(&component, &global_key);
        let inner_scope = match &component.props().error_handler {
            Some(handler) => task.scope.push(global_key.clone(), handler.clone()),
            None => task.scope.clone(),
        };
        let entry = NodeComponent {
            component: component.clone(),
            global_key: global_key.clone(),
            scope: task.scope.clone(),
        };
        log::trace!("resolve {} ({})", global_key, component.kind().name());

        if let ComponentKind::Inline(spec) = component.kind() {
            let rendered = {
                let mut ctx = RenderContext::new(&self.env, &global_key, state, &task.scope);
                spec.render(&mut ctx)
            };
            match rendered {
                Ok(Some(child)) => {
                    let mut merged = task.merged;
                    merged.push(entry);
                    self.stack.push(ResolveTask {
                        component: child,
                        parent: task.parent,
                        parent_key: Some(global_key),
                        merged,
                        scope: inner_scope,
                    });
                }
                Ok(None) => log::trace!("{global_key} rendered nothing"),
                Err(error) => {
                    task.scope
                        .route(component.name(), CallbackPhase::Render, error)?;
                }
            }
            return Ok(());
        }

        let Some(content) = content_for(component.kind()) else {
            return Ok(());
        };
        let mut chain: SmallVec<[NodeComponent; 2]> = SmallVec::new();
        chain.push(entry);
        chain.extend(task.merged.into_iter().rev());

        let mut node = LayoutNode::new(chain, content);
        node.parent = task.parent;
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(node);
        match task.parent {
            Some(parent) => self.nodes[parent.index()].children.push(id),
            None => self.root = Some(id),
        }

        for child in component.children().iter().rev() {
            self.stack.push(ResolveTask {
                component: child.clone(),
                parent: Some(id),
                parent_key: Some(global_key.clone()),
                merged: SmallVec::new(),
                scope: inner_scope.clone(),
            });
        }
        Ok(())
    }

    fn state_for(&mut self, component: &ComponentRef, global_key: &str) -> Option<StateRef> {
        let base = match (self.env.tree_state.committed(global_key), component.initial_state()) {
            (None, Some(create)) => Some(
                self.env
                    .initial_states
                    .get_or_create(global_key, || create()),
            ),
            _ => None,
        };
        let state = self.env.tree_state.state_for_resolve(global_key, base);
        if let Some(state) = &state {
            self.states.insert(global_key.to_string(), state.clone());
        }
        state
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Resolve a root component.
pub fn resolve(env: ResolveEnv, root: ComponentRef) -> RenderResult<ResolveOutcome> {
    ResolveStateContext::start(env, root, None, ErrorScope::root()).run()
}

/// Resume an interrupted resolve.
///
/// Anything but [`ResolveOutcome::Interrupted`] is an error.
pub fn resume(outcome: ResolveOutcome, token: CancellationToken) -> RenderResult<ResolveOutcome> {
    match outcome {
        ResolveOutcome::Interrupted(ctx) => ctx.resume(token),
        other => Err(RenderError::NotPartial {
            state: other.state_name(),
        }),
    }
}

/// Resolve a subtree under an existing key, without interruption.
///
/// Returns `None` when the computation was cancelled.
pub(crate) fn resolve_nested(
    env: &ResolveEnv,
    root: ComponentRef,
    parent_key: &str,
    scope: &ErrorScope,
) -> RenderResult<Option<ResolvedTree>> {
    let ctx = ResolveStateContext::start(env.non_interruptible(), root, Some(parent_key), scope.clone());
    Ok(ctx.run()?.into_tree())
}
