//! Layout engine - resolved tree in, positioned result tree out.
//!
//! # Pass structure
//!
//! ```text
//! ResolvedTree ─▶ result arena ─▶ solver tree ─▶ compute (measure callbacks)
//!                                                        │
//!          LayoutState ◀── collect ◀── graft nested ◀── extract geometry
//! ```
//!
//! The solver calls back for every leaf and nested tree holder. A leaf
//! measurement is looked up, in order, in the node's own last measurement,
//! the measured result cache, and the previous layout's diff record before
//! the leaf is asked. Nested tree holders render their subtree with the
//! specs they are handed, resolve it, and lay it out recursively.
//!
//! Measure errors do not abort the solver: they are routed to the node's
//! error scope, the node measures as zero, and the first unhandled error is
//! returned once the pass is over.

use std::collections::HashMap;

use taffy::{AvailableSpace, NodeId as SolverNode};

use crate::engine::StateRef;
use crate::error::{CallbackPhase, RenderError, RenderResult};
use crate::resolve::{
    LayoutNode, NodeContent, RenderContext, ResolveEnv, ResolvedTree, resolve_nested,
};
use crate::types::{Size, SizeSpec};

use super::collect::collect_results;
use super::taffy_bridge::{build_solver_tree, from_taffy_edges, to_available_space, to_size_spec};
use super::{DiffRecord, LayoutResultTree, LayoutState, NestedResult, ResultNode};

/// Outcome of [`calculate_layout`].
#[derive(Debug)]
pub enum LayoutOutcome {
    Complete(LayoutState),
    /// The computation's token was cancelled; nothing was produced.
    Cancelled,
}

impl LayoutOutcome {
    pub fn into_state(self) -> Option<LayoutState> {
        match self {
            Self::Complete(state) => Some(state),
            Self::Cancelled => None,
        }
    }
}

type DiffRecords = HashMap<String, DiffRecord>;

// =============================================================================
// Entry points
// =============================================================================

/// Lay out `tree` under the given root specs and collect its outputs.
///
/// `previous` is the layout this one replaces: its diff records memoize
/// leaf measurements and its output ids are reused for stable keys.
pub fn calculate_layout(
    env: &ResolveEnv,
    tree: &ResolvedTree,
    width: SizeSpec,
    height: SizeSpec,
    previous: Option<&LayoutState>,
    retain_results: bool,
) -> RenderResult<LayoutOutcome> {
    let diffs = previous.map(|state| &state.diff_records);
    let Some(results) = compute_results(env, tree, width, height, diffs)? else {
        log::debug!("layout v{} cancelled", env.version);
        return Ok(LayoutOutcome::Cancelled);
    };
    if env.token.is_cancelled() {
        return Ok(LayoutOutcome::Cancelled);
    }

    let state = collect_results(results, previous, env.version, retain_results)?;
    log::debug!(
        "layout v{}: {} outputs, size {}x{}",
        state.version,
        state.outputs.len(),
        state.size.width,
        state.size.height
    );
    Ok(LayoutOutcome::Complete(state))
}

/// Size of `tree` under the given specs, without collecting outputs.
pub fn measure_tree(
    env: &ResolveEnv,
    tree: &ResolvedTree,
    width: SizeSpec,
    height: SizeSpec,
) -> RenderResult<Size> {
    Ok(compute_results(env, tree, width, height, None)?.map_or(Size::ZERO, |r| r.root_size()))
}

/// Run the solver over `tree`. `None` when cancelled.
pub(crate) fn compute_results(
    env: &ResolveEnv,
    tree: &ResolvedTree,
    width: SizeSpec,
    height: SizeSpec,
    previous: Option<&DiffRecords>,
) -> RenderResult<Option<LayoutResultTree>> {
    let mut results = LayoutResultTree::new(width, height);
    results.states = tree.states().clone();
    let Some(root) = build_arena(tree, &mut results) else {
        return Ok(Some(results));
    };
    if env.token.is_cancelled() {
        return Ok(None);
    }

    let (mut solver, solver_nodes) = build_solver_tree(&results, width, height)?;
    let available = taffy::Size {
        width: to_available_space(width),
        height: to_available_space(height),
    };

    let mut pass = MeasurePass {
        env,
        previous,
        error: None,
        cancelled: false,
    };
    solver.compute_layout_with_measure(
        solver_nodes[root],
        available,
        |known: taffy::Size<Option<f32>>,
         avail: taffy::Size<AvailableSpace>,
         _node: SolverNode,
         context: Option<&mut usize>,
         _style: &taffy::Style| {
            let Some(&mut index) = context else {
                return taffy::Size::ZERO;
            };
            let w = to_size_spec(known.width, avail.width);
            let h = to_size_spec(known.height, avail.height);
            let size = pass.measure(&mut results, index, w, h);
            taffy::Size {
                width: known.width.unwrap_or(size.width),
                height: known.height.unwrap_or(size.height),
            }
        },
    )?;

    if pass.cancelled || env.token.is_cancelled() {
        return Ok(None);
    }

    for (index, &solver_node) in solver_nodes.iter().enumerate() {
        let layout = solver.layout(solver_node)?;
        let result = &mut results.nodes[index];
        result.x = layout.location.x;
        result.y = layout.location.y;
        result.width = layout.size.width;
        result.height = layout.size.height;
        result.padding = from_taffy_edges(layout.padding);
        result.border = from_taffy_edges(layout.border);
    }

    if let Some(error) = pass.error {
        return Err(error);
    }

    if !graft_nested_trees(env, &mut results, previous)? {
        return Ok(None);
    }
    Ok(Some(results))
}

// =============================================================================
// Arena
// =============================================================================

/// Copy `tree` into `results` in pre-order. Returns the root index.
fn build_arena(tree: &ResolvedTree, results: &mut LayoutResultTree) -> Option<usize> {
    let root = tree.root()?;
    results.nodes.reserve(tree.len());

    let mut stack = vec![(root, None)];
    while let Some((id, parent)) = stack.pop() {
        let index = results.nodes.len();
        let node = tree.node(id);
        results.nodes.push(ResultNode::new(node.clone(), parent));
        match parent {
            Some(parent) => results.nodes[parent].children.push(index),
            None => results.root = Some(index),
        }
        for &child in node.children.iter().rev() {
            stack.push((child, Some(index)));
        }
    }
    results.root
}

// =============================================================================
// Measurement
// =============================================================================

struct MeasurePass<'a> {
    env: &'a ResolveEnv,
    previous: Option<&'a DiffRecords>,
    /// First unhandled measure error.
    error: Option<RenderError>,
    cancelled: bool,
}

impl MeasurePass<'_> {
    fn measure(
        &mut self,
        results: &mut LayoutResultTree,
        index: usize,
        width: SizeSpec,
        height: SizeSpec,
    ) -> Size {
        if self.cancelled || self.env.token.is_cancelled() {
            self.cancelled = true;
            return Size::ZERO;
        }
        if let Some(size) = results.nodes[index].cached_measurement(width, height) {
            return size;
        }

        let node = results.nodes[index].node.clone();
        let size = match &node.content {
            NodeContent::Leaf(_) => self.measure_leaf(&node, width, height),
            NodeContent::NestedTreeHolder(_) => {
                let states = &results.states;
                match lay_out_nested(self.env, &node, states, width, height, self.previous) {
                    Ok(Some(tree)) => {
                        let size = tree.root_size();
                        results.nodes[index].nested = Some(NestedResult {
                            width_spec: width,
                            height_spec: height,
                            tree,
                        });
                        size
                    }
                    Ok(None) => {
                        self.cancelled = true;
                        Size::ZERO
                    }
                    Err(error) => {
                        self.error.get_or_insert(error);
                        Size::ZERO
                    }
                }
            }
            NodeContent::Container => Size::ZERO,
        };

        results.nodes[index].record_measurement(width, height, size);
        size
    }

    fn measure_leaf(&mut self, node: &LayoutNode, width: SizeSpec, height: SizeSpec) -> Size {
        let Some(leaf) = node.leaf() else {
            return Size::ZERO;
        };

        if let Some(size) = self.env.cache.get(&node.tail().component, width, height) {
            log::trace!("{}: measured during render", node.global_key());
            return size;
        }

        if !leaf.forces_remeasure() {
            let reused = self
                .previous
                .and_then(|diffs| diffs.get(node.global_key()))
                .filter(|record| leaf.is_equivalent_to(record.leaf.as_ref()))
                .and_then(|record| record.measured(width, height));
            if let Some(size) = reused {
                log::trace!("{}: reusing previous measurement", node.global_key());
                return size;
            }
        }

        match leaf.measure(width, height) {
            Ok(size) => size,
            Err(error) => {
                if let Err(unhandled) =
                    node.error_scope().route(node.name(), CallbackPhase::Measure, error)
                {
                    self.error.get_or_insert(unhandled);
                }
                Size::ZERO
            }
        }
    }
}

// =============================================================================
// Nested trees
// =============================================================================

/// Render, resolve and lay out the subtree of a nested tree holder.
///
/// `None` when cancelled. A holder that renders nothing (or whose render
/// error was handled) yields an empty tree.
fn lay_out_nested(
    env: &ResolveEnv,
    node: &LayoutNode,
    states: &HashMap<String, StateRef>,
    width: SizeSpec,
    height: SizeSpec,
    previous: Option<&DiffRecords>,
) -> RenderResult<Option<LayoutResultTree>> {
    let NodeContent::NestedTreeHolder(holder) = &node.content else {
        return Ok(Some(LayoutResultTree::new(width, height)));
    };
    let tail = node.tail();

    let rendered = {
        let state = states.get(&tail.global_key).cloned();
        let mut ctx = RenderContext::new(env, &tail.global_key, state, &tail.scope);
        holder.render_with_size(&mut ctx, width, height)
    };
    let child = match rendered {
        Ok(Some(child)) => child,
        Ok(None) => return Ok(Some(LayoutResultTree::new(width, height))),
        Err(error) => {
            tail.scope.route(node.name(), CallbackPhase::Render, error)?;
            return Ok(Some(LayoutResultTree::new(width, height)));
        }
    };

    let Some(subtree) = resolve_nested(env, child, &tail.global_key, &node.child_scope())? else {
        return Ok(None);
    };
    compute_results(env, &subtree, width, height, previous)
}

/// Attach every holder's nested tree, re-laying it out when the holder's
/// final size differs from what it was measured at.
///
/// Returns `false` when cancelled.
fn graft_nested_trees(
    env: &ResolveEnv,
    results: &mut LayoutResultTree,
    previous: Option<&DiffRecords>,
) -> RenderResult<bool> {
    let holders: Vec<usize> = (0..results.nodes.len())
        .filter(|&i| results.nodes[i].node.is_nested_tree_holder())
        .collect();

    for index in holders {
        let size = results.nodes[index].size();
        let nested = match results.nodes[index].nested.take() {
            Some(nested) if nested.tree.root_size() == size => nested.tree,
            _ => {
                let node = results.nodes[index].node.clone();
                let width = SizeSpec::exactly(size.width);
                let height = SizeSpec::exactly(size.height);
                match lay_out_nested(env, &node, &results.states, width, height, previous)? {
                    Some(tree) => tree,
                    None => return Ok(false),
                }
            }
        };
        results.graft(index, nested);
    }
    Ok(true)
}
