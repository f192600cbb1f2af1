//! Collect results - flattens a laid out result tree into render units.
//!
//! One pre-order walk emits, for every node, in this order:
//!
//! ```text
//! [HOST]  BACKGROUND  CONTENT  <children...>  FOREGROUND  BORDER
//! ```
//!
//! The root always owns the host output with id 0, which sits at index 0
//! even when the tree is empty. A node that needs a host (handlers, node
//! info, transition key, `wrap_in_view`, nested tree) opens a new level:
//! everything it and its descendants emit mounts into it.
//!
//! The same walk records visibility outputs, transition and working range
//! registrations, the diff records for measurement reuse and the owners the
//! event indirection table is committed with.

use std::collections::HashMap;

use crate::animation::TransitionId;
use crate::engine::{DispatchInfo, parent_global_key};
use crate::error::RenderResult;
use crate::mount::DrawableSpec;
use crate::resolve::LayoutNode;
use crate::types::{OutputFlags, Rect};

use super::result::pixel_rect;
use super::{
    DiffRecord, LayoutResultTree, LayoutState, NodeInfo, OutputIdCalculator, OutputUnitType,
    ROOT_HOST_ID, RenderUnit, TransitionRecord, UnitContent, UpdateState, ViewNodeInfo,
    VisibilityOutput, WorkingRangeRecord,
};

/// Flatten `results` into a [`LayoutState`].
pub(crate) fn collect_results(
    results: LayoutResultTree,
    previous: Option<&LayoutState>,
    version: u64,
    retain_results: bool,
) -> RenderResult<LayoutState> {
    let mut collector = Collector {
        results: &results,
        previous,
        ids: OutputIdCalculator::new(previous.map(LayoutState::output_keys)),
        version,
        outputs: Vec::with_capacity(results.len() * 2 + 1),
        output_keys: HashMap::new(),
        visibility_outputs: Vec::new(),
        transitions: Vec::new(),
        working_ranges: Vec::new(),
        diff_records: HashMap::new(),
        owners: Vec::new(),
    };

    collector.add_root_host()?;
    if let Some(root) = results.root() {
        collector.visit(root, 0.0, 0.0, ROOT_HOST_ID, 0)?;
    }

    let Collector {
        outputs,
        output_keys,
        visibility_outputs,
        transitions,
        working_ranges,
        diff_records,
        owners,
        ..
    } = collector;

    let id_to_index = outputs
        .iter()
        .enumerate()
        .map(|(index, unit)| (unit.id, index))
        .collect();
    let mut tops: Vec<usize> = (0..outputs.len()).collect();
    tops.sort_by_key(|&i| (outputs[i].bounds.top, i));
    let mut bottoms: Vec<usize> = (0..outputs.len()).collect();
    bottoms.sort_by_key(|&i| (outputs[i].bounds.bottom, i));

    Ok(LayoutState {
        version,
        width_spec: results.width_spec,
        height_spec: results.height_spec,
        size: results.root_size(),
        outputs,
        id_to_index,
        tops,
        bottoms,
        visibility_outputs,
        transitions,
        working_ranges,
        diff_records,
        output_keys,
        states: results.states.clone(),
        owners,
        result_tree: retain_results.then_some(results),
    })
}

/// Whether `node` must be backed by its own host output.
fn needs_host(node: &LayoutNode) -> bool {
    let props = &node.props;
    props.has_interaction_handlers()
        || props.has_accessibility_info()
        || props.transition_key.is_some()
        || props.wrap_in_view
        || props.hosts_nested_tree
        || props.view_tag.is_some()
        || props.alpha.is_some()
}

struct Collector<'a> {
    results: &'a LayoutResultTree,
    previous: Option<&'a LayoutState>,
    ids: OutputIdCalculator<'a>,
    version: u64,
    outputs: Vec<RenderUnit>,
    output_keys: HashMap<(String, OutputUnitType), u64>,
    visibility_outputs: Vec<VisibilityOutput>,
    transitions: Vec<TransitionRecord>,
    working_ranges: Vec<WorkingRangeRecord>,
    diff_records: HashMap<String, DiffRecord>,
    owners: Vec<(String, DispatchInfo)>,
}

impl Collector<'_> {
    fn add_root_host(&mut self) -> RenderResult<()> {
        let (key, bounds) = match self.results.root() {
            Some(root) => {
                let node = self.results.node(root);
                (
                    node.node.global_key().to_string(),
                    pixel_rect(node.x, node.y, node.width, node.height),
                )
            }
            None => (String::new(), Rect::EMPTY),
        };

        let mut unit = RenderUnit::new(OutputUnitType::Host, UnitContent::Host, bounds, ROOT_HOST_ID, key);
        if let Some(root) = self.results.root() {
            apply_host_data(&mut unit, &self.results.node(root).node)?;
        }
        unit.update_state = match self.previous.and_then(|p| p.outputs.first()) {
            Some(previous) if unit.is_equivalent_to(previous) => UpdateState::Updated,
            Some(_) => UpdateState::Dirty,
            None => UpdateState::Unknown,
        };
        unit.layout_version = self.version;
        self.output_keys
            .insert((unit.global_key.clone(), OutputUnitType::Host), ROOT_HOST_ID);
        self.outputs.push(unit);
        Ok(())
    }

    fn visit(
        &mut self,
        index: usize,
        parent_x: f32,
        parent_y: f32,
        host_id: u64,
        level: usize,
    ) -> RenderResult<()> {
        let results = self.results;
        let result = results.node(index);
        let node = &result.node;
        let x = parent_x + result.x;
        let y = parent_y + result.y;
        let bounds = pixel_rect(x, y, result.width, result.height);
        let first_output = self.outputs.len();

        let is_root = results.root() == Some(index);
        let is_host = is_root || needs_host(node);
        let (inner_host, inner_level) = if is_root {
            (ROOT_HOST_ID, level)
        } else if is_host {
            let mut unit = RenderUnit::new(
                OutputUnitType::Host,
                UnitContent::Host,
                bounds,
                host_id,
                node.global_key(),
            );
            unit.flags = content_flags(node);
            apply_host_data(&mut unit, node)?;
            (self.add(unit, node, level)?, level + 1)
        } else {
            (host_id, level)
        };

        let decoration_flags = if is_host {
            OutputFlags::MATCH_HOST_BOUNDS
        } else {
            OutputFlags::empty()
        };

        if let Some(color) = node.props.background {
            self.add_drawable(
                node,
                OutputUnitType::Background,
                DrawableSpec::Background(color),
                bounds,
                inner_host,
                inner_level,
                decoration_flags,
            )?;
        }

        if let Some(leaf) = node.leaf() {
            let mut unit = RenderUnit::new(
                OutputUnitType::Content,
                UnitContent::Leaf(leaf.clone()),
                bounds,
                inner_host,
                node.global_key(),
            );
            unit.flags = content_flags(node);
            self.add(unit, node, inner_level)?;
            self.diff_records.insert(
                node.global_key().to_string(),
                DiffRecord {
                    leaf: leaf.clone(),
                    measurements: result.measurements.clone(),
                },
            );
        }

        for &child in &result.children {
            self.visit(child, x, y, inner_host, inner_level)?;
        }

        if let Some(color) = node.props.foreground {
            self.add_drawable(
                node,
                OutputUnitType::Foreground,
                DrawableSpec::Foreground(color),
                bounds,
                inner_host,
                inner_level,
                decoration_flags,
            )?;
        }

        let border = node.style.border;
        if let (Some(color), false) = (node.props.border_color, border.is_zero()) {
            self.add_drawable(
                node,
                OutputUnitType::Border,
                DrawableSpec::Border { widths: border, color },
                bounds,
                inner_host,
                inner_level,
                decoration_flags,
            )?;
        }

        self.record_node(node, bounds, inner_host, first_output);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn add_drawable(
        &mut self,
        node: &LayoutNode,
        unit_type: OutputUnitType,
        spec: DrawableSpec,
        bounds: Rect,
        host_id: u64,
        level: usize,
        flags: OutputFlags,
    ) -> RenderResult<u64> {
        let mut unit = RenderUnit::new(
            unit_type,
            UnitContent::Drawable(spec),
            bounds,
            host_id,
            node.global_key(),
        );
        unit.flags = flags;
        self.add(unit, node, level)
    }

    /// Assign an id and append.
    fn add(&mut self, mut unit: RenderUnit, node: &LayoutNode, level: usize) -> RenderResult<u64> {
        let previous = self.previous;
        let (id, update_state) = self.ids.next_id(
            node.global_key(),
            node.component_type_id(),
            level,
            unit.unit_type,
            |previous_id| {
                previous
                    .and_then(|p| p.output_by_id(previous_id))
                    .is_some_and(|old| unit.is_equivalent_to(old))
            },
        )?;
        unit.id = id;
        unit.update_state = update_state;
        unit.layout_version = self.version;
        self.output_keys
            .insert((unit.global_key.clone(), unit.unit_type), id);
        self.outputs.push(unit);
        Ok(id)
    }

    /// Everything besides render units a node contributes.
    fn record_node(&mut self, node: &LayoutNode, bounds: Rect, host_id: u64, first_output: usize) {
        let props = &node.props;

        if props.has_visibility_handlers() {
            self.visibility_outputs.push(VisibilityOutput {
                global_key: node.global_key().to_string(),
                bounds,
                visible_height_ratio: props.visible_height_ratio.unwrap_or(0.0),
                visible_width_ratio: props.visible_width_ratio.unwrap_or(0.0),
                handlers: props
                    .handlers
                    .iter()
                    .filter(|h| h.slot.is_visibility())
                    .cloned()
                    .collect(),
            });
        }

        if let Some(id) = transition_id(node) {
            self.transitions.push(TransitionRecord {
                id,
                output_id: host_id,
                transitions: props.transitions.clone(),
            });
        }

        for (owner, spec) in &props.working_ranges {
            self.working_ranges.push(WorkingRangeRecord {
                spec: spec.clone(),
                global_key: owner.clone(),
                position: first_output,
            });
        }

        for entry in &node.components {
            self.owners.push((
                entry.global_key.clone(),
                DispatchInfo {
                    component: entry.component.clone(),
                    state: self.results.states.get(&entry.global_key).cloned(),
                    version: self.version,
                    error_scope: entry.scope.clone(),
                },
            ));
        }
    }
}

fn content_flags(node: &LayoutNode) -> OutputFlags {
    let mut flags = OutputFlags::empty();
    if node.props.duplicate_parent_state {
        flags |= OutputFlags::DUPLICATE_PARENT_STATE;
    }
    if node.props.disable_touch {
        flags |= OutputFlags::DISABLE_TOUCHABLE;
    }
    flags
}

fn transition_id(node: &LayoutNode) -> Option<TransitionId> {
    let (key, key_type) = node.props.transition_key.as_ref()?;
    let owner = parent_global_key(node.global_key()).unwrap_or_default();
    Some(TransitionId::new(*key_type, key.clone(), owner))
}

/// Node info, view node info and transition id of a host output.
fn apply_host_data(unit: &mut RenderUnit, node: &LayoutNode) -> RenderResult<()> {
    let props = &node.props;

    let node_info = NodeInfo {
        handlers: props
            .handlers
            .iter()
            .filter(|h| !h.slot.is_visibility())
            .cloned()
            .collect(),
        content_description: props.content_description.clone(),
        focusable: props.focusable,
        selected: props.selected,
        enabled: props.enabled,
        accessibility_role: props.accessibility_role.clone(),
    };
    if !node_info.is_empty() {
        unit.set_node_info(node_info)?;
    }

    let view_info = ViewNodeInfo {
        alpha: props.alpha,
        view_tag: props.view_tag.clone(),
    };
    if !view_info.is_empty() {
        unit.set_view_node_info(view_info)?;
    }

    unit.transition_id = transition_id(node);
    unit.importance = props.importance.unwrap_or_default();
    unit.hosts_nested_tree = props.hosts_nested_tree;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::TransitionKeyType;
    use crate::engine::{Component, ComponentRef, ComponentTypeId, HandlerSlot, handler_fn};
    use crate::layout::{LayoutOutcome, calculate_layout, calculate_id, level_of};
    use crate::resolve::{ResolveEnv, resolve};
    use crate::testing::TestLeaf;
    use crate::types::{Edges, Rgba, SizeSpec};

    fn lay_out(root: ComponentRef, previous: Option<&LayoutState>, version: u64) -> LayoutState {
        let env = ResolveEnv::detached(version);
        let tree = resolve(env.clone(), root).unwrap().into_tree().unwrap();
        match calculate_layout(
            &env,
            &tree,
            SizeSpec::exactly(100.0),
            SizeSpec::exactly(100.0),
            previous,
            false,
        )
        .unwrap()
        {
            LayoutOutcome::Complete(state) => state,
            LayoutOutcome::Cancelled => panic!("cancelled"),
        }
    }

    fn text(key: &str, h: f32) -> ComponentRef {
        Component::leaf("Text", TestLeaf::labeled(key, 100.0, h))
            .type_id(ComponentTypeId::new(5))
            .key(key)
            .build()
    }

    #[test]
    fn test_root_host_is_first() {
        let state = lay_out(Component::column(vec![text("a", 10.0)]).build(), None, 1);
        let root = &state.outputs()[0];
        assert_eq!(root.id(), ROOT_HOST_ID);
        assert!(root.is_host());
        assert_eq!(state.outputs()[1].unit_type(), OutputUnitType::Content);
        assert_eq!(state.outputs()[1].host_id(), ROOT_HOST_ID);
    }

    #[test]
    fn test_output_order_and_decorations() {
        let root = Component::column(vec![text("a", 10.0)])
            .background(Rgba::WHITE)
            .foreground(Rgba::BLACK)
            .border(Edges::all(1.0), Rgba::GRAY)
            .build();
        let state = lay_out(root, None, 1);
        let types: Vec<_> = state.outputs().iter().map(|u| u.unit_type()).collect();
        assert_eq!(
            types,
            vec![
                OutputUnitType::Host,
                OutputUnitType::Background,
                OutputUnitType::Content,
                OutputUnitType::Foreground,
                OutputUnitType::Border,
            ]
        );
        // the root is a host, so its decorations match it
        assert!(state.outputs()[1].flags().contains(OutputFlags::MATCH_HOST_BOUNDS));
        assert!(!state.outputs()[2].flags().contains(OutputFlags::MATCH_HOST_BOUNDS));
    }

    #[test]
    fn test_click_handler_opens_host_level() {
        let button = Component::leaf("Button", TestLeaf::fixed(20.0, 20.0))
            .type_id(ComponentTypeId::new(7))
            .on_click(handler_fn(|_, _| Ok(true)))
            .build();
        let state = lay_out(Component::column(vec![button]).build(), None, 1);

        let host = &state.outputs()[1];
        let content = &state.outputs()[2];
        assert!(host.is_host());
        assert_eq!(level_of(host.id()), 0);
        assert_eq!(content.host_id(), host.id());
        assert_eq!(level_of(content.id()), 1);
        let info = host.node_info().expect("node info on host");
        assert!(info.handler(HandlerSlot::Click).is_some());
        assert!(content.node_info().is_none());
    }

    #[test]
    fn test_ids_follow_bit_layout() {
        let state = lay_out(Component::column(vec![text("a", 10.0)]).build(), None, 1);
        let expected = calculate_id(5, 0, OutputUnitType::Content, 0).unwrap();
        assert_eq!(state.outputs()[1].id(), expected);
        assert_eq!(state.index_of(expected), Some(1));
    }

    #[test]
    fn test_unchanged_tree_keeps_ids_and_is_updated() {
        let first = lay_out(Component::column(vec![text("a", 10.0), text("b", 10.0)]).build(), None, 1);
        let second = lay_out(
            Component::column(vec![text("a", 10.0), text("b", 10.0)]).build(),
            Some(&first),
            2,
        );
        let ids = |s: &LayoutState| s.outputs().iter().map(|u| u.id()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert!(second
            .outputs()
            .iter()
            .all(|u| u.update_state() == UpdateState::Updated));
    }

    #[test]
    fn test_swapped_siblings_keep_their_ids() {
        let first = lay_out(Component::column(vec![text("a", 10.0), text("b", 20.0)]).build(), None, 1);
        let second = lay_out(
            Component::column(vec![text("b", 20.0), text("a", 10.0)]).build(),
            Some(&first),
            2,
        );
        let key_of = |s: &LayoutState, i: usize| s.outputs()[i].global_key().to_string();
        assert_eq!(key_of(&first, 1), key_of(&second, 2));
        assert_eq!(first.outputs()[1].id(), second.outputs()[2].id());
        assert_eq!(first.outputs()[2].id(), second.outputs()[1].id());
    }

    #[test]
    fn test_inserted_sibling_does_not_perturb_ids() {
        let first = lay_out(Component::column(vec![text("a", 10.0), text("b", 10.0)]).build(), None, 1);
        let second = lay_out(
            Component::column(vec![text("new", 10.0), text("a", 10.0), text("b", 10.0)]).build(),
            Some(&first),
            2,
        );
        let id_of = |s: &LayoutState, key: &str| {
            s.outputs()
                .iter()
                .find(|u| u.global_key().ends_with(key) && !u.is_host())
                .map(|u| u.id())
        };
        assert_eq!(id_of(&first, ",a"), id_of(&second, ",a"));
        assert_eq!(id_of(&first, ",b"), id_of(&second, ",b"));
        let fresh = id_of(&second, ",new").unwrap();
        assert_eq!(
            second.outputs().iter().find(|u| u.id() == fresh).unwrap().update_state(),
            UpdateState::Unknown
        );
    }

    #[test]
    fn test_changed_content_is_dirty() {
        let first = lay_out(Component::column(vec![text("a", 10.0)]).build(), None, 1);
        let changed = Component::leaf("Text", TestLeaf::labeled("other", 100.0, 10.0))
            .type_id(ComponentTypeId::new(5))
            .key("a")
            .build();
        let second = lay_out(Component::column(vec![changed]).build(), Some(&first), 2);
        assert_eq!(second.outputs()[1].id(), first.outputs()[1].id());
        assert_eq!(second.outputs()[1].update_state(), UpdateState::Dirty);
    }

    #[test]
    fn test_sorted_indexes() {
        let root = Component::column(vec![text("a", 30.0), text("b", 10.0), text("c", 20.0)]).build();
        let state = lay_out(root, None, 1);
        let tops: Vec<i32> = state.tops().iter().map(|&i| state.outputs()[i].bounds().top).collect();
        let bottoms: Vec<i32> = state
            .bottoms()
            .iter()
            .map(|&i| state.outputs()[i].bounds().bottom)
            .collect();
        assert!(tops.windows(2).all(|w| w[0] <= w[1]));
        assert!(bottoms.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(state.outputs()[3].bounds(), Rect::new(0, 40, 100, 60));
    }

    #[test]
    fn test_visibility_and_transition_records() {
        let card = Component::leaf("Card", TestLeaf::fixed(100.0, 50.0))
            .on_visible(handler_fn(|_, _| Ok(true)))
            .visible_ratios(0.0, 0.5)
            .transition_key("card", TransitionKeyType::Global)
            .build();
        let state = lay_out(Component::column(vec![card]).build(), None, 1);

        let visibility = &state.visibility_outputs()[0];
        assert_eq!(visibility.bounds, Rect::new(0, 0, 100, 50));
        assert_eq!(visibility.visible_height_ratio, 0.5);
        assert!(visibility.handler(HandlerSlot::Visible).is_some());

        let record = &state.transitions()[0];
        assert_eq!(record.id.key(), "card");
        let host = state.output_by_id(record.output_id).unwrap();
        assert!(host.is_host());
        assert_eq!(host.transition_id(), Some(&record.id));
    }

    #[test]
    fn test_empty_tree_has_only_root_host() {
        let empty = Component::inline("Nothing", crate::testing::TestInline::empty()).build();
        let state = lay_out(empty, None, 1);
        assert_eq!(state.output_count(), 1);
        assert_eq!(state.outputs()[0].id(), ROOT_HOST_ID);
    }
}
