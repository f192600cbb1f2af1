//! Intermediate layout nodes.
//!
//! A [`LayoutNode`] is what one resolved component (plus any composites that
//! merged into it) asks of layout: flex style, visual props, handlers and
//! children. Nodes live in the arena of a [`ResolvedTree`] and are read-only
//! once resolve completes.

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::animation::{Transition, TransitionKeyType};
use crate::engine::{
    AccessibilityImportance, BoundHandler, Component, ComponentKind, ComponentRef,
    ComponentTypeId, ErrorScope, HandlerSlot, NeedsSizeFromParent, ProducesMeasuredContent,
    StateRef, StyleProp,
};
use crate::mount::WorkingRangeSpec;
use crate::types::{
    AlignContent, AlignItems, AlignSelf, Dimension, Edges, FlexDirection, FlexWrap,
    JustifyContent, PositionType, Rgba,
};

use super::MeasuredResultCache;

// =============================================================================
// NodeId
// =============================================================================

/// Index of a node in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

// =============================================================================
// Style
// =============================================================================

/// Flex style of one node, built by applying [`StyleProp`]s in order.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStyle {
    pub width: Dimension,
    pub height: Dimension,
    pub min_width: Dimension,
    pub min_height: Dimension,
    pub max_width: Dimension,
    pub max_height: Dimension,
    pub flex_direction: FlexDirection,
    pub flex_wrap: FlexWrap,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub align_self: AlignSelf,
    pub align_content: AlignContent,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub flex_basis: Dimension,
    pub position: PositionType,
    pub inset: [Option<f32>; 4],
    pub margin: Edges,
    pub padding: Edges,
    pub border: Edges,
    pub gap: f32,
}

impl Default for NodeStyle {
    fn default() -> Self {
        Self {
            width: Dimension::Auto,
            height: Dimension::Auto,
            min_width: Dimension::Auto,
            min_height: Dimension::Auto,
            max_width: Dimension::Auto,
            max_height: Dimension::Auto,
            flex_direction: FlexDirection::Column,
            flex_wrap: FlexWrap::NoWrap,
            justify_content: JustifyContent::FlexStart,
            align_items: AlignItems::Stretch,
            align_self: AlignSelf::Auto,
            align_content: AlignContent::FlexStart,
            flex_grow: 0.0,
            flex_shrink: 1.0,
            flex_basis: Dimension::Auto,
            position: PositionType::Relative,
            inset: [None; 4],
            margin: Edges::ZERO,
            padding: Edges::ZERO,
            border: Edges::ZERO,
            gap: 0.0,
        }
    }
}

impl NodeStyle {
    pub fn apply(&mut self, prop: &StyleProp) {
        match *prop {
            StyleProp::Width(v) => self.width = v,
            StyleProp::Height(v) => self.height = v,
            StyleProp::MinWidth(v) => self.min_width = v,
            StyleProp::MinHeight(v) => self.min_height = v,
            StyleProp::MaxWidth(v) => self.max_width = v,
            StyleProp::MaxHeight(v) => self.max_height = v,
            StyleProp::FlexDirection(v) => self.flex_direction = v,
            StyleProp::FlexWrap(v) => self.flex_wrap = v,
            StyleProp::JustifyContent(v) => self.justify_content = v,
            StyleProp::AlignItems(v) => self.align_items = v,
            StyleProp::AlignSelf(v) => self.align_self = v,
            StyleProp::AlignContent(v) => self.align_content = v,
            StyleProp::FlexGrow(v) => self.flex_grow = v,
            StyleProp::FlexShrink(v) => self.flex_shrink = v,
            StyleProp::FlexBasis(v) => self.flex_basis = v,
            StyleProp::PositionType(v) => self.position = v,
            StyleProp::Inset { left, top, right, bottom } => {
                self.inset = [left, top, right, bottom];
            }
            StyleProp::Margin(v) => self.margin = v,
            StyleProp::Padding(v) => self.padding = v,
            StyleProp::Border(v) => self.border = v,
            StyleProp::Gap(v) => self.gap = v,
        }
    }
}

// =============================================================================
// Merged props
// =============================================================================

/// Visual and interaction props merged from every component of a node.
#[derive(Debug, Clone, Default)]
pub struct NodeProps {
    pub background: Option<Rgba>,
    pub foreground: Option<Rgba>,
    pub border_color: Option<Rgba>,
    /// At most one handler per slot, owned by the component that declared it.
    pub handlers: SmallVec<[BoundHandler; 2]>,
    pub content_description: Option<String>,
    pub focusable: Option<bool>,
    pub selected: Option<bool>,
    pub enabled: Option<bool>,
    pub accessibility_role: Option<String>,
    pub importance: Option<AccessibilityImportance>,
    pub view_tag: Option<String>,
    pub alpha: Option<f32>,
    pub visible_height_ratio: Option<f32>,
    pub visible_width_ratio: Option<f32>,
    pub transition_key: Option<(String, TransitionKeyType)>,
    pub transitions: Vec<Transition>,
    pub working_ranges: Vec<(String, WorkingRangeSpec)>,
    pub wrap_in_view: bool,
    pub duplicate_parent_state: bool,
    pub disable_touch: bool,
    pub hosts_nested_tree: bool,
}

impl NodeProps {
    /// Overlay `component`'s props; later calls win.
    fn merge(&mut self, component: &Component, owner_key: &str) {
        let props = component.props();
        macro_rules! take {
            ($($field:ident),*) => {
                $(if props.$field.is_some() {
                    self.$field = props.$field.clone();
                })*
            };
        }
        take!(
            background,
            foreground,
            border_color,
            content_description,
            focusable,
            selected,
            enabled,
            accessibility_role,
            importance,
            view_tag,
            alpha,
            visible_height_ratio,
            visible_width_ratio,
            transition_key
        );

        for handler in &props.handlers {
            self.handlers.retain(|h| h.slot != handler.slot);
            self.handlers.push(BoundHandler::new(owner_key, handler.slot));
        }
        self.transitions.extend(props.transitions.iter().cloned());
        self.working_ranges.extend(
            props
                .working_ranges
                .iter()
                .map(|range| (owner_key.to_string(), range.clone())),
        );
        self.wrap_in_view |= props.wrap_in_view;
        self.duplicate_parent_state |= props.duplicate_parent_state;
        self.disable_touch |= props.disable_touch;
        self.hosts_nested_tree |= props.hosts_nested_tree;
    }

    pub fn handler(&self, slot: HandlerSlot) -> Option<&BoundHandler> {
        self.handlers.iter().find(|h| h.slot == slot)
    }

    pub fn has_interaction_handlers(&self) -> bool {
        self.handlers.iter().any(|h| h.slot.is_interaction())
    }

    pub fn has_visibility_handlers(&self) -> bool {
        self.handlers.iter().any(|h| h.slot.is_visibility())
    }

    /// Whether anything accessibility related was declared.
    pub fn has_accessibility_info(&self) -> bool {
        self.content_description.is_some()
            || self.focusable == Some(true)
            || self.accessibility_role.is_some()
            || self.handler(HandlerSlot::Accessibility).is_some()
            || matches!(
                self.importance,
                Some(AccessibilityImportance::Yes | AccessibilityImportance::NoHideDescendants)
            )
    }
}

// =============================================================================
// LayoutNode
// =============================================================================

/// What a node contributes besides its children.
#[derive(Clone)]
pub enum NodeContent {
    Container,
    Leaf(Arc<dyn ProducesMeasuredContent>),
    /// Deferred until layout hands down size specs.
    NestedTreeHolder(Arc<dyn NeedsSizeFromParent>),
}

impl NodeContent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Leaf(_) => "leaf",
            Self::NestedTreeHolder(_) => "nested-tree-holder",
        }
    }
}

/// A component merged into a node.
#[derive(Clone)]
pub struct NodeComponent {
    pub component: ComponentRef,
    pub global_key: String,
    pub scope: ErrorScope,
}

/// Resolved layout intent of one component chain.
#[derive(Clone)]
pub struct LayoutNode {
    /// Innermost (layout producing) component first, outermost last.
    pub components: SmallVec<[NodeComponent; 2]>,
    pub content: NodeContent,
    pub style: NodeStyle,
    pub props: NodeProps,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

impl LayoutNode {
    pub(crate) fn new(chain: SmallVec<[NodeComponent; 2]>, content: NodeContent) -> Self {
        let mut style = NodeStyle::default();
        let mut props = NodeProps::default();
        for entry in &chain {
            for prop in &entry.component.props().style {
                style.apply(prop);
            }
            props.merge(&entry.component, &entry.global_key);
        }
        Self {
            components: chain,
            content,
            style,
            props,
            children: Vec::new(),
            parent: None,
        }
    }

    /// The component that produced the node's layout.
    pub fn tail(&self) -> &NodeComponent {
        &self.components[0]
    }

    /// Global key used for identity across versions.
    pub fn global_key(&self) -> &str {
        &self.tail().global_key
    }

    pub fn component_type_id(&self) -> ComponentTypeId {
        self.tail().component.component_type_id()
    }

    pub fn name(&self) -> &str {
        self.tail().component.name()
    }

    /// Scope errors of this node's callbacks are routed to.
    pub fn error_scope(&self) -> &ErrorScope {
        &self.tail().scope
    }

    /// Scope handed to anything resolved below this node.
    pub fn child_scope(&self) -> ErrorScope {
        let tail = self.tail();
        match &tail.component.props().error_handler {
            Some(handler) => tail.scope.push(tail.global_key.clone(), handler.clone()),
            None => tail.scope.clone(),
        }
    }

    pub fn leaf(&self) -> Option<&Arc<dyn ProducesMeasuredContent>> {
        match &self.content {
            NodeContent::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn is_nested_tree_holder(&self) -> bool {
        matches!(self.content, NodeContent::NestedTreeHolder(_))
    }
}

impl std::fmt::Debug for LayoutNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutNode")
            .field("key", &self.global_key())
            .field("name", &self.name())
            .field("content", &self.content.name())
            .field("merged", &self.components.len())
            .field("children", &self.children)
            .finish()
    }
}

/// How to build a node from a component kind, `None` for inline kinds.
pub(crate) fn content_for(kind: &ComponentKind) -> Option<NodeContent> {
    match kind {
        ComponentKind::Column(_) | ComponentKind::Row(_) => Some(NodeContent::Container),
        ComponentKind::Leaf(leaf) => Some(NodeContent::Leaf(leaf.clone())),
        ComponentKind::NestedTree(spec) => Some(NodeContent::NestedTreeHolder(spec.clone())),
        ComponentKind::Inline(_) => None,
    }
}

// =============================================================================
// ResolvedTree
// =============================================================================

/// Output of a completed resolve.
pub struct ResolvedTree {
    pub(crate) nodes: Vec<Arc<LayoutNode>>,
    pub(crate) root: Option<NodeId>,
    pub(crate) states: HashMap<String, StateRef>,
    pub(crate) cache: Arc<MeasuredResultCache>,
    pub(crate) root_component: ComponentRef,
    pub(crate) version: u64,
}

impl ResolvedTree {
    /// Root node, `None` when the root rendered nothing.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Arc<LayoutNode> {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// States seen by this resolve, keyed by global key.
    pub fn states(&self) -> &HashMap<String, StateRef> {
        &self.states
    }

    pub fn root_component(&self) -> &ComponentRef {
        &self.root_component
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn measured_cache(&self) -> &Arc<MeasuredResultCache> {
        &self.cache
    }

    /// Nodes in depth-first pre-order.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        order
    }

    /// Global key of every node, in pre-order.
    pub fn global_keys(&self) -> Vec<&str> {
        self.preorder()
            .into_iter()
            .map(|id| self.node(id).global_key())
            .collect()
    }
}

impl std::fmt::Debug for ResolvedTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTree")
            .field("version", &self.version)
            .field("nodes", &self.nodes.len())
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::handler_fn;
    use crate::testing::TestLeaf;

    fn entry(component: ComponentRef, key: &str) -> NodeComponent {
        NodeComponent {
            component,
            global_key: key.to_string(),
            scope: ErrorScope::root(),
        }
    }

    #[test]
    fn test_style_applies_in_order() {
        let mut style = NodeStyle::default();
        style.apply(&StyleProp::Width(Dimension::Px(10.0)));
        style.apply(&StyleProp::Width(Dimension::Percent(50.0)));
        style.apply(&StyleProp::Padding(Edges::all(2.0)));
        assert_eq!(style.width, Dimension::Percent(50.0));
        assert_eq!(style.padding.horizontal(), 4.0);
        assert_eq!(style.flex_shrink, 1.0);
    }

    #[test]
    fn test_outer_props_override_inner() {
        let inner = Component::leaf("Text", TestLeaf::fixed(1.0, 1.0))
            .background(Rgba::RED)
            .on_click(handler_fn(|_, _| Ok(true)))
            .width(10.0)
            .build();
        let outer = Component::column(vec![])
            .background(Rgba::BLUE)
            .on_click(handler_fn(|_, _| Ok(false)))
            .width(20.0)
            .build();

        let node = LayoutNode::new(
            SmallVec::from_vec(vec![entry(inner.clone(), "1,2"), entry(outer, "1")]),
            NodeContent::Leaf(TestLeaf::fixed(1.0, 1.0)),
        );

        assert_eq!(node.props.background, Some(Rgba::BLUE));
        assert_eq!(node.style.width, Dimension::Px(20.0));
        assert_eq!(node.props.handlers.len(), 1);
        assert_eq!(node.props.handler(HandlerSlot::Click).unwrap().owner_key, "1");
        assert_eq!(node.global_key(), "1,2");
        assert_eq!(node.component_type_id(), inner.component_type_id());
    }

    #[test]
    fn test_accessibility_info() {
        let mut props = NodeProps::default();
        assert!(!props.has_accessibility_info());
        props.content_description = Some("close".into());
        assert!(props.has_accessibility_info());
    }
}
