//! Component - immutable description of desired output.
//!
//! Layout intent is a closed sum type ([`ComponentKind`]); the resolver
//! dispatches on it instead of overriding hooks on a class hierarchy. The
//! three open variants delegate to small capability traits:
//!
//! - [`CanResolveInline`]: renders into another component during resolve
//! - [`NeedsSizeFromParent`]: renders once the parent hands down size specs
//! - [`ProducesMeasuredContent`]: a leaf that measures and mounts content
//!
//! # Example
//!
//! ```ignore
//! use tessera::engine::Component;
//!
//! let root = Component::column(vec![
//!     Component::leaf("Text", text_spec("a")).key("a").build(),
//!     Component::leaf("Text", text_spec("b")).key("b").build(),
//! ])
//! .padding(Edges::all(8.0))
//! .background(Rgba::WHITE)
//! .build();
//! ```

use std::any::Any;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::animation::{Transition, TransitionKeyType};
use crate::error::CallbackError;
use crate::mount::{ContentType, MountContent, WorkingRangeSpec};
use crate::resolve::RenderContext;
use crate::types::{
    AlignContent, AlignItems, AlignSelf, Dimension, Edges, FlexDirection, FlexWrap,
    JustifyContent, PositionType, Rgba, Size, SizeSpec,
};

use super::{ErrorHandler, EventHandler, HandlerFn, HandlerSlot, StateRef};

// =============================================================================
// Component Type Id
// =============================================================================

/// Largest type id that fits the 38 bit field of an output id.
pub const MAX_COMPONENT_TYPE_ID: u64 = (1 << 38) - 1;

/// Stable identifier of a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(u64);

impl ComponentTypeId {
    /// Built-in column container.
    pub const COLUMN: Self = Self(1);
    /// Built-in row container.
    pub const ROW: Self = Self(2);

    /// Ids below this are reserved for built-ins.
    const FIRST_USER_ID: u64 = 16;

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Derive a stable id from a type name (FNV-1a folded into 38 bits).
    pub fn from_name(name: &str) -> Self {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in name.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        let folded = (hash ^ (hash >> 38)) & MAX_COMPONENT_TYPE_ID;
        Self(folded.max(Self::FIRST_USER_ID))
    }
}

// =============================================================================
// Capability Traits
// =============================================================================

/// A component that resolves by rendering another component.
pub trait CanResolveInline: Send + Sync {
    /// Produce the single child this component stands for, or nothing.
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<Option<ComponentRef>, CallbackError>;
}

/// A component whose children depend on the size its parent assigns.
///
/// Resolution is deferred into a nested tree holder until layout knows the
/// constraints.
pub trait NeedsSizeFromParent: Send + Sync {
    fn render_with_size(
        &self,
        ctx: &mut RenderContext<'_>,
        width: SizeSpec,
        height: SizeSpec,
    ) -> Result<Option<ComponentRef>, CallbackError>;
}

/// A leaf that measures itself and mounts platform content.
pub trait ProducesMeasuredContent: Send + Sync {
    /// Pool key for recycled content.
    fn content_type(&self) -> ContentType;

    /// Measure under the given constraints.
    fn measure(&self, width: SizeSpec, height: SizeSpec) -> Result<Size, CallbackError>;

    /// Allocate fresh content when the pool is empty.
    fn create_content(&self) -> Box<dyn MountContent>;

    /// Bind this component's props onto content.
    fn mount(&self, _content: &mut dyn MountContent) -> Result<(), CallbackError> {
        Ok(())
    }

    /// Undo [`mount`](Self::mount) before content is reused or pooled.
    fn unmount(&self, _content: &mut dyn MountContent) {}

    /// Same props as `other`: measurement and mounted content can be reused.
    fn is_equivalent_to(&self, _other: &dyn ProducesMeasuredContent) -> bool {
        false
    }

    /// Skip measurement memoization for this leaf.
    fn forces_remeasure(&self) -> bool {
        false
    }

    /// Whether mounted content may be handed back to a pool.
    fn is_recyclable(&self) -> bool {
        true
    }

    /// Override the configured pool capacity for this content type.
    fn pool_size(&self) -> Option<usize> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

// =============================================================================
// Component
// =============================================================================

/// Shared handle to an immutable component.
pub type ComponentRef = Arc<Component>;

/// Creates initial state the first time a global key is resolved.
pub type InitialStateFn = Arc<dyn Fn() -> StateRef + Send + Sync>;

/// Layout intent.
#[derive(Clone)]
pub enum ComponentKind {
    /// Vertical flex container.
    Column(Vec<ComponentRef>),
    /// Horizontal flex container.
    Row(Vec<ComponentRef>),
    Inline(Arc<dyn CanResolveInline>),
    Leaf(Arc<dyn ProducesMeasuredContent>),
    NestedTree(Arc<dyn NeedsSizeFromParent>),
}

impl ComponentKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Column(_) => "column",
            Self::Row(_) => "row",
            Self::Inline(_) => "inline",
            Self::Leaf(_) => "leaf",
            Self::NestedTree(_) => "nested-tree",
        }
    }
}

/// Layout style properties a component contributes to its node.
///
/// Stored as a list so an outer component only overrides what it sets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StyleProp {
    Width(Dimension),
    Height(Dimension),
    MinWidth(Dimension),
    MinHeight(Dimension),
    MaxWidth(Dimension),
    MaxHeight(Dimension),
    FlexDirection(FlexDirection),
    FlexWrap(FlexWrap),
    JustifyContent(JustifyContent),
    AlignItems(AlignItems),
    AlignSelf(AlignSelf),
    AlignContent(AlignContent),
    FlexGrow(f32),
    FlexShrink(f32),
    FlexBasis(Dimension),
    PositionType(PositionType),
    Inset { left: Option<f32>, top: Option<f32>, right: Option<f32>, bottom: Option<f32> },
    Margin(Edges),
    Padding(Edges),
    Border(Edges),
    Gap(f32),
}

/// Accessibility importance of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessibilityImportance {
    #[default]
    Auto,
    Yes,
    No,
    NoHideDescendants,
}

/// Props every component kind accepts.
#[derive(Clone, Default)]
pub struct CommonProps {
    pub style: Vec<StyleProp>,
    pub background: Option<Rgba>,
    pub foreground: Option<Rgba>,
    pub border_color: Option<Rgba>,
    pub handlers: Vec<EventHandler>,
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
    pub working_ranges: Vec<WorkingRangeSpec>,
    pub wrap_in_view: bool,
    pub duplicate_parent_state: bool,
    pub disable_touch: bool,
    pub hosts_nested_tree: bool,
    pub error_handler: Option<Arc<dyn ErrorHandler>>,
}

/// An immutable component.
///
/// Build one with the constructors below and [`ComponentBuilder::build`].
#[derive(Clone)]
pub struct Component {
    type_id: ComponentTypeId,
    name: Cow<'static, str>,
    key: Option<String>,
    kind: ComponentKind,
    props: CommonProps,
    debug_props: BTreeMap<String, String>,
    initial_state: Option<InitialStateFn>,
}

impl Component {
    /// Vertical flex container.
    pub fn column(children: Vec<ComponentRef>) -> ComponentBuilder {
        ComponentBuilder::new(ComponentTypeId::COLUMN, "Column", ComponentKind::Column(children))
    }

    /// Horizontal flex container.
    pub fn row(children: Vec<ComponentRef>) -> ComponentBuilder {
        let mut builder =
            ComponentBuilder::new(ComponentTypeId::ROW, "Row", ComponentKind::Row(children));
        builder
            .component
            .props
            .style
            .push(StyleProp::FlexDirection(FlexDirection::Row));
        builder
    }

    /// Leaf producing measured content.
    pub fn leaf(
        name: impl Into<Cow<'static, str>>,
        spec: Arc<dyn ProducesMeasuredContent>,
    ) -> ComponentBuilder {
        let name = name.into();
        ComponentBuilder::new(ComponentTypeId::from_name(&name), name, ComponentKind::Leaf(spec))
    }

    /// Composite resolving into another component.
    pub fn inline(
        name: impl Into<Cow<'static, str>>,
        spec: Arc<dyn CanResolveInline>,
    ) -> ComponentBuilder {
        let name = name.into();
        ComponentBuilder::new(ComponentTypeId::from_name(&name), name, ComponentKind::Inline(spec))
    }

    /// Component deferred until its parent provides size specs.
    pub fn nested(
        name: impl Into<Cow<'static, str>>,
        spec: Arc<dyn NeedsSizeFromParent>,
    ) -> ComponentBuilder {
        let name = name.into();
        ComponentBuilder::new(
            ComponentTypeId::from_name(&name),
            name,
            ComponentKind::NestedTree(spec),
        )
    }

    pub fn component_type_id(&self) -> ComponentTypeId {
        self.type_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Manual key, if any.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub fn props(&self) -> &CommonProps {
        &self.props
    }

    /// Debug-only props recorded in time-travel snapshots.
    pub fn debug_props(&self) -> &BTreeMap<String, String> {
        &self.debug_props
    }

    pub fn initial_state(&self) -> Option<&InitialStateFn> {
        self.initial_state.as_ref()
    }

    /// Handler registered for a slot on this instance.
    pub fn handler(&self, slot: HandlerSlot) -> Option<&EventHandler> {
        self.props.handlers.iter().find(|h| h.slot == slot)
    }

    /// Children declared directly by a container.
    pub fn children(&self) -> &[ComponentRef] {
        match &self.kind {
            ComponentKind::Column(children) | ComponentKind::Row(children) => children,
            _ => &[],
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("type_id", &self.type_id.0)
            .field("key", &self.key)
            .field("kind", &self.kind.name())
            .field("children", &self.children().len())
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Fluent builder for [`Component`].
pub struct ComponentBuilder {
    component: Component,
}

impl ComponentBuilder {
    fn new(type_id: ComponentTypeId, name: impl Into<Cow<'static, str>>, kind: ComponentKind) -> Self {
        Self {
            component: Component {
                type_id,
                name: name.into(),
                key: None,
                kind,
                props: CommonProps::default(),
                debug_props: BTreeMap::new(),
                initial_state: None,
            },
        }
    }

    /// Override the derived type id.
    pub fn type_id(mut self, type_id: ComponentTypeId) -> Self {
        self.component.type_id = type_id;
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.component.key = Some(key.into());
        self
    }

    pub fn style(mut self, prop: StyleProp) -> Self {
        self.component.props.style.push(prop);
        self
    }

    pub fn width(self, width: impl Into<Dimension>) -> Self {
        self.style(StyleProp::Width(width.into()))
    }

    pub fn height(self, height: impl Into<Dimension>) -> Self {
        self.style(StyleProp::Height(height.into()))
    }

    pub fn flex_grow(self, grow: f32) -> Self {
        self.style(StyleProp::FlexGrow(grow))
    }

    pub fn padding(self, padding: Edges) -> Self {
        self.style(StyleProp::Padding(padding))
    }

    pub fn margin(self, margin: Edges) -> Self {
        self.style(StyleProp::Margin(margin))
    }

    pub fn border(mut self, widths: Edges, color: Rgba) -> Self {
        self.component.props.border_color = Some(color);
        self.style(StyleProp::Border(widths))
    }

    pub fn background(mut self, color: Rgba) -> Self {
        self.component.props.background = Some(color);
        self
    }

    pub fn foreground(mut self, color: Rgba) -> Self {
        self.component.props.foreground = Some(color);
        self
    }

    /// Register a handler for a slot, replacing any previous one.
    pub fn handler(mut self, slot: HandlerSlot, callback: HandlerFn) -> Self {
        self.component.props.handlers.retain(|h| h.slot != slot);
        self.component.props.handlers.push(EventHandler::new(slot, callback));
        self
    }

    pub fn on_click(self, callback: HandlerFn) -> Self {
        self.handler(HandlerSlot::Click, callback)
    }

    pub fn on_long_click(self, callback: HandlerFn) -> Self {
        self.handler(HandlerSlot::LongClick, callback)
    }

    pub fn on_touch(self, callback: HandlerFn) -> Self {
        self.handler(HandlerSlot::Touch, callback)
    }

    pub fn on_visible(self, callback: HandlerFn) -> Self {
        self.handler(HandlerSlot::Visible, callback)
    }

    pub fn on_invisible(self, callback: HandlerFn) -> Self {
        self.handler(HandlerSlot::Invisible, callback)
    }

    pub fn on_focused_visible(self, callback: HandlerFn) -> Self {
        self.handler(HandlerSlot::Focused, callback)
    }

    pub fn on_unfocused_visible(self, callback: HandlerFn) -> Self {
        self.handler(HandlerSlot::Unfocused, callback)
    }

    pub fn on_full_impression(self, callback: HandlerFn) -> Self {
        self.handler(HandlerSlot::FullImpression, callback)
    }

    pub fn on_visibility_changed(self, callback: HandlerFn) -> Self {
        self.handler(HandlerSlot::VisibilityChanged, callback)
    }

    /// Minimum visible fractions before the visible handler fires.
    pub fn visible_ratios(mut self, width_ratio: f32, height_ratio: f32) -> Self {
        self.component.props.visible_width_ratio = Some(width_ratio);
        self.component.props.visible_height_ratio = Some(height_ratio);
        self
    }

    pub fn content_description(mut self, description: impl Into<String>) -> Self {
        self.component.props.content_description = Some(description.into());
        self
    }

    pub fn focusable(mut self, focusable: bool) -> Self {
        self.component.props.focusable = Some(focusable);
        self
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.component.props.selected = Some(selected);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.component.props.enabled = Some(enabled);
        self
    }

    pub fn accessibility_role(mut self, role: impl Into<String>) -> Self {
        self.component.props.accessibility_role = Some(role.into());
        self
    }

    pub fn importance(mut self, importance: AccessibilityImportance) -> Self {
        self.component.props.importance = Some(importance);
        self
    }

    pub fn view_tag(mut self, tag: impl Into<String>) -> Self {
        self.component.props.view_tag = Some(tag.into());
        self
    }

    pub fn alpha(mut self, alpha: f32) -> Self {
        self.component.props.alpha = Some(alpha);
        self
    }

    /// Key used to correlate this output across layouts for transitions.
    pub fn transition_key(mut self, key: impl Into<String>, key_type: TransitionKeyType) -> Self {
        self.component.props.transition_key = Some((key.into(), key_type));
        self
    }

    pub fn transition(mut self, transition: Transition) -> Self {
        self.component.props.transitions.push(transition);
        self
    }

    pub fn working_range(mut self, range: WorkingRangeSpec) -> Self {
        self.component.props.working_ranges.push(range);
        self
    }

    /// Force a host view around this component's outputs.
    pub fn wrap_in_view(mut self) -> Self {
        self.component.props.wrap_in_view = true;
        self
    }

    pub fn duplicate_parent_state(mut self) -> Self {
        self.component.props.duplicate_parent_state = true;
        self
    }

    pub fn disable_touch(mut self) -> Self {
        self.component.props.disable_touch = true;
        self
    }

    /// Mark the host as containing its own render tree (always mounted).
    pub fn hosts_nested_tree(mut self) -> Self {
        self.component.props.hosts_nested_tree = true;
        self
    }

    pub fn error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.component.props.error_handler = Some(handler);
        self
    }

    pub fn initial_state(mut self, create: InitialStateFn) -> Self {
        self.component.initial_state = Some(create);
        self
    }

    pub fn debug_prop(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.component.debug_props.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> ComponentRef {
        Arc::new(self.component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::handler_fn;
    use crate::testing::TestLeaf;

    #[test]
    fn test_type_id_from_name_is_stable_and_bounded() {
        let a = ComponentTypeId::from_name("Text");
        let b = ComponentTypeId::from_name("Text");
        let c = ComponentTypeId::from_name("Image");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.value() <= MAX_COMPONENT_TYPE_ID);
        assert!(a.value() >= 16);
    }

    #[test]
    fn test_row_sets_direction() {
        let row = Component::row(vec![]).build();
        assert_eq!(row.component_type_id(), ComponentTypeId::ROW);
        assert!(row
            .props()
            .style
            .contains(&StyleProp::FlexDirection(FlexDirection::Row)));
    }

    #[test]
    fn test_handler_replaces_same_slot() {
        let first = handler_fn(|_, _| Ok(true));
        let second = handler_fn(|_, _| Ok(false));
        let component = Component::leaf("Text", TestLeaf::fixed(10.0, 10.0))
            .on_click(first)
            .on_click(second.clone())
            .build();

        assert_eq!(component.props().handlers.len(), 1);
        let handler = component.handler(HandlerSlot::Click).unwrap();
        assert!(Arc::ptr_eq(&handler.callback, &second));
    }

    #[test]
    fn test_children_only_for_containers() {
        let leaf = Component::leaf("Text", TestLeaf::fixed(1.0, 1.0)).build();
        let column = Component::column(vec![leaf.clone(), leaf]).build();
        assert_eq!(column.children().len(), 2);
        assert!(column.children()[0].children().is_empty());
    }
}
