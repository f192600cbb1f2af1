//! Layout state - everything mount needs from one layout version.
//!
//! Produced by the collect pass and immutable afterwards. Besides the
//! flattened [`RenderUnit`] list it carries the indexes incremental mount
//! walks (`tops`, `bottoms`), the visibility outputs, transition and
//! working range registrations, and the diff records the next layout uses
//! for measurement memoization and id reuse.

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::animation::{Transition, TransitionId};
use crate::engine::{
    AccessibilityImportance, BoundHandler, DispatchInfo, HandlerSlot, ProducesMeasuredContent,
    StateRef,
};
use crate::error::{RenderError, RenderResult};
use crate::mount::{ContentType, DrawableSpec, WorkingRangeSpec};
use crate::types::{OutputFlags, Rect, Rgba, Size, SizeSpec};

use super::{LayoutResultTree, MeasureRecord, OutputUnitType, ROOT_HOST_ID, UpdateState};

// =============================================================================
// Mount data
// =============================================================================

/// Interaction and accessibility data of an output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeInfo {
    pub handlers: SmallVec<[BoundHandler; 2]>,
    pub content_description: Option<String>,
    pub focusable: Option<bool>,
    pub selected: Option<bool>,
    pub enabled: Option<bool>,
    pub accessibility_role: Option<String>,
}

impl NodeInfo {
    pub fn handler(&self, slot: HandlerSlot) -> Option<&BoundHandler> {
        self.handlers.iter().find(|h| h.slot == slot)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// View specific data of a host output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewNodeInfo {
    pub alpha: Option<f32>,
    pub view_tag: Option<String>,
}

impl ViewNodeInfo {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// What an output mounts.
#[derive(Clone)]
pub enum UnitContent {
    Host,
    Leaf(Arc<dyn ProducesMeasuredContent>),
    Drawable(DrawableSpec),
}

impl UnitContent {
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Host => ContentType::HOST,
            Self::Leaf(leaf) => leaf.content_type(),
            Self::Drawable(spec) => spec.content_type(),
        }
    }

    /// Whether the mounted content can be kept for `other`.
    pub fn is_equivalent_to(&self, other: &UnitContent) -> bool {
        match (self, other) {
            (Self::Host, Self::Host) => true,
            (Self::Leaf(a), Self::Leaf(b)) => a.is_equivalent_to(b.as_ref()),
            (Self::Drawable(a), Self::Drawable(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Debug for UnitContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => f.write_str("Host"),
            Self::Leaf(leaf) => write!(f, "Leaf({:?})", leaf.content_type()),
            Self::Drawable(spec) => write!(f, "Drawable({spec:?})"),
        }
    }
}

// =============================================================================
// RenderUnit
// =============================================================================

/// A flattened, mountable output.
#[derive(Debug, Clone)]
pub struct RenderUnit {
    pub(crate) id: u64,
    pub(crate) unit_type: OutputUnitType,
    pub(crate) content: UnitContent,
    pub(crate) bounds: Rect,
    pub(crate) host_id: u64,
    pub(crate) flags: OutputFlags,
    pub(crate) node_info: Option<Arc<NodeInfo>>,
    pub(crate) view_node_info: Option<Arc<ViewNodeInfo>>,
    pub(crate) transition_id: Option<TransitionId>,
    pub(crate) importance: AccessibilityImportance,
    pub(crate) update_state: UpdateState,
    pub(crate) global_key: String,
    pub(crate) hosts_nested_tree: bool,
    pub(crate) layout_version: u64,
}

impl RenderUnit {
    pub(crate) fn new(
        unit_type: OutputUnitType,
        content: UnitContent,
        bounds: Rect,
        host_id: u64,
        global_key: impl Into<String>,
    ) -> Self {
        Self {
            id: ROOT_HOST_ID,
            unit_type,
            content,
            bounds,
            host_id,
            flags: OutputFlags::empty(),
            node_info: None,
            view_node_info: None,
            transition_id: None,
            importance: AccessibilityImportance::Auto,
            update_state: UpdateState::Unknown,
            global_key: global_key.into(),
            hosts_nested_tree: false,
            layout_version: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unit_type(&self) -> OutputUnitType {
        self.unit_type
    }

    pub fn content(&self) -> &UnitContent {
        &self.content
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Id of the host output this output mounts into.
    pub fn host_id(&self) -> u64 {
        self.host_id
    }

    pub fn flags(&self) -> OutputFlags {
        self.flags
    }

    pub fn node_info(&self) -> Option<&Arc<NodeInfo>> {
        self.node_info.as_ref()
    }

    pub fn view_node_info(&self) -> Option<&Arc<ViewNodeInfo>> {
        self.view_node_info.as_ref()
    }

    pub fn transition_id(&self) -> Option<&TransitionId> {
        self.transition_id.as_ref()
    }

    pub fn importance(&self) -> AccessibilityImportance {
        self.importance
    }

    pub fn update_state(&self) -> UpdateState {
        self.update_state
    }

    pub fn global_key(&self) -> &str {
        &self.global_key
    }

    pub fn is_host(&self) -> bool {
        self.unit_type == OutputUnitType::Host
    }

    /// Hosts content that runs its own render tree.
    pub fn hosts_nested_tree(&self) -> bool {
        self.hosts_nested_tree
    }

    pub fn layout_version(&self) -> u64 {
        self.layout_version
    }

    /// Assign node info. Only allowed once.
    pub fn set_node_info(&mut self, info: NodeInfo) -> RenderResult<()> {
        if self.node_info.is_some() {
            return Err(RenderError::NodeInfoAlreadySet { id: self.id });
        }
        self.node_info = Some(Arc::new(info));
        Ok(())
    }

    /// Assign view node info. Only allowed once.
    pub fn set_view_node_info(&mut self, info: ViewNodeInfo) -> RenderResult<()> {
        if self.view_node_info.is_some() {
            return Err(RenderError::ViewNodeInfoAlreadySet { id: self.id });
        }
        self.view_node_info = Some(Arc::new(info));
        Ok(())
    }

    /// Same content, flags and mount data as `other`; bounds are ignored.
    pub fn is_equivalent_to(&self, other: &RenderUnit) -> bool {
        self.unit_type == other.unit_type
            && self.flags == other.flags
            && self.node_info == other.node_info
            && self.view_node_info == other.view_node_info
            && self.importance == other.importance
            && self.content.is_equivalent_to(&other.content)
    }
}

// =============================================================================
// Layout products besides render units
// =============================================================================

/// A node with visibility handlers.
#[derive(Debug, Clone)]
pub struct VisibilityOutput {
    pub global_key: String,
    pub bounds: Rect,
    pub visible_height_ratio: f32,
    pub visible_width_ratio: f32,
    pub handlers: SmallVec<[BoundHandler; 2]>,
}

impl VisibilityOutput {
    pub fn handler(&self, slot: HandlerSlot) -> Option<&BoundHandler> {
        self.handlers.iter().find(|h| h.slot == slot)
    }
}

/// A keyed output with transitions.
#[derive(Debug, Clone)]
pub struct TransitionRecord {
    pub id: TransitionId,
    /// Output animated for this key (the node's host).
    pub output_id: u64,
    pub transitions: Vec<Transition>,
}

/// A working range registered by a component.
#[derive(Debug, Clone)]
pub struct WorkingRangeRecord {
    pub spec: WorkingRangeSpec,
    pub global_key: String,
    /// Index of the node's first output.
    pub position: usize,
}

/// Measurements of a leaf, kept for memoization in the next layout.
#[derive(Clone)]
pub struct DiffRecord {
    pub leaf: Arc<dyn ProducesMeasuredContent>,
    pub measurements: SmallVec<[MeasureRecord; 2]>,
}

impl DiffRecord {
    /// Size previously measured under exactly these specs.
    pub fn measured(&self, width: SizeSpec, height: SizeSpec) -> Option<Size> {
        self.measurements
            .iter()
            .find(|m| m.width_spec == width && m.height_spec == height)
            .map(|m| m.size)
    }
}

// =============================================================================
// LayoutState
// =============================================================================

/// Result of one completed layout.
pub struct LayoutState {
    pub(crate) version: u64,
    pub(crate) width_spec: SizeSpec,
    pub(crate) height_spec: SizeSpec,
    pub(crate) size: Size,
    pub(crate) outputs: Vec<RenderUnit>,
    pub(crate) id_to_index: HashMap<u64, usize>,
    pub(crate) tops: Vec<usize>,
    pub(crate) bottoms: Vec<usize>,
    pub(crate) visibility_outputs: Vec<VisibilityOutput>,
    pub(crate) transitions: Vec<TransitionRecord>,
    pub(crate) working_ranges: Vec<WorkingRangeRecord>,
    pub(crate) diff_records: HashMap<String, DiffRecord>,
    pub(crate) output_keys: HashMap<(String, OutputUnitType), u64>,
    pub(crate) states: HashMap<String, StateRef>,
    pub(crate) owners: Vec<(String, DispatchInfo)>,
    pub(crate) result_tree: Option<LayoutResultTree>,
}

impl LayoutState {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn width_spec(&self) -> SizeSpec {
        self.width_spec
    }

    pub fn height_spec(&self) -> SizeSpec {
        self.height_spec
    }

    /// Measured size of the root.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Whether this layout satisfies the given constraints.
    pub fn is_compatible(&self, width: SizeSpec, height: SizeSpec) -> bool {
        self.width_spec == width && self.height_spec == height
    }

    pub fn outputs(&self) -> &[RenderUnit] {
        &self.outputs
    }

    pub fn output(&self, index: usize) -> Option<&RenderUnit> {
        self.outputs.get(index)
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn index_of(&self, id: u64) -> Option<usize> {
        self.id_to_index.get(&id).copied()
    }

    pub fn output_by_id(&self, id: u64) -> Option<&RenderUnit> {
        self.index_of(id).map(|index| &self.outputs[index])
    }

    /// Output indexes sorted by top edge.
    pub fn tops(&self) -> &[usize] {
        &self.tops
    }

    /// Output indexes sorted by bottom edge.
    pub fn bottoms(&self) -> &[usize] {
        &self.bottoms
    }

    pub fn visibility_outputs(&self) -> &[VisibilityOutput] {
        &self.visibility_outputs
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn working_ranges(&self) -> &[WorkingRangeRecord] {
        &self.working_ranges
    }

    pub fn diff_record(&self, global_key: &str) -> Option<&DiffRecord> {
        self.diff_records.get(global_key)
    }

    /// Id the `unit` output of `global_key` received.
    pub fn output_id_for(&self, global_key: &str, unit: OutputUnitType) -> Option<u64> {
        self.output_keys.get(&(global_key.to_string(), unit)).copied()
    }

    pub(crate) fn output_keys(&self) -> &HashMap<(String, OutputUnitType), u64> {
        &self.output_keys
    }

    pub fn states(&self) -> &HashMap<String, StateRef> {
        &self.states
    }

    /// Components that may receive events, with their dispatch data.
    pub fn owners(&self) -> &[(String, DispatchInfo)] {
        &self.owners
    }

    /// Result tree, only kept when layout results are retained.
    pub fn result_tree(&self) -> Option<&LayoutResultTree> {
        self.result_tree.as_ref()
    }

    /// Drop the result tree once outputs have been extracted.
    pub fn release_layout_phase_data(&mut self) {
        self.result_tree = None;
    }

    /// Whether any output belongs to a transition key.
    pub fn has_transitions(&self) -> bool {
        !self.transitions.is_empty()
    }
}

impl std::fmt::Debug for LayoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutState")
            .field("version", &self.version)
            .field("size", &self.size)
            .field("outputs", &self.outputs.len())
            .field("visibility_outputs", &self.visibility_outputs.len())
            .field("transitions", &self.transitions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_info_set_once() {
        let mut unit = RenderUnit::new(OutputUnitType::Host, UnitContent::Host, Rect::EMPTY, 0, "1");
        unit.id = 42;
        unit.set_node_info(NodeInfo::default()).unwrap();
        assert!(matches!(
            unit.set_node_info(NodeInfo::default()),
            Err(RenderError::NodeInfoAlreadySet { id: 42 })
        ));

        unit.set_view_node_info(ViewNodeInfo::default()).unwrap();
        assert!(matches!(
            unit.set_view_node_info(ViewNodeInfo::default()),
            Err(RenderError::ViewNodeInfoAlreadySet { id: 42 })
        ));
    }

    #[test]
    fn test_equivalence_ignores_bounds() {
        let spec = DrawableSpec::Background(Rgba::RED);
        let a = RenderUnit::new(
            OutputUnitType::Background,
            UnitContent::Drawable(spec.clone()),
            Rect::new(0, 0, 10, 10),
            0,
            "1",
        );
        let mut b = a.clone();
        b.bounds = Rect::new(5, 5, 20, 20);
        assert!(a.is_equivalent_to(&b));

        b.content = UnitContent::Drawable(DrawableSpec::Background(Rgba::BLUE));
        assert!(!a.is_equivalent_to(&b));
    }
}
