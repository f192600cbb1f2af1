//! Recording fakes for the platform seam.
//!
//! Everything here runs without a GUI toolkit. Hosts append every child
//! operation to a shared [`HostLog`] so tests can assert on exactly what a
//! mount pass did.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::animation::AnimatedProperty;
use crate::engine::{CanResolveInline, ComponentRef, ProducesMeasuredContent};
use crate::error::CallbackError;
use crate::mount::{
    ContentFactory, ContentType, DrawableSpec, DrawableState, HostContainer, MountContent,
    ViewAttributes,
};
use crate::resolve::RenderContext;
use crate::types::{Rect, Size, SizeSpec};

// =============================================================================
// Host log
// =============================================================================

/// One child operation performed on a [`RecordingHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    Mount { index: usize, id: u64 },
    Unmount { index: usize, id: Option<u64> },
    Move { id: u64, from: usize, to: usize },
    StartDisappearing { index: usize, id: Option<u64> },
    FinishDisappearing { id: u64 },
}

/// Operations shared by every host a factory created.
pub type HostLog = Arc<Mutex<Vec<HostOp>>>;

// =============================================================================
// Views
// =============================================================================

/// Plain view content that remembers what mount wrote onto it.
#[derive(Debug, Clone, Default)]
pub struct TestView {
    pub bounds: Rect,
    pub attributes: ViewAttributes,
    pub drawable_state: DrawableState,
    pub visible_bounds: Option<Rect>,
    pub label: Option<String>,
    pub properties: HashMap<AnimatedProperty, f32>,
}

impl MountContent for TestView {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn set_bounds(&mut self, bounds: Rect) {
        self.bounds = bounds;
    }

    fn view_attributes(&self) -> Option<ViewAttributes> {
        Some(self.attributes.clone())
    }

    fn apply_view_attributes(&mut self, attributes: &ViewAttributes) {
        self.attributes = attributes.clone();
    }

    fn set_drawable_state(&mut self, state: DrawableState) {
        self.drawable_state = state;
    }

    fn notify_visible_bounds_changed(&mut self, visible: Option<Rect>) {
        self.visible_bounds = visible;
    }

    fn animated_property(&self, property: AnimatedProperty) -> Option<f32> {
        self.properties.get(&property).copied()
    }

    fn set_animated_property(&mut self, property: AnimatedProperty, value: f32) {
        self.properties.insert(property, value);
    }
}

/// Framework drawable content.
#[derive(Debug, Clone, Default)]
pub struct TestDrawable {
    pub bounds: Rect,
    pub spec: Option<DrawableSpec>,
    pub drawable_state: DrawableState,
}

impl MountContent for TestDrawable {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn set_bounds(&mut self, bounds: Rect) {
        self.bounds = bounds;
    }

    fn set_drawable_state(&mut self, state: DrawableState) {
        self.drawable_state = state;
    }

    fn bind_drawable(&mut self, spec: &DrawableSpec) {
        self.spec = Some(spec.clone());
    }

    fn unbind_drawable(&mut self) {
        self.spec = None;
    }
}

// =============================================================================
// RecordingHost
// =============================================================================

/// Host view keeping a sparse child list plus a scrap slot.
///
/// Mounting or moving onto an occupied index parks the occupant in scrap;
/// a later move takes it back out.
pub struct RecordingHost {
    view: TestView,
    children: HashMap<usize, u64>,
    scrap: Vec<u64>,
    disappearing: Vec<u64>,
    log: HostLog,
}

impl RecordingHost {
    pub fn new(log: HostLog) -> Self {
        Self {
            view: TestView::default(),
            children: HashMap::new(),
            scrap: Vec::new(),
            disappearing: Vec::new(),
            log,
        }
    }

    /// Mounted children ordered by index.
    pub fn children(&self) -> Vec<(usize, u64)> {
        let mut children: Vec<_> = self.children.iter().map(|(i, id)| (*i, *id)).collect();
        children.sort_unstable();
        children
    }

    pub fn scrap(&self) -> &[u64] {
        &self.scrap
    }

    /// Children still drawn while they animate out.
    pub fn disappearing(&self) -> &[u64] {
        &self.disappearing
    }

    pub fn view(&self) -> &TestView {
        &self.view
    }

    fn park(&mut self, index: usize) {
        if let Some(occupant) = self.children.remove(&index) {
            self.scrap.push(occupant);
        }
    }
}

impl HostContainer for RecordingHost {
    fn mount(&mut self, index: usize, id: u64) {
        self.park(index);
        self.children.insert(index, id);
        self.log.lock().push(HostOp::Mount { index, id });
    }

    fn unmount(&mut self, index: usize) -> Option<u64> {
        let id = self.children.remove(&index);
        self.log.lock().push(HostOp::Unmount { index, id });
        id
    }

    fn move_item(&mut self, id: u64, old_index: usize, new_index: usize) {
        if self.children.get(&old_index) == Some(&id) {
            self.children.remove(&old_index);
        } else {
            self.scrap.retain(|scrapped| *scrapped != id);
        }
        self.park(new_index);
        self.children.insert(new_index, id);
        self.log.lock().push(HostOp::Move {
            id,
            from: old_index,
            to: new_index,
        });
    }

    fn mount_item_count(&self) -> usize {
        self.children.len()
    }

    fn start_disappearing(&mut self, index: usize) -> Option<u64> {
        let id = self.children.remove(&index);
        if let Some(id) = id {
            self.disappearing.push(id);
        }
        self.log.lock().push(HostOp::StartDisappearing { index, id });
        id
    }

    fn finish_disappearing(&mut self, id: u64) {
        self.disappearing.retain(|d| *d != id);
        self.log.lock().push(HostOp::FinishDisappearing { id });
    }
}

impl MountContent for RecordingHost {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn set_bounds(&mut self, bounds: Rect) {
        self.view.set_bounds(bounds);
    }

    fn as_host(&mut self) -> Option<&mut dyn HostContainer> {
        Some(self)
    }

    fn view_attributes(&self) -> Option<ViewAttributes> {
        self.view.view_attributes()
    }

    fn apply_view_attributes(&mut self, attributes: &ViewAttributes) {
        self.view.apply_view_attributes(attributes);
    }

    fn set_drawable_state(&mut self, state: DrawableState) {
        self.view.set_drawable_state(state);
    }

    fn notify_visible_bounds_changed(&mut self, visible: Option<Rect>) {
        self.view.notify_visible_bounds_changed(visible);
    }

    fn animated_property(&self, property: AnimatedProperty) -> Option<f32> {
        self.view.animated_property(property)
    }

    fn set_animated_property(&mut self, property: AnimatedProperty, value: f32) {
        self.view.set_animated_property(property, value);
    }
}

// =============================================================================
// RecordingFactory
// =============================================================================

/// Creates recording hosts that all write to one log.
#[derive(Clone, Default)]
pub struct RecordingFactory {
    log: HostLog,
    created: Arc<AtomicUsize>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &HostLog {
        &self.log
    }

    /// Root host sharing this factory's log.
    pub fn root(&self) -> Box<dyn MountContent> {
        Box::new(RecordingHost::new(self.log.clone()))
    }

    /// Hosts and drawables created so far (the root is not counted).
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Logged moves, in order.
    pub fn moves(&self) -> Vec<HostOp> {
        self.log
            .lock()
            .iter()
            .filter(|op| matches!(op, HostOp::Move { .. }))
            .cloned()
            .collect()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }
}

impl ContentFactory for RecordingFactory {
    fn create_host(&self) -> Box<dyn MountContent> {
        self.created.fetch_add(1, Ordering::Relaxed);
        Box::new(RecordingHost::new(self.log.clone()))
    }

    fn create_drawable(&self, _spec: &DrawableSpec) -> Box<dyn MountContent> {
        self.created.fetch_add(1, Ordering::Relaxed);
        Box::new(TestDrawable::default())
    }
}

// =============================================================================
// Components
// =============================================================================

/// Leaf of a fixed desired size.
#[derive(Debug, Default)]
pub struct TestLeaf {
    label: Option<String>,
    size: Size,
    fail_mount: bool,
    measures: AtomicUsize,
}

impl TestLeaf {
    pub fn fixed(width: f32, height: f32) -> Arc<Self> {
        Arc::new(Self {
            size: Size::new(width, height),
            ..Self::default()
        })
    }

    /// Equivalent to another labeled leaf with the same label and size.
    pub fn labeled(label: impl Into<String>, width: f32, height: f32) -> Arc<Self> {
        Arc::new(Self {
            label: Some(label.into()),
            size: Size::new(width, height),
            ..Self::default()
        })
    }

    /// Measures fine, fails when bound to content.
    pub fn failing_mount(width: f32, height: f32) -> Arc<Self> {
        Arc::new(Self {
            size: Size::new(width, height),
            fail_mount: true,
            ..Self::default()
        })
    }

    pub fn measure_calls(&self) -> usize {
        self.measures.load(Ordering::Relaxed)
    }
}

impl ProducesMeasuredContent for TestLeaf {
    fn content_type(&self) -> ContentType {
        ContentType::new("test.leaf")
    }

    fn measure(&self, width: SizeSpec, height: SizeSpec) -> Result<Size, CallbackError> {
        self.measures.fetch_add(1, Ordering::Relaxed);
        Ok(Size::new(width.resolve(self.size.width), height.resolve(self.size.height)))
    }

    fn create_content(&self) -> Box<dyn MountContent> {
        Box::new(TestView::default())
    }

    fn mount(&self, content: &mut dyn MountContent) -> Result<(), CallbackError> {
        if self.fail_mount {
            return Err(CallbackError::new("content refused to bind"));
        }
        if let Some(view) = content.as_any_mut().downcast_mut::<TestView>() {
            view.label = self.label.clone();
        }
        Ok(())
    }

    fn unmount(&self, content: &mut dyn MountContent) {
        if let Some(view) = content.as_any_mut().downcast_mut::<TestView>() {
            view.label = None;
        }
    }

    fn is_equivalent_to(&self, other: &dyn ProducesMeasuredContent) -> bool {
        match other.as_any().downcast_ref::<TestLeaf>() {
            Some(other) => {
                self.label.is_some() && self.label == other.label && self.size == other.size
            }
            None => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

enum InlineBehavior {
    Returning(ComponentRef),
    Failing(String),
    Empty,
}

/// Composite with a canned render result.
pub struct TestInline {
    behavior: InlineBehavior,
}

impl TestInline {
    pub fn returning(child: ComponentRef) -> Arc<Self> {
        Arc::new(Self {
            behavior: InlineBehavior::Returning(child),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            behavior: InlineBehavior::Failing(message.to_string()),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            behavior: InlineBehavior::Empty,
        })
    }
}

impl CanResolveInline for TestInline {
    fn render(&self, _ctx: &mut RenderContext<'_>) -> Result<Option<ComponentRef>, CallbackError> {
        match &self.behavior {
            InlineBehavior::Returning(child) => Ok(Some(child.clone())),
            InlineBehavior::Failing(message) => Err(CallbackError::new(message.clone())),
            InlineBehavior::Empty => Ok(None),
        }
    }
}
