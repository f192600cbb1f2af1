//! Mount items - a render unit paired with its live content.

use crate::animation::AnimatedProperty;
use crate::error::CallbackError;
use crate::layout::{RenderUnit, UnitContent};
use crate::types::{OutputFlags, Rect};

use super::{HostContainer, MountContent, ViewAttributes, ViewFlags};
use crate::engine::HandlerSlot;

/// Live record of one mounted output.
pub struct MountItem {
    pub(crate) unit: RenderUnit,
    pub(crate) content: Box<dyn MountContent>,
    /// Position inside the host (the output index it was mounted at).
    pub(crate) index: usize,
    /// Absolute bounds currently applied; animations may move them.
    pub(crate) bounds: Rect,
    /// Absolute origin of the host.
    pub(crate) host_origin: (i32, i32),
    pub(crate) bound: bool,
    /// Attributes the view had before mount data was applied.
    pub(crate) default_attributes: Option<ViewAttributes>,
}

impl MountItem {
    pub(crate) fn new(
        unit: RenderUnit,
        content: Box<dyn MountContent>,
        index: usize,
        host_origin: (i32, i32),
    ) -> Self {
        let default_attributes = content.view_attributes();
        Self {
            bounds: unit.bounds(),
            unit,
            content,
            index,
            host_origin,
            bound: false,
            default_attributes,
        }
    }

    pub fn id(&self) -> u64 {
        self.unit.id()
    }

    pub fn unit(&self) -> &RenderUnit {
        &self.unit
    }

    pub fn host_id(&self) -> u64 {
        self.unit.host_id()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn content(&self) -> &dyn MountContent {
        self.content.as_ref()
    }

    pub fn content_mut(&mut self) -> &mut dyn MountContent {
        self.content.as_mut()
    }

    /// Downcast the content.
    pub fn content_as<T: 'static>(&self) -> Option<&T> {
        self.content.as_any().downcast_ref::<T>()
    }

    pub(crate) fn as_host(&mut self) -> Option<&mut dyn HostContainer> {
        self.content.as_host()
    }

    /// Set absolute bounds and push them, host relative, to the content.
    pub(crate) fn apply_bounds(&mut self, bounds: Rect) {
        self.bounds = bounds;
        let (x, y) = self.host_origin;
        self.content.set_bounds(bounds.offset(-x, -y));
    }

    /// Bind the unit's data to the content.
    pub(crate) fn bind(&mut self) -> Result<(), CallbackError> {
        match &self.unit.content {
            UnitContent::Leaf(leaf) => leaf.mount(self.content.as_mut())?,
            UnitContent::Drawable(spec) => self.content.bind_drawable(spec),
            UnitContent::Host => {}
        }
        self.apply_view_attributes();
        self.bound = true;
        Ok(())
    }

    pub(crate) fn unbind(&mut self) {
        if !self.bound {
            return;
        }
        match &self.unit.content {
            UnitContent::Leaf(leaf) => leaf.unmount(self.content.as_mut()),
            UnitContent::Drawable(_) => self.content.unbind_drawable(),
            UnitContent::Host => {}
        }
        if let Some(defaults) = &self.default_attributes {
            self.content.apply_view_attributes(defaults);
        }
        self.bound = false;
    }

    /// Recompute and apply view attributes from the current unit.
    pub(crate) fn apply_view_attributes(&mut self) {
        if let Some(defaults) = &self.default_attributes {
            let attributes = view_attributes_for(defaults, &self.unit);
            self.content.apply_view_attributes(&attributes);
        }
    }

    // =========================================================================
    // Animated properties
    // =========================================================================

    pub fn property(&self, property: AnimatedProperty) -> f32 {
        let b = self.bounds;
        match property {
            AnimatedProperty::X => b.left as f32,
            AnimatedProperty::Y => b.top as f32,
            AnimatedProperty::Width => b.width() as f32,
            AnimatedProperty::Height => b.height() as f32,
            _ => self
                .content
                .animated_property(property)
                .unwrap_or_else(|| property.default_value()),
        }
    }

    pub fn set_property(&mut self, property: AnimatedProperty, value: f32) {
        let b = self.bounds;
        let v = value.round() as i32;
        let bounds = match property {
            AnimatedProperty::X => Rect::from_xywh(v, b.top, b.width(), b.height()),
            AnimatedProperty::Y => Rect::from_xywh(b.left, v, b.width(), b.height()),
            AnimatedProperty::Width => Rect::from_xywh(b.left, b.top, v, b.height()),
            AnimatedProperty::Height => Rect::from_xywh(b.left, b.top, b.width(), v),
            _ => {
                self.content.set_animated_property(property, value);
                return;
            }
        };
        self.apply_bounds(bounds);
    }

    /// Reset animated content properties to their defaults. Geometry is
    /// left alone; the next bind sets it from the unit.
    pub(crate) fn reset_animated_properties(&mut self) {
        for property in AnimatedProperty::ALL {
            if property.is_geometry() {
                continue;
            }
            let default = property.default_value();
            if self
                .content
                .animated_property(property)
                .is_some_and(|value| value != default)
            {
                self.content.set_animated_property(property, default);
            }
        }
    }
}

impl std::fmt::Debug for MountItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountItem")
            .field("id", &format_args!("{:#x}", self.id()))
            .field("index", &self.index)
            .field("host", &format_args!("{:#x}", self.host_id()))
            .field("bounds", &self.bounds)
            .field("bound", &self.bound)
            .finish()
    }
}

/// View attributes for `unit`, starting from the view's own defaults.
///
/// Explicit node info wins; anything it leaves unset keeps the default.
pub fn view_attributes_for(defaults: &ViewAttributes, unit: &RenderUnit) -> ViewAttributes {
    let mut attributes = defaults.clone();

    if let Some(info) = unit.node_info() {
        let mut set = |flag: ViewFlags, value: Option<bool>| {
            if let Some(value) = value {
                attributes.flags.set(flag, value);
            }
        };
        if info.handler(HandlerSlot::Click).is_some() {
            set(ViewFlags::CLICKABLE, Some(true));
        }
        if info.handler(HandlerSlot::LongClick).is_some() {
            set(ViewFlags::LONG_CLICKABLE, Some(true));
        }
        set(ViewFlags::FOCUSABLE, info.focusable);
        set(ViewFlags::SELECTED, info.selected);
        set(ViewFlags::ENABLED, info.enabled);

        if info.content_description.is_some() {
            attributes.content_description = info.content_description.clone();
        }
        if info.accessibility_role.is_some() {
            attributes.accessibility_role = info.accessibility_role.clone();
        }
    }

    if let Some(view_info) = unit.view_node_info() {
        if let Some(alpha) = view_info.alpha {
            attributes.alpha = alpha;
        }
        if view_info.view_tag.is_some() {
            attributes.view_tag = view_info.view_tag.clone();
        }
    }

    let flags = unit.flags();
    if flags.contains(OutputFlags::DUPLICATE_PARENT_STATE) {
        attributes.flags.insert(ViewFlags::DUPLICATE_PARENT_STATE);
    }
    if flags.contains(OutputFlags::DISABLE_TOUCHABLE) {
        attributes.flags.remove(ViewFlags::TOUCHABLE);
    }
    attributes.importance = unit.importance();
    attributes
}
