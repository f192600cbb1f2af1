//! Platform seam - what mount needs from the GUI toolkit.
//!
//! Mount never touches a real view or drawable. It works through:
//!
//! - [`MountContent`]: one live piece of platform content (view, drawable,
//!   host container)
//! - [`HostContainer`]: the child list of a host view, addressed by the
//!   output position of each child
//! - [`ContentFactory`]: creates hosts and drawables when no pooled
//!   instance is available
//!
//! Leaf components create their own content through
//! `ProducesMeasuredContent::create_content`.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;

use crate::animation::AnimatedProperty;
use crate::engine::AccessibilityImportance;
use crate::types::{Edges, Rect, Rgba};

// =============================================================================
// Content types
// =============================================================================

/// Pool key of a piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentType(Cow<'static, str>);

impl ContentType {
    pub const HOST: ContentType = ContentType(Cow::Borrowed("host"));
    pub const BACKGROUND: ContentType = ContentType(Cow::Borrowed("drawable.background"));
    pub const FOREGROUND: ContentType = ContentType(Cow::Borrowed("drawable.foreground"));
    pub const BORDER: ContentType = ContentType(Cow::Borrowed("drawable.border"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A framework drawn decoration.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawableSpec {
    Background(Rgba),
    Foreground(Rgba),
    Border { widths: Edges, color: Rgba },
}

impl DrawableSpec {
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Background(_) => ContentType::BACKGROUND,
            Self::Foreground(_) => ContentType::FOREGROUND,
            Self::Border { .. } => ContentType::BORDER,
        }
    }
}

// =============================================================================
// View attributes
// =============================================================================

bitflags::bitflags! {
    /// Interaction state of a view.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ViewFlags: u8 {
        const CLICKABLE = 1 << 0;
        const LONG_CLICKABLE = 1 << 1;
        const FOCUSABLE = 1 << 2;
        const SELECTED = 1 << 3;
        const ENABLED = 1 << 4;
        const DUPLICATE_PARENT_STATE = 1 << 5;
        /// Receives touch events.
        const TOUCHABLE = 1 << 6;
    }
}

bitflags::bitflags! {
    /// Drawable state propagated from a host to its children.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DrawableState: u8 {
        const PRESSED = 1 << 0;
        const FOCUSED = 1 << 1;
        const SELECTED = 1 << 2;
        const ENABLED = 1 << 3;
        const ACTIVATED = 1 << 4;
    }
}

/// Attributes mount writes onto a view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewAttributes {
    pub flags: ViewFlags,
    pub content_description: Option<String>,
    pub accessibility_role: Option<String>,
    pub importance: AccessibilityImportance,
    pub alpha: f32,
    pub view_tag: Option<String>,
}

impl Default for ViewAttributes {
    fn default() -> Self {
        Self {
            flags: ViewFlags::ENABLED | ViewFlags::TOUCHABLE,
            content_description: None,
            accessibility_role: None,
            importance: AccessibilityImportance::Auto,
            alpha: 1.0,
            view_tag: None,
        }
    }
}

// =============================================================================
// Traits
// =============================================================================

/// One live piece of platform content.
///
/// Only the bounds are required; everything else defaults to a no-op so
/// simple drawables stay small.
pub trait MountContent: Any {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Position inside the host, in host coordinates.
    fn set_bounds(&mut self, bounds: Rect);

    /// The child container, for host content.
    fn as_host(&mut self) -> Option<&mut dyn HostContainer> {
        None
    }

    /// Current attributes of a view, `None` for content that is not a view.
    fn view_attributes(&self) -> Option<ViewAttributes> {
        None
    }

    fn apply_view_attributes(&mut self, _attributes: &ViewAttributes) {}

    fn set_drawable_state(&mut self, _state: DrawableState) {}

    /// Draw a framework decoration.
    fn bind_drawable(&mut self, _spec: &DrawableSpec) {}

    fn unbind_drawable(&mut self) {}

    /// The visible part of the content changed; content hosting its own
    /// render tree re-runs incremental mount on it.
    fn notify_visible_bounds_changed(&mut self, _visible: Option<Rect>) {}

    /// Value of a property that is not part of the bounds.
    fn animated_property(&self, _property: AnimatedProperty) -> Option<f32> {
        None
    }

    fn set_animated_property(&mut self, _property: AnimatedProperty, _value: f32) {}
}

/// Child list of a host view.
///
/// Children are addressed by their output position in the layout, which
/// is sparse within one host. Moving a child onto an occupied position
/// parks the occupant in a scrap slot until it is moved out again.
pub trait HostContainer {
    fn mount(&mut self, index: usize, id: u64);

    /// Returns the id that was mounted at `index`.
    fn unmount(&mut self, index: usize) -> Option<u64>;

    fn move_item(&mut self, id: u64, old_index: usize, new_index: usize);

    fn mount_item_count(&self) -> usize;

    /// Take the child at `index` out of the indexed list while it animates
    /// out. Hosts that cannot keep drawing it simply unmount it.
    fn start_disappearing(&mut self, index: usize) -> Option<u64> {
        self.unmount(index)
    }

    /// The disappear animation of `id` ended.
    fn finish_disappearing(&mut self, _id: u64) {}
}

/// Creates framework content when the pools are empty.
pub trait ContentFactory {
    fn create_host(&self) -> Box<dyn MountContent>;

    fn create_drawable(&self, spec: &DrawableSpec) -> Box<dyn MountContent>;
}
