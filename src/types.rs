//! Core types for tessera.
//!
//! These types define the foundation that everything builds on.
//! They flow through resolve, layout and mount and define what the
//! platform adapters understand: rectangles in integer pixels, size specs
//! handed to the constraint solver, flex style enums and output flags.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

// =============================================================================
// Geometry
// =============================================================================

/// Integer rectangle in pixels, edges are `[left, right) x [top, bottom)`.
///
/// Same convention as the platform: `right` and `bottom` are exclusive, so a
/// rect with `left == right` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// The empty rect at the origin.
    pub const EMPTY: Self = Self::new(0, 0, 0, 0);

    /// Create a rect from its four edges.
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Create a rect from origin and size.
    pub const fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    #[inline]
    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    #[inline]
    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// True when the rect has no area.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// Strict intersection test: touching edges do not intersect.
    #[inline]
    pub const fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Compute the intersection of two rects.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }
        Some(Rect {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        })
    }

    /// True if `other` lies completely inside this rect.
    pub const fn contains(&self, other: &Rect) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    /// Translate the rect.
    #[inline]
    pub const fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    #[inline]
    pub const fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width() as i64 * self.height() as i64
        }
    }
}

/// A measured size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Self = Self {
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Per-edge values (padding, margin, border widths).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Edges {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Edges {
    pub const ZERO: Self = Self::all(0.0);

    pub const fn all(value: f32) -> Self {
        Self {
            left: value,
            top: value,
            right: value,
            bottom: value,
        }
    }

    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    #[inline]
    pub fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    #[inline]
    pub fn vertical(&self) -> f32 {
        self.top + self.bottom
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

// =============================================================================
// Size Specs - Constraints handed down during measurement
// =============================================================================

/// How a [`SizeSpec`] constrains the measured dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SizeMode {
    /// The child must be exactly `size`.
    Exactly,
    /// The child can be as large as it wants up to `size`.
    AtMost,
    /// No constraint; `size` is ignored.
    #[default]
    Unspecified,
}

/// A measurement constraint for one axis.
///
/// Two specs are equal when their modes match and their sizes are bit-equal,
/// which is what measurement memoization needs ("same exact size-spec pair").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SizeSpec {
    pub mode: SizeMode,
    pub size: f32,
}

impl SizeSpec {
    pub const fn exactly(size: f32) -> Self {
        Self {
            mode: SizeMode::Exactly,
            size,
        }
    }

    pub const fn at_most(size: f32) -> Self {
        Self {
            mode: SizeMode::AtMost,
            size,
        }
    }

    pub const fn unspecified() -> Self {
        Self {
            mode: SizeMode::Unspecified,
            size: 0.0,
        }
    }

    /// Clamp a desired size to this constraint.
    pub fn resolve(&self, desired: f32) -> f32 {
        match self.mode {
            SizeMode::Exactly => self.size,
            SizeMode::AtMost => desired.min(self.size),
            SizeMode::Unspecified => desired,
        }
    }
}

impl PartialEq for SizeSpec {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode
            && (self.mode == SizeMode::Unspecified || self.size.to_bits() == other.size.to_bits())
    }
}

impl Eq for SizeSpec {}

impl Hash for SizeSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.mode.hash(state);
        if self.mode != SizeMode::Unspecified {
            self.size.to_bits().hash(state);
        }
    }
}

// =============================================================================
// Dimension - Supports absolute and percentage values
// =============================================================================

/// A style dimension that can be absolute, percentage or content-determined.
///
/// # Examples
///
/// ```
/// use tessera::types::Dimension;
///
/// let width = Dimension::Px(50.0);          // 50 pixels
/// let height = Dimension::Percent(100.0);   // Full parent height
/// let auto = Dimension::Auto;               // Content-determined
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Dimension {
    /// Auto-size based on content.
    #[default]
    Auto,
    /// Absolute size in pixels.
    Px(f32),
    /// Percentage of parent size (0-100).
    Percent(f32),
}

impl From<f32> for Dimension {
    fn from(value: f32) -> Self {
        Self::Px(value)
    }
}

impl From<i32> for Dimension {
    fn from(value: i32) -> Self {
        Self::Px(value as f32)
    }
}

// =============================================================================
// Flex Enums - For layout
// =============================================================================

/// Main axis direction for flex containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FlexDirection {
    #[default]
    Column,
    Row,
    ColumnReverse,
    RowReverse,
}

impl FlexDirection {
    /// True for row and row-reverse.
    pub fn is_row(&self) -> bool {
        matches!(self, Self::Row | Self::RowReverse)
    }
}

/// Flex wrap behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FlexWrap {
    #[default]
    NoWrap,
    Wrap,
    WrapReverse,
}

/// Main axis alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JustifyContent {
    #[default]
    FlexStart,
    Center,
    FlexEnd,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

/// Cross axis alignment of children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AlignItems {
    #[default]
    Stretch,
    FlexStart,
    Center,
    FlexEnd,
    Baseline,
}

/// Cross axis alignment override for a single child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AlignSelf {
    /// Inherit from the parent's `align_items`.
    #[default]
    Auto,
    Stretch,
    FlexStart,
    Center,
    FlexEnd,
    Baseline,
}

/// Alignment of wrapped lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AlignContent {
    #[default]
    FlexStart,
    Stretch,
    Center,
    FlexEnd,
    SpaceBetween,
    SpaceAround,
}

/// Positioning scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PositionType {
    #[default]
    Relative,
    Absolute,
}

// =============================================================================
// Color
// =============================================================================

/// RGBA color with 8-bit channels.
///
/// Alpha 255 = fully opaque, 0 = fully transparent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque RGB color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const RED: Self = Self::rgb(255, 0, 0);
    pub const GREEN: Self = Self::rgb(0, 255, 0);
    pub const BLUE: Self = Self::rgb(0, 0, 255);
    pub const GRAY: Self = Self::rgb(128, 128, 128);

    /// Create from a packed `0xRRGGBB` integer.
    pub const fn from_rgb_int(value: u32) -> Self {
        Self::rgb(
            ((value >> 16) & 0xff) as u8,
            ((value >> 8) & 0xff) as u8,
            (value & 0xff) as u8,
        )
    }

    #[inline]
    pub const fn is_transparent(&self) -> bool {
        self.a == 0
    }
}

// =============================================================================
// Output Flags (bitflags)
// =============================================================================

bitflags::bitflags! {
    /// Flags carried by a render unit from layout into mount.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OutputFlags: u8 {
        /// Mirror the drawable state of the parent host.
        const DUPLICATE_PARENT_STATE = 1 << 0;
        /// The mounted view must not receive touch events.
        const DISABLE_TOUCHABLE = 1 << 1;
        /// A decoration that takes the full bounds of the host it lives in.
        const MATCH_HOST_BOUNDS = 1 << 2;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rect_intersects_is_strict() {
        let a = Rect::new(0, 0, 10, 10);
        let touching = Rect::new(10, 0, 20, 10);
        let overlapping = Rect::new(9, 9, 20, 20);

        assert!(!a.intersects(&touching));
        assert!(a.intersects(&overlapping));
        assert_eq!(a.intersect(&overlapping), Some(Rect::new(9, 9, 10, 10)));
        assert_eq!(a.intersect(&touching), None);
    }

    #[test]
    fn test_rect_dimensions() {
        let r = Rect::from_xywh(5, 10, 20, 30);
        assert_eq!(r, Rect::new(5, 10, 25, 40));
        assert_eq!(r.width(), 20);
        assert_eq!(r.height(), 30);
        assert_eq!(r.area(), 600);
        assert!(Rect::EMPTY.is_empty());
        assert_eq!(r.offset(-5, -10), Rect::new(0, 0, 20, 30));
    }

    #[test]
    fn test_size_spec_resolve() {
        assert_eq!(SizeSpec::exactly(100.0).resolve(40.0), 100.0);
        assert_eq!(SizeSpec::at_most(100.0).resolve(140.0), 100.0);
        assert_eq!(SizeSpec::at_most(100.0).resolve(40.0), 40.0);
        assert_eq!(SizeSpec::unspecified().resolve(40.0), 40.0);
    }

    #[test]
    fn test_size_spec_equality_ignores_unspecified_size() {
        let a = SizeSpec {
            mode: SizeMode::Unspecified,
            size: 10.0,
        };
        assert_eq!(a, SizeSpec::unspecified());
        assert_ne!(SizeSpec::exactly(10.0), SizeSpec::at_most(10.0));

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&SizeSpec::unspecified()));
    }

    #[test]
    fn test_rgba_from_rgb_int() {
        assert_eq!(Rgba::from_rgb_int(0xff0000), Rgba::RED);
        assert_eq!(Rgba::from_rgb_int(0x282a36), Rgba::rgb(40, 42, 54));
        assert!(Rgba::TRANSPARENT.is_transparent());
    }

    #[test]
    fn test_output_flags_combine() {
        let flags = OutputFlags::DUPLICATE_PARENT_STATE | OutputFlags::MATCH_HOST_BOUNDS;
        assert!(flags.contains(OutputFlags::MATCH_HOST_BOUNDS));
        assert!(!flags.contains(OutputFlags::DISABLE_TOUCHABLE));
    }
}
