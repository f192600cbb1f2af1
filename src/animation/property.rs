//! Animated properties and the targets that expose them.

use std::fmt;

/// A visual property a transition can animate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnimatedProperty {
    X,
    Y,
    Width,
    Height,
    Alpha,
    Scale,
    Rotation,
}

impl AnimatedProperty {
    pub const ALL: [AnimatedProperty; 7] = [
        Self::X,
        Self::Y,
        Self::Width,
        Self::Height,
        Self::Alpha,
        Self::Scale,
        Self::Rotation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Width => "width",
            Self::Height => "height",
            Self::Alpha => "alpha",
            Self::Scale => "scale",
            Self::Rotation => "rotation",
        }
    }

    /// Position and size live in the mount item's bounds, not the content.
    pub fn is_geometry(self) -> bool {
        matches!(self, Self::X | Self::Y | Self::Width | Self::Height)
    }

    /// Value of content that never set the property.
    pub fn default_value(self) -> f32 {
        match self {
            Self::Alpha | Self::Scale => 1.0,
            _ => 0.0,
        }
    }
}

impl fmt::Display for AnimatedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Something whose animated properties can be read and written.
pub trait AnimationTarget {
    fn property(&self, property: AnimatedProperty) -> f32;

    fn set_property(&mut self, property: AnimatedProperty, value: f32);
}

impl AnimationTarget for crate::mount::MountItem {
    fn property(&self, property: AnimatedProperty) -> f32 {
        crate::mount::MountItem::property(self, property)
    }

    fn set_property(&mut self, property: AnimatedProperty, value: f32) {
        crate::mount::MountItem::set_property(self, property, value)
    }
}
