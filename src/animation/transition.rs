//! Transition declarations.
//!
//! A component with a transition key declares what to animate when the
//! output behind that key changes between two layouts:
//!
//! ```ignore
//! Component::leaf("Card", card)
//!     .transition_key("card", TransitionKeyType::Global)
//!     .transition(Transition::sequence(vec![
//!         Transition::animate([AnimatedProperty::Alpha]).appear_from(0.0),
//!         Transition::animate([AnimatedProperty::Y]).duration_ms(200),
//!     ]))
//! ```

use std::fmt;

use smallvec::SmallVec;

use super::AnimatedProperty;

// =============================================================================
// Keys
// =============================================================================

/// Scope of a transition key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransitionKeyType {
    /// Unique in the whole tree.
    #[default]
    Global,
    /// Unique among the outputs of one owner.
    Local,
}

/// Identity correlating an output across two layouts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId {
    key: String,
    /// Empty for global keys.
    owner: String,
    local: bool,
}

impl TransitionId {
    pub fn new(key_type: TransitionKeyType, key: impl Into<String>, owner: impl Into<String>) -> Self {
        let local = key_type == TransitionKeyType::Local;
        Self {
            key: key.into(),
            owner: if local { owner.into() } else { String::new() },
            local,
        }
    }

    pub fn global(key: impl Into<String>) -> Self {
        Self::new(TransitionKeyType::Global, key, "")
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owner(&self) -> Option<&str> {
        self.local.then_some(self.owner.as_str())
    }

    pub fn key_type(&self) -> TransitionKeyType {
        if self.local {
            TransitionKeyType::Local
        } else {
            TransitionKeyType::Global
        }
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.local {
            write!(f, "{}/{}", self.owner, self.key)
        } else {
            f.write_str(&self.key)
        }
    }
}

// =============================================================================
// Timing
// =============================================================================

/// Easing curve over normalized time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    Linear,
    EaseIn,
    EaseOut,
    #[default]
    EaseInOut,
}

impl Easing {
    /// Progress for normalized time `t` in `0.0..=1.0`.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Self::EaseInOut => t * t * (3.0 - 2.0 * t),
        }
    }
}

pub const DEFAULT_DURATION_MS: u64 = 300;

/// Duration, delay and easing of one animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub duration_ms: u64,
    pub delay_ms: u64,
    pub easing: Easing,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            duration_ms: DEFAULT_DURATION_MS,
            delay_ms: 0,
            easing: Easing::default(),
        }
    }
}

/// A value resolved against the property's end value when needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeValue {
    Absolute(f32),
    /// Added to the end value.
    Offset(f32),
    /// Multiplied with the end value.
    Scaled(f32),
}

impl RuntimeValue {
    pub fn resolve(self, end_value: f32) -> f32 {
        match self {
            Self::Absolute(v) => v,
            Self::Offset(d) => end_value + d,
            Self::Scaled(f) => end_value * f,
        }
    }
}

impl From<f32> for RuntimeValue {
    fn from(value: f32) -> Self {
        Self::Absolute(value)
    }
}

// =============================================================================
// Transition
// =============================================================================

/// Animation of a set of properties with one timing.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyTransition {
    pub properties: SmallVec<[AnimatedProperty; 2]>,
    pub timing: Timing,
    pub appear_from: Option<RuntimeValue>,
    pub disappear_to: Option<RuntimeValue>,
}

/// A transition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Property(PropertyTransition),
    /// Children start together.
    Parallel(Vec<Transition>),
    /// Each child starts when the previous one ends.
    Sequence(Vec<Transition>),
}

/// One property animation with its absolute start offset.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledAnimation {
    pub property: AnimatedProperty,
    pub start_ms: u64,
    pub timing: Timing,
    pub appear_from: Option<RuntimeValue>,
    pub disappear_to: Option<RuntimeValue>,
}

impl Transition {
    pub fn animate(properties: impl IntoIterator<Item = AnimatedProperty>) -> Self {
        Self::Property(PropertyTransition {
            properties: properties.into_iter().collect(),
            timing: Timing::default(),
            appear_from: None,
            disappear_to: None,
        })
    }

    pub fn parallel(children: Vec<Transition>) -> Self {
        Self::Parallel(children)
    }

    pub fn sequence(children: Vec<Transition>) -> Self {
        Self::Sequence(children)
    }

    fn map_property(mut self, f: impl FnOnce(&mut PropertyTransition)) -> Self {
        if let Self::Property(p) = &mut self {
            f(p);
        }
        self
    }

    pub fn duration_ms(self, duration_ms: u64) -> Self {
        self.map_property(|p| p.timing.duration_ms = duration_ms)
    }

    pub fn delay_ms(self, delay_ms: u64) -> Self {
        self.map_property(|p| p.timing.delay_ms = delay_ms)
    }

    pub fn easing(self, easing: Easing) -> Self {
        self.map_property(|p| p.timing.easing = easing)
    }

    pub fn appear_from(self, value: impl Into<RuntimeValue>) -> Self {
        let value = value.into();
        self.map_property(|p| p.appear_from = Some(value))
    }

    pub fn disappear_to(self, value: impl Into<RuntimeValue>) -> Self {
        let value = value.into();
        self.map_property(|p| p.disappear_to = Some(value))
    }

    /// Total running time including delays.
    pub fn total_duration_ms(&self) -> u64 {
        match self {
            Self::Property(p) => p.timing.delay_ms + p.timing.duration_ms,
            Self::Parallel(children) => children
                .iter()
                .map(Transition::total_duration_ms)
                .max()
                .unwrap_or(0),
            Self::Sequence(children) => children.iter().map(Transition::total_duration_ms).sum(),
        }
    }

    /// Flatten into property animations with absolute start offsets.
    pub fn schedule(&self, start_ms: u64, out: &mut Vec<ScheduledAnimation>) {
        match self {
            Self::Property(p) => {
                for &property in &p.properties {
                    out.push(ScheduledAnimation {
                        property,
                        start_ms: start_ms + p.timing.delay_ms,
                        timing: p.timing,
                        appear_from: p.appear_from,
                        disappear_to: p.disappear_to,
                    });
                }
            }
            Self::Parallel(children) => {
                for child in children {
                    child.schedule(start_ms, out);
                }
            }
            Self::Sequence(children) => {
                let mut at = start_ms;
                for child in children {
                    child.schedule(at, out);
                    at += child.total_duration_ms();
                }
            }
        }
    }

    /// Every property this transition touches.
    pub fn properties(&self) -> Vec<AnimatedProperty> {
        let mut scheduled = Vec::new();
        self.schedule(0, &mut scheduled);
        let mut properties: Vec<AnimatedProperty> = scheduled.into_iter().map(|s| s.property).collect();
        properties.sort();
        properties.dedup();
        properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_ids_include_owner() {
        let a = TransitionId::new(TransitionKeyType::Local, "title", "1,2");
        let b = TransitionId::new(TransitionKeyType::Local, "title", "1,3");
        assert_ne!(a, b);
        assert_eq!(a.owner(), Some("1,2"));

        let g1 = TransitionId::new(TransitionKeyType::Global, "title", "1,2");
        let g2 = TransitionId::new(TransitionKeyType::Global, "title", "1,3");
        assert_eq!(g1, g2);
        assert_eq!(g1, TransitionId::global("title"));
    }

    #[test]
    fn test_easing_endpoints() {
        for easing in [Easing::Linear, Easing::EaseIn, Easing::EaseOut, Easing::EaseInOut] {
            assert_eq!(easing.apply(0.0), 0.0);
            assert_eq!(easing.apply(1.0), 1.0);
        }
        assert!(Easing::EaseIn.apply(0.5) < 0.5);
        assert!(Easing::EaseOut.apply(0.5) > 0.5);
    }

    #[test]
    fn test_sequence_schedules_back_to_back() {
        let t = Transition::sequence(vec![
            Transition::animate([AnimatedProperty::Alpha]).duration_ms(100),
            Transition::parallel(vec![
                Transition::animate([AnimatedProperty::X, AnimatedProperty::Y]).duration_ms(50),
                Transition::animate([AnimatedProperty::Scale]).delay_ms(10).duration_ms(200),
            ]),
        ]);
        assert_eq!(t.total_duration_ms(), 310);

        let mut scheduled = Vec::new();
        t.schedule(0, &mut scheduled);
        let starts: Vec<(AnimatedProperty, u64)> =
            scheduled.iter().map(|s| (s.property, s.start_ms)).collect();
        assert_eq!(
            starts,
            vec![
                (AnimatedProperty::Alpha, 0),
                (AnimatedProperty::X, 100),
                (AnimatedProperty::Y, 100),
                (AnimatedProperty::Scale, 110),
            ]
        );
    }

    #[test]
    fn test_runtime_values() {
        assert_eq!(RuntimeValue::Absolute(0.0).resolve(42.0), 0.0);
        assert_eq!(RuntimeValue::Offset(-10.0).resolve(42.0), 32.0);
        assert_eq!(RuntimeValue::Scaled(0.5).resolve(42.0), 21.0);
    }
}
