//! Transitions between layout versions.
//!
//! - [`transition`]: keys and declarations (`Transition::animate`, parallel
//!   and sequence sets, easing)
//! - [`property`]: animatable properties and [`AnimationTarget`]
//! - [`graph`]: one driver node per (item, property) plus running bindings
//! - [`manager`]: before/after capture and binding activation for a mount

pub mod graph;
pub mod manager;
pub mod property;
pub mod transition;

pub use graph::{AnimatedPropertyNode, AnimationGraph, PropertyBinding};
pub use manager::{ChangeType, PropertyResolver, TargetLookup, TransitionManager};
pub use property::{AnimatedProperty, AnimationTarget};
pub use transition::{
    DEFAULT_DURATION_MS, Easing, PropertyTransition, RuntimeValue, ScheduledAnimation, Timing,
    Transition, TransitionId, TransitionKeyType,
};
