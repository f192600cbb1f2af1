//! Transition manager - before/after capture around a mount pass.
//!
//! ```text
//!   mount(layout)
//!     on_new_transition_context(prev records, next records)
//!     for every keyed item torn down or updated:  on_pre_mount_item   (before values)
//!     ... unmount / mount / update ...
//!     for every keyed item mounted or updated:    on_post_mount_item  (after values)
//!     activate_bindings(targets, now)
//!
//!   frame(now)
//!     advance(targets, now) -> finished disappearing items
//! ```
//!
//! Keys are classified by where their items showed up:
//!
//! | before | after | in next tree | change      |
//! |--------|-------|--------------|-------------|
//! | yes    | yes   | yes          | Unchanged   |
//! | no     | yes   | yes          | Appeared    |
//! | yes    | no    | no           | Disappeared |

use std::collections::{HashMap, HashSet};

use crate::error::{RenderError, RenderResult};
use crate::layout::TransitionRecord;

use super::{
    AnimatedProperty, AnimatedPropertyNode, AnimationGraph, AnimationTarget, PropertyBinding,
    ScheduledAnimation, Transition, TransitionId,
};

// =============================================================================
// Classification
// =============================================================================

/// How a transition key changed between two layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Appeared,
    Disappeared,
    Unchanged,
}

impl ChangeType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Appeared => "appeared",
            Self::Disappeared => "disappeared",
            Self::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Default)]
struct TransitionDiff {
    change: Option<ChangeType>,
    before_item: Option<u64>,
    after_item: Option<u64>,
    before: HashMap<AnimatedProperty, f32>,
    after: HashMap<AnimatedProperty, f32>,
    appear_from: HashMap<AnimatedProperty, f32>,
    disappear_to: HashMap<AnimatedProperty, f32>,
}

impl TransitionDiff {
    fn animated_item(&self) -> Option<u64> {
        match self.change? {
            ChangeType::Disappeared => self.before_item,
            ChangeType::Appeared | ChangeType::Unchanged => self.after_item,
        }
    }
}

// =============================================================================
// Seams
// =============================================================================

/// Finds the animation target of a mount item.
pub trait TargetLookup {
    fn target(&mut self, item_id: u64) -> Option<&mut dyn AnimationTarget>;
}

impl<T: AnimationTarget> TargetLookup for HashMap<u64, T> {
    fn target(&mut self, item_id: u64) -> Option<&mut dyn AnimationTarget> {
        self.get_mut(&item_id).map(|t| t as &mut dyn AnimationTarget)
    }
}

/// Values and driver nodes by (transition key, property).
///
/// Bindings read start and end values through this and never touch mount
/// items directly.
pub trait PropertyResolver {
    /// Value the animation starts from.
    fn current_state(&self, id: &TransitionId, property: AnimatedProperty) -> Option<f32>;

    /// Value the animation ends at.
    fn end_state(&self, id: &TransitionId, property: AnimatedProperty) -> Option<f32>;

    fn animated_property_node(
        &mut self,
        id: &TransitionId,
        property: AnimatedProperty,
    ) -> Option<&AnimatedPropertyNode>;
}

// =============================================================================
// TransitionManager
// =============================================================================

#[derive(Debug, Default)]
pub struct TransitionManager {
    transitions: HashMap<TransitionId, Vec<Transition>>,
    properties: HashMap<TransitionId, Vec<AnimatedProperty>>,
    next_keys: HashSet<TransitionId>,
    diffs: HashMap<TransitionId, TransitionDiff>,
    disappearing: HashMap<TransitionId, u64>,
    graph: AnimationGraph,
}

impl TransitionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new before/after capture.
    ///
    /// Keys of `next` use the next tree's transitions. Keys only in
    /// `previous` keep theirs so they can animate out.
    pub fn on_new_transition_context(&mut self, previous: &[TransitionRecord], next: &[TransitionRecord]) {
        self.transitions.clear();
        self.properties.clear();
        self.diffs.clear();
        self.next_keys = next.iter().map(|r| r.id.clone()).collect();

        for record in next.iter().chain(previous) {
            if self.transitions.contains_key(&record.id) || record.transitions.is_empty() {
                continue;
            }
            let mut properties: Vec<AnimatedProperty> =
                record.transitions.iter().flat_map(Transition::properties).collect();
            properties.sort();
            properties.dedup();
            self.properties.insert(record.id.clone(), properties);
            self.transitions.insert(record.id.clone(), record.transitions.clone());
        }
        log::trace!(
            "transition context: {} keys, {} in next tree",
            self.transitions.len(),
            self.next_keys.len()
        );
    }

    /// Whether `id` has at least one animated property in this context.
    pub fn is_animating_key(&self, id: &TransitionId) -> bool {
        self.properties.get(id).is_some_and(|p| !p.is_empty())
    }

    /// Capture before values of `item_id` ahead of unmount or update.
    pub fn on_pre_mount_item(
        &mut self,
        id: &TransitionId,
        item_id: u64,
        target: &dyn AnimationTarget,
    ) -> RenderResult<()> {
        let Some(properties) = self.properties.get(id) else {
            return Ok(());
        };
        let diff = self.diffs.entry(id.clone()).or_default();
        claim(&mut diff.before_item, id, item_id)?;
        for &property in properties {
            diff.before.insert(property, target.property(property));
        }
        Ok(())
    }

    /// Capture after values of `item_id` once it is mounted or updated.
    pub fn on_post_mount_item(
        &mut self,
        id: &TransitionId,
        item_id: u64,
        target: &dyn AnimationTarget,
    ) -> RenderResult<()> {
        let Some(properties) = self.properties.get(id) else {
            return Ok(());
        };
        let diff = self.diffs.entry(id.clone()).or_default();
        claim(&mut diff.after_item, id, item_id)?;
        for &property in properties {
            diff.after.insert(property, target.property(property));
        }
        diff.change = Some(if diff.before_item.is_some() {
            ChangeType::Unchanged
        } else {
            ChangeType::Appeared
        });
        Ok(())
    }

    /// Whether an item of `id` being unmounted should stay for a disappear
    /// animation.
    pub fn should_animate_disappear(&self, id: &TransitionId) -> bool {
        !self.next_keys.contains(id)
            && self.transitions.get(id).is_some_and(|transitions| {
                let mut scheduled = Vec::new();
                for t in transitions {
                    t.schedule(0, &mut scheduled);
                }
                scheduled.iter().any(|s| s.disappear_to.is_some())
            })
    }

    /// Keep `item_id` mounted while `id` animates out.
    pub fn record_disappearing(&mut self, id: &TransitionId, item_id: u64) -> RenderResult<()> {
        if self.next_keys.contains(id) {
            let state = self
                .diffs
                .get(id)
                .and_then(|d| d.change)
                .unwrap_or(ChangeType::Unchanged);
            return Err(RenderError::NotDisappearing {
                key: id.to_string(),
                state: state.name(),
            });
        }
        self.disappearing.insert(id.clone(), item_id);
        Ok(())
    }

    /// Classification of `id` in the current context.
    pub fn change_type(&self, id: &TransitionId) -> Option<ChangeType> {
        self.diffs.get(id).and_then(|d| d.change)
    }

    fn classify_disappeared(&mut self) {
        for (id, diff) in &mut self.diffs {
            if diff.change.is_none() && diff.before_item.is_some() && !self.next_keys.contains(id) {
                diff.change = Some(ChangeType::Disappeared);
            }
        }
    }

    /// Resolve start and end values and start every binding at `now_ms`.
    pub fn activate_bindings(&mut self, targets: &mut dyn TargetLookup, now_ms: u64) -> RenderResult<()> {
        self.classify_disappeared();

        let mut ids: Vec<TransitionId> = self.diffs.keys().cloned().collect();
        ids.sort();

        for id in ids {
            let Some(transitions) = self.transitions.get(&id) else {
                continue;
            };
            let mut scheduled: Vec<ScheduledAnimation> = Vec::new();
            for t in transitions {
                t.schedule(0, &mut scheduled);
            }
            let Some(diff) = self.diffs.get_mut(&id) else {
                continue;
            };
            let Some(change) = diff.change else {
                continue;
            };

            match change {
                ChangeType::Unchanged => {
                    let Some(target) = diff.after_item.and_then(|item| targets.target(item)) else {
                        continue;
                    };
                    for (&property, &before) in &diff.before {
                        target.set_property(property, before);
                    }
                }
                ChangeType::Appeared => {
                    let Some(target) = diff.after_item.and_then(|item| targets.target(item)) else {
                        continue;
                    };
                    for animation in &scheduled {
                        let (Some(from), Some(&end)) =
                            (animation.appear_from, diff.after.get(&animation.property))
                        else {
                            continue;
                        };
                        let value = from.resolve(end);
                        diff.appear_from.insert(animation.property, value);
                        target.set_property(animation.property, value);
                    }
                }
                ChangeType::Disappeared => {
                    if self.disappearing.get(&id) != diff.before_item.as_ref() {
                        continue;
                    }
                    for animation in &scheduled {
                        let (Some(to), Some(&start)) =
                            (animation.disappear_to, diff.before.get(&animation.property))
                        else {
                            continue;
                        };
                        diff.disappear_to.insert(animation.property, to.resolve(start));
                    }
                }
            }

            self.start_bindings(&id, change, &scheduled, now_ms);
        }
        Ok(())
    }

    fn start_bindings(&mut self, id: &TransitionId, change: ChangeType, scheduled: &[ScheduledAnimation], now_ms: u64) {
        let Some(item_id) = self.diffs.get(id).and_then(TransitionDiff::animated_item) else {
            return;
        };
        for animation in scheduled {
            let wanted = match change {
                ChangeType::Appeared => animation.appear_from.is_some(),
                ChangeType::Disappeared => animation.disappear_to.is_some(),
                ChangeType::Unchanged => true,
            };
            if !wanted {
                continue;
            }
            let (Some(from), Some(to)) = (
                self.current_state(id, animation.property),
                self.end_state(id, animation.property),
            ) else {
                continue;
            };
            if from == to && change == ChangeType::Unchanged {
                continue;
            }
            if let Some(node) = self.animated_property_node(id, animation.property) {
                node.set_value(from);
            }
            self.graph.bind(PropertyBinding {
                transition_id: id.clone(),
                item_id,
                property: animation.property,
                from,
                to,
                start_ms: now_ms + animation.start_ms,
                timing: animation.timing,
            });
        }
    }

    /// Step running animations to `now_ms` and write values to targets.
    ///
    /// Returns disappearing items whose animations finished; the caller
    /// unmounts them.
    pub fn advance(&mut self, targets: &mut dyn TargetLookup, now_ms: u64) -> Vec<u64> {
        for (item_id, property, value) in self.graph.step(now_ms) {
            if let Some(target) = targets.target(item_id) {
                target.set_property(property, value);
            }
        }

        let running: HashSet<&TransitionId> = self.graph.running_ids().into_iter().collect();
        let finished: Vec<(TransitionId, u64)> = self
            .disappearing
            .iter()
            .filter(|(id, _)| !running.contains(id))
            .map(|(id, item)| (id.clone(), *item))
            .collect();

        let mut done = Vec::with_capacity(finished.len());
        for (id, item_id) in finished {
            self.disappearing.remove(&id);
            self.graph.remove_item(item_id);
            done.push(item_id);
        }
        done
    }

    pub fn is_running(&self) -> bool {
        self.graph.is_running()
    }

    /// Items kept mounted for disappear animations.
    pub fn disappearing_items(&self) -> impl Iterator<Item = u64> + '_ {
        self.disappearing.values().copied()
    }

    pub fn is_disappearing_item(&self, item_id: u64) -> bool {
        self.disappearing.values().any(|&item| item == item_id)
    }

    pub fn graph(&self) -> &AnimationGraph {
        &self.graph
    }

    /// Forget an item that was unmounted outside of a transition.
    pub fn forget_item(&mut self, item_id: u64) {
        self.graph.remove_item(item_id);
        self.disappearing.retain(|_, item| *item != item_id);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn claim(slot: &mut Option<u64>, id: &TransitionId, item_id: u64) -> RenderResult<()> {
    match *slot {
        Some(first) if first != item_id => Err(RenderError::DuplicateTransitionKey {
            key: id.to_string(),
            first,
            second: item_id,
        }),
        _ => {
            *slot = Some(item_id);
            Ok(())
        }
    }
}

impl PropertyResolver for TransitionManager {
    fn current_state(&self, id: &TransitionId, property: AnimatedProperty) -> Option<f32> {
        let diff = self.diffs.get(id)?;
        match diff.change? {
            ChangeType::Appeared => diff.appear_from.get(&property).copied(),
            ChangeType::Unchanged | ChangeType::Disappeared => diff.before.get(&property).copied(),
        }
    }

    fn end_state(&self, id: &TransitionId, property: AnimatedProperty) -> Option<f32> {
        let diff = self.diffs.get(id)?;
        match diff.change? {
            ChangeType::Disappeared => diff.disappear_to.get(&property).copied(),
            ChangeType::Unchanged | ChangeType::Appeared => diff.after.get(&property).copied(),
        }
    }

    fn animated_property_node(
        &mut self,
        id: &TransitionId,
        property: AnimatedProperty,
    ) -> Option<&AnimatedPropertyNode> {
        let item_id = self.diffs.get(id)?.animated_item()?;
        let initial = self.current_state(id, property).unwrap_or(property.default_value());
        Some(self.graph.node(item_id, property, initial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Easing, TransitionKeyType};

    #[derive(Default)]
    struct Target(HashMap<AnimatedProperty, f32>);

    impl AnimationTarget for Target {
        fn property(&self, property: AnimatedProperty) -> f32 {
            self.0.get(&property).copied().unwrap_or(property.default_value())
        }

        fn set_property(&mut self, property: AnimatedProperty, value: f32) {
            self.0.insert(property, value);
        }
    }

    fn record(key: &str, output_id: u64, transition: Transition) -> TransitionRecord {
        TransitionRecord {
            id: TransitionId::new(TransitionKeyType::Global, key, ""),
            output_id,
            transitions: vec![transition],
        }
    }

    fn linear(properties: impl IntoIterator<Item = AnimatedProperty>) -> Transition {
        Transition::animate(properties).duration_ms(100).easing(Easing::Linear)
    }

    #[test]
    fn test_unchanged_restores_before_then_animates() {
        let id = TransitionId::global("card");
        let records = vec![record("card", 7, linear([AnimatedProperty::X]))];
        let mut targets: HashMap<u64, Target> = HashMap::new();
        targets.insert(7, Target::default());

        let mut manager = TransitionManager::new();
        manager.on_new_transition_context(&records, &records);
        manager.on_pre_mount_item(&id, 7, &targets[&7]).unwrap();
        targets.get_mut(&7).unwrap().set_property(AnimatedProperty::X, 100.0);
        manager.on_post_mount_item(&id, 7, &targets[&7]).unwrap();
        assert_eq!(manager.change_type(&id), Some(ChangeType::Unchanged));

        manager.activate_bindings(&mut targets, 1000).unwrap();
        assert_eq!(targets[&7].property(AnimatedProperty::X), 0.0);
        assert_eq!(manager.current_state(&id, AnimatedProperty::X), Some(0.0));
        assert_eq!(manager.end_state(&id, AnimatedProperty::X), Some(100.0));

        manager.advance(&mut targets, 1050);
        assert_eq!(targets[&7].property(AnimatedProperty::X), 50.0);
        manager.advance(&mut targets, 1100);
        assert_eq!(targets[&7].property(AnimatedProperty::X), 100.0);
        assert!(!manager.is_running());
    }

    #[test]
    fn test_appear_from_is_applied_immediately() {
        let id = TransitionId::global("badge");
        let records = vec![record("badge", 3, linear([AnimatedProperty::Alpha]).appear_from(0.0))];
        let mut targets: HashMap<u64, Target> = HashMap::new();
        targets.insert(3, Target::default());

        let mut manager = TransitionManager::new();
        manager.on_new_transition_context(&[], &records);
        manager.on_post_mount_item(&id, 3, &targets[&3]).unwrap();
        assert_eq!(manager.change_type(&id), Some(ChangeType::Appeared));

        manager.activate_bindings(&mut targets, 0).unwrap();
        assert_eq!(targets[&3].property(AnimatedProperty::Alpha), 0.0);
        assert!(manager.is_running());

        manager.advance(&mut targets, 100);
        assert_eq!(targets[&3].property(AnimatedProperty::Alpha), 1.0);
    }

    #[test]
    fn test_disappearing_item_finishes_then_is_released() {
        let id = TransitionId::global("toast");
        let previous = vec![record("toast", 9, linear([AnimatedProperty::Alpha]).disappear_to(0.0))];
        let mut targets: HashMap<u64, Target> = HashMap::new();
        targets.insert(9, Target::default());

        let mut manager = TransitionManager::new();
        manager.on_new_transition_context(&previous, &[]);
        assert!(manager.should_animate_disappear(&id));
        manager.on_pre_mount_item(&id, 9, &targets[&9]).unwrap();
        manager.record_disappearing(&id, 9).unwrap();

        manager.activate_bindings(&mut targets, 0).unwrap();
        assert_eq!(manager.change_type(&id), Some(ChangeType::Disappeared));
        assert!(manager.advance(&mut targets, 50).is_empty());
        assert_eq!(targets[&9].property(AnimatedProperty::Alpha), 0.5);

        assert_eq!(manager.advance(&mut targets, 100), vec![9]);
        assert_eq!(targets[&9].property(AnimatedProperty::Alpha), 0.0);
        assert!(!manager.is_disappearing_item(9));
    }

    #[test]
    fn test_disappear_of_present_key_fails() {
        let id = TransitionId::global("card");
        let records = vec![record("card", 1, linear([AnimatedProperty::Alpha]).disappear_to(0.0))];
        let mut manager = TransitionManager::new();
        manager.on_new_transition_context(&records, &records);
        assert!(!manager.should_animate_disappear(&id));
        assert!(matches!(
            manager.record_disappearing(&id, 1),
            Err(RenderError::NotDisappearing { .. })
        ));
    }

    #[test]
    fn test_two_items_with_one_key_fail() {
        let id = TransitionId::global("card");
        let records = vec![record("card", 1, linear([AnimatedProperty::X]))];
        let target = Target::default();
        let mut manager = TransitionManager::new();
        manager.on_new_transition_context(&[], &records);
        manager.on_post_mount_item(&id, 1, &target).unwrap();
        assert!(matches!(
            manager.on_post_mount_item(&id, 2, &target),
            Err(RenderError::DuplicateTransitionKey { first: 1, second: 2, .. })
        ));
    }

    #[test]
    fn test_unregistered_keys_are_ignored() {
        let id = TransitionId::global("plain");
        let target = Target::default();
        let mut manager = TransitionManager::new();
        manager.on_new_transition_context(&[], &[]);
        manager.on_pre_mount_item(&id, 1, &target).unwrap();
        manager.on_post_mount_item(&id, 1, &target).unwrap();
        assert_eq!(manager.change_type(&id), None);
        assert!(!manager.is_animating_key(&id));
    }
}
