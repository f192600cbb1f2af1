//! Animation graph - one driver node per (mount item, property).
//!
//! Bindings never write a target directly. They write the value signal of
//! the property's node, and the manager copies node values onto targets
//! after each step. Two bindings on the same property of the same item
//! therefore share one node and the later active binding wins, instead of
//! both writing the target.

use std::collections::HashMap;

use spark_signals::{Signal, signal};

use super::{AnimatedProperty, Timing, TransitionId};

/// Driver of one property of one mount item.
pub struct AnimatedPropertyNode {
    item_id: u64,
    property: AnimatedProperty,
    value: Signal<f32>,
}

impl AnimatedPropertyNode {
    fn new(item_id: u64, property: AnimatedProperty, initial: f32) -> Self {
        Self {
            item_id,
            property,
            value: signal(initial),
        }
    }

    pub fn item_id(&self) -> u64 {
        self.item_id
    }

    pub fn property(&self) -> AnimatedProperty {
        self.property
    }

    pub fn value(&self) -> f32 {
        self.value.get()
    }

    pub fn set_value(&self, value: f32) {
        self.value.set(value);
    }

    /// Signal for observers of the animated value.
    pub fn signal(&self) -> Signal<f32> {
        self.value.clone()
    }
}

impl std::fmt::Debug for AnimatedPropertyNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimatedPropertyNode")
            .field("item_id", &format_args!("{:#x}", self.item_id))
            .field("property", &self.property)
            .field("value", &self.value())
            .finish()
    }
}

/// A running interpolation feeding one node.
#[derive(Debug, Clone)]
pub struct PropertyBinding {
    pub transition_id: TransitionId,
    pub item_id: u64,
    pub property: AnimatedProperty,
    pub from: f32,
    pub to: f32,
    /// Absolute start time.
    pub start_ms: u64,
    pub timing: Timing,
}

impl PropertyBinding {
    pub fn end_ms(&self) -> u64 {
        self.start_ms + self.timing.duration_ms
    }

    /// Value at `now_ms`, `None` before the binding starts.
    pub fn value_at(&self, now_ms: u64) -> Option<f32> {
        if now_ms < self.start_ms {
            return None;
        }
        let elapsed = (now_ms - self.start_ms) as f32;
        let t = if self.timing.duration_ms == 0 {
            1.0
        } else {
            elapsed / self.timing.duration_ms as f32
        };
        Some(self.from + (self.to - self.from) * self.timing.easing.apply(t))
    }
}

/// Nodes memoized per item and the bindings driving them.
#[derive(Debug, Default)]
pub struct AnimationGraph {
    nodes: HashMap<u64, HashMap<AnimatedProperty, AnimatedPropertyNode>>,
    bindings: Vec<PropertyBinding>,
}

impl AnimationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The node of (`item_id`, `property`), created with `initial` once.
    pub fn node(&mut self, item_id: u64, property: AnimatedProperty, initial: f32) -> &AnimatedPropertyNode {
        self.nodes
            .entry(item_id)
            .or_default()
            .entry(property)
            .or_insert_with(|| AnimatedPropertyNode::new(item_id, property, initial))
    }

    pub fn existing_node(&self, item_id: u64, property: AnimatedProperty) -> Option<&AnimatedPropertyNode> {
        self.nodes.get(&item_id)?.get(&property)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.values().map(HashMap::len).sum()
    }

    pub fn bind(&mut self, binding: PropertyBinding) {
        self.node(binding.item_id, binding.property, binding.from);
        self.bindings.push(binding);
    }

    pub fn is_running(&self) -> bool {
        !self.bindings.is_empty()
    }

    pub fn bindings(&self) -> &[PropertyBinding] {
        &self.bindings
    }

    /// Step every binding to `now_ms`.
    ///
    /// Returns the nodes written, as (item, property, value), and drops
    /// finished bindings.
    pub fn step(&mut self, now_ms: u64) -> Vec<(u64, AnimatedProperty, f32)> {
        let mut written: Vec<(u64, AnimatedProperty, f32)> = Vec::new();
        for binding in &self.bindings {
            let Some(value) = binding.value_at(now_ms) else {
                continue;
            };
            if let Some(node) = self
                .nodes
                .get(&binding.item_id)
                .and_then(|props| props.get(&binding.property))
            {
                node.set_value(value);
            }
            match written
                .iter_mut()
                .find(|(item, property, _)| *item == binding.item_id && *property == binding.property)
            {
                Some(entry) => entry.2 = value,
                None => written.push((binding.item_id, binding.property, value)),
            }
        }
        self.bindings.retain(|binding| now_ms < binding.end_ms());
        written
    }

    /// Transition ids that still have bindings.
    pub fn running_ids(&self) -> Vec<&TransitionId> {
        let mut ids: Vec<&TransitionId> = self.bindings.iter().map(|b| &b.transition_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Drop the nodes of an item that is gone.
    pub fn remove_item(&mut self, item_id: u64) {
        self.nodes.remove(&item_id);
        self.bindings.retain(|binding| binding.item_id != item_id);
    }
}
