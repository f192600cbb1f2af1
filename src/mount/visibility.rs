//! Visibility processing.
//!
//! Every visibility output is checked against the visible rect after each
//! mount and scroll. Per output the tracker remembers what was already
//! reported so each handler fires on transitions only:
//!
//! - `VisibilityChanged` whenever the visible ratios change
//! - `Visible` once the width and height ratio thresholds are met
//! - `FullImpression` once the whole output has been on screen
//! - `Focused` while the output covers half the viewport (or all of itself
//!   when it is smaller than that), `Unfocused` when that stops
//! - `Invisible` when the output leaves the rect entirely or the layout

use std::collections::{HashMap, HashSet};

use crate::engine::{BoundHandler, Event, HandlerSlot};
use crate::layout::VisibilityOutput;
use crate::types::Rect;

#[derive(Debug, Clone, Default, PartialEq)]
struct VisibilityItem {
    visible: bool,
    full_impression: bool,
    focused: bool,
    width_ratio: f32,
    height_ratio: f32,
}

/// A handler call produced by visibility processing.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityEvent {
    pub handler: BoundHandler,
    pub event: Event,
}

/// Reported visibility per global key.
#[derive(Debug, Default)]
pub struct VisibilityState {
    items: HashMap<String, (VisibilityItem, Vec<BoundHandler>)>,
}

fn ratio(part: i32, whole: i32) -> f32 {
    if whole <= 0 {
        return if part >= 0 { 1.0 } else { 0.0 };
    }
    part as f32 / whole as f32
}

/// Focus rule: half the viewport, or the whole output if it is smaller.
fn is_in_focused_range(bounds: Rect, visible: Rect, viewport: Rect) -> bool {
    let half_viewport = viewport.area() / 2;
    if bounds.area() >= half_viewport {
        visible.area() >= half_viewport
    } else {
        visible == bounds
    }
}

impl VisibilityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outputs currently tracked as on screen.
    pub fn tracked(&self) -> usize {
        self.items.len()
    }

    pub fn is_visible(&self, global_key: &str) -> bool {
        self.items.get(global_key).is_some_and(|(item, _)| item.visible)
    }

    /// Check `outputs` against `rect` and return the handler calls due.
    pub fn process(&mut self, outputs: &[VisibilityOutput], rect: Rect) -> Vec<VisibilityEvent> {
        let mut events = Vec::new();
        let mut seen: HashSet<&str> = HashSet::with_capacity(outputs.len());

        for output in outputs {
            let Some(visible) = output.bounds.intersect(&rect).filter(|r| !r.is_empty()) else {
                continue;
            };
            seen.insert(output.global_key.as_str());

            let handlers: Vec<BoundHandler> = output.handlers.iter().cloned().collect();
            let (item, stored) = self
                .items
                .entry(output.global_key.clone())
                .or_insert_with(|| (VisibilityItem::default(), Vec::new()));
            *stored = handlers;

            let emit = |events: &mut Vec<VisibilityEvent>, slot: HandlerSlot, event: Event| {
                if let Some(handler) = output.handler(slot) {
                    events.push(VisibilityEvent {
                        handler: handler.clone(),
                        event,
                    });
                }
            };

            let width_ratio = ratio(visible.width(), output.bounds.width());
            let height_ratio = ratio(visible.height(), output.bounds.height());
            if width_ratio != item.width_ratio || height_ratio != item.height_ratio {
                item.width_ratio = width_ratio;
                item.height_ratio = height_ratio;
                emit(
                    &mut events,
                    HandlerSlot::VisibilityChanged,
                    Event::VisibilityChanged {
                        visible_rect: visible.offset(-output.bounds.left, -output.bounds.top),
                        width_ratio,
                        height_ratio,
                    },
                );
            }

            if !item.visible
                && width_ratio >= output.visible_width_ratio
                && height_ratio >= output.visible_height_ratio
            {
                item.visible = true;
                emit(&mut events, HandlerSlot::Visible, Event::Visible);
            }

            if !item.full_impression && visible == output.bounds {
                item.full_impression = true;
                emit(&mut events, HandlerSlot::FullImpression, Event::FullImpression);
            }

            let focused = is_in_focused_range(output.bounds, visible, rect);
            if focused != item.focused {
                item.focused = focused;
                if focused {
                    emit(&mut events, HandlerSlot::Focused, Event::Focused);
                } else {
                    emit(&mut events, HandlerSlot::Unfocused, Event::Unfocused);
                }
            }
        }

        let gone: Vec<String> = self
            .items
            .keys()
            .filter(|key| !seen.contains(key.as_str()))
            .cloned()
            .collect();
        for key in gone {
            if let Some((item, handlers)) = self.items.remove(&key) {
                exit_events(&item, &handlers, &mut events);
            }
        }
        events
    }

    /// Report everything tracked as gone, e.g. on unmount of the tree.
    pub fn clear(&mut self) -> Vec<VisibilityEvent> {
        let mut events = Vec::new();
        for (_, (item, handlers)) in self.items.drain() {
            exit_events(&item, &handlers, &mut events);
        }
        events
    }
}

fn exit_events(item: &VisibilityItem, handlers: &[BoundHandler], events: &mut Vec<VisibilityEvent>) {
    let find = |slot: HandlerSlot| handlers.iter().find(|h| h.slot == slot).cloned();
    if item.focused {
        if let Some(handler) = find(HandlerSlot::Unfocused) {
            events.push(VisibilityEvent {
                handler,
                event: Event::Unfocused,
            });
        }
    }
    if item.visible {
        if let Some(handler) = find(HandlerSlot::Invisible) {
            events.push(VisibilityEvent {
                handler,
                event: Event::Invisible,
            });
        }
    }
    if let Some(handler) = find(HandlerSlot::VisibilityChanged) {
        events.push(VisibilityEvent {
            handler,
            event: Event::VisibilityChanged {
                visible_rect: Rect::EMPTY,
                width_ratio: 0.0,
                height_ratio: 0.0,
            },
        });
    }
}
