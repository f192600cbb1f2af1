//! Events - handler slots and the dispatch indirection table.
//!
//! Handlers never capture the component that declared them. A mounted output
//! only carries a [`BoundHandler`]: the owner's global key plus a slot. At
//! dispatch time the [`EventHandlersController`] looks the key up in a table
//! that is replaced once per committed tree version, so a handler bound by an
//! old version still reaches the newest component instance and its state.
//!
//! ```text
//! NodeInfo { click: BoundHandler("1,a", Click) }
//!                 │
//!                 ▼
//! EventHandlersController["1,a"] ─▶ DispatchInfo { component v7, state v7 }
//!                                         │
//!                                         └─▶ component.handler(Click)(ctx, event)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{CallbackError, CallbackPhase, RenderError};
use crate::types::Rect;

use super::{ComponentRef, ErrorScope, StateRef};

// =============================================================================
// Slots and events
// =============================================================================

/// Which handler of a component an event targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandlerSlot {
    Click,
    LongClick,
    Touch,
    FocusChanged,
    Visible,
    Invisible,
    Focused,
    Unfocused,
    FullImpression,
    VisibilityChanged,
    Accessibility,
}

impl HandlerSlot {
    /// Slots that make a node interactive and therefore need a host view.
    pub fn is_interaction(&self) -> bool {
        matches!(self, Self::Click | Self::LongClick | Self::Touch | Self::FocusChanged)
    }

    /// Slots consumed by visibility processing.
    pub fn is_visibility(&self) -> bool {
        matches!(
            self,
            Self::Visible
                | Self::Invisible
                | Self::Focused
                | Self::Unfocused
                | Self::FullImpression
                | Self::VisibilityChanged
        )
    }
}

/// Touch phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchAction {
    Down,
    Move,
    Up,
    Cancel,
}

/// An event delivered to a component handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Click,
    LongClick,
    Touch { x: f32, y: f32, action: TouchAction },
    FocusChanged { has_focus: bool },
    Visible,
    Invisible,
    Focused,
    Unfocused,
    FullImpression,
    VisibilityChanged {
        /// Visible part of the output in its own coordinates.
        visible_rect: Rect,
        /// Visible fraction of the width, `0.0..=1.0`.
        width_ratio: f32,
        /// Visible fraction of the height, `0.0..=1.0`.
        height_ratio: f32,
    },
    Accessibility { action: String },
}

impl Event {
    /// The slot this event is dispatched to.
    pub fn slot(&self) -> HandlerSlot {
        match self {
            Self::Click => HandlerSlot::Click,
            Self::LongClick => HandlerSlot::LongClick,
            Self::Touch { .. } => HandlerSlot::Touch,
            Self::FocusChanged { .. } => HandlerSlot::FocusChanged,
            Self::Visible => HandlerSlot::Visible,
            Self::Invisible => HandlerSlot::Invisible,
            Self::Focused => HandlerSlot::Focused,
            Self::Unfocused => HandlerSlot::Unfocused,
            Self::FullImpression => HandlerSlot::FullImpression,
            Self::VisibilityChanged { .. } => HandlerSlot::VisibilityChanged,
            Self::Accessibility { .. } => HandlerSlot::Accessibility,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// What a handler sees of its owner at dispatch time.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub global_key: String,
    /// Committed state of the owner, if it has any.
    pub state: Option<StateRef>,
    /// Tree version that produced the owner instance.
    pub version: u64,
}

/// Handler callback. Returns whether the event was consumed.
pub type HandlerFn =
    Arc<dyn Fn(&EventContext, &Event) -> Result<bool, CallbackError> + Send + Sync>;

/// Wrap a closure as a [`HandlerFn`].
pub fn handler_fn<F>(f: F) -> HandlerFn
where
    F: Fn(&EventContext, &Event) -> Result<bool, CallbackError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A handler declared on a component.
#[derive(Clone)]
pub struct EventHandler {
    pub slot: HandlerSlot,
    pub callback: HandlerFn,
}

impl EventHandler {
    pub fn new(slot: HandlerSlot, callback: HandlerFn) -> Self {
        Self { slot, callback }
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler").field("slot", &self.slot).finish()
    }
}

/// Stable reference to a handler: owner key plus slot, never the owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundHandler {
    pub owner_key: String,
    pub slot: HandlerSlot,
}

impl BoundHandler {
    pub fn new(owner_key: impl Into<String>, slot: HandlerSlot) -> Self {
        Self {
            owner_key: owner_key.into(),
            slot,
        }
    }
}

// =============================================================================
// EventHandlersController
// =============================================================================

/// Latest owner of a global key.
#[derive(Clone)]
pub struct DispatchInfo {
    pub component: ComponentRef,
    pub state: Option<StateRef>,
    pub version: u64,
    pub error_scope: ErrorScope,
}

/// Global key → current owner indirection table.
#[derive(Default)]
pub struct EventHandlersController {
    table: RwLock<HashMap<String, DispatchInfo>>,
    version: RwLock<u64>,
}

impl EventHandlersController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the table with the owners of a newly committed version.
    ///
    /// Older versions are ignored so a late commit can never roll the table
    /// back.
    pub fn commit(&self, version: u64, owners: impl IntoIterator<Item = (String, DispatchInfo)>) {
        let mut current = self.version.write();
        if version < *current {
            log::debug!("ignoring event table for stale version {version} (have {})", *current);
            return;
        }
        *current = version;
        let table: HashMap<String, DispatchInfo> = owners.into_iter().collect();
        log::trace!("event table v{version}: {} owners", table.len());
        *self.table.write() = table;
    }

    /// Version of the current table.
    pub fn version(&self) -> u64 {
        *self.version.read()
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// Current owner of a key.
    pub fn owner(&self, global_key: &str) -> Option<ComponentRef> {
        self.table.read().get(global_key).map(|info| info.component.clone())
    }

    /// Dispatch data of the current owner of a key.
    pub fn dispatch_info(&self, global_key: &str) -> Option<DispatchInfo> {
        self.table.read().get(global_key).cloned()
    }

    /// Dispatch `event` to the newest owner of `handler.owner_key`.
    ///
    /// Returns `Ok(false)` when the owner is gone or no longer declares the
    /// slot. Callback errors go through the owner's error scope.
    pub fn dispatch(&self, handler: &BoundHandler, event: &Event) -> Result<bool, RenderError> {
        let Some(info) = self.table.read().get(&handler.owner_key).cloned() else {
            log::debug!("no owner for {} ({:?})", handler.owner_key, handler.slot);
            return Ok(false);
        };
        let Some(declared) = info.component.handler(handler.slot) else {
            return Ok(false);
        };

        let ctx = EventContext {
            global_key: handler.owner_key.clone(),
            state: info.state.clone(),
            version: info.version,
        };
        match (declared.callback)(&ctx, event) {
            Ok(consumed) => Ok(consumed),
            Err(error) => {
                info.error_scope
                    .route(info.component.name(), CallbackPhase::Event, error)?;
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Component, downcast_state};
    use crate::testing::TestLeaf;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn owner(version: u64, seen: Arc<AtomicU64>) -> DispatchInfo {
        let component = Component::leaf("Button", TestLeaf::fixed(10.0, 10.0))
            .on_click(handler_fn(move |ctx, _| {
                seen.store(ctx.version, Ordering::SeqCst);
                Ok(true)
            }))
            .build();
        DispatchInfo {
            component,
            state: Some(Arc::new(version as u32)),
            version,
            error_scope: ErrorScope::root(),
        }
    }

    #[test]
    fn test_old_binding_reaches_newest_owner() {
        let seen = Arc::new(AtomicU64::new(0));
        let controller = EventHandlersController::new();
        let bound = BoundHandler::new("1,a", HandlerSlot::Click);

        controller.commit(1, [("1,a".to_string(), owner(1, seen.clone()))]);
        controller.commit(2, [("1,a".to_string(), owner(2, seen.clone()))]);

        assert!(controller.dispatch(&bound, &Event::Click).unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stale_commit_ignored() {
        let seen = Arc::new(AtomicU64::new(0));
        let controller = EventHandlersController::new();
        controller.commit(3, [("k".to_string(), owner(3, seen.clone()))]);
        controller.commit(2, []);

        assert_eq!(controller.version(), 3);
        assert_eq!(controller.len(), 1);
        let info = controller.table.read().get("k").cloned().unwrap();
        assert_eq!(downcast_state::<u32>(info.state.as_ref().unwrap()), Some(&3));
    }

    #[test]
    fn test_missing_owner_or_slot_is_not_consumed() {
        let seen = Arc::new(AtomicU64::new(0));
        let controller = EventHandlersController::new();
        controller.commit(1, [("k".to_string(), owner(1, seen))]);

        let gone = BoundHandler::new("other", HandlerSlot::Click);
        assert!(!controller.dispatch(&gone, &Event::Click).unwrap());
        let no_slot = BoundHandler::new("k", HandlerSlot::LongClick);
        assert!(!controller.dispatch(&no_slot, &Event::LongClick).unwrap());
    }

    #[test]
    fn test_failing_handler_routes_to_root() {
        let controller = EventHandlersController::new();
        let component = Component::leaf("Button", TestLeaf::fixed(1.0, 1.0))
            .on_click(handler_fn(|_, _| Err(CallbackError::new("nope"))))
            .build();
        controller.commit(
            1,
            [(
                "k".to_string(),
                DispatchInfo {
                    component,
                    state: None,
                    version: 1,
                    error_scope: ErrorScope::root(),
                },
            )],
        );

        let err = controller
            .dispatch(&BoundHandler::new("k", HandlerSlot::Click), &Event::Click)
            .unwrap_err();
        assert!(matches!(err, RenderError::Callback { phase: CallbackPhase::Event, .. }));
    }

    #[test]
    fn test_event_slots() {
        assert_eq!(Event::Touch { x: 0.0, y: 0.0, action: TouchAction::Down }.slot(), HandlerSlot::Touch);
        assert!(HandlerSlot::Click.is_interaction());
        assert!(HandlerSlot::FullImpression.is_visibility());
        assert!(!HandlerSlot::Accessibility.is_visibility());
    }
}
