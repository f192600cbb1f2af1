//! # tessera
//!
//! Declarative UI render core for Rust.
//!
//! Components describe the output they want; tessera resolves them into an
//! intermediate node tree, lays that out with [taffy](https://github.com/DioxusLabs/taffy),
//! flattens the result into render units with stable ids, and reconciles
//! those units against live platform content with the minimal set of mount,
//! move, update and unmount operations.
//!
//! ## Architecture
//!
//! ```text
//! Component tree ─resolve─▶ LayoutNode arena ─layout─▶ LayoutState ─mount─▶ platform content
//!       ▲                         │                        │                   │
//!  ComponentTree            nested trees             output ids         incremental mount
//!  (futures, commit)        (deferred)               transitions        visibility, animations
//! ```
//!
//! Resolve and layout may run on any thread and can be cancelled or
//! interrupted at node boundaries. Mount runs on the UI thread only.
//!
//! ## Modules
//!
//! - [`types`] - Geometry, size specs, flex enums, colors, output flags
//! - [`engine`] - Components, global keys, state, event handlers, error scopes
//! - [`resolve`] - Component tree to node arena, resumable
//! - [`layout`] - Flexbox layout, output ids, collected render units
//! - [`mount`] - Reconciliation, pools, incremental mount, visibility, working ranges
//! - [`animation`] - Transitions and the animated property graph
//! - [`tree`] - Tree futures, commit, time-travel history
//! - [`testing`] - Recording platform doubles

pub mod animation;
pub mod config;
pub mod engine;
pub mod error;
pub mod layout;
pub mod mount;
pub mod resolve;
pub mod testing;
pub mod tree;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use config::RenderConfig;
pub use error::{CallbackError, CallbackPhase, ConfigError, RenderError, RenderResult};

pub use engine::{
    CanResolveInline, Component, ComponentBuilder, ComponentKind, ComponentRef, ComponentTypeId,
    ErrorDisposition, ErrorHandler, Event, EventHandlersController, HandlerSlot,
    NeedsSizeFromParent, ProducesMeasuredContent, StateRef, StateUpdater, handler_fn,
};

pub use resolve::{CancellationToken, ResolveEnv, ResolveOutcome, ResolvedTree, resolve};

pub use layout::{
    LayoutOutcome, LayoutState, OutputUnitType, RenderUnit, calculate_id, calculate_layout,
};

pub use mount::{
    ContentFactory, ContentType, HostContainer, MountContent, MountState, MountStats,
};

pub use animation::{Easing, Transition, TransitionManager};

pub use tree::{ComponentTree, DebugSnapshot, LayoutRequest};
