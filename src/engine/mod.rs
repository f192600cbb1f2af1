//! Component engine - the declarative input side of the pipeline.
//!
//! The engine owns everything application code touches before resolve:
//! - Component: immutable description of desired output (a closed sum type
//!   of layout intents plus capability traits)
//! - Keys: path-like global keys that identify a component across versions
//! - State: committed per-key state plus the racing-safe initial state cache
//! - Events: handler slots and the global-key indirection table used to
//!   dispatch into the newest component instance
//! - Error scopes: chained error handlers installed by ancestor components
//!
//! # Architecture
//!
//! ```text
//! Component (Arc) ──resolve──▶ LayoutNode ──layout──▶ RenderUnit ──mount──▶ content
//!      │                            │
//!      └── global key ──────────────┴──▶ EventHandlersController ◀── dispatch
//! ```

mod component;
mod error_scope;
mod events;
mod keys;
mod state;

pub use component::*;
pub use error_scope::*;
pub use events::*;
pub use keys::*;
pub use state::*;
