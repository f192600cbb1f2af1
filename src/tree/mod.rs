//! Tree - the owner of a root component across layout versions.
//!
//! # Architecture
//!
//! ```text
//!  set_root / set_size_spec / update_state
//!                 │
//!                 ▼
//!        ┌──────────────────┐  join   ┌────────────┐
//!        │  ComponentTree   │ ──────▶ │ TreeFuture │ ◀── other callers
//!        │  committed state │         └────────────┘
//!        │  debug history   │ ◀─ commit ─┘
//!        └──────────────────┘
//!                 │ Arc<LayoutState>
//!                 ▼
//!            MountState (UI thread)
//! ```

mod component_tree;
mod debug;
mod future;

pub use component_tree::ComponentTree;
pub use debug::{DebugHistory, DebugSnapshot};
pub use future::{FutureResult, LayoutRequest, SharedError, TreeFuture};
